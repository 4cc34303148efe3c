//! CSV rendering of the membership history

use std::io::Write;

use crate::store::{HistoryRecord, StoreError};

pub const CSV_HEADER: [&str; 4] = ["User", "Action", "Segment", "Date"];

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("csv write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("csv flush failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Write the header and one row per record. Returns the number of rows.
pub fn write_history_csv<I, W>(records: I, writer: W) -> Result<usize, ExportError>
where
    I: IntoIterator<Item = Result<HistoryRecord, StoreError>>,
    W: Write,
{
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(CSV_HEADER)?;

    let mut rows = 0;
    for record in records {
        let record = record?;
        csv_writer.write_record([
            record.user_id.to_string(),
            record.action.as_str().to_string(),
            record.segment_name,
            record.timestamp.to_rfc3339(),
        ])?;
        rows += 1;
    }

    csv_writer.flush()?;
    Ok(rows)
}

/// Render into an in-memory buffer, for HTTP responses.
pub fn history_csv_bytes<I>(records: I) -> Result<(Vec<u8>, usize), ExportError>
where
    I: IntoIterator<Item = Result<HistoryRecord, StoreError>>,
{
    let mut buffer = Vec::new();
    let rows = write_history_csv(records, &mut buffer)?;
    Ok((buffer, rows))
}
