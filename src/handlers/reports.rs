//! History report export

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Json},
};

use super::state::{run_blocking, AppState};
use crate::errors::{AppError, ValidationErrorExt};
use crate::export;
use crate::store::ReportPeriod;
use crate::validation;

/// GET /csv-report - Membership history for one UTC month as CSV
///
/// The period comes in a JSON body `{year, month}`; the file is returned as
/// an attachment named `report-YYYY-M.csv`.
#[tracing::instrument(skip(state))]
pub async fn csv_report(
    State(state): State<AppState>,
    Json(period): Json<ReportPeriod>,
) -> Result<impl IntoResponse, AppError> {
    validation::validate_report_period(&period).map_validation_err("period")?;

    let (csv, rows) = run_blocking(&state, move |service| {
        let records = service.history().query(period)?;
        Ok(export::history_csv_bytes(records)?)
    })
    .await?;

    tracing::info!(rows, "History report generated");

    let disposition = format!(
        "attachment; filename=\"report-{}-{}.csv\"",
        period.year, period.month
    );

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    ))
}
