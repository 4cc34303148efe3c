//! Input validation for names and report periods

use anyhow::{anyhow, Result};

use crate::store::ReportPeriod;

pub const MAX_USER_NAME_LENGTH: usize = 256;
pub const MAX_SEGMENT_NAME_LENGTH: usize = 128;
/// Cap on names per reconcile list
pub const MAX_BATCH_ITEMS: usize = 1_000;

pub const MIN_REPORT_YEAR: i32 = 1970;
pub const MAX_REPORT_YEAR: i32 = 9999;

fn validate_name(value: &str, max_len: usize) -> Result<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("cannot be empty"));
    }

    let len = trimmed.chars().count();
    if len > max_len {
        return Err(anyhow!("too long: {len} chars (max: {max_len})"));
    }

    if trimmed.chars().any(char::is_control) {
        return Err(anyhow!("contains control characters"));
    }

    Ok(())
}

pub fn validate_user_name(name: &str) -> Result<()> {
    validate_name(name, MAX_USER_NAME_LENGTH)
}

/// Segment names are also used as URL path parameters and CSV fields.
pub fn validate_segment_name(name: &str) -> Result<()> {
    validate_name(name, MAX_SEGMENT_NAME_LENGTH)
}

pub fn validate_batch_len(items: &[String]) -> Result<()> {
    if items.len() > MAX_BATCH_ITEMS {
        return Err(anyhow!(
            "too many segments: {} (max: {MAX_BATCH_ITEMS})",
            items.len()
        ));
    }
    Ok(())
}

pub fn validate_report_period(period: &ReportPeriod) -> Result<()> {
    if !(1..=12).contains(&period.month) {
        return Err(anyhow!("month must be between 1 and 12, got {}", period.month));
    }
    if !(MIN_REPORT_YEAR..=MAX_REPORT_YEAR).contains(&period.year) {
        return Err(anyhow!(
            "year must be between {MIN_REPORT_YEAR} and {MAX_REPORT_YEAR}, got {}",
            period.year
        ));
    }
    Ok(())
}
