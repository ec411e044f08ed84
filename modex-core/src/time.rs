//! Container timestamps.
//!
//! Run start/end times are stored as `YYYY-MM-DDThh:mm:ss` strings in the
//! instrument's local time, with no zone designator.

use crate::{Error, Result};
use chrono::{Local, NaiveDateTime, TimeZone};

/// Timestamp format used by run start and end times.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Parses a local-time timestamp into seconds since the Unix epoch.
///
/// Ambiguous local times (during a DST fold) resolve to the earlier instant.
///
/// # Errors
/// Returns [`Error::InvalidTimestamp`] if the string does not match the
/// format or names a local time that does not exist.
pub fn parse_timestamp(text: &str) -> Result<i64> {
    let trimmed = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    let naive = NaiveDateTime::parse_from_str(trimmed, TIMESTAMP_FORMAT)
        .map_err(|e| Error::InvalidTimestamp(format!("'{trimmed}': {e}")))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp())
        .ok_or_else(|| Error::InvalidTimestamp(format!("'{trimmed}' does not exist in local time")))
}

/// Formats seconds since the Unix epoch as a local-time timestamp.
#[must_use]
pub fn format_timestamp(epoch: i64) -> String {
    match Local.timestamp_opt(epoch, 0).earliest() {
        Some(dt) => dt.format(TIMESTAMP_FORMAT).to_string(),
        None => epoch.to_string(),
    }
}
