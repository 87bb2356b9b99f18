//! Timestamp normalization for Habitica payloads
//!
//! The API mixes two date representations: millisecond epochs (sometimes
//! encoded as numeric strings) and ISO-8601-ish wall-clock strings with an
//! optional fractional/timezone tail. Everything is normalized to UTC epoch
//! seconds before it touches the database.

use chrono::NaiveDateTime;
use serde_json::Value;

/// Error type for unparseable date values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatError {
    pub raw: String,
}

impl std::fmt::Display for FormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unrecognized timestamp format: {:?}", self.raw)
    }
}

impl std::error::Error for FormatError {}

/// Convert a raw JSON date value (millisecond epoch number, numeric string,
/// or `YYYY-MM-DDTHH:MM:SS[.fff...]` string) to UTC epoch seconds.
pub fn normalize(raw: &Value) -> Result<i64, FormatError> {
    match raw {
        Value::Number(n) => n
            .as_f64()
            .map(|ms| (ms / 1000.0) as i64)
            .ok_or_else(|| FormatError { raw: n.to_string() }),
        Value::String(s) => normalize_str(s),
        other => Err(FormatError {
            raw: other.to_string(),
        }),
    }
}

/// String form of [`normalize`]: numeric interpretation first, then
/// wall-clock parsing with everything after the first `.` discarded.
pub fn normalize_str(raw: &str) -> Result<i64, FormatError> {
    if let Ok(ms) = raw.trim().parse::<f64>() {
        return Ok((ms / 1000.0) as i64);
    }

    // "2015-01-01T00:00:00.000Z" -> "2015-01-01T00:00:00", read as UTC
    let head = raw.split('.').next().unwrap_or(raw);
    NaiveDateTime::parse_from_str(head, "%Y-%m-%dT%H:%M:%S")
        .map(|dt| dt.and_utc().timestamp())
        .map_err(|_| FormatError {
            raw: raw.to_string(),
        })
}
