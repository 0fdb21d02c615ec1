//! Timestamp parsing for time columns.

use crate::value::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Formats accepted in addition to RFC 3339.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Date-only format, read as midnight.
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a timestamp string. Offsets are normalised to UTC.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, DATE_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Timestamp held by a table cell, if it is a parseable string.
pub fn value_to_timestamp(value: &Value) -> Option<NaiveDateTime> {
    value.as_str().and_then(parse_timestamp)
}
