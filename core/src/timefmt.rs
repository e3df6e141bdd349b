//! Timestamp parsing and the fixed `YYYY-MM-DD HH:MM:SS` wire format.

use chrono::{DateTime, NaiveDateTime, Timelike};
use serde::{Deserialize, Deserializer, Serializer};

pub const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

/// Parse a ledger timestamp. RFC 3339 values are converted to naive UTC.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

pub fn display(ts: &NaiveDateTime) -> String {
    ts.format(DISPLAY_FORMAT).to_string()
}

/// Floor a timestamp to the start of its hour.
pub fn floor_to_hour(ts: &NaiveDateTime) -> NaiveDateTime {
    ts.date()
        .and_hms_opt(ts.hour(), 0, 0)
        .unwrap_or(*ts)
}

/// `#[serde(with = "crate::timefmt")]` for `NaiveDateTime` fields.
pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&display(ts))
}

pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
    let raw = String::deserialize(d)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_layouts() {
        let expected = NaiveDateTime::parse_from_str("2024-03-01 10:15:30", DISPLAY_FORMAT).unwrap();
        assert_eq!(parse_timestamp("2024-03-01 10:15:30"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T10:15:30"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T10:15:30Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T12:15:30+02:00"), Some(expected));
        assert!(parse_timestamp("2024-03-01 10:15:30.250").is_some());
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn floors_to_hour() {
        let ts = parse_timestamp("2024-03-01 10:59:59").unwrap();
        assert_eq!(display(&floor_to_hour(&ts)), "2024-03-01 10:00:00");
    }
}
