//! Timestamp discovery and parsing for loosely-typed source rows
//!
//! Tables in the wild name their time attribute differently and store it as
//! epoch seconds, epoch milliseconds, ISO 8601 strings, or US/Eastern wall
//! clock strings. [`find_timestamp`] tries each known attribute name
//! (case-insensitive) and returns the first value that parses.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};

/// Attribute names recognized as the record timestamp, lowercase
pub const TIMESTAMP_KEYS: &[&str] = &[
    "timestamp",
    "ts",
    "time",
    "date",
    "datetime",
    "created",
    "created_at",
    "createdat",
    "published",
    "published_at",
    "publishedat",
    "pub_date",
    "est_timestamp",
];

/// Epoch values above this are milliseconds
const MILLIS_THRESHOLD: f64 = 1e12;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Locate and parse the timestamp attribute of a row
pub fn find_timestamp(fields: &Map<String, Value>) -> Option<DateTime<Utc>> {
    fields
        .iter()
        .filter(|(key, _)| TIMESTAMP_KEYS.contains(&key.to_lowercase().as_str()))
        .find_map(|(_, value)| parse_timestamp(value))
}

/// Best-effort conversion of a JSON value to a UTC instant
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_f64().and_then(from_epoch),
        Value::String(s) => parse_timestamp_str(s),
        _ => None,
    }
}

/// Parse a textual timestamp
pub fn parse_timestamp_str(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(num) = s.parse::<f64>() {
        return from_epoch(num);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for (suffix, offset_hours) in [(" EST", -5), (" EDT", -4)] {
        if let Some(wall) = s.strip_suffix(suffix) {
            let offset = FixedOffset::east_opt(offset_hours * 3600)?;
            let naive = parse_naive(wall.trim())?;
            return offset
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.with_timezone(&Utc));
        }
    }

    if let Some(naive) = parse_naive(s) {
        return Some(Utc.from_utc_datetime(&naive));
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn parse_naive(s: &str) -> Option<NaiveDateTime> {
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

fn from_epoch(mut num: f64) -> Option<DateTime<Utc>> {
    if !num.is_finite() || num < 0.0 {
        return None;
    }
    if num > MILLIS_THRESHOLD {
        num /= 1000.0;
    }
    DateTime::from_timestamp(num.trunc() as i64, 0)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_epoch_seconds_and_millis() {
        assert_eq!(parse_timestamp(&json!(1_747_689_600)), Some(at(1_747_689_600)));
        assert_eq!(parse_timestamp(&json!(1_747_689_600_123_i64)), Some(at(1_747_689_600)));
        assert_eq!(parse_timestamp(&json!(1_747_689_600.9)), Some(at(1_747_689_600)));
        assert_eq!(parse_timestamp(&json!("1747689600")), Some(at(1_747_689_600)));
    }

    #[test]
    fn test_iso_strings() {
        assert_eq!(parse_timestamp_str("2025-05-19T21:20:00Z"), Some(at(1_747_689_600)));
        assert_eq!(parse_timestamp_str("2025-05-19T23:20:00+02:00"), Some(at(1_747_689_600)));
        // Naive values are taken as UTC
        assert_eq!(parse_timestamp_str("2025-05-19T21:20:00"), Some(at(1_747_689_600)));
        assert_eq!(parse_timestamp_str("2025-05-19 21:20:00"), Some(at(1_747_689_600)));
    }

    #[test]
    fn test_eastern_suffixes() {
        assert_eq!(parse_timestamp_str("2025-05-19 16:20:00 EST"), Some(at(1_747_689_600)));
        assert_eq!(parse_timestamp_str("2025-05-19T17:20:00 EDT"), Some(at(1_747_689_600)));
        assert_eq!(parse_timestamp_str("yesterday EST"), None);
    }

    #[test]
    fn test_unparseable_values() {
        assert_eq!(parse_timestamp(&json!(null)), None);
        assert_eq!(parse_timestamp(&json!(true)), None);
        assert_eq!(parse_timestamp(&json!("soon")), None);
        assert_eq!(parse_timestamp(&json!(-5)), None);
    }

    #[test]
    fn test_find_timestamp_is_case_insensitive() {
        let row = json!({"Title": "x", "PublishedAt": "2025-05-19T21:20:00Z"});
        let fields = row.as_object().unwrap();
        assert_eq!(find_timestamp(fields), Some(at(1_747_689_600)));
    }

    #[test]
    fn test_find_timestamp_skips_unparseable_candidates() {
        let row = json!({"date": "n/a", "ts": 1_747_689_600});
        assert_eq!(find_timestamp(row.as_object().unwrap()), Some(at(1_747_689_600)));

        let row = json!({"title": "no time here"});
        assert_eq!(find_timestamp(row.as_object().unwrap()), None);
    }
}
