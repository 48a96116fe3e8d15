//! Common types shared by REST and stream payloads.

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};

/// Timestamps above this are treated as milliseconds.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Timestamp as sent by the backend.
///
/// The backend serializes database rows with ISO-8601 strings, while pushed
/// payloads may carry Unix seconds or milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireTime {
    /// Integer Unix time.
    Integer(i64),
    /// Fractional Unix time.
    Fractional(f64),
    /// ISO-8601 or `YYYY-MM-DD HH:MM:SS` text.
    Text(String),
}

impl WireTime {
    /// Resolve to Unix seconds, or `None` if the value cannot be parsed.
    pub fn unix_seconds(&self) -> Option<i64> {
        match self {
            WireTime::Integer(n) => Some(normalize_epoch(*n)),
            WireTime::Fractional(f) if f.is_finite() => Some(normalize_epoch(f.trunc() as i64)),
            WireTime::Fractional(_) => None,
            WireTime::Text(s) => parse_text_time(s.trim()),
        }
    }
}

impl From<i64> for WireTime {
    fn from(secs: i64) -> Self {
        WireTime::Integer(secs)
    }
}

fn normalize_epoch(value: i64) -> i64 {
    if value.abs() >= MILLIS_THRESHOLD {
        value / 1000
    } else {
        value
    }
}

fn parse_text_time(s: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp());
    }

    // Naive timestamps are UTC.
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc().timestamp());
        }
    }

    s.parse::<i64>().ok().map(normalize_epoch)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(f64),
}

impl StringOrNumber {
    fn into_f64<E: serde::de::Error>(self) -> Result<f64, E> {
        match self {
            StringOrNumber::Number(n) => Ok(n),
            StringOrNumber::String(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|e| E::custom(format!("invalid number: {e}"))),
        }
    }
}

/// Deserialize an `f64` sent either as a JSON number or a numeric string.
pub(crate) fn number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    StringOrNumber::deserialize(deserializer)?.into_f64()
}

/// Like [`number`], accepting `null` or a missing field.
pub(crate) fn optional_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<StringOrNumber>::deserialize(deserializer)?
        .map(StringOrNumber::into_f64)
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_time_formats() {
        let iso = WireTime::Text("2025-11-26T21:17:14+00:00".into());
        let naive = WireTime::Text("2025-11-26 21:17:14".into());
        let naive_t = WireTime::Text("2025-11-26T21:17:14.250".into());
        let secs = WireTime::Integer(1_764_191_834);
        let millis = WireTime::Integer(1_764_191_834_000);

        for t in [iso, naive, naive_t, secs, millis] {
            assert_eq!(t.unix_seconds(), Some(1_764_191_834), "{t:?}");
        }
    }

    #[test]
    fn test_wire_time_rejects_garbage() {
        assert_eq!(WireTime::Text("yesterday".into()).unix_seconds(), None);
        assert_eq!(WireTime::Fractional(f64::NAN).unix_seconds(), None);
    }

    #[test]
    fn test_wire_time_deserializes_untagged() {
        let t: WireTime = serde_json::from_str("1700000000").unwrap();
        assert_eq!(t, WireTime::Integer(1_700_000_000));
        let t: WireTime = serde_json::from_str("\"2023-11-14T22:13:20Z\"").unwrap();
        assert_eq!(t.unix_seconds(), Some(1_700_000_000));
    }
}
