// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time conversion.

use chrono::{DateTime, SecondsFormat, Utc};

/// Watermark of a (user, domain) with nothing stored yet.
pub const EPOCH_ZERO: DateTime<Utc> = DateTime::<Utc>::UNIX_EPOCH;

/// Format a UTC timestamp as RFC3339 with millisecond precision and a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC3339 timestamp into UTC.
pub fn parse_rfc3339(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Convert a stored millisecond value back to a timestamp.
pub fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(EPOCH_ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_uses_millis_and_z() {
        let date = from_millis(1_650_799_544_774);
        assert_eq!(format_utc_rfc3339(date), "2022-04-24T11:25:44.774Z");
    }

    #[test]
    fn test_parse_normalizes_offsets() {
        let parsed = parse_rfc3339("2022-04-24T13:25:44.774+02:00").unwrap();
        assert_eq!(parsed.timestamp_millis(), 1_650_799_544_774);
        assert!(parse_rfc3339("yesterday").is_none());
    }
}
