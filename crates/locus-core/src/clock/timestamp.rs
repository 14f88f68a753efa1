//! ISO-8601 timestamp conversion.
//!
//! Servers report `updated_at` as an RFC 3339 string. The store keeps
//! milliseconds since the Unix epoch.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

/// Parse an RFC 3339 timestamp into milliseconds since the Unix epoch.
///
/// # Errors
///
/// Returns the underlying [`chrono::ParseError`] when `raw` is not RFC 3339.
pub fn iso_to_millis(raw: &str) -> Result<i64, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw.trim()).map(|dt| dt.timestamp_millis())
}

/// Format milliseconds since the Unix epoch as an RFC 3339 UTC string with
/// millisecond precision, e.g. `2024-05-01T12:00:00.250Z`.
///
/// Out-of-range values clamp to the Unix epoch.
#[must_use]
pub fn millis_to_iso(millis: i64) -> String {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::UNIX_EPOCH)
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_utc_millis() {
        assert_eq!(iso_to_millis("1970-01-01T00:00:01.500Z"), Ok(1_500));
    }

    #[test]
    fn parses_offsets() {
        assert_eq!(
            iso_to_millis("2024-05-01T14:00:00+02:00"),
            iso_to_millis("2024-05-01T12:00:00Z")
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(iso_to_millis("yesterday").is_err());
    }

    #[test]
    fn formats_with_millis() {
        assert_eq!(millis_to_iso(1_714_564_800_250), "2024-05-01T12:00:00.250Z");
    }

    #[test]
    fn format_then_parse_preserves_millis() {
        let millis = 1_700_000_123_456;
        assert_eq!(iso_to_millis(&millis_to_iso(millis)), Ok(millis));
    }
}
