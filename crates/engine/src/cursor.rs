//! Opaque pagination cursors.
//!
//! A cursor is the base64 encoding of an ISO-8601 timestamp. Decode failure
//! or empty input is treated as "no cursor", i.e. page from the newest.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};

/// Encode an epoch-millisecond timestamp as an opaque cursor.
pub fn encode(timestamp_ms: i64) -> String {
    let iso = DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
        .to_rfc3339_opts(SecondsFormat::Millis, true);
    STANDARD.encode(iso)
}

/// Decode a cursor back to epoch milliseconds.
///
/// Missing, empty, or malformed cursors yield `None`.
pub fn decode(cursor: Option<&str>) -> Option<i64> {
    let cursor = cursor?.trim();
    if cursor.is_empty() {
        return None;
    }

    let bytes = STANDARD.decode(cursor).ok()?;
    let iso = String::from_utf8(bytes).ok()?;
    let parsed = DateTime::parse_from_rfc3339(&iso).ok()?;
    Some(parsed.with_timezone(&Utc).timestamp_millis())
}

/// Current time as epoch milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let ts = 1_700_000_000_123;
        assert_eq!(decode(Some(&encode(ts))), Some(ts));
    }

    #[test]
    fn test_invalid_input_means_no_cursor() {
        assert_eq!(decode(None), None);
        assert_eq!(decode(Some("")), None);
        assert_eq!(decode(Some("   ")), None);
        assert_eq!(decode(Some("not base64!!!")), None);
        // Valid base64 of a non-timestamp string.
        let garbage = STANDARD.encode("hello world");
        assert_eq!(decode(Some(&garbage)), None);
    }
}
