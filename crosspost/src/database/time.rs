//! Timestamp helpers for database columns.
//!
//! All timestamps are stored as unix epoch milliseconds (INTEGER columns).

use chrono::{DateTime, TimeZone, Utc};

/// Current time as unix epoch milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert a stored millisecond timestamp back to a UTC instant.
///
/// Out-of-range values clamp to the unix epoch rather than panicking on
/// corrupt rows.
pub fn ms_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or_else(|| Utc.timestamp_millis_opt(0).single().unwrap_or_default())
}

/// Convert a UTC instant to unix epoch milliseconds.
pub fn datetime_to_ms(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let now = Utc::now();
        let ms = datetime_to_ms(now);
        let back = ms_to_datetime(ms);
        assert_eq!(back.timestamp_millis(), now.timestamp_millis());
    }
}
