//! Timestamp helpers for the database layer.
//!
//! Timestamps are stored as `INTEGER` Unix epoch milliseconds (UTC).

use chrono::Utc;

/// Current time as Unix epoch milliseconds (UTC).
#[inline]
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_is_epoch_millis() {
        let before = Utc::now().timestamp_millis();
        let now = now_ms();
        assert!(now >= before);
        // Milliseconds, not seconds: anything after 2001 is above 1e12.
        assert!(now > 1_000_000_000_000);
    }
}
