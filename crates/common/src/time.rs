//! Epoch-millisecond clock helpers.
//!
//! All timestamps on the wire and in the store are integer milliseconds
//! since the Unix epoch, UTC.

/// Current time as milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
