//! Utility functions and helpers

use chrono::Utc;

/// Current wall-clock time in seconds since the epoch, with millisecond precision
pub fn current_time_secs() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Shorten a hash for log output
pub fn short_hash(hash: &str) -> &str {
    match hash.char_indices().nth(12) {
        Some((idx, _)) => &hash[..idx],
        None => hash,
    }
}
