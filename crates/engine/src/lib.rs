pub mod config;
pub mod deletion;
pub mod error;
pub mod flag;
pub mod hooks;
pub mod visit;
pub mod world;

use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock time in epoch milliseconds, the unit of every flag and
/// timestamp the engine compares.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Render epoch milliseconds for logs, e.g. `2026-10-17 09:30:00 UTC`.
pub fn format_millis(millis: i64) -> String {
    match chrono::DateTime::from_timestamp_millis(millis) {
        Some(at) if millis < i64::MAX / 2 => at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        _ => "never".to_string(),
    }
}
