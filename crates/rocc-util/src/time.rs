//! Time utilities for rocc
//!
//! Session records carry wall-clock timestamps for diagnostics. Timer
//! enforcement never uses these; it runs on the Tokio monotonic clock.

use chrono::{DateTime, Local};
use std::time::Duration;

/// Get the current local time.
#[allow(clippy::disallowed_methods)] // The single wrapper around Local::now()
pub fn now() -> DateTime<Local> {
    Local::now()
}

/// Format a DateTime for logs and the audit listing.
pub fn format_datetime_full(dt: &DateTime<Local>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Convert whole seconds (as carried in Diameter Unsigned32 AVPs) to a Duration
pub fn seconds(secs: u64) -> Duration {
    Duration::from_secs(secs)
}

/// Double a duration, saturating instead of overflowing
pub fn doubled(d: Duration) -> Duration {
    d.checked_mul(2).unwrap_or(Duration::MAX)
}
