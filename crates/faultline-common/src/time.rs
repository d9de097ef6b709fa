//! ---
//! fl_section: "01-core-functionality"
//! fl_subsection: "module"
//! fl_type: "source"
//! fl_scope: "code"
//! fl_description: "Shared primitives and utilities for the simulation runtime."
//! fl_version: "v0.1.0"
//! fl_owner: "sre-platform"
//! ---
use std::time::Duration;

use chrono::Utc;

/// Wall-clock seconds since the Unix epoch.
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

/// Absolute deadline `duration` after `start`, saturating at `i64::MAX`.
pub fn deadline_after(start: i64, duration: Duration) -> i64 {
    let secs = i64::try_from(duration.as_secs()).unwrap_or(i64::MAX);
    start.saturating_add(secs)
}
