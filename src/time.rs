//! A common source of wall-clock time.
//!
//! Every timestamp in the system is milliseconds since the Unix epoch. Events
//! may carry their own timestamps; when they do not, the ingest path stamps
//! them with `now_ms` at delivery.

use chrono::Utc;

/// The current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
