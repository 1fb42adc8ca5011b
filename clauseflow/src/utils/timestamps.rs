//! Timestamp helpers.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Timestamps are always UTC.
pub type Timestamp = DateTime<Utc>;

/// Returns `now - duration`, saturating at the earliest representable time.
#[must_use]
pub fn cutoff(now: Timestamp, duration: Duration) -> Timestamp {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|d| now.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
