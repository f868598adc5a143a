//! Time and timestamp helpers.

use chrono::{DateTime, Utc};

/// UTC timestamp used for `registered_at`, `updated_at`, export start times
/// and history entries.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}
