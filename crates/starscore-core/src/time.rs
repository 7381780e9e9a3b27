//! Fixed UTC+8 civil clock.
//!
//! Records carry a Beijing-time timestamp next to the server `created_at`.
//! The offset is fixed and never consults the host timezone database.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

const BEIJING_OFFSET_SECS: i32 = 8 * 60 * 60;

#[must_use]
pub fn beijing_offset() -> FixedOffset {
    FixedOffset::east_opt(BEIJING_OFFSET_SECS).expect("UTC+8 is within the valid offset range")
}

/// Converts a UTC instant to Beijing civil time.
#[must_use]
pub fn to_beijing(at: DateTime<Utc>) -> DateTime<FixedOffset> {
    at.with_timezone(&beijing_offset())
}

#[must_use]
pub fn beijing_now() -> DateTime<FixedOffset> {
    to_beijing(Utc::now())
}

/// Calendar day in Beijing for the given instant.
#[must_use]
pub fn beijing_day(at: DateTime<Utc>) -> NaiveDate {
    to_beijing(at).date_naive()
}
