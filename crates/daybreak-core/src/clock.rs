//! Day-boundary resolution.
//!
//! Every "once per day" guarantee in the engine depends on
//! [`resolve_assignment_date`]: the same instant and offset always resolve to
//! the same calendar date, independent of the server's local time zone.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};

/// Largest valid distance from UTC, in minutes (±14h).
pub const MAX_OFFSET_MINUTES: i32 = 14 * 60;

/// Validate a stored timezone offset.
///
/// Offsets outside ±14h are invalid and fall back to UTC.
pub fn sanitize_offset(tz_offset_minutes: i32) -> i32 {
    if (-MAX_OFFSET_MINUTES..=MAX_OFFSET_MINUTES).contains(&tz_offset_minutes) {
        tz_offset_minutes
    } else {
        tracing::warn!(
            tz_offset_minutes,
            "invalid timezone offset, falling back to UTC"
        );
        0
    }
}

/// Resolve the calendar date an instant falls on for a user's offset.
pub fn resolve_assignment_date(instant: DateTime<Utc>, tz_offset_minutes: i32) -> NaiveDate {
    let minutes = sanitize_offset(tz_offset_minutes);
    match FixedOffset::east_opt(minutes * 60) {
        Some(offset) => instant.with_timezone(&offset).date_naive(),
        None => instant.date_naive(),
    }
}

/// Number of whole calendar days strictly between `earlier` and `later`.
///
/// Consecutive days have a gap of 0.
pub fn missed_days_between(earlier: NaiveDate, later: NaiveDate) -> u32 {
    let diff = (later - earlier).num_days() - 1;
    diff.max(0) as u32
}

/// Source of "now". Injected so tests and replays can pin the instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock pinned to a fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    /// Noon UTC on the given date.
    pub fn at_noon(date: NaiveDate) -> Self {
        let instant = date
            .and_hms_opt(12, 0, 0)
            .map(|dt| dt.and_utc())
            .unwrap_or_else(Utc::now);
        Self(instant)
    }

    /// The same time of day, `days` later.
    pub fn advance_days(&self, days: i64) -> Self {
        Self(self.0 + Duration::days(days))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
