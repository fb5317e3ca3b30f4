//! Shield budget windows.

use chrono::{Datelike, Duration, NaiveDate};

use crate::storage::{ShieldConfig, ShieldRefill};

/// First and last day of the shield period that contains `date`.
///
/// Rolling periods end on `date` itself; weekly periods start on the Monday
/// of `date`'s ISO week.
pub fn budget_window(config: &ShieldConfig, date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = match config.refill {
        ShieldRefill::Rolling => {
            let span = i64::from(config.period_days.max(1)) - 1;
            date - Duration::days(span)
        }
        ShieldRefill::Weekly => {
            date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
        }
    };
    (start, date)
}

/// How a gap of `missed` days is handled given the remaining budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapOutcome {
    /// No day was missed
    Continuous,
    /// The gap is covered, spending this many shields
    Bridged(u32),
    /// Not enough shields left
    Broken,
}

pub fn resolve_gap(missed: u32, remaining: u32) -> GapOutcome {
    match missed {
        0 => GapOutcome::Continuous,
        n if n <= remaining => GapOutcome::Bridged(n),
        _ => GapOutcome::Broken,
    }
}
