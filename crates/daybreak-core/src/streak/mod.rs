//! Streak and daily-state tracking.
//!
//! A day's streak length is derived exactly once, on its first completion,
//! from the most recent earlier day that had a completion. Nothing else
//! writes it.

pub mod shield;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::catalog::RitualCatalog;
use crate::clock::missed_days_between;
use crate::error::{DatabaseError, EngineError, Result};
use crate::events::{BadgeEvent, EngagementEvent};
use crate::scheduler::{Assignment, RitualCompletion};
use crate::storage::{AssignmentStore, BadgeStore, Config, DailyStateStore};
use crate::tier::Tier;
use crate::user::UserContext;

pub use shield::{budget_window, resolve_gap, GapOutcome};

/// Per-user, per-day engagement record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyState {
    pub user_id: String,
    pub state_date: NaiveDate,
    pub tier: Tier,
    pub rituals_completed_today: u32,
    pub daily_cap_reached: bool,
    /// Streak as of this day; 0 until the day's first completion
    pub streak_length: u32,
    /// Shields spent to bridge the gap before this day
    pub shields_consumed: u32,
    pub has_rerolled_today: bool,
    /// Offset used to resolve this day
    pub tz_offset_minutes: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DailyState {
    /// A fresh row for a day with no activity yet.
    pub fn open(
        user_id: &str,
        state_date: NaiveDate,
        tier: Tier,
        tz_offset_minutes: i32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            state_date,
            tier,
            rituals_completed_today: 0,
            daily_cap_reached: false,
            streak_length: 0,
            shields_consumed: 0,
            has_rerolled_today: false,
            tz_offset_minutes,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Optional facts supplied with a completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal_word_count: Option<u32>,
}

/// Outcome of [`StreakTracker::record_completion`].
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRecord {
    pub state: DailyState,
    pub assignment: Assignment,
    /// The ritual was already done; nothing changed
    pub already_completed: bool,
    pub shields_used: u32,
    /// Events appended to the badge log by this call, in order
    pub events: Vec<BadgeEvent>,
}

/// Read model of a user's streak.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakSummary {
    /// Live streak; 0 once a gap can no longer be bridged
    pub current_streak: u32,
    pub last_completed: Option<NaiveDate>,
    pub completed_today: bool,
    pub shields_remaining: u32,
    pub shield_budget: u32,
}

pub struct StreakTracker<'a> {
    config: &'a Config,
    rituals: &'a RitualCatalog,
}

impl<'a> StreakTracker<'a> {
    pub fn new(config: &'a Config, rituals: &'a RitualCatalog) -> Self {
        Self { config, rituals }
    }

    /// The day writes should land on: `resolved`, or the user's latest day
    /// if an offset change left `resolved` behind it.
    pub fn active_date(
        &self,
        conn: &Connection,
        user: &UserContext,
        resolved: NaiveDate,
    ) -> Result<NaiveDate> {
        match DailyStateStore::new(conn).latest(&user.user_id)? {
            Some(latest) if latest.state_date > resolved => {
                tracing::debug!(
                    user_id = %user.user_id,
                    resolved = %resolved,
                    latest = %latest.state_date,
                    "resolved day already closed"
                );
                Ok(latest.state_date)
            }
            _ => Ok(resolved),
        }
    }

    /// Return the day's row, creating it on first engagement.
    ///
    /// # Errors
    /// [`EngineError::DayClosed`] if the user already has a later day.
    pub fn open_day(
        &self,
        conn: &Connection,
        user: &UserContext,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<DailyState> {
        let store = DailyStateStore::new(conn);
        if let Some(latest) = store.latest(&user.user_id)? {
            if latest.state_date > date {
                return Err(EngineError::DayClosed {
                    date,
                    latest: latest.state_date,
                }
                .into());
            }
        }
        let fresh = DailyState::open(&user.user_id, date, user.tier, user.effective_offset(), now);
        if store.insert_if_absent(&fresh)? {
            tracing::debug!(user_id = %user.user_id, date = %date, "daily state opened");
        }
        let state = store.get(&user.user_id, date)?.ok_or_else(|| {
            DatabaseError::Conflict(format!(
                "daily state for {} on {date} vanished after insert",
                user.user_id
            ))
        })?;
        Ok(state)
    }

    /// Shields still available for a completion on `date`.
    pub fn shields_remaining(
        &self,
        conn: &Connection,
        user: &UserContext,
        date: NaiveDate,
    ) -> Result<u32> {
        let budget = self.config.tier_policy(user.tier).shield_budget;
        if budget == 0 {
            return Ok(0);
        }
        let (from, to) = budget_window(&self.config.shield, date);
        let spent = DailyStateStore::new(conn).shields_consumed_between(&user.user_id, from, to)?;
        Ok(budget.saturating_sub(spent))
    }

    /// Mark `ritual_id` done on `date` and update the day's counters.
    ///
    /// Must run inside the caller's write transaction: the assignment,
    /// the daily state and the appended badge events commit together.
    ///
    /// # Errors
    /// [`EngineError::NotAssigned`] if the ritual is not on the live
    /// assignment; [`EngineError::DailyCapReached`] if the tier's cap is
    /// already met; [`EngineError::DayClosed`] if a later day exists. A
    /// repeated completion is not an error.
    pub fn record_completion(
        &self,
        conn: &Connection,
        user: &UserContext,
        date: NaiveDate,
        ritual_id: &str,
        details: &CompletionDetails,
        now: DateTime<Utc>,
    ) -> Result<CompletionRecord> {
        let mut state = self.open_day(conn, user, date, now)?;
        let assignments = AssignmentStore::new(conn);
        let not_assigned = || EngineError::NotAssigned {
            ritual_id: ritual_id.to_string(),
            date,
        };

        let mut assignment = assignments
            .find_live(&user.user_id, date)?
            .ok_or_else(not_assigned)?;
        if !assignment.contains(ritual_id) {
            return Err(not_assigned().into());
        }
        if assignment.is_completed(ritual_id) {
            tracing::debug!(user_id = %user.user_id, ritual_id, "duplicate completion ignored");
            return Ok(CompletionRecord {
                state,
                assignment,
                already_completed: true,
                shields_used: 0,
                events: Vec::new(),
            });
        }

        let cap = self.config.tier_policy(user.tier).daily_cap.max(1);
        if state.rituals_completed_today >= cap {
            return Err(EngineError::DailyCapReached { date, cap }.into());
        }

        let mut shields_used = 0;
        if state.rituals_completed_today == 0 {
            let (streak, shields) = self.continue_streak(conn, user, date)?;
            state.streak_length = streak;
            state.shields_consumed = shields;
            shields_used = shields;
        }
        state.rituals_completed_today += 1;
        state.daily_cap_reached = state.rituals_completed_today >= cap;
        state.tier = user.tier;
        state.updated_at = now;
        DailyStateStore::new(conn).update(&state)?;

        assignment.completions.push(RitualCompletion {
            ritual_id: ritual_id.to_string(),
            completed_at: now,
        });
        assignment.completed = assignment
            .ritual_ids
            .iter()
            .all(|id| assignment.is_completed(id));
        if assignment.completed {
            assignment.completed_at = Some(now);
        }
        assignments.save_completions(
            &assignment.id,
            &assignment.completions,
            assignment.completed,
            assignment.completed_at,
        )?;

        let mut events = Vec::with_capacity(2);
        if shields_used > 0 {
            events.push(EngagementEvent::ShieldConsumed {
                assignment_date: date,
                shields: shields_used,
            });
        }
        events.push(EngagementEvent::RitualCompleted {
            ritual_id: ritual_id.to_string(),
            assignment_date: date,
            category: self
                .rituals
                .get(ritual_id)
                .map(|r| r.category.clone())
                .unwrap_or_default(),
            streak_count: state.streak_length,
            journal_word_count: details.journal_word_count,
        });

        let badge_store = BadgeStore::new(conn);
        let events = events
            .into_iter()
            .map(|event| {
                let entry = BadgeEvent {
                    id: uuid::Uuid::new_v4().to_string(),
                    user_id: user.user_id.clone(),
                    occurred_at: now,
                    event,
                };
                badge_store.append_event(&entry).map(|_| entry)
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        tracing::info!(
            user_id = %user.user_id,
            date = %date,
            ritual_id,
            streak = state.streak_length,
            shields_used,
            completed_today = state.rituals_completed_today,
            "ritual completed"
        );

        Ok(CompletionRecord {
            state,
            assignment,
            already_completed: false,
            shields_used,
            events,
        })
    }

    /// Streak length and shields spent for the first completion on `date`.
    fn continue_streak(
        &self,
        conn: &Connection,
        user: &UserContext,
        date: NaiveDate,
    ) -> Result<(u32, u32)> {
        let Some(last) = DailyStateStore::new(conn).last_completed_before(&user.user_id, date)?
        else {
            return Ok((1, 0));
        };

        let missed = missed_days_between(last.state_date, date);
        let remaining = self.shields_remaining(conn, user, date)?;
        match resolve_gap(missed, remaining) {
            GapOutcome::Continuous => Ok((last.streak_length + 1, 0)),
            GapOutcome::Bridged(shields) => {
                tracing::info!(
                    user_id = %user.user_id,
                    date = %date,
                    missed,
                    shields,
                    "streak gap bridged by shields"
                );
                Ok((last.streak_length + 1, shields))
            }
            GapOutcome::Broken => {
                tracing::debug!(user_id = %user.user_id, missed, remaining, "streak reset");
                Ok((1, 0))
            }
        }
    }

    /// The streak as it stands on `today`, without writing anything.
    pub fn current_streak(
        &self,
        conn: &Connection,
        user: &UserContext,
        today: NaiveDate,
    ) -> Result<StreakSummary> {
        let budget = self.config.tier_policy(user.tier).shield_budget;
        let shields_remaining = self.shields_remaining(conn, user, today)?;
        let last = DailyStateStore::new(conn).last_completed_on_or_before(&user.user_id, today)?;

        let (current_streak, last_completed, completed_today) = match last {
            None => (0, None, false),
            Some(day) if day.state_date == today => (day.streak_length, Some(today), true),
            Some(day) => {
                let missed = missed_days_between(day.state_date, today);
                let alive = !matches!(resolve_gap(missed, shields_remaining), GapOutcome::Broken);
                let streak = if alive { day.streak_length } else { 0 };
                (streak, Some(day.state_date), false)
            }
        };

        Ok(StreakSummary {
            current_streak,
            last_completed,
            completed_today,
            shields_remaining,
            shield_budget: budget,
        })
    }
}
