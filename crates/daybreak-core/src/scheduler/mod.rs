//! Daily ritual scheduler.
//!
//! Creates the user's assignment on first access and returns the stored one
//! afterwards. Idempotency under concurrent first access comes from the
//! assignment table's uniqueness constraints: a racer whose insert is
//! rejected re-reads the winner's row.

pub mod selection;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::catalog::RitualCatalog;
use crate::error::{CatalogError, DatabaseError, EngineError, Result};
use crate::storage::{AssignmentStore, Config, DailyStateStore};
use crate::streak::DailyState;
use crate::user::UserContext;

pub use selection::{select, selection_seed, SelectionRequest};

/// One ritual of an assignment marked done.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RitualCompletion {
    pub ritual_id: String,
    pub completed_at: DateTime<Utc>,
}

/// The rituals shown to a user for one calendar date.
///
/// Generation 0 is the original pick; each reroll retires the live row and
/// adds the next generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: String,
    pub user_id: String,
    pub assignment_date: NaiveDate,
    pub generation: u32,
    pub ritual_ids: Vec<String>,
    pub completions: Vec<RitualCompletion>,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub rerolled: bool,
    pub created_at: DateTime<Utc>,
}

impl Assignment {
    fn new(
        user_id: &str,
        assignment_date: NaiveDate,
        generation: u32,
        ritual_ids: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            assignment_date,
            generation,
            ritual_ids,
            completions: Vec::new(),
            completed: false,
            completed_at: None,
            rerolled: false,
            created_at: now,
        }
    }

    pub fn is_completed(&self, ritual_id: &str) -> bool {
        self.completions.iter().any(|c| c.ritual_id == ritual_id)
    }

    pub fn contains(&self, ritual_id: &str) -> bool {
        self.ritual_ids.iter().any(|r| r == ritual_id)
    }
}

/// Result of a successful reroll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reroll {
    pub assignment: Assignment,
    pub replaced: Vec<String>,
}

/// Picks and persists assignments. Stateless: every call reads what it
/// needs through the given connection.
pub struct DailyScheduler<'a> {
    config: &'a Config,
    rituals: &'a RitualCatalog,
}

impl<'a> DailyScheduler<'a> {
    pub fn new(config: &'a Config, rituals: &'a RitualCatalog) -> Self {
        Self { config, rituals }
    }

    /// Return the live assignment for (user, date), creating it if absent.
    ///
    /// # Errors
    /// Fails only on storage errors or when the tier's pool is empty.
    pub fn get_or_create_assignment(
        &self,
        conn: &Connection,
        user: &UserContext,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Assignment> {
        let store = AssignmentStore::new(conn);
        if let Some(existing) = store.find_live(&user.user_id, date)? {
            return Ok(existing);
        }

        let history = store.list_for_date(&user.user_id, date)?;
        let generation = history.last().map(|a| a.generation + 1).unwrap_or(0);
        let rerolled: HashSet<String> = history
            .iter()
            .flat_map(|a| a.ritual_ids.iter().cloned())
            .collect();

        let assignment = self.pick(&store, user, date, generation, &rerolled, now)?;
        self.insert_or_fetch(&store, assignment)
    }

    /// Replace today's assignment once.
    ///
    /// `state` is the day's row; its reroll flag gates the call and is set
    /// on success.
    ///
    /// # Errors
    /// [`EngineError::RerollNotAllowed`] when the tier disables rerolls or a
    /// ritual of the current assignment is already completed;
    /// [`EngineError::RerollExhausted`] when today's reroll is used.
    pub fn reroll(
        &self,
        conn: &Connection,
        user: &UserContext,
        date: NaiveDate,
        state: &mut DailyState,
        now: DateTime<Utc>,
    ) -> Result<Reroll> {
        if !self.config.tier_policy(user.tier).reroll_enabled {
            return Err(EngineError::RerollNotAllowed {
                reason: format!("rerolls are disabled for the {} tier", user.tier),
            }
            .into());
        }
        if state.has_rerolled_today {
            return Err(EngineError::RerollExhausted { date }.into());
        }

        let current = self.get_or_create_assignment(conn, user, date, now)?;
        if !current.completions.is_empty() {
            return Err(EngineError::RerollNotAllowed {
                reason: "today's ritual is already completed".into(),
            }
            .into());
        }

        let store = AssignmentStore::new(conn);
        if !store.mark_rerolled(&current.id)? {
            return Err(EngineError::RerollExhausted { date }.into());
        }

        let mut excluded: HashSet<String> = store
            .list_for_date(&user.user_id, date)?
            .iter()
            .flat_map(|a| a.ritual_ids.iter().cloned())
            .collect();
        excluded.extend(current.ritual_ids.iter().cloned());

        let replacement = self.pick(&store, user, date, current.generation + 1, &excluded, now)?;
        let assignment = self.insert_or_fetch(&store, replacement)?;

        state.has_rerolled_today = true;
        state.updated_at = now;
        DailyStateStore::new(conn).update(state)?;

        tracing::info!(
            user_id = %user.user_id,
            date = %date,
            replaced = ?current.ritual_ids,
            rituals = ?assignment.ritual_ids,
            "assignment rerolled"
        );

        Ok(Reroll {
            assignment,
            replaced: current.ritual_ids,
        })
    }

    fn pick(
        &self,
        store: &AssignmentStore<'_>,
        user: &UserContext,
        date: NaiveDate,
        generation: u32,
        rerolled_today: &HashSet<String>,
        now: DateTime<Utc>,
    ) -> Result<Assignment> {
        let policy = self.config.tier_policy(user.tier);
        let pool = self.rituals.pool(user.tier);
        if pool.is_empty() {
            return Err(CatalogError::EmptyPool(user.tier).into());
        }

        let previous = store
            .latest_live_before(&user.user_id, date)?
            .map(|a| a.ritual_ids)
            .unwrap_or_default();
        let previous_categories: Vec<String> = previous
            .iter()
            .filter_map(|id| self.rituals.get(id))
            .map(|r| r.category.clone())
            .collect();

        let request = SelectionRequest {
            user_id: &user.user_id,
            date,
            generation,
            count: policy.cardinality(user.tier),
            strategy: policy.selection,
            archetype: user.archetype.as_deref(),
            previous: &previous,
            rerolled_today,
            salt: &self.config.selection.salt,
        };
        let categories = self.rituals.categories(user.tier);
        let ritual_ids = select(&pool, &categories, &previous_categories, &request);

        tracing::debug!(
            user_id = %user.user_id,
            date = %date,
            generation,
            strategy = ?policy.selection,
            rituals = ?ritual_ids,
            "rituals selected"
        );

        Ok(Assignment::new(&user.user_id, date, generation, ritual_ids, now))
    }

    fn insert_or_fetch(
        &self,
        store: &AssignmentStore<'_>,
        assignment: Assignment,
    ) -> Result<Assignment> {
        if store.insert_if_absent(&assignment)? {
            tracing::info!(
                user_id = %assignment.user_id,
                date = %assignment.assignment_date,
                generation = assignment.generation,
                rituals = ?assignment.ritual_ids,
                "assignment created"
            );
            return Ok(assignment);
        }

        tracing::debug!(
            user_id = %assignment.user_id,
            date = %assignment.assignment_date,
            "assignment insert lost the race, reading winner"
        );
        let winner = store
            .find_live(&assignment.user_id, assignment.assignment_date)?
            .ok_or_else(|| {
                DatabaseError::Conflict(format!(
                    "assignment for {} on {} rejected but no live row exists",
                    assignment.user_id, assignment.assignment_date
                ))
            })?;
        Ok(winner)
    }
}
