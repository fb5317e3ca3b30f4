//! Generic interpreter for badge rules.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use super::rule::{Aggregate, Badge, BadgeCatalog, BadgeRule};
use crate::clock::resolve_assignment_date;
use crate::error::Result;
use crate::events::{BadgeEvent, EngagementEvent, EventKind};
use crate::storage::{BadgeStore, Database};
use crate::user::UserContext;

/// State that badge rules may read besides the event log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluationFacts {
    pub current_streak: u32,
}

/// Fold the events a rule accepts into the number its threshold is
/// compared against.
pub fn aggregate(
    rule: &BadgeRule,
    events: &[BadgeEvent],
    facts: EvaluationFacts,
    tz_offset_minutes: i32,
) -> f64 {
    let matching = events.iter().filter(|e| rule.accepts(&e.event));
    let numbers = |field: &str| -> Vec<f64> {
        events
            .iter()
            .filter(|e| rule.accepts(&e.event))
            .filter_map(|e| e.event.field(field).and_then(|v| v.as_number()))
            .collect()
    };
    match &rule.aggregate {
        Aggregate::Count => matching.count() as f64,
        Aggregate::Sum { field } => numbers(field).into_iter().sum(),
        Aggregate::Max { field } => numbers(field).into_iter().fold(0.0, f64::max),
        Aggregate::DistinctDays => matching
            .map(|e| resolve_assignment_date(e.occurred_at, tz_offset_minutes))
            .collect::<HashSet<_>>()
            .len() as f64,
        Aggregate::CurrentStreak => f64::from(facts.current_streak),
    }
}

/// Higher priority first, then id ascending.
pub fn display_order(a: &Badge, b: &Badge) -> std::cmp::Ordering {
    b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id))
}

pub struct BadgeEvaluator<'a> {
    catalog: &'a BadgeCatalog,
}

impl<'a> BadgeEvaluator<'a> {
    pub fn new(catalog: &'a BadgeCatalog) -> Self {
        Self { catalog }
    }

    /// Append `event` to the log, then evaluate. Returns the stored entry
    /// and the badges newly granted by this call.
    ///
    /// The append commits in its own transaction before evaluation starts,
    /// so the event is kept even if evaluation fails.
    pub fn handle_event(
        &self,
        db: &Database,
        user: &UserContext,
        event: EngagementEvent,
        facts: EvaluationFacts,
        now: DateTime<Utc>,
    ) -> Result<(BadgeEvent, Vec<Badge>)> {
        let entry = BadgeEvent {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.user_id.clone(),
            occurred_at: now,
            event,
        };
        let tx = db.write_transaction()?;
        BadgeStore::new(&tx).append_event(&entry)?;
        tx.commit()?;

        let tx = db.write_transaction()?;
        let granted = self.evaluate(&tx, user, &entry, facts, now)?;
        tx.commit()?;
        Ok((entry, granted))
    }

    /// Check every in-scope, not-yet-granted badge and grant the satisfied
    /// ones. Grants lost to a concurrent writer are left out of the result.
    pub fn evaluate(
        &self,
        conn: &Connection,
        user: &UserContext,
        source: &BadgeEvent,
        facts: EvaluationFacts,
        now: DateTime<Utc>,
    ) -> Result<Vec<Badge>> {
        let store = BadgeStore::new(conn);
        let granted = store.granted_ids(&user.user_id)?;
        let offset = user.effective_offset();
        let mut logs: HashMap<EventKind, Vec<BadgeEvent>> = HashMap::new();
        let mut newly = Vec::new();

        for badge in self.catalog.in_scope(user.tier, user.archetype.as_deref()) {
            if granted.contains(&badge.id) {
                continue;
            }
            let events = match logs.entry(badge.rule.event) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    entry.insert(store.events_of_kind(&user.user_id, badge.rule.event)?)
                }
            };
            let value = aggregate(&badge.rule, events, facts, offset);
            if !badge.rule.is_satisfied_by(value) {
                continue;
            }
            if store.grant(&user.user_id, &badge.id, now, &source.id)? {
                tracing::info!(
                    user_id = %user.user_id,
                    badge_id = %badge.id,
                    value,
                    source_event = %source.id,
                    "badge granted"
                );
                newly.push(badge.clone());
            }
        }

        newly.sort_by(display_order);
        Ok(newly)
    }
}
