//! Engine facade: the operations request handlers call.
//!
//! The engine holds no per-user state. Each call takes the caller's own
//! [`Database`] connection, resolves "today" through the clock and the
//! user's offset, and runs its writes in `BEGIN IMMEDIATE` transactions.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::badges::{order_grants, Badge, BadgeCatalog, BadgeEvaluator, BadgeGrant, EvaluationFacts};
use crate::catalog::{cached_badges, cached_rituals, CachedCatalog, RitualCatalog};
use crate::clock::{resolve_assignment_date, Clock, SystemClock};
use crate::error::{EngineError, Result};
use crate::events::{BadgeEvent, EngagementEvent};
use crate::rewards::{deliver, NullLedger, RewardLedger, RewardNotice, RewardSource};
use crate::scheduler::{Assignment, DailyScheduler};
use crate::storage::{BadgeStore, Config, DailyStateStore, Database};
use crate::streak::{CompletionDetails, DailyState, StreakSummary, StreakTracker};
use crate::user::UserContext;

/// Result of `complete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionOutcome {
    pub daily_state: DailyState,
    pub new_badges: Vec<Badge>,
    /// True when the ritual had already been completed; the state is the
    /// prior one and nothing was written
    pub already_completed: bool,
}

/// Result of `reroll`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerollOutcome {
    pub assignment: Assignment,
    pub replaced: Vec<String>,
    pub new_badges: Vec<Badge>,
}

pub struct Engine {
    config: Config,
    rituals: CachedCatalog<RitualCatalog>,
    badges: CachedCatalog<BadgeCatalog>,
    clock: Arc<dyn Clock>,
    ledger: Arc<dyn RewardLedger>,
}

impl Engine {
    /// Build an engine whose catalogs come from the configured sources.
    ///
    /// # Errors
    /// Returns an error if either catalog fails its first load.
    pub fn new(config: Config) -> Result<Self> {
        let rituals = cached_rituals(&config.catalog)?;
        let badges = cached_badges(&config.catalog)?;
        Ok(Self {
            config,
            rituals,
            badges,
            clock: Arc::new(SystemClock),
            ledger: Arc::new(NullLedger),
        })
    }

    /// Build an engine over fixed catalogs.
    pub fn with_catalogs(config: Config, rituals: RitualCatalog, badges: BadgeCatalog) -> Self {
        Self {
            config,
            rituals: CachedCatalog::fixed(rituals),
            badges: CachedCatalog::fixed(badges),
            clock: Arc::new(SystemClock),
            ledger: Arc::new(NullLedger),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn RewardLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn rituals(&self) -> Arc<RitualCatalog> {
        self.rituals.get()
    }

    pub fn badge_catalog(&self) -> Arc<BadgeCatalog> {
        self.badges.get()
    }

    /// The user's current calendar date. Never earlier than a day the
    /// user already has, so an offset change cannot reopen closed history.
    pub fn today_date(&self, db: &Database, user: &UserContext) -> Result<NaiveDate> {
        let rituals = self.rituals.get();
        self.active_date(db.conn(), &rituals, user, self.clock.now())
    }

    fn active_date(
        &self,
        conn: &Connection,
        rituals: &RitualCatalog,
        user: &UserContext,
        now: DateTime<Utc>,
    ) -> Result<NaiveDate> {
        let resolved = resolve_assignment_date(now, user.tz_offset_minutes);
        StreakTracker::new(&self.config, rituals).active_date(conn, user, resolved)
    }

    /// Today's assignment, created on first access.
    pub fn today(&self, db: &Database, user: &UserContext) -> Result<Assignment> {
        let now = self.clock.now();
        let rituals = self.rituals.get();

        let tx = db.write_transaction()?;
        let date = self.active_date(&tx, &rituals, user, now)?;
        StreakTracker::new(&self.config, &rituals).open_day(&tx, user, date, now)?;
        let assignment =
            DailyScheduler::new(&self.config, &rituals).get_or_create_assignment(&tx, user, date, now)?;
        tx.commit()?;
        Ok(assignment)
    }

    /// Replace today's assignment, once per day.
    pub fn reroll(&self, db: &Database, user: &UserContext) -> Result<RerollOutcome> {
        let now = self.clock.now();
        let rituals = self.rituals.get();
        let tracker = StreakTracker::new(&self.config, &rituals);

        let tx = db.write_transaction()?;
        let date = self.active_date(&tx, &rituals, user, now)?;
        let mut state = tracker.open_day(&tx, user, date, now)?;
        let reroll =
            DailyScheduler::new(&self.config, &rituals).reroll(&tx, user, date, &mut state, now)?;
        let event = BadgeEvent {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.user_id.clone(),
            occurred_at: now,
            event: EngagementEvent::RitualRerolled {
                assignment_date: date,
                replaced: reroll.replaced.clone(),
            },
        };
        BadgeStore::new(&tx).append_event(&event)?;
        tx.commit()?;

        let new_badges = self.evaluate(db, user, &event, date)?;
        Ok(RerollOutcome {
            assignment: reroll.assignment,
            replaced: reroll.replaced,
            new_badges,
        })
    }

    /// Mark a ritual of today's assignment complete and evaluate badges.
    ///
    /// A repeated call returns the prior daily state with
    /// `already_completed` set.
    pub fn complete(
        &self,
        db: &Database,
        user: &UserContext,
        ritual_id: &str,
        details: &CompletionDetails,
    ) -> Result<CompletionOutcome> {
        let now = self.clock.now();
        let rituals = self.rituals.get();

        let tx = db.write_transaction()?;
        let date = self.active_date(&tx, &rituals, user, now)?;
        let record = StreakTracker::new(&self.config, &rituals)
            .record_completion(&tx, user, date, ritual_id, details, now)?;
        tx.commit()?;

        if record.already_completed {
            return Ok(CompletionOutcome {
                daily_state: record.state,
                new_badges: Vec::new(),
                already_completed: true,
            });
        }

        if let Some(ritual) = rituals.get(ritual_id) {
            deliver(
                self.ledger.as_ref(),
                &RewardNotice {
                    user_id: user.user_id.clone(),
                    source: RewardSource::RitualCompleted {
                        ritual_id: ritual_id.to_string(),
                    },
                    currency: ritual.reward.currency,
                    points: ritual.reward.points,
                    at: now,
                },
            );
        }

        let new_badges = match record.events.last() {
            Some(source) => self.evaluate(db, user, source, date)?,
            None => Vec::new(),
        };

        Ok(CompletionOutcome {
            daily_state: record.state,
            new_badges,
            already_completed: false,
        })
    }

    /// Badges the user holds, in display order.
    pub fn badges(&self, db: &Database, user: &UserContext) -> Result<Vec<BadgeGrant>> {
        let mut grants = BadgeStore::new(db.conn()).grants(&user.user_id)?;
        order_grants(&mut grants, &self.badges.get());
        Ok(grants)
    }

    /// Record a non-ritual lifecycle event and evaluate badges.
    ///
    /// The event is committed before evaluation starts, so it is kept even
    /// if evaluation fails.
    ///
    /// # Errors
    /// [`EngineError::ReservedEvent`] for kinds only the engine writes.
    pub fn emit_event(
        &self,
        db: &Database,
        user: &UserContext,
        event: EngagementEvent,
    ) -> Result<Vec<Badge>> {
        let kind = event.kind();
        if kind.is_engine_owned() {
            return Err(EngineError::ReservedEvent {
                kind: kind.to_string(),
            }
            .into());
        }
        let now = self.clock.now();
        let rituals = self.rituals.get();
        let catalog = self.badges.get();

        let date = self.active_date(db.conn(), &rituals, user, now)?;
        let facts = self.facts(db.conn(), &rituals, user, date)?;
        let (entry, granted) =
            BadgeEvaluator::new(&catalog).handle_event(db, user, event, facts, now)?;
        tracing::debug!(user_id = %user.user_id, event_id = %entry.id, kind = %kind, "event recorded");

        self.pay_badges(user, &granted, now);
        Ok(granted)
    }

    pub fn streak(&self, db: &Database, user: &UserContext) -> Result<StreakSummary> {
        let rituals = self.rituals.get();
        let date = self.active_date(db.conn(), &rituals, user, self.clock.now())?;
        StreakTracker::new(&self.config, &rituals).current_streak(db.conn(), user, date)
    }

    /// The newest `days` daily states, newest first.
    pub fn history(&self, db: &Database, user: &UserContext, days: u32) -> Result<Vec<DailyState>> {
        Ok(DailyStateStore::new(db.conn()).recent(&user.user_id, days)?)
    }

    /// The newest `limit` badge log entries, newest first.
    pub fn events(&self, db: &Database, user: &UserContext, limit: u32) -> Result<Vec<BadgeEvent>> {
        Ok(BadgeStore::new(db.conn()).recent_events(&user.user_id, limit)?)
    }

    fn evaluate(
        &self,
        db: &Database,
        user: &UserContext,
        source: &BadgeEvent,
        date: NaiveDate,
    ) -> Result<Vec<Badge>> {
        let rituals = self.rituals.get();
        let catalog = self.badges.get();
        let now = self.clock.now();

        let tx = db.write_transaction()?;
        let facts = self.facts(&tx, &rituals, user, date)?;
        let granted = BadgeEvaluator::new(&catalog).evaluate(&tx, user, source, facts, now)?;
        tx.commit()?;
        self.pay_badges(user, &granted, now);
        Ok(granted)
    }

    fn facts(
        &self,
        conn: &Connection,
        rituals: &RitualCatalog,
        user: &UserContext,
        date: NaiveDate,
    ) -> Result<EvaluationFacts> {
        let streak = StreakTracker::new(&self.config, rituals).current_streak(conn, user, date)?;
        Ok(EvaluationFacts {
            current_streak: streak.current_streak,
        })
    }

    fn pay_badges(&self, user: &UserContext, granted: &[Badge], now: DateTime<Utc>) {
        for badge in granted {
            deliver(
                self.ledger.as_ref(),
                &RewardNotice {
                    user_id: user.user_id.clone(),
                    source: RewardSource::BadgeGranted {
                        badge_id: badge.id.clone(),
                    },
                    currency: 0,
                    points: badge.reward.points,
                    at: now,
                },
            );
        }
    }
}
