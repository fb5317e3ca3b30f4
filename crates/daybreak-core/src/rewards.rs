//! Reward-ledger collaborator.
//!
//! The engine tells the ledger what a user earned and moves on. It never
//! reads balances back, and a ledger failure never fails the request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::storage::{Database, RewardOutbox};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RewardSource {
    RitualCompleted { ritual_id: String },
    BadgeGranted { badge_id: String },
}

impl RewardSource {
    pub fn label(&self) -> String {
        match self {
            RewardSource::RitualCompleted { ritual_id } => format!("ritual:{ritual_id}"),
            RewardSource::BadgeGranted { badge_id } => format!("badge:{badge_id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardNotice {
    pub user_id: String,
    pub source: RewardSource,
    pub currency: u32,
    pub points: u32,
    pub at: DateTime<Utc>,
}

pub type LedgerError = Box<dyn std::error::Error + Send + Sync>;

/// Receives fire-and-forget reward notices.
pub trait RewardLedger: Send + Sync {
    fn notify(&self, notice: &RewardNotice) -> Result<(), LedgerError>;
}

/// Discards every notice.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLedger;

impl RewardLedger for NullLedger {
    fn notify(&self, _notice: &RewardNotice) -> Result<(), LedgerError> {
        Ok(())
    }
}

/// Keeps notices in memory.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    notices: Mutex<Vec<RewardNotice>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<RewardNotice> {
        match self.notices.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl RewardLedger for MemoryLedger {
    fn notify(&self, notice: &RewardNotice) -> Result<(), LedgerError> {
        self.notices
            .lock()
            .map_err(|e| e.to_string())?
            .push(notice.clone());
        Ok(())
    }
}

/// Appends notices to the local `reward_entries` table, from which a
/// delivery process forwards them to the ledger service.
pub struct OutboxLedger {
    db: Mutex<Database>,
}

impl OutboxLedger {
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }
}

impl RewardLedger for OutboxLedger {
    fn notify(&self, notice: &RewardNotice) -> Result<(), LedgerError> {
        let db = self.db.lock().map_err(|e| e.to_string())?;
        RewardOutbox::new(db.conn()).record(notice)?;
        Ok(())
    }
}

/// Deliver a notice, logging instead of propagating failures.
pub(crate) fn deliver(ledger: &dyn RewardLedger, notice: &RewardNotice) {
    if notice.currency == 0 && notice.points == 0 {
        return;
    }
    if let Err(e) = ledger.notify(notice) {
        tracing::warn!(
            user_id = %notice.user_id,
            source = %notice.source.label(),
            error = %e,
            "reward ledger notification failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingLedger;

    impl RewardLedger for FailingLedger {
        fn notify(&self, _notice: &RewardNotice) -> Result<(), LedgerError> {
            Err("ledger offline".into())
        }
    }

    fn notice(points: u32) -> RewardNotice {
        RewardNotice {
            user_id: "u1".into(),
            source: RewardSource::BadgeGranted {
                badge_id: "first-light".into(),
            },
            currency: 0,
            points,
            at: Utc::now(),
        }
    }

    #[test]
    fn deliver_swallows_ledger_errors() {
        deliver(&FailingLedger, &notice(5));
    }

    #[test]
    fn zero_rewards_are_not_sent() {
        let ledger = MemoryLedger::new();
        deliver(&ledger, &notice(0));
        deliver(&ledger, &notice(10));
        assert_eq!(ledger.notices().len(), 1);
    }

    #[test]
    fn outbox_ledger_records_rows() {
        let ledger = OutboxLedger::new(Database::open_memory().unwrap());
        ledger.notify(&notice(10)).unwrap();
        let db = ledger.db.lock().unwrap();
        assert_eq!(RewardOutbox::new(db.conn()).count("u1").unwrap(), 1);
    }

    #[test]
    fn source_labels_are_prefixed() {
        let source = RewardSource::RitualCompleted {
            ritual_id: "breath-box".into(),
        };
        assert_eq!(source.label(), "ritual:breath-box");
    }
}
