//! Badge catalog, rule interpreter and grants.

pub mod evaluator;
pub mod rule;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use evaluator::{aggregate, display_order, BadgeEvaluator, EvaluationFacts};
pub use rule::{
    Aggregate, Badge, BadgeCatalog, BadgeReward, BadgeRule, BadgeScope, Comparator, Condition,
};

/// A badge a user has earned. Unique per (user, badge).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeGrant {
    pub user_id: String,
    pub badge_id: String,
    pub earned_at: DateTime<Utc>,
    pub source_event_id: String,
}

/// Sort grants for display using their catalog priority. Grants whose badge
/// is no longer in the catalog go last, by id.
pub fn order_grants(grants: &mut [BadgeGrant], catalog: &BadgeCatalog) {
    grants.sort_by(|a, b| match (catalog.get(&a.badge_id), catalog.get(&b.badge_id)) {
        (Some(x), Some(y)) => display_order(x, y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.badge_id.cmp(&b.badge_id),
    });
}
