//! Declarative badge definitions.
//!
//! A badge is data: which events it counts, how they are aggregated, and the
//! threshold the aggregate must cross. The evaluator interprets these rules;
//! adding a badge never requires code.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::CatalogError;
use crate::events::{EngagementEvent, EventKind, FieldValue};
use crate::tier::Tier;

const BUILTIN_BADGES: &str = include_str!("../../catalog/badges.toml");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Gte,
    Gt,
    Eq,
    Lte,
    Lt,
}

impl Comparator {
    pub fn compare(&self, actual: f64, expected: f64) -> bool {
        match self {
            Comparator::Gte => actual >= expected,
            Comparator::Gt => actual > expected,
            Comparator::Eq => (actual - expected).abs() < f64::EPSILON,
            Comparator::Lte => actual <= expected,
            Comparator::Lt => actual < expected,
        }
    }
}

/// How matching events are folded into one number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Aggregate {
    /// Number of matching events
    Count,
    /// Sum of a numeric field; events without it contribute nothing
    Sum { field: String },
    /// Largest value of a numeric field
    Max { field: String },
    /// Number of distinct local calendar days with a matching event
    DistinctDays,
    /// The user's live streak, read from daily state
    CurrentStreak,
}

/// A per-event filter: only events whose field satisfies it are aggregated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub comparator: Comparator,
    pub value: FieldValue,
}

impl Condition {
    /// Missing fields never satisfy a condition. Text values support only
    /// equality.
    pub fn matches(&self, event: &EngagementEvent) -> bool {
        match (event.field(&self.field), &self.value) {
            (Some(FieldValue::Number(actual)), FieldValue::Number(expected)) => {
                self.comparator.compare(actual, *expected)
            }
            (Some(FieldValue::Text(actual)), FieldValue::Text(expected)) => {
                self.comparator == Comparator::Eq && actual.eq_ignore_ascii_case(expected)
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadgeRule {
    pub event: EventKind,
    pub aggregate: Aggregate,
    pub comparator: Comparator,
    pub threshold: f64,
    #[serde(default)]
    pub filters: Vec<Condition>,
}

impl BadgeRule {
    pub fn accepts(&self, event: &EngagementEvent) -> bool {
        event.kind() == self.event && self.filters.iter().all(|c| c.matches(event))
    }

    pub fn is_satisfied_by(&self, value: f64) -> bool {
        self.comparator.compare(value, self.threshold)
    }

    fn validate(&self, id: &str) -> Result<(), CatalogError> {
        let invalid = |message: String| CatalogError::Invalid {
            id: id.to_string(),
            message,
        };
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(invalid(format!("threshold {} out of range", self.threshold)));
        }
        let fields = self.event.fields();
        let referenced = self.filters.iter().map(|c| c.field.as_str()).chain(
            match &self.aggregate {
                Aggregate::Sum { field } | Aggregate::Max { field } => Some(field.as_str()),
                _ => None,
            },
        );
        for field in referenced {
            if !fields.contains(&field) {
                return Err(invalid(format!(
                    "field '{field}' does not exist on {}",
                    self.event
                )));
            }
        }
        Ok(())
    }
}

/// Which users a badge is offered to. Empty lists mean "everyone".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BadgeScope {
    #[serde(default)]
    pub tiers: Vec<Tier>,
    #[serde(default)]
    pub archetypes: Vec<String>,
}

impl BadgeScope {
    pub fn includes(&self, tier: Tier, archetype: Option<&str>) -> bool {
        let tier_ok = self.tiers.is_empty() || self.tiers.contains(&tier);
        let archetype_ok = self.archetypes.is_empty()
            || archetype.is_some_and(|a| self.archetypes.iter().any(|s| s.eq_ignore_ascii_case(a)));
        tier_ok && archetype_ok
    }
}

/// One-time reward attached to a badge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BadgeReward {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_percent: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cosmetic: Option<String>,
    #[serde(default)]
    pub points: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Badge {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Display order: higher first
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub scope: BadgeScope,
    #[serde(default)]
    pub reward: BadgeReward,
    pub rule: BadgeRule,
}

#[derive(Serialize, Deserialize)]
struct BadgesFile {
    #[serde(default)]
    badges: Vec<Badge>,
}

/// Read-only badge catalog.
#[derive(Debug, Clone, Default)]
pub struct BadgeCatalog {
    badges: Vec<Badge>,
}

impl BadgeCatalog {
    /// # Errors
    /// Returns an error on duplicate ids or rules that reference unknown
    /// fields or negative thresholds.
    pub fn new(badges: Vec<Badge>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for badge in &badges {
            if !seen.insert(badge.id.as_str()) {
                return Err(CatalogError::DuplicateId(badge.id.clone()));
            }
            badge.rule.validate(&badge.id)?;
        }
        Ok(Self { badges })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, CatalogError> {
        let file: BadgesFile = toml::from_str(content)?;
        Self::new(file.badges)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_toml_str(BUILTIN_BADGES)
    }

    pub fn get(&self, id: &str) -> Option<&Badge> {
        self.badges.iter().find(|b| b.id == id)
    }

    pub fn all(&self) -> &[Badge] {
        &self.badges
    }

    /// Badges offered to a user of this tier and archetype.
    pub fn in_scope<'s>(
        &'s self,
        tier: Tier,
        archetype: Option<&'s str>,
    ) -> impl Iterator<Item = &'s Badge> + 's {
        self.badges
            .iter()
            .filter(move |b| b.scope.includes(tier, archetype))
    }
}
