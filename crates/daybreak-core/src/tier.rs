//! Subscription tiers and the per-tier rules the engine applies.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Subscription level. Owned by billing; read-only here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Free tier: large rotating pool, one ritual per day
    Ghost,
    /// Paid tier: curated pool, up to two rituals per day
    Firewall,
}

impl Tier {
    pub const ALL: [Tier; 2] = [Tier::Ghost, Tier::Firewall];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Ghost => "ghost",
            Tier::Firewall => "firewall",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ghost" => Ok(Tier::Ghost),
            "firewall" => Ok(Tier::Firewall),
            other => Err(format!("unknown tier: {other}")),
        }
    }
}

/// How rituals are picked once anti-repetition has filtered the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Seeded uniform choice
    Random,
    /// Move to the next category after the one shown previously
    CategoryRotation,
    /// Prefer rituals tagged with the user's archetype
    Archetype,
}

/// Per-tier engine rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierPolicy {
    /// Rituals per assignment
    pub daily_rituals: u32,
    /// Completions accepted per day
    pub daily_cap: u32,
    #[serde(default = "default_true")]
    pub reroll_enabled: bool,
    /// Missed days forgiven per shield period
    #[serde(default)]
    pub shield_budget: u32,
    #[serde(default = "default_selection")]
    pub selection: SelectionStrategy,
}

fn default_true() -> bool {
    true
}

fn default_selection() -> SelectionStrategy {
    SelectionStrategy::Random
}

/// A `[tiers.*]` table as written; absent keys keep the tier's defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TierPolicyOverrides {
    pub daily_rituals: Option<u32>,
    pub daily_cap: Option<u32>,
    pub reroll_enabled: Option<bool>,
    pub shield_budget: Option<u32>,
    pub selection: Option<SelectionStrategy>,
}

impl TierPolicyOverrides {
    pub fn over(self, base: TierPolicy) -> TierPolicy {
        TierPolicy {
            daily_rituals: self.daily_rituals.unwrap_or(base.daily_rituals),
            daily_cap: self.daily_cap.unwrap_or(base.daily_cap),
            reroll_enabled: self.reroll_enabled.unwrap_or(base.reroll_enabled),
            shield_budget: self.shield_budget.unwrap_or(base.shield_budget),
            selection: self.selection.unwrap_or(base.selection),
        }
    }
}

impl TierPolicy {
    pub fn ghost() -> Self {
        Self {
            daily_rituals: 1,
            daily_cap: 1,
            reroll_enabled: true,
            shield_budget: 0,
            selection: SelectionStrategy::Random,
        }
    }

    pub fn firewall() -> Self {
        Self {
            daily_rituals: 2,
            daily_cap: 2,
            reroll_enabled: true,
            shield_budget: 2,
            selection: SelectionStrategy::CategoryRotation,
        }
    }

    /// Ghost is always exactly one ritual; other tiers are capped at two.
    pub fn cardinality(&self, tier: Tier) -> usize {
        match tier {
            Tier::Ghost => 1,
            Tier::Firewall => self.daily_rituals.clamp(1, 2) as usize,
        }
    }
}
