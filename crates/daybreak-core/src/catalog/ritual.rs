//! Ritual definitions and the tier-partitioned catalog.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::CatalogError;
use crate::tier::Tier;

const BUILTIN_RITUALS: &str = include_str!("../../catalog/rituals.toml");

/// Reward granted to the external ledger when a ritual is completed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardWeights {
    #[serde(default)]
    pub currency: u32,
    #[serde(default)]
    pub points: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

/// A guided micro-task. Authored externally, never mutated by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ritual {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Tiers whose pool contains this ritual
    pub tiers: Vec<Tier>,
    pub category: String,
    #[serde(default)]
    pub archetypes: Vec<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub reward: RewardWeights,
}

impl Ritual {
    pub fn eligible_for(&self, tier: Tier) -> bool {
        self.tiers.contains(&tier)
    }

    pub fn has_archetype(&self, archetype: &str) -> bool {
        self.archetypes.iter().any(|a| a.eq_ignore_ascii_case(archetype))
    }
}

#[derive(Serialize, Deserialize)]
struct RitualsFile {
    #[serde(default)]
    rituals: Vec<Ritual>,
}

/// Read-only ritual catalog, in authoring order.
#[derive(Debug, Clone, Default)]
pub struct RitualCatalog {
    rituals: Vec<Ritual>,
}

impl RitualCatalog {
    /// Build a catalog from already-parsed rituals.
    ///
    /// # Errors
    /// Returns an error if ids repeat or an entry has no tier.
    pub fn new(rituals: Vec<Ritual>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for ritual in &rituals {
            if !seen.insert(ritual.id.as_str()) {
                return Err(CatalogError::DuplicateId(ritual.id.clone()));
            }
            if ritual.id.trim().is_empty() {
                return Err(CatalogError::Invalid {
                    id: ritual.id.clone(),
                    message: "empty id".into(),
                });
            }
            if ritual.tiers.is_empty() {
                return Err(CatalogError::Invalid {
                    id: ritual.id.clone(),
                    message: "no eligible tiers".into(),
                });
            }
        }
        Ok(Self { rituals })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, CatalogError> {
        let file: RitualsFile = toml::from_str(content)?;
        Self::new(file.rituals)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// The catalog compiled into the crate.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_toml_str(BUILTIN_RITUALS)
    }

    pub fn get(&self, id: &str) -> Option<&Ritual> {
        self.rituals.iter().find(|r| r.id == id)
    }

    pub fn all(&self) -> &[Ritual] {
        &self.rituals
    }

    /// Rituals eligible for a tier, in authoring order.
    pub fn pool(&self, tier: Tier) -> Vec<&Ritual> {
        self.rituals.iter().filter(|r| r.eligible_for(tier)).collect()
    }

    /// Distinct categories of a tier's pool, in first-seen order.
    pub fn categories(&self, tier: Tier) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for ritual in self.pool(tier) {
            if !out.contains(&ritual.category.as_str()) {
                out.push(&ritual.category);
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.rituals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rituals.is_empty()
    }
}
