//! TOML-based engine configuration.
//!
//! Stores the operator-tunable engine rules:
//! - Per-tier cardinality, caps, reroll eligibility, shield budget and
//!   selection strategy
//! - Shield refill cadence
//! - Catalog locations and refresh interval
//! - Selection seed salt
//!
//! Configuration is stored at `<data_dir>/config.toml`.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::data_dir;
use crate::error::ConfigError;
use crate::tier::{Tier, TierPolicy, TierPolicyOverrides};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TiersConfig {
    #[serde(default = "TierPolicy::ghost", deserialize_with = "ghost_policy")]
    pub ghost: TierPolicy,
    #[serde(default = "TierPolicy::firewall", deserialize_with = "firewall_policy")]
    pub firewall: TierPolicy,
}

fn ghost_policy<'de, D: Deserializer<'de>>(de: D) -> Result<TierPolicy, D::Error> {
    Ok(TierPolicyOverrides::deserialize(de)?.over(TierPolicy::ghost()))
}

fn firewall_policy<'de, D: Deserializer<'de>>(de: D) -> Result<TierPolicy, D::Error> {
    Ok(TierPolicyOverrides::deserialize(de)?.over(TierPolicy::firewall()))
}

/// When spent shields become available again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShieldRefill {
    /// Budget applies to the trailing `period_days` window
    Rolling,
    /// Budget resets every Monday
    Weekly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShieldConfig {
    #[serde(default = "default_refill")]
    pub refill: ShieldRefill,
    #[serde(default = "default_period_days")]
    pub period_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Ritual catalog TOML; the built-in catalog when unset
    #[serde(default)]
    pub rituals_path: Option<String>,
    /// Badge catalog TOML; the built-in catalog when unset
    #[serde(default)]
    pub badges_path: Option<String>,
    #[serde(default = "default_refresh_secs")]
    pub refresh_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionConfig {
    #[serde(default = "default_salt")]
    pub salt: String,
}

/// Engine configuration.
///
/// Serialized to/from TOML at `<data_dir>/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub tiers: TiersConfig,
    #[serde(default)]
    pub shield: ShieldConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
}

fn default_refill() -> ShieldRefill {
    ShieldRefill::Rolling
}
fn default_period_days() -> u32 {
    7
}
fn default_refresh_secs() -> u64 {
    300
}
fn default_salt() -> String {
    "daybreak".into()
}

impl Default for TiersConfig {
    fn default() -> Self {
        Self {
            ghost: TierPolicy::ghost(),
            firewall: TierPolicy::firewall(),
        }
    }
}

impl Default for ShieldConfig {
    fn default() -> Self {
        Self {
            refill: default_refill(),
            period_days: default_period_days(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            rituals_path: None,
            badges_path: None,
            refresh_secs: default_refresh_secs(),
        }
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self { salt: default_salt() }
    }
}

impl CatalogConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_secs)
    }
}

impl Config {
    pub fn tier_policy(&self, tier: Tier) -> &TierPolicy {
        match tier {
            Tier::Ghost => &self.tiers.ghost,
            Tier::Firewall => &self.tiers.firewall,
        }
    }

    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current
                    .as_object_mut()
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
                let existing = obj
                    .get(part)
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<i64>() {
                            serde_json::Value::Number(n.into())
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as number")));
                        }
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current
                .get_mut(part)
                .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
        }

        Err(ConfigError::UnknownKey(key.to_string()))
    }

    fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk, writing the defaults on first use.
    ///
    /// # Errors
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => Self::from_toml_str(&content).map_err(|e| match e {
                ConfigError::InvalidValue { message, .. } => ConfigError::LoadFailed {
                    path: path.clone(),
                    message,
                },
                other => other,
            }),
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let cfg: Config = toml::from_str(content).map_err(|e| ConfigError::InvalidValue {
            key: "<root>".into(),
            message: e.to_string(),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject settings the engine cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for tier in Tier::ALL {
            let policy = self.tier_policy(tier);
            if policy.daily_rituals == 0 {
                return Err(ConfigError::InvalidValue {
                    key: format!("tiers.{tier}.daily_rituals"),
                    message: "must be at least 1".into(),
                });
            }
            if policy.daily_cap == 0 {
                return Err(ConfigError::InvalidValue {
                    key: format!("tiers.{tier}.daily_cap"),
                    message: "must be at least 1".into(),
                });
            }
        }
        if self.shield.period_days == 0 {
            return Err(ConfigError::InvalidValue {
                key: "shield.period_days".into(),
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Persist to disk.
    ///
    /// # Errors
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path()?;
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key without saving.
    ///
    /// # Errors
    /// Returns an error if the key is unknown or the value does not fit.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut json = serde_json::to_value(&*self).map_err(|e| invalid(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| invalid(e.to_string()))?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Set a config value by key and save.
    ///
    /// # Errors
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.apply(key, value)?;
        self.save()
    }

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::SelectionStrategy;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed = Config::from_toml_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn defaults_match_tier_rules() {
        let cfg = Config::default();
        assert_eq!(cfg.tier_policy(Tier::Ghost).daily_rituals, 1);
        assert_eq!(cfg.tier_policy(Tier::Firewall).daily_rituals, 2);
        assert_eq!(cfg.tier_policy(Tier::Ghost).shield_budget, 0);
        assert_eq!(cfg.shield.refill, ShieldRefill::Rolling);
        assert_eq!(cfg.shield.period_days, 7);
        assert!(cfg.catalog.rituals_path.is_none());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg = Config::from_toml_str(
            r#"
            [tiers.ghost]
            daily_rituals = 1
            daily_cap = 1
            shield_budget = 1

            [shield]
            refill = "weekly"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.tiers.ghost.shield_budget, 1);
        assert!(cfg.tiers.ghost.reroll_enabled);
        assert_eq!(cfg.tiers.ghost.selection, SelectionStrategy::Random);
        assert_eq!(cfg.tiers.firewall, TierPolicy::firewall());
        assert_eq!(cfg.shield.refill, ShieldRefill::Weekly);
        assert_eq!(cfg.shield.period_days, 7);
    }

    #[test]
    fn partial_tier_table_keeps_that_tiers_defaults() {
        let cfg = Config::from_toml_str(
            r#"
            [tiers.firewall]
            shield_budget = 1
            "#,
        )
        .unwrap();
        let firewall = cfg.tier_policy(Tier::Firewall);
        assert_eq!(firewall.shield_budget, 1);
        assert_eq!(firewall.daily_rituals, 2);
        assert_eq!(firewall.daily_cap, 2);
        assert_eq!(firewall.selection, SelectionStrategy::CategoryRotation);
        assert_eq!(cfg.tiers.ghost, TierPolicy::ghost());
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("tiers.firewall.daily_rituals").as_deref(), Some("2"));
        assert_eq!(cfg.get("shield.refill").as_deref(), Some("rolling"));
        assert!(cfg.get("tiers.missing").is_none());
    }

    #[test]
    fn apply_updates_nested_values() {
        let mut cfg = Config::default();
        cfg.apply("tiers.ghost.shield_budget", "2").unwrap();
        cfg.apply("tiers.ghost.reroll_enabled", "false").unwrap();
        cfg.apply("tiers.firewall.selection", "archetype").unwrap();
        assert_eq!(cfg.tiers.ghost.shield_budget, 2);
        assert!(!cfg.tiers.ghost.reroll_enabled);
        assert_eq!(cfg.tiers.firewall.selection, SelectionStrategy::Archetype);
    }

    #[test]
    fn apply_rejects_unknown_keys_and_bad_values() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.apply("tiers.ghost.nope", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(cfg.apply("tiers.ghost.reroll_enabled", "maybe").is_err());
        assert!(cfg.apply("tiers.firewall.selection", "alphabetical").is_err());
        assert!(cfg.apply("shield.period_days", "0").is_err());
        assert_eq!(cfg, Config::default());
    }
}
