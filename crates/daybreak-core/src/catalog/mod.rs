//! Read-only ritual catalog and the snapshot cache shared with badges.

pub mod cache;
pub mod ritual;

use std::path::PathBuf;

pub use cache::CachedCatalog;
pub use ritual::{Difficulty, RewardWeights, Ritual, RitualCatalog};

use crate::badges::BadgeCatalog;
use crate::error::CatalogError;
use crate::storage::CatalogConfig;

/// Load the ritual catalog named by the configuration, or the built-in one.
pub fn load_rituals(config: &CatalogConfig) -> Result<RitualCatalog, CatalogError> {
    match &config.rituals_path {
        Some(path) => RitualCatalog::load(&PathBuf::from(path)),
        None => RitualCatalog::builtin(),
    }
}

/// Load the badge catalog named by the configuration, or the built-in one.
pub fn load_badges(config: &CatalogConfig) -> Result<BadgeCatalog, CatalogError> {
    match &config.badges_path {
        Some(path) => BadgeCatalog::load(&PathBuf::from(path)),
        None => BadgeCatalog::builtin(),
    }
}

/// Cached ritual catalog that reloads from the configured source.
pub fn cached_rituals(config: &CatalogConfig) -> Result<CachedCatalog<RitualCatalog>, CatalogError> {
    let source = config.clone();
    CachedCatalog::new(config.refresh_interval(), move || load_rituals(&source))
}

/// Cached badge catalog that reloads from the configured source.
pub fn cached_badges(config: &CatalogConfig) -> Result<CachedCatalog<BadgeCatalog>, CatalogError> {
    let source = config.clone();
    CachedCatalog::new(config.refresh_interval(), move || load_badges(&source))
}
