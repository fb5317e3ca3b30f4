use clap::Subcommand;
use daybreak_core::catalog::{load_badges, load_rituals};
use daybreak_core::Config;

use super::print_json;

#[derive(Subcommand)]
pub enum CatalogAction {
    /// List rituals
    Rituals,
    /// List badges
    Badges,
}

pub fn run(action: CatalogAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    match action {
        CatalogAction::Rituals => print_json(&load_rituals(&config.catalog)?.all()),
        CatalogAction::Badges => print_json(&load_badges(&config.catalog)?.all()),
    }
}
