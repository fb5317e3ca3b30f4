//! Ritual selection with anti-repetition.
//!
//! Selection is seeded from (salt, user, date, generation), so two requests
//! racing to create the same assignment compute the same pick, and a replay
//! of the same inputs is reproducible.

use chrono::NaiveDate;
use rand::prelude::*;
use rand_pcg::Mcg128Xsl64;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

use crate::catalog::Ritual;
use crate::tier::SelectionStrategy;

/// Inputs for one selection.
#[derive(Debug, Clone)]
pub struct SelectionRequest<'a> {
    pub user_id: &'a str,
    pub date: NaiveDate,
    pub generation: u32,
    /// Rituals to pick
    pub count: usize,
    pub strategy: SelectionStrategy,
    pub archetype: Option<&'a str>,
    /// Rituals shown on the preceding assignment date
    pub previous: &'a [String],
    /// Rituals already rerolled away today
    pub rerolled_today: &'a HashSet<String>,
    pub salt: &'a str,
}

/// Derive the RNG seed for a selection.
pub fn selection_seed(salt: &str, user_id: &str, date: NaiveDate, generation: u32) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update([0u8]);
    hasher.update(user_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(date.to_string().as_bytes());
    hasher.update(generation.to_le_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

/// Apply the exclusion filter, relaxing it rather than ever returning an
/// empty candidate set: first yesterday's rituals are let back in, then the
/// rerolled ones.
pub fn candidates<'r>(pool: &[&'r Ritual], req: &SelectionRequest<'_>) -> Vec<&'r Ritual> {
    let strict: Vec<&Ritual> = pool
        .iter()
        .copied()
        .filter(|r| !req.rerolled_today.contains(&r.id) && !req.previous.contains(&r.id))
        .collect();
    if !strict.is_empty() {
        return strict;
    }

    tracing::debug!(
        user_id = req.user_id,
        date = %req.date,
        "catalog exhausted by anti-repetition, admitting previous day's rituals"
    );
    let relaxed: Vec<&Ritual> = pool
        .iter()
        .copied()
        .filter(|r| !req.rerolled_today.contains(&r.id))
        .collect();
    if !relaxed.is_empty() {
        return relaxed;
    }

    tracing::debug!(
        user_id = req.user_id,
        date = %req.date,
        "catalog exhausted by rerolls, admitting the whole pool"
    );
    pool.to_vec()
}

/// Pick up to `req.count` distinct ritual ids from `pool`.
///
/// `category_order` is the tier's category order, used by rotation;
/// `previous_categories` are the categories shown on the preceding date.
pub fn select(
    pool: &[&Ritual],
    category_order: &[&str],
    previous_categories: &[String],
    req: &SelectionRequest<'_>,
) -> Vec<String> {
    let mut candidates = candidates(pool, req);
    let mut rng = Mcg128Xsl64::seed_from_u64(selection_seed(
        req.salt,
        req.user_id,
        req.date,
        req.generation,
    ));
    candidates.shuffle(&mut rng);

    let ordered: Vec<&Ritual> = match req.strategy {
        SelectionStrategy::Random => candidates,
        SelectionStrategy::Archetype => match req.archetype {
            Some(archetype) => {
                let (mut preferred, rest): (Vec<&Ritual>, Vec<&Ritual>) =
                    candidates.into_iter().partition(|r| r.has_archetype(archetype));
                preferred.extend(rest);
                preferred
            }
            None => candidates,
        },
        SelectionStrategy::CategoryRotation => {
            rotate_categories(candidates, category_order, previous_categories, &mut rng)
        }
    };

    ordered
        .into_iter()
        .take(req.count.max(1))
        .map(|r| r.id.clone())
        .collect()
}

/// Order candidates so that consecutive picks walk the category cycle,
/// starting after the last category shown previously.
fn rotate_categories<'r>(
    candidates: Vec<&'r Ritual>,
    category_order: &[&str],
    previous_categories: &[String],
    rng: &mut Mcg128Xsl64,
) -> Vec<&'r Ritual> {
    if category_order.is_empty() {
        return candidates;
    }

    let start = previous_categories
        .iter()
        .filter_map(|c| category_order.iter().position(|o| o == c))
        .max()
        .map(|idx| (idx + 1) % category_order.len())
        .unwrap_or_else(|| rng.gen_range(0..category_order.len()));

    let mut ordered = Vec::with_capacity(candidates.len());
    let mut remaining = candidates;
    // One ritual per category per lap, until every candidate is placed.
    while !remaining.is_empty() {
        let before = remaining.len();
        for step in 0..category_order.len() {
            let category = category_order[(start + step) % category_order.len()];
            if let Some(pos) = remaining.iter().position(|r| r.category == category) {
                ordered.push(remaining.remove(pos));
            }
        }
        if remaining.len() == before {
            // Categories missing from the order list.
            ordered.append(&mut remaining);
        }
    }
    ordered
}
