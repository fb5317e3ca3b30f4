//! # Daybreak Core Library
//!
//! Core logic of the daily engagement engine: which rituals a user sees
//! each day, how their streak evolves, and which badges they earn. All
//! operations are also exposed through the standalone `daybreak` CLI.
//!
//! ## Architecture
//!
//! - **Clock**: resolves an instant and a user's UTC offset to the calendar
//!   date every "once per day" rule is keyed on
//! - **Scheduler**: idempotent daily assignment with anti-repetition and
//!   one reroll per day
//! - **Streak tracker**: per-day state, streak continuation and shields
//! - **Badges**: an append-only event log and a declarative rule interpreter
//!   with at-most-once grants
//! - **Storage**: SQLite tables guarded by uniqueness constraints, plus TOML
//!   configuration
//!
//! ## Key Components
//!
//! - [`Engine`]: the request-level operations
//! - [`Database`]: per-request SQLite connection
//! - [`Config`]: tier policies, shield cadence and catalog sources

pub mod badges;
pub mod catalog;
pub mod clock;
pub mod engine;
pub mod error;
pub mod events;
pub mod rewards;
pub mod scheduler;
pub mod storage;
pub mod streak;
pub mod tier;
pub mod user;

pub use badges::{Badge, BadgeCatalog, BadgeGrant, BadgeRule};
pub use catalog::{CachedCatalog, Ritual, RitualCatalog};
pub use clock::{resolve_assignment_date, Clock, FixedClock, SystemClock};
pub use engine::{CompletionOutcome, Engine, RerollOutcome};
pub use error::{CatalogError, ConfigError, CoreError, DatabaseError, EngineError};
pub use events::{BadgeEvent, EngagementEvent, EventKind};
pub use rewards::{MemoryLedger, NullLedger, OutboxLedger, RewardLedger, RewardNotice};
pub use scheduler::{Assignment, DailyScheduler};
pub use storage::{Config, Database};
pub use streak::{CompletionDetails, DailyState, StreakSummary, StreakTracker};
pub use tier::{SelectionStrategy, Tier, TierPolicy};
pub use user::UserContext;
