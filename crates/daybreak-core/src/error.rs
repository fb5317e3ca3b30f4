//! Core error types for daybreak-core.
//!
//! Every failure here is per-request and recoverable. Conditions that the
//! engine treats as idempotent success (a duplicate completion, a lost
//! insert race) never surface as errors.

use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

/// Core error type for daybreak-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Ritual or badge catalog errors
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Rejections produced by the engine itself
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// A uniqueness constraint rejected the write
    #[error("Uniqueness conflict: {0}")]
    Conflict(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("unknown config key: {0}")]
    UnknownKey(String),

    /// Could not determine the data directory
    #[error("Failed to access data directory: {0}")]
    DataDir(String),
}

/// Catalog loading and validation errors.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read catalog file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse catalog TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Duplicate catalog id '{0}'")]
    DuplicateId(String),

    #[error("Invalid catalog entry '{id}': {message}")]
    Invalid { id: String, message: String },

    #[error("No rituals are eligible for tier '{0}'")]
    EmptyPool(crate::tier::Tier),
}

/// Rejections surfaced to callers of the engine operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The ritual is not part of the user's live assignment for that date
    #[error("ritual '{ritual_id}' is not assigned for {date}")]
    NotAssigned { ritual_id: String, date: NaiveDate },

    /// The daily reroll budget is used up
    #[error("reroll already used for {date}")]
    RerollExhausted { date: NaiveDate },

    /// Reroll is not permitted in the current state
    #[error("reroll not allowed: {reason}")]
    RerollNotAllowed { reason: String },

    /// The tier's completion cap for the day is reached
    #[error("daily cap of {cap} completions reached for {date}")]
    DailyCapReached { date: NaiveDate, cap: u32 },

    /// A later day already exists, so this day is closed history
    #[error("day {date} is closed; the latest day is {latest}")]
    DayClosed { date: NaiveDate, latest: NaiveDate },

    /// The event kind is only ever produced by the engine itself
    #[error("event type '{kind}' cannot be emitted directly")]
    ReservedEvent { kind: String },
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, msg) => match e.code {
                rusqlite::ErrorCode::DatabaseLocked | rusqlite::ErrorCode::DatabaseBusy => {
                    DatabaseError::Locked
                }
                rusqlite::ErrorCode::ConstraintViolation => {
                    DatabaseError::Conflict(msg.clone().unwrap_or_else(|| e.to_string()))
                }
                _ => DatabaseError::QueryFailed(err.to_string()),
            },
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

impl DatabaseError {
    /// True when the error came from a uniqueness constraint.
    pub fn is_conflict(&self) -> bool {
        matches!(self, DatabaseError::Conflict(_))
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
