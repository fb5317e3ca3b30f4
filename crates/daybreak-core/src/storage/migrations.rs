//! Database schema migrations for daybreak.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const CURRENT_VERSION: i32 = 2;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Returns 0 if no version is set (initial database).
fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            tracing::warn!(error = %e, "failed to read schema_version");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: engine tables.
///
/// - `assignments`: one row per (user, date, reroll generation); at most one
///   live (non-rerolled) row per (user, date)
/// - `daily_states`: one row per (user, calendar date)
/// - `badge_events`: append-only event log
/// - `badge_grants`: at most one row per (user, badge)
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS assignments (
            id               TEXT PRIMARY KEY,
            user_id          TEXT NOT NULL,
            assignment_date  TEXT NOT NULL,
            generation       INTEGER NOT NULL DEFAULT 0,
            ritual_ids       TEXT NOT NULL,
            completions      TEXT NOT NULL DEFAULT '[]',
            completed        INTEGER NOT NULL DEFAULT 0,
            completed_at     TEXT,
            rerolled         INTEGER NOT NULL DEFAULT 0,
            created_at       TEXT NOT NULL,
            UNIQUE (user_id, assignment_date, generation)
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_assignments_live
            ON assignments(user_id, assignment_date) WHERE rerolled = 0;

        CREATE TABLE IF NOT EXISTS daily_states (
            user_id            TEXT NOT NULL,
            state_date         TEXT NOT NULL,
            tier               TEXT NOT NULL,
            rituals_completed  INTEGER NOT NULL DEFAULT 0,
            daily_cap_reached  INTEGER NOT NULL DEFAULT 0,
            streak_length      INTEGER NOT NULL DEFAULT 0,
            shields_consumed   INTEGER NOT NULL DEFAULT 0,
            has_rerolled       INTEGER NOT NULL DEFAULT 0,
            tz_offset_minutes  INTEGER NOT NULL DEFAULT 0,
            created_at         TEXT NOT NULL,
            updated_at         TEXT NOT NULL,
            PRIMARY KEY (user_id, state_date)
        );

        CREATE INDEX IF NOT EXISTS idx_daily_states_completed
            ON daily_states(user_id, state_date) WHERE rituals_completed > 0;

        CREATE TABLE IF NOT EXISTS badge_events (
            id           TEXT PRIMARY KEY,
            user_id      TEXT NOT NULL,
            event_type   TEXT NOT NULL,
            payload      TEXT NOT NULL,
            occurred_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_badge_events_user_type
            ON badge_events(user_id, event_type);

        CREATE TABLE IF NOT EXISTS badge_grants (
            user_id          TEXT NOT NULL,
            badge_id         TEXT NOT NULL,
            earned_at        TEXT NOT NULL,
            source_event_id  TEXT NOT NULL,
            PRIMARY KEY (user_id, badge_id)
        );",
    )?;

    set_schema_version(&tx, 1)?;
    tx.commit()?;
    Ok(())
}

/// Migration v2: reward outbox.
///
/// Local record of every notice sent to the external reward ledger. Balances
/// are never derived from it.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS reward_entries (
            id               TEXT PRIMARY KEY,
            user_id          TEXT NOT NULL,
            source           TEXT NOT NULL,
            amount_currency  INTEGER NOT NULL DEFAULT 0,
            amount_points    INTEGER NOT NULL DEFAULT 0,
            created_at       TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_reward_entries_user ON reward_entries(user_id);",
    )?;

    set_schema_version(&tx, 2)?;
    tx.commit()?;
    Ok(())
}
