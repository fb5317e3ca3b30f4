//! SQLite connection handling.
//!
//! One [`Database`] wraps one connection. Request handlers open their own;
//! concurrent writers are serialized by SQLite itself, never by in-process
//! locks.

use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

use super::{data_dir, migrations};
use crate::error::{DatabaseError, Result};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite database holding assignments, daily states, the badge event log,
/// badge grants and the reward outbox.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `<data_dir>/daybreak.db`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        let path = data_dir()?.join("daybreak.db");
        Self::open_path(&path)
    }

    /// Open (or create) a database file at an explicit path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_path(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::init(conn)
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    /// Returns an error if migration fails.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(DatabaseError::from)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT).map_err(DatabaseError::from)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(DatabaseError::from)?;
        migrations::migrate(&conn)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self { conn })
    }

    /// Begin a write transaction, taking the write lock up front so that
    /// read-then-insert sequences cannot deadlock against another writer.
    ///
    /// # Errors
    /// Returns [`DatabaseError::Locked`] if the lock is not obtained within
    /// the busy timeout.
    pub fn write_transaction(&self) -> Result<Transaction<'_>> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)
            .map_err(DatabaseError::from)?;
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_memory_applies_schema() {
        let db = Database::open_memory().unwrap();
        let tables: i64 = db
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('assignments', 'daily_states', 'badge_events', 'badge_grants', 'reward_entries')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 5);
    }

    #[test]
    fn reopening_a_file_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daybreak.db");
        drop(Database::open_path(&path).unwrap());
        let db = Database::open_path(&path).unwrap();
        let version: i32 = db
            .conn()
            .query_row("SELECT version FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, migrations::CURRENT_VERSION);
    }

    #[test]
    fn write_transaction_rolls_back_on_drop() {
        let db = Database::open_memory().unwrap();
        {
            let tx = db.write_transaction().unwrap();
            tx.execute(
                "INSERT INTO badge_grants (user_id, badge_id, earned_at, source_event_id)
                 VALUES ('u', 'b', '2024-01-01T00:00:00+00:00', 'e')",
                [],
            )
            .unwrap();
        }
        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM badge_grants", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
