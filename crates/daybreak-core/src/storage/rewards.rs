//! Outbox of notices handed to the external reward ledger.

use rusqlite::{params, Connection};

use crate::error::DatabaseError;
use crate::rewards::RewardNotice;

pub struct RewardOutbox<'c> {
    conn: &'c Connection,
}

impl<'c> RewardOutbox<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn record(&self, notice: &RewardNotice) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT INTO reward_entries (id, user_id, source, amount_currency, amount_points, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                uuid::Uuid::new_v4().to_string(),
                notice.user_id,
                notice.source.label(),
                notice.currency,
                notice.points,
                notice.at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Number of notices recorded for a user.
    pub fn count(&self, user_id: &str) -> Result<u32, DatabaseError> {
        let n = self.conn.query_row(
            "SELECT COUNT(*) FROM reward_entries WHERE user_id = ?1",
            params![user_id],
            |row| row.get::<_, u32>(0),
        )?;
        Ok(n)
    }
}
