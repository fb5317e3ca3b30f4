//! Badge event log and badge grants.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::collections::HashSet;

use super::{read_datetime, read_json};
use crate::badges::BadgeGrant;
use crate::error::DatabaseError;
use crate::events::{BadgeEvent, EventKind};

fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<BadgeEvent> {
    Ok(BadgeEvent {
        id: row.get(0)?,
        user_id: row.get(1)?,
        event: read_json(row, 2)?,
        occurred_at: read_datetime(row, 3)?,
    })
}

fn row_to_grant(row: &rusqlite::Row) -> rusqlite::Result<BadgeGrant> {
    Ok(BadgeGrant {
        user_id: row.get(0)?,
        badge_id: row.get(1)?,
        earned_at: read_datetime(row, 2)?,
        source_event_id: row.get(3)?,
    })
}

pub struct BadgeStore<'c> {
    conn: &'c Connection,
}

impl<'c> BadgeStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Append to the event log. Entries are never updated or deleted.
    pub fn append_event(&self, event: &BadgeEvent) -> Result<(), DatabaseError> {
        let payload = serde_json::to_string(&event.event)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        self.conn.execute(
            "INSERT INTO badge_events (id, user_id, event_type, payload, occurred_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.id,
                event.user_id,
                event.event.kind().as_str(),
                payload,
                event.occurred_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// All of a user's events of one kind, oldest first.
    pub fn events_of_kind(
        &self,
        user_id: &str,
        kind: EventKind,
    ) -> Result<Vec<BadgeEvent>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, payload, occurred_at FROM badge_events
             WHERE user_id = ?1 AND event_type = ?2
             ORDER BY occurred_at ASC, rowid ASC",
        )?;
        let rows = stmt.query_map(params![user_id, kind.as_str()], row_to_event)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// The newest `limit` events, newest first.
    pub fn recent_events(&self, user_id: &str, limit: u32) -> Result<Vec<BadgeEvent>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, payload, occurred_at FROM badge_events
             WHERE user_id = ?1
             ORDER BY occurred_at DESC, rowid DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user_id, limit], row_to_event)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn granted_ids(&self, user_id: &str) -> Result<HashSet<String>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare("SELECT badge_id FROM badge_grants WHERE user_id = ?1")?;
        let rows = stmt.query_map(params![user_id], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<HashSet<_>, _>>()?)
    }

    /// Grant a badge at most once. Returns `true` only for the call that
    /// created the grant; replays and lost races return `false`.
    pub fn grant(
        &self,
        user_id: &str,
        badge_id: &str,
        earned_at: DateTime<Utc>,
        source_event_id: &str,
    ) -> Result<bool, DatabaseError> {
        let changed = self.conn.execute(
            "INSERT INTO badge_grants (user_id, badge_id, earned_at, source_event_id)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (user_id, badge_id) DO NOTHING",
            params![user_id, badge_id, earned_at.to_rfc3339(), source_event_id],
        )?;
        Ok(changed == 1)
    }

    pub fn grants(&self, user_id: &str) -> Result<Vec<BadgeGrant>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, badge_id, earned_at, source_event_id FROM badge_grants
             WHERE user_id = ?1
             ORDER BY badge_id ASC",
        )?;
        let rows = stmt.query_map(params![user_id], row_to_grant)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EngagementEvent;
    use crate::storage::Database;

    fn wall(id: &str) -> BadgeEvent {
        BadgeEvent {
            id: id.into(),
            user_id: "u1".into(),
            occurred_at: Utc::now(),
            event: EngagementEvent::WallInteraction { kind: "like".into() },
        }
    }

    #[test]
    fn events_are_filtered_by_kind() {
        let db = Database::open_memory().unwrap();
        let store = BadgeStore::new(db.conn());
        store.append_event(&wall("e1")).unwrap();
        store.append_event(&wall("e2")).unwrap();
        assert_eq!(store.events_of_kind("u1", EventKind::WallInteraction).unwrap().len(), 2);
        assert!(store.events_of_kind("u1", EventKind::RitualCompleted).unwrap().is_empty());
        assert_eq!(store.recent_events("u1", 1).unwrap().len(), 1);
    }

    #[test]
    fn grant_is_at_most_once() {
        let db = Database::open_memory().unwrap();
        let store = BadgeStore::new(db.conn());
        let now = Utc::now();
        assert!(store.grant("u1", "first-light", now, "e1").unwrap());
        assert!(!store.grant("u1", "first-light", now, "e2").unwrap());
        let grants = store.grants("u1").unwrap();
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].source_event_id, "e1");
        assert!(store.granted_ids("u1").unwrap().contains("first-light"));
    }
}
