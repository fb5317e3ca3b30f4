//! Per-user, per-day engagement rows.

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};

use super::{format_date, read_date, read_datetime};
use crate::error::DatabaseError;
use crate::streak::DailyState;
use crate::tier::Tier;

const COLUMNS: &str = "user_id, state_date, tier, rituals_completed, daily_cap_reached,
                       streak_length, shields_consumed, has_rerolled, tz_offset_minutes,
                       created_at, updated_at";

fn row_to_state(row: &rusqlite::Row) -> rusqlite::Result<DailyState> {
    let tier_str: String = row.get(2)?;
    let tier = tier_str.parse::<Tier>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
    })?;
    Ok(DailyState {
        user_id: row.get(0)?,
        state_date: read_date(row, 1)?,
        tier,
        rituals_completed_today: row.get(3)?,
        daily_cap_reached: row.get(4)?,
        streak_length: row.get(5)?,
        shields_consumed: row.get(6)?,
        has_rerolled_today: row.get(7)?,
        tz_offset_minutes: row.get(8)?,
        created_at: read_datetime(row, 9)?,
        updated_at: read_datetime(row, 10)?,
    })
}

pub struct DailyStateStore<'c> {
    conn: &'c Connection,
}

impl<'c> DailyStateStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn get(&self, user_id: &str, date: NaiveDate) -> Result<Option<DailyState>, DatabaseError> {
        let sql = format!("SELECT {COLUMNS} FROM daily_states WHERE user_id = ?1 AND state_date = ?2");
        let found = self
            .conn
            .query_row(&sql, params![user_id, format_date(date)], row_to_state)
            .optional()?;
        Ok(found)
    }

    /// Insert the day's row unless it exists. Returns `true` if inserted.
    pub fn insert_if_absent(&self, state: &DailyState) -> Result<bool, DatabaseError> {
        let changed = self.conn.execute(
            "INSERT INTO daily_states (user_id, state_date, tier, rituals_completed,
                                       daily_cap_reached, streak_length, shields_consumed,
                                       has_rerolled, tz_offset_minutes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT (user_id, state_date) DO NOTHING",
            params![
                state.user_id,
                format_date(state.state_date),
                state.tier.as_str(),
                state.rituals_completed_today,
                state.daily_cap_reached,
                state.streak_length,
                state.shields_consumed,
                state.has_rerolled_today,
                state.tz_offset_minutes,
                state.created_at.to_rfc3339(),
                state.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(changed == 1)
    }

    /// Overwrite the mutable counters of today's row.
    pub fn update(&self, state: &DailyState) -> Result<(), DatabaseError> {
        self.conn.execute(
            "UPDATE daily_states
             SET tier = ?3, rituals_completed = ?4, daily_cap_reached = ?5, streak_length = ?6,
                 shields_consumed = ?7, has_rerolled = ?8, updated_at = ?9
             WHERE user_id = ?1 AND state_date = ?2",
            params![
                state.user_id,
                format_date(state.state_date),
                state.tier.as_str(),
                state.rituals_completed_today,
                state.daily_cap_reached,
                state.streak_length,
                state.shields_consumed,
                state.has_rerolled_today,
                state.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// The user's newest row, completed or not.
    pub fn latest(&self, user_id: &str) -> Result<Option<DailyState>, DatabaseError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM daily_states WHERE user_id = ?1
             ORDER BY state_date DESC LIMIT 1"
        );
        let found = self
            .conn
            .query_row(&sql, params![user_id], row_to_state)
            .optional()?;
        Ok(found)
    }

    /// Most recent day strictly before `date` with at least one completion.
    pub fn last_completed_before(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<DailyState>, DatabaseError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM daily_states
             WHERE user_id = ?1 AND state_date < ?2 AND rituals_completed > 0
             ORDER BY state_date DESC LIMIT 1"
        );
        let found = self
            .conn
            .query_row(&sql, params![user_id, format_date(date)], row_to_state)
            .optional()?;
        Ok(found)
    }

    /// Most recent day on or before `date` with at least one completion.
    pub fn last_completed_on_or_before(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<DailyState>, DatabaseError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM daily_states
             WHERE user_id = ?1 AND state_date <= ?2 AND rituals_completed > 0
             ORDER BY state_date DESC LIMIT 1"
        );
        let found = self
            .conn
            .query_row(&sql, params![user_id, format_date(date)], row_to_state)
            .optional()?;
        Ok(found)
    }

    /// Shields spent on days in `[from, to]`.
    pub fn shields_consumed_between(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<u32, DatabaseError> {
        let total = self.conn.query_row(
            "SELECT COALESCE(SUM(shields_consumed), 0) FROM daily_states
             WHERE user_id = ?1 AND state_date >= ?2 AND state_date <= ?3",
            params![user_id, format_date(from), format_date(to)],
            |row| row.get::<_, u32>(0),
        )?;
        Ok(total)
    }

    /// The newest `limit` rows, newest first.
    pub fn recent(&self, user_id: &str, limit: u32) -> Result<Vec<DailyState>, DatabaseError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM daily_states WHERE user_id = ?1
             ORDER BY state_date DESC LIMIT ?2"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![user_id, limit], row_to_state)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use chrono::Utc;

    fn state(d: u32, completed: u32, streak: u32, shields: u32) -> DailyState {
        let mut s = DailyState::open(
            "u1",
            NaiveDate::from_ymd_opt(2024, 6, d).unwrap(),
            Tier::Ghost,
            0,
            Utc::now(),
        );
        s.rituals_completed_today = completed;
        s.streak_length = streak;
        s.shields_consumed = shields;
        s
    }

    #[test]
    fn insert_is_first_writer_wins() {
        let db = Database::open_memory().unwrap();
        let store = DailyStateStore::new(db.conn());
        assert!(store.insert_if_absent(&state(1, 0, 0, 0)).unwrap());
        assert!(!store.insert_if_absent(&state(1, 1, 1, 0)).unwrap());
        let stored = store.get("u1", state(1, 0, 0, 0).state_date).unwrap().unwrap();
        assert_eq!(stored.rituals_completed_today, 0);
    }

    #[test]
    fn last_completed_before_ignores_empty_days() {
        let db = Database::open_memory().unwrap();
        let store = DailyStateStore::new(db.conn());
        store.insert_if_absent(&state(1, 1, 4, 0)).unwrap();
        store.insert_if_absent(&state(2, 0, 0, 0)).unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let last = store.last_completed_before("u1", today).unwrap().unwrap();
        assert_eq!(last.streak_length, 4);
        assert_eq!(last.state_date.format("%d").to_string(), "01");
    }

    #[test]
    fn shields_are_summed_over_window() {
        let db = Database::open_memory().unwrap();
        let store = DailyStateStore::new(db.conn());
        store.insert_if_absent(&state(1, 1, 1, 1)).unwrap();
        store.insert_if_absent(&state(5, 1, 2, 2)).unwrap();
        store.insert_if_absent(&state(9, 1, 3, 1)).unwrap();
        let from = NaiveDate::from_ymd_opt(2024, 6, 2).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 6, 9).unwrap();
        assert_eq!(store.shields_consumed_between("u1", from, to).unwrap(), 3);
    }

    #[test]
    fn update_overwrites_counters() {
        let db = Database::open_memory().unwrap();
        let store = DailyStateStore::new(db.conn());
        let mut s = state(1, 0, 0, 0);
        store.insert_if_absent(&s).unwrap();
        s.rituals_completed_today = 1;
        s.streak_length = 1;
        s.has_rerolled_today = true;
        store.update(&s).unwrap();
        let stored = store.get("u1", s.state_date).unwrap().unwrap();
        assert_eq!(stored.rituals_completed_today, 1);
        assert!(stored.has_rerolled_today);
        assert_eq!(store.recent("u1", 10).unwrap().len(), 1);
    }

    #[test]
    fn latest_includes_days_without_completions() {
        let db = Database::open_memory().unwrap();
        let store = DailyStateStore::new(db.conn());
        assert!(store.latest("u1").unwrap().is_none());
        store.insert_if_absent(&state(1, 1, 1, 0)).unwrap();
        store.insert_if_absent(&state(4, 0, 0, 0)).unwrap();
        let latest = store.latest("u1").unwrap().unwrap();
        assert_eq!(latest.state_date, NaiveDate::from_ymd_opt(2024, 6, 4).unwrap());
    }
}
