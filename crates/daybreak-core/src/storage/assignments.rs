//! Assignment rows: which rituals a user was shown on which date.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{format_date, read_date, read_datetime, read_json, read_opt_datetime};
use crate::error::DatabaseError;
use crate::scheduler::{Assignment, RitualCompletion};

const COLUMNS: &str = "id, user_id, assignment_date, generation, ritual_ids, completions,
                       completed, completed_at, rerolled, created_at";

fn row_to_assignment(row: &rusqlite::Row) -> rusqlite::Result<Assignment> {
    Ok(Assignment {
        id: row.get(0)?,
        user_id: row.get(1)?,
        assignment_date: read_date(row, 2)?,
        generation: row.get(3)?,
        ritual_ids: read_json(row, 4)?,
        completions: read_json(row, 5)?,
        completed: row.get(6)?,
        completed_at: read_opt_datetime(row, 7)?,
        rerolled: row.get(8)?,
        created_at: read_datetime(row, 9)?,
    })
}

/// Access to the `assignments` table over a connection or open transaction.
pub struct AssignmentStore<'c> {
    conn: &'c Connection,
}

impl<'c> AssignmentStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// The live (non-rerolled) assignment for a user and date.
    pub fn find_live(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<Assignment>, DatabaseError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM assignments
             WHERE user_id = ?1 AND assignment_date = ?2 AND rerolled = 0"
        );
        let found = self
            .conn
            .query_row(&sql, params![user_id, format_date(date)], row_to_assignment)
            .optional()?;
        Ok(found)
    }

    /// Every generation for a user and date, oldest first.
    pub fn list_for_date(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<Assignment>, DatabaseError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM assignments
             WHERE user_id = ?1 AND assignment_date = ?2
             ORDER BY generation ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![user_id, format_date(date)], row_to_assignment)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// The live assignment on the most recent date before `date`.
    pub fn latest_live_before(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<Assignment>, DatabaseError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM assignments
             WHERE user_id = ?1 AND assignment_date < ?2 AND rerolled = 0
             ORDER BY assignment_date DESC
             LIMIT 1"
        );
        let found = self
            .conn
            .query_row(&sql, params![user_id, format_date(date)], row_to_assignment)
            .optional()?;
        Ok(found)
    }

    /// Insert unless a row with the same (user, date, generation) or another
    /// live row for (user, date) already exists. Returns `true` when this call
    /// wrote the row.
    pub fn insert_if_absent(&self, assignment: &Assignment) -> Result<bool, DatabaseError> {
        let result = self.conn.execute(
            "INSERT INTO assignments (id, user_id, assignment_date, generation, ritual_ids,
                                      completions, completed, completed_at, rerolled, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT DO NOTHING",
            params![
                assignment.id,
                assignment.user_id,
                format_date(assignment.assignment_date),
                assignment.generation,
                serde_json::to_string(&assignment.ritual_ids)
                    .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?,
                serde_json::to_string(&assignment.completions)
                    .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?,
                assignment.completed,
                assignment.completed_at.map(|t| t.to_rfc3339()),
                assignment.rerolled,
                assignment.created_at.to_rfc3339(),
            ],
        );
        match result.map_err(DatabaseError::from) {
            Ok(changed) => Ok(changed == 1),
            Err(e) if e.is_conflict() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Retire a live assignment. Returns `false` if it was already retired.
    pub fn mark_rerolled(&self, id: &str) -> Result<bool, DatabaseError> {
        let changed = self.conn.execute(
            "UPDATE assignments SET rerolled = 1 WHERE id = ?1 AND rerolled = 0",
            params![id],
        )?;
        Ok(changed == 1)
    }

    /// Persist the completion list of an assignment.
    pub fn save_completions(
        &self,
        id: &str,
        completions: &[RitualCompletion],
        completed: bool,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), DatabaseError> {
        let json = serde_json::to_string(completions)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        self.conn.execute(
            "UPDATE assignments SET completions = ?2, completed = ?3, completed_at = ?4
             WHERE id = ?1",
            params![id, json, completed, completed_at.map(|t| t.to_rfc3339())],
        )?;
        Ok(())
    }

    /// Number of live assignments for a user and date.
    pub fn count_live(&self, user_id: &str, date: NaiveDate) -> Result<u32, DatabaseError> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM assignments
             WHERE user_id = ?1 AND assignment_date = ?2 AND rerolled = 0",
            params![user_id, format_date(date)],
            |row| row.get::<_, u32>(0),
        )?;
        Ok(count)
    }
}
