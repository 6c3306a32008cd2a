use chrono::{DateTime, Utc};
use oxpager_common::types::AlertAssignment;
use rusqlite::{params, OptionalExtension, Row};

use crate::codec::{millis, opt_ts, text, ts};
use crate::error::Result;
use crate::store::StoreView;

const ASSIGNMENT_COLUMNS: &str = "id, alert_id, assigned_to, assigned_by, reason, level, \
     expected_response_minutes, assigned_at, acknowledged_at, response_time_minutes";

fn row_to_assignment(row: &Row<'_>) -> rusqlite::Result<AlertAssignment> {
    Ok(AlertAssignment {
        id: row.get(0)?,
        alert_id: row.get(1)?,
        assigned_to: row.get(2)?,
        assigned_by: row.get(3)?,
        reason: text(row, 4)?,
        level: row.get(5)?,
        expected_response_minutes: row.get(6)?,
        assigned_at: ts(row, 7)?,
        acknowledged_at: opt_ts(row, 8)?,
        response_time_minutes: row.get(9)?,
    })
}

impl StoreView<'_> {
    pub fn insert_assignment(&self, assignment: &AlertAssignment) -> Result<()> {
        self.conn().execute(
            "INSERT INTO alert_assignments (id, alert_id, assigned_to, assigned_by, reason, level,
                 expected_response_minutes, assigned_at, acknowledged_at, response_time_minutes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                &assignment.id,
                &assignment.alert_id,
                &assignment.assigned_to,
                &assignment.assigned_by,
                assignment.reason.as_str(),
                assignment.level,
                assignment.expected_response_minutes,
                millis(assignment.assigned_at),
                assignment.acknowledged_at.map(millis),
                assignment.response_time_minutes,
            ],
        )?;
        Ok(())
    }

    /// Assignments of an alert in the order they were made.
    pub fn assignments_for_alert(&self, alert_id: &str) -> Result<Vec<AlertAssignment>> {
        let sql = format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM alert_assignments
             WHERE alert_id = ?1 ORDER BY assigned_at ASC, level ASC, id ASC"
        );
        let mut stmt = self.conn().prepare_cached(&sql)?;
        let rows = stmt.query_map(params![alert_id], row_to_assignment)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// The most recent assignment of the alert still waiting for an
    /// acknowledgment.
    pub fn latest_open_assignment(&self, alert_id: &str) -> Result<Option<AlertAssignment>> {
        let sql = format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM alert_assignments
             WHERE alert_id = ?1 AND acknowledged_at IS NULL
             ORDER BY assigned_at DESC, level DESC, id DESC LIMIT 1"
        );
        Ok(self
            .conn()
            .query_row(&sql, params![alert_id], row_to_assignment)
            .optional()?)
    }

    /// Stamps an acknowledgment on an assignment that has none yet.
    pub fn acknowledge_assignment(
        &self,
        id: &str,
        at: DateTime<Utc>,
        response_time_minutes: i64,
    ) -> Result<bool> {
        let updated = self.conn().execute(
            "UPDATE alert_assignments SET acknowledged_at = ?1, response_time_minutes = ?2
             WHERE id = ?3 AND acknowledged_at IS NULL",
            params![millis(at), response_time_minutes, id],
        )?;
        Ok(updated == 1)
    }
}
