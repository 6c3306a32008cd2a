use chrono::{DateTime, Utc};
use oxpager_common::types::MaintenanceWindow;
use rusqlite::{params, Row};

use crate::codec::{json, millis, opt_text, to_json, ts};
use crate::error::{Result, StorageError};
use crate::store::StoreView;

const WINDOW_COLUMNS: &str = "id, team_id, name, starts_at, ends_at, timezone, affected_systems, \
     affected_severities, suppress_all, enabled, recurrence, priority, created_at";

fn row_to_window(row: &Row<'_>) -> rusqlite::Result<MaintenanceWindow> {
    Ok(MaintenanceWindow {
        id: row.get(0)?,
        team_id: row.get(1)?,
        name: row.get(2)?,
        starts_at: ts(row, 3)?,
        ends_at: ts(row, 4)?,
        timezone: row.get(5)?,
        affected_systems: json(row, 6)?,
        affected_severities: json(row, 7)?,
        suppress_all: row.get(8)?,
        enabled: row.get(9)?,
        recurrence: opt_text(row, 10)?,
        priority: row.get(11)?,
        created_at: ts(row, 12)?,
    })
}

impl StoreView<'_> {
    /// Inserts or replaces a window. Windows whose end is not after their
    /// start are rejected.
    pub fn upsert_maintenance_window(&self, window: &MaintenanceWindow) -> Result<()> {
        if !window.has_valid_range() {
            return Err(StorageError::InvalidTimeRange {
                entity: "maintenance_window",
                id: window.id.clone(),
            });
        }
        self.conn().execute(
            "INSERT OR REPLACE INTO maintenance_windows (id, team_id, name, starts_at, ends_at,
                 timezone, affected_systems, affected_severities, suppress_all, enabled,
                 recurrence, priority, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                &window.id,
                &window.team_id,
                &window.name,
                millis(window.starts_at),
                millis(window.ends_at),
                &window.timezone,
                to_json(&window.affected_systems)?,
                to_json(&window.affected_severities)?,
                window.suppress_all,
                window.enabled,
                window.recurrence.map(|r| r.as_str()),
                window.priority,
                millis(window.created_at),
            ],
        )?;
        Ok(())
    }

    /// Enabled windows covering `now` that are global or owned by `team_id`,
    /// highest priority first and most recently created first within a
    /// priority.
    pub fn active_maintenance_windows(
        &self,
        team_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<MaintenanceWindow>> {
        let sql = format!(
            "SELECT {WINDOW_COLUMNS} FROM maintenance_windows
             WHERE enabled = 1 AND starts_at <= ?1 AND ends_at >= ?1
               AND (team_id IS NULL OR team_id = ?2)
             ORDER BY priority DESC, created_at DESC, id DESC"
        );
        let mut stmt = self.conn().prepare_cached(&sql)?;
        let rows = stmt.query_map(params![millis(now), team_id], row_to_window)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Enabled windows whose end lies before `now`.
    pub fn ended_maintenance_windows(&self, now: DateTime<Utc>) -> Result<Vec<MaintenanceWindow>> {
        let sql = format!(
            "SELECT {WINDOW_COLUMNS} FROM maintenance_windows
             WHERE enabled = 1 AND ends_at < ?1 ORDER BY ends_at ASC"
        );
        let mut stmt = self.conn().prepare_cached(&sql)?;
        let rows = stmt.query_map(params![millis(now)], row_to_window)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn list_maintenance_windows(&self, team_id: Option<&str>) -> Result<Vec<MaintenanceWindow>> {
        let sql = format!(
            "SELECT {WINDOW_COLUMNS} FROM maintenance_windows
             WHERE ?1 IS NULL OR team_id IS NULL OR team_id = ?1
             ORDER BY starts_at ASC"
        );
        let mut stmt = self.conn().prepare_cached(&sql)?;
        let rows = stmt.query_map(params![team_id], row_to_window)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn reschedule_maintenance_window(
        &self,
        id: &str,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> Result<bool> {
        if ends_at <= starts_at {
            return Err(StorageError::InvalidTimeRange {
                entity: "maintenance_window",
                id: id.to_string(),
            });
        }
        let updated = self.conn().execute(
            "UPDATE maintenance_windows SET starts_at = ?1, ends_at = ?2 WHERE id = ?3",
            params![millis(starts_at), millis(ends_at), id],
        )?;
        Ok(updated > 0)
    }

    pub fn disable_maintenance_window(&self, id: &str) -> Result<bool> {
        let updated = self.conn().execute(
            "UPDATE maintenance_windows SET enabled = 0 WHERE id = ?1 AND enabled = 1",
            params![id],
        )?;
        Ok(updated > 0)
    }
}

