use chrono::{DateTime, Utc};
use oxpager_common::types::{OnCallEntry, OnCallSchedule};
use rusqlite::{params, Row};

use crate::codec::{json, millis, opt_ts, text, to_json, ts};
use crate::error::{Result, StorageError};
use crate::store::StoreView;

const SCHEDULE_COLUMNS: &str = "id, team_id, name, schedule_type, timezone, effective_from, \
     effective_until, applicable_severities, enabled, created_at";

fn row_to_schedule(row: &Row<'_>) -> rusqlite::Result<OnCallSchedule> {
    Ok(OnCallSchedule {
        id: row.get(0)?,
        team_id: row.get(1)?,
        name: row.get(2)?,
        schedule_type: text(row, 3)?,
        timezone: row.get(4)?,
        effective_from: ts(row, 5)?,
        effective_until: opt_ts(row, 6)?,
        applicable_severities: json(row, 7)?,
        enabled: row.get(8)?,
        created_at: ts(row, 9)?,
    })
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<OnCallEntry> {
    Ok(OnCallEntry {
        id: row.get(0)?,
        schedule_id: row.get(1)?,
        user_id: row.get(2)?,
        starts_at: ts(row, 3)?,
        ends_at: ts(row, 4)?,
        is_primary: row.get(5)?,
        backup_user: row.get(6)?,
        is_override: row.get(7)?,
        override_reason: row.get(8)?,
        original_user: row.get(9)?,
        created_at: ts(row, 10)?,
    })
}

impl StoreView<'_> {
    pub fn upsert_on_call_schedule(&self, schedule: &OnCallSchedule) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO on_call_schedules (id, team_id, name, schedule_type, timezone,
                 effective_from, effective_until, applicable_severities, enabled, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                &schedule.id,
                &schedule.team_id,
                &schedule.name,
                schedule.schedule_type.as_str(),
                &schedule.timezone,
                millis(schedule.effective_from),
                schedule.effective_until.map(millis),
                to_json(&schedule.applicable_severities)?,
                schedule.enabled,
                millis(schedule.created_at),
            ],
        )?;
        Ok(())
    }

    /// Inserts or replaces an entry. Entries whose end is not after their
    /// start are rejected.
    pub fn upsert_on_call_entry(&self, entry: &OnCallEntry) -> Result<()> {
        if !entry.has_valid_range() {
            return Err(StorageError::InvalidTimeRange {
                entity: "on_call_entry",
                id: entry.id.clone(),
            });
        }
        self.conn().execute(
            "INSERT OR REPLACE INTO on_call_entries (id, schedule_id, user_id, starts_at, ends_at,
                 is_primary, backup_user, is_override, override_reason, original_user, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                &entry.id,
                &entry.schedule_id,
                &entry.user_id,
                millis(entry.starts_at),
                millis(entry.ends_at),
                entry.is_primary,
                &entry.backup_user,
                entry.is_override,
                &entry.override_reason,
                &entry.original_user,
                millis(entry.created_at),
            ],
        )?;
        Ok(())
    }

    /// Every schedule of the team, oldest first.
    pub fn schedules_for_team(&self, team_id: &str) -> Result<Vec<OnCallSchedule>> {
        let sql = format!(
            "SELECT {SCHEDULE_COLUMNS} FROM on_call_schedules
             WHERE team_id = ?1 ORDER BY created_at ASC, id ASC"
        );
        let mut stmt = self.conn().prepare_cached(&sql)?;
        let rows = stmt.query_map(params![team_id], row_to_schedule)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Entries of the schedule whose `[starts_at, ends_at)` contains
    /// `now`, oldest first.
    pub fn entries_covering(
        &self,
        schedule_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<OnCallEntry>> {
        let mut stmt = self.conn().prepare_cached(
            "SELECT id, schedule_id, user_id, starts_at, ends_at, is_primary, backup_user,
                    is_override, override_reason, original_user, created_at
             FROM on_call_entries
             WHERE schedule_id = ?1 AND starts_at <= ?2 AND ends_at > ?2
             ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![schedule_id, millis(now)], row_to_entry)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}
