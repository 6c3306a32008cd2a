use chrono::{DateTime, Utc};
use oxpager_common::types::{AlertGroup, GroupMember};
use rusqlite::{params, OptionalExtension, Row};

use crate::codec::{json, millis, to_json, ts};
use crate::error::Result;
use crate::store::StoreView;

const GROUP_COLUMNS: &str = "id, team_id, group_key, first_alert_id, last_alert_id, alert_count, \
     severities, first_alert_at, last_alert_at, suppression_applied";

fn row_to_group(row: &Row<'_>) -> rusqlite::Result<AlertGroup> {
    Ok(AlertGroup {
        id: row.get(0)?,
        team_id: row.get(1)?,
        group_key: row.get(2)?,
        first_alert_id: row.get(3)?,
        last_alert_id: row.get(4)?,
        alert_count: row.get(5)?,
        severities: json(row, 6)?,
        first_alert_at: ts(row, 7)?,
        last_alert_at: ts(row, 8)?,
        suppression_applied: row.get(9)?,
    })
}

impl StoreView<'_> {
    /// The open group for (`team_id`, `group_key`) whose last alert arrived at
    /// or after `since`. Newest first if several qualify.
    pub fn find_open_group(
        &self,
        team_id: &str,
        group_key: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<AlertGroup>> {
        let sql = format!(
            "SELECT {GROUP_COLUMNS} FROM alert_groups
             WHERE team_id = ?1 AND group_key = ?2 AND last_alert_at >= ?3
             ORDER BY last_alert_at DESC, id DESC LIMIT 1"
        );
        Ok(self
            .conn()
            .query_row(
                &sql,
                params![team_id, group_key, millis(since)],
                row_to_group,
            )
            .optional()?)
    }

    pub fn insert_group(&self, group: &AlertGroup) -> Result<()> {
        self.conn().execute(
            "INSERT INTO alert_groups (id, team_id, group_key, first_alert_id, last_alert_id,
                 alert_count, severities, first_alert_at, last_alert_at, suppression_applied)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                &group.id,
                &group.team_id,
                &group.group_key,
                &group.first_alert_id,
                &group.last_alert_id,
                group.alert_count,
                to_json(&group.severities)?,
                millis(group.first_alert_at),
                millis(group.last_alert_at),
                group.suppression_applied,
            ],
        )?;
        Ok(())
    }

    /// Writes back the aggregate fields of a group after a new member joined.
    pub fn update_group(&self, group: &AlertGroup) -> Result<bool> {
        let updated = self.conn().execute(
            "UPDATE alert_groups
             SET last_alert_id = ?1, alert_count = ?2, severities = ?3, last_alert_at = ?4,
                 suppression_applied = ?5
             WHERE id = ?6",
            params![
                &group.last_alert_id,
                group.alert_count,
                to_json(&group.severities)?,
                millis(group.last_alert_at),
                group.suppression_applied,
                &group.id,
            ],
        )?;
        Ok(updated > 0)
    }

    /// Records membership. Returns false if the alert is already a member.
    pub fn add_group_member(&self, member: &GroupMember) -> Result<bool> {
        let inserted = self.conn().execute(
            "INSERT INTO alert_group_members (group_id, alert_id, suppressed, joined_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(group_id, alert_id) DO NOTHING",
            params![
                &member.group_id,
                &member.alert_id,
                member.suppressed,
                millis(member.joined_at)
            ],
        )?;
        Ok(inserted > 0)
    }

    pub fn get_group(&self, id: &str) -> Result<Option<AlertGroup>> {
        let sql = format!("SELECT {GROUP_COLUMNS} FROM alert_groups WHERE id = ?1");
        Ok(self
            .conn()
            .query_row(&sql, params![id], row_to_group)
            .optional()?)
    }

    pub fn group_members(&self, group_id: &str) -> Result<Vec<GroupMember>> {
        let mut stmt = self.conn().prepare_cached(
            "SELECT group_id, alert_id, suppressed, joined_at FROM alert_group_members
             WHERE group_id = ?1 ORDER BY joined_at ASC, alert_id ASC",
        )?;
        let rows = stmt.query_map(params![group_id], |row| {
            Ok(GroupMember {
                group_id: row.get(0)?,
                alert_id: row.get(1)?,
                suppressed: row.get(2)?,
                joined_at: ts(row, 3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn group_for_alert(&self, alert_id: &str) -> Result<Option<AlertGroup>> {
        let sql = "SELECT g.id, g.team_id, g.group_key, g.first_alert_id, g.last_alert_id,
                          g.alert_count, g.severities, g.first_alert_at, g.last_alert_at,
                          g.suppression_applied
                   FROM alert_groups g
                   JOIN alert_group_members m ON m.group_id = g.id
                   WHERE m.alert_id = ?1
                   ORDER BY g.last_alert_at DESC LIMIT 1";
        Ok(self
            .conn()
            .query_row(sql, params![alert_id], row_to_group)
            .optional()?)
    }

    /// Removes groups (and their membership rows) whose last alert is older
    /// than `before`. Returns the number of groups removed.
    pub fn cleanup_stale_groups(&self, before: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn();
        conn.execute(
            "DELETE FROM alert_group_members WHERE group_id IN
                 (SELECT id FROM alert_groups WHERE last_alert_at < ?1)",
            params![millis(before)],
        )?;
        Ok(conn.execute(
            "DELETE FROM alert_groups WHERE last_alert_at < ?1",
            params![millis(before)],
        )?)
    }
}

