use chrono::{DateTime, Utc};
use oxpager_common::types::{SuppressionLogEntry, SuppressionRule};
use rusqlite::{params, Row};

use crate::codec::{json, millis, opt_ts, text, to_json, ts};
use crate::error::{Result, StorageError};
use crate::store::StoreView;

const RULE_COLUMNS: &str = "id, team_id, name, rule_type, condition, suppression_minutes, \
     max_alerts_per_window, window_minutes, limit_scope, group_by, priority, enabled, created_at";

fn row_to_rule(row: &Row<'_>) -> rusqlite::Result<SuppressionRule> {
    Ok(SuppressionRule {
        id: row.get(0)?,
        team_id: row.get(1)?,
        name: row.get(2)?,
        rule_type: text(row, 3)?,
        condition: json(row, 4)?,
        suppression_minutes: row.get(5)?,
        max_alerts_per_window: row.get(6)?,
        window_minutes: row.get(7)?,
        limit_scope: text(row, 8)?,
        group_by: json(row, 9)?,
        priority: row.get(10)?,
        enabled: row.get(11)?,
        created_at: ts(row, 12)?,
    })
}

fn row_to_log(row: &Row<'_>) -> rusqlite::Result<SuppressionLogEntry> {
    Ok(SuppressionLogEntry {
        id: row.get(0)?,
        alert_id: row.get(1)?,
        team_id: row.get(2)?,
        rule_id: row.get(3)?,
        suppressed: row.get(4)?,
        reason: text(row, 5)?,
        suppress_until: opt_ts(row, 6)?,
        metadata: json(row, 7)?,
        created_at: ts(row, 8)?,
    })
}

impl StoreView<'_> {
    // ---- suppression_rules ----

    /// Rejects a rule whose condition could never be evaluated.
    pub fn upsert_suppression_rule(&self, rule: &SuppressionRule) -> Result<()> {
        rule.condition
            .validate()
            .map_err(|e| StorageError::InvalidValue {
                column: "condition",
                value: format!("rule '{}': {e}", rule.id),
            })?;
        self.conn().execute(
            "INSERT OR REPLACE INTO suppression_rules (id, team_id, name, rule_type, condition,
                 suppression_minutes, max_alerts_per_window, window_minutes, limit_scope,
                 group_by, priority, enabled, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                &rule.id,
                &rule.team_id,
                &rule.name,
                rule.rule_type.as_str(),
                to_json(&rule.condition)?,
                rule.suppression_minutes,
                rule.max_alerts_per_window,
                rule.window_minutes,
                rule.limit_scope.as_str(),
                to_json(&rule.group_by)?,
                rule.priority,
                rule.enabled,
                millis(rule.created_at),
            ],
        )?;
        Ok(())
    }

    /// Enabled rules that are global or owned by `team_id`, in evaluation
    /// order: descending priority, then id.
    pub fn enabled_suppression_rules(&self, team_id: &str) -> Result<Vec<SuppressionRule>> {
        let sql = format!(
            "SELECT {RULE_COLUMNS} FROM suppression_rules
             WHERE enabled = 1 AND (team_id IS NULL OR team_id = ?1)
             ORDER BY priority DESC, id ASC"
        );
        let mut stmt = self.conn().prepare_cached(&sql)?;
        let rows = stmt.query_map(params![team_id], row_to_rule)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // ---- suppression_logs ----

    pub fn insert_suppression_log(&self, entry: &SuppressionLogEntry) -> Result<()> {
        self.conn().execute(
            "INSERT INTO suppression_logs (id, alert_id, team_id, rule_id, suppressed, reason,
                 suppress_until, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                &entry.id,
                &entry.alert_id,
                &entry.team_id,
                &entry.rule_id,
                entry.suppressed,
                entry.reason.as_str(),
                entry.suppress_until.map(millis),
                to_json(&entry.metadata)?,
                millis(entry.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn suppression_logs_for_alert(&self, alert_id: &str) -> Result<Vec<SuppressionLogEntry>> {
        let mut stmt = self.conn().prepare_cached(
            "SELECT id, alert_id, team_id, rule_id, suppressed, reason, suppress_until, metadata,
                    created_at
             FROM suppression_logs WHERE alert_id = ?1 ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![alert_id], row_to_log)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Deletes log entries created before `before`. Returns the number removed.
    pub fn cleanup_suppression_logs(&self, before: DateTime<Utc>) -> Result<usize> {
        Ok(self.conn().execute(
            "DELETE FROM suppression_logs WHERE created_at < ?1",
            params![millis(before)],
        )?)
    }
}
