use chrono::{DateTime, Utc};
use oxpager_common::types::{AlertRecord, AlertRule, AlertStatus, Resolution};
use rusqlite::{params, OptionalExtension, Row};

use crate::codec::{json, millis, opt_text, opt_ts, text, to_json, ts};
use crate::error::Result;
use crate::store::StoreView;

const ALERT_COLUMNS: &str = "id, rule_id, metric_name, severity, team_id, status, labels, \
     created_at, acknowledged_at, resolved_at, resolution";

fn row_to_alert(row: &Row<'_>) -> rusqlite::Result<AlertRecord> {
    Ok(AlertRecord {
        id: row.get(0)?,
        rule_id: row.get(1)?,
        metric_name: row.get(2)?,
        severity: text(row, 3)?,
        team_id: row.get(4)?,
        status: text(row, 5)?,
        labels: json(row, 6)?,
        created_at: ts(row, 7)?,
        acknowledged_at: opt_ts(row, 8)?,
        resolved_at: opt_ts(row, 9)?,
        resolution: opt_text(row, 10)?,
    })
}

impl StoreView<'_> {
    // ---- alerts ----

    pub fn insert_alert(&self, alert: &AlertRecord) -> Result<()> {
        self.conn().execute(
            "INSERT INTO alerts (id, rule_id, metric_name, severity, team_id, status, labels,
                 created_at, acknowledged_at, resolved_at, resolution)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                &alert.id,
                &alert.rule_id,
                &alert.metric_name,
                alert.severity.as_str(),
                &alert.team_id,
                alert.status.as_str(),
                to_json(&alert.labels)?,
                millis(alert.created_at),
                alert.acknowledged_at.map(millis),
                alert.resolved_at.map(millis),
                alert.resolution.map(|r| r.as_str()),
            ],
        )?;
        Ok(())
    }

    pub fn get_alert(&self, id: &str) -> Result<Option<AlertRecord>> {
        let sql = format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = ?1");
        Ok(self
            .conn()
            .query_row(&sql, params![id], row_to_alert)
            .optional()?)
    }

    /// Most recent active or acknowledged alert on `rule_id` created at or
    /// after `since`.
    pub fn latest_open_alert_for_rule(
        &self,
        rule_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<AlertRecord>> {
        let sql = format!(
            "SELECT {ALERT_COLUMNS} FROM alerts
             WHERE rule_id = ?1 AND status IN ('active', 'acknowledged') AND created_at >= ?2
             ORDER BY created_at DESC, id DESC LIMIT 1"
        );
        Ok(self
            .conn()
            .query_row(&sql, params![rule_id, millis(since)], row_to_alert)
            .optional()?)
    }

    /// Number of alerts on `rule_id` created at or after `since`.
    pub fn count_rule_alerts_since(&self, rule_id: &str, since: DateTime<Utc>) -> Result<u32> {
        let count: u32 = self.conn().query_row(
            "SELECT COUNT(*) FROM alerts WHERE rule_id = ?1 AND created_at >= ?2",
            params![rule_id, millis(since)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Moves an active alert to acknowledged. Returns false when the alert is
    /// missing or no longer active.
    pub fn acknowledge_alert(&self, id: &str, at: DateTime<Utc>) -> Result<bool> {
        let updated = self.conn().execute(
            "UPDATE alerts SET status = ?1, acknowledged_at = ?2 WHERE id = ?3 AND status = 'active'",
            params![AlertStatus::Acknowledged.as_str(), millis(at), id],
        )?;
        Ok(updated > 0)
    }

    /// Resolves an open alert. Resolution is terminal: a resolved alert is
    /// never updated again.
    pub fn resolve_alert(&self, id: &str, at: DateTime<Utc>, resolution: Resolution) -> Result<bool> {
        let updated = self.conn().execute(
            "UPDATE alerts SET status = ?1, resolved_at = ?2, resolution = ?3
             WHERE id = ?4 AND status != 'resolved'",
            params![
                AlertStatus::Resolved.as_str(),
                millis(at),
                resolution.as_str(),
                id
            ],
        )?;
        Ok(updated > 0)
    }

    // ---- alert_rules ----

    pub fn upsert_alert_rule(&self, rule: &AlertRule) -> Result<()> {
        self.conn().execute(
            "INSERT INTO alert_rules (id, team_id, name, metric_name, max_alerts_per_hour)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                 team_id = excluded.team_id,
                 name = excluded.name,
                 metric_name = excluded.metric_name,
                 max_alerts_per_hour = excluded.max_alerts_per_hour",
            params![
                &rule.id,
                &rule.team_id,
                &rule.name,
                &rule.metric_name,
                rule.max_alerts_per_hour
            ],
        )?;
        Ok(())
    }

    pub fn get_alert_rule(&self, id: &str) -> Result<Option<AlertRule>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT id, team_id, name, metric_name, max_alerts_per_hour
                 FROM alert_rules WHERE id = ?1",
                params![id],
                |row| {
                    Ok(AlertRule {
                        id: row.get(0)?,
                        team_id: row.get(1)?,
                        name: row.get(2)?,
                        metric_name: row.get(3)?,
                        max_alerts_per_hour: row.get(4)?,
                    })
                },
            )
            .optional()?)
    }
}
