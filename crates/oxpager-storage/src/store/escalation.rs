use chrono::{DateTime, Utc};
use oxpager_common::types::{
    EscalationConfig, EscalationPhase, EscalationState, Severity, SeverityRouting,
};
use rusqlite::{params, OptionalExtension, Row};

use crate::codec::{json, millis, text, to_json, ts};
use crate::error::Result;
use crate::store::StoreView;

const ROUTING_COLUMNS: &str = "id, team_id, severity, assigned_users, assigned_channels, \
     initial_delay_minutes, escalation_interval_minutes, max_escalation_level, \
     business_hours_only, weekend_escalation, auto_acknowledge_minutes, auto_resolve_minutes, \
     enabled, priority";

const STATE_COLUMNS: &str = "alert_id, team_id, severity, routing_id, current_level, \
     next_escalation_at, phase, created_at, updated_at";

fn row_to_routing(row: &Row<'_>) -> rusqlite::Result<SeverityRouting> {
    Ok(SeverityRouting {
        id: row.get(0)?,
        team_id: row.get(1)?,
        severity: text(row, 2)?,
        assigned_users: json(row, 3)?,
        assigned_channels: json(row, 4)?,
        initial_delay_minutes: row.get(5)?,
        escalation_interval_minutes: row.get(6)?,
        max_escalation_level: row.get(7)?,
        business_hours_only: row.get(8)?,
        weekend_escalation: row.get(9)?,
        auto_acknowledge_minutes: row.get(10)?,
        auto_resolve_minutes: row.get(11)?,
        enabled: row.get(12)?,
        priority: row.get(13)?,
    })
}

fn row_to_state(row: &Row<'_>) -> rusqlite::Result<EscalationState> {
    Ok(EscalationState {
        alert_id: row.get(0)?,
        team_id: row.get(1)?,
        severity: text(row, 2)?,
        routing_id: row.get(3)?,
        current_level: row.get(4)?,
        next_escalation_at: ts(row, 5)?,
        phase: text(row, 6)?,
        created_at: ts(row, 7)?,
        updated_at: ts(row, 8)?,
    })
}

impl StoreView<'_> {
    // ---- escalation_configs ----

    pub fn upsert_escalation_config(&self, config: &EscalationConfig, now: DateTime<Utc>) -> Result<()> {
        self.conn().execute(
            "INSERT INTO escalation_configs (team_id, config, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(team_id) DO UPDATE SET
                 config = excluded.config,
                 updated_at = excluded.updated_at",
            params![&config.team_id, to_json(config)?, millis(now)],
        )?;
        Ok(())
    }

    pub fn get_escalation_config(&self, team_id: &str) -> Result<Option<EscalationConfig>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT config FROM escalation_configs WHERE team_id = ?1",
                params![team_id],
                |row| json(row, 0),
            )
            .optional()?)
    }

    // ---- severity_routing ----

    pub fn upsert_severity_routing(&self, routing: &SeverityRouting) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO severity_routing (id, team_id, severity, assigned_users,
                 assigned_channels, initial_delay_minutes, escalation_interval_minutes,
                 max_escalation_level, business_hours_only, weekend_escalation,
                 auto_acknowledge_minutes, auto_resolve_minutes, enabled, priority)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                &routing.id,
                &routing.team_id,
                routing.severity.as_str(),
                to_json(&routing.assigned_users)?,
                to_json(&routing.assigned_channels)?,
                routing.initial_delay_minutes,
                routing.escalation_interval_minutes,
                routing.max_escalation_level,
                routing.business_hours_only,
                routing.weekend_escalation,
                routing.auto_acknowledge_minutes,
                routing.auto_resolve_minutes,
                routing.enabled,
                routing.priority,
            ],
        )?;
        Ok(())
    }

    /// All routing rows (enabled or not) for the team and severity, in
    /// precedence order: ascending priority, then id.
    pub fn severity_routing_for(
        &self,
        team_id: &str,
        severity: Severity,
    ) -> Result<Vec<SeverityRouting>> {
        let sql = format!(
            "SELECT {ROUTING_COLUMNS} FROM severity_routing
             WHERE team_id = ?1 AND severity = ?2
             ORDER BY priority ASC, id ASC"
        );
        let mut stmt = self.conn().prepare_cached(&sql)?;
        let rows = stmt.query_map(params![team_id, severity.as_str()], row_to_routing)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get_severity_routing(&self, id: &str) -> Result<Option<SeverityRouting>> {
        let sql = format!("SELECT {ROUTING_COLUMNS} FROM severity_routing WHERE id = ?1");
        Ok(self
            .conn()
            .query_row(&sql, params![id], row_to_routing)
            .optional()?)
    }

    // ---- escalation_states ----

    pub fn insert_escalation_state(&self, state: &EscalationState) -> Result<()> {
        self.conn().execute(
            "INSERT INTO escalation_states (alert_id, team_id, severity, routing_id,
                 current_level, next_escalation_at, phase, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                &state.alert_id,
                &state.team_id,
                state.severity.as_str(),
                &state.routing_id,
                state.current_level,
                millis(state.next_escalation_at),
                state.phase.as_str(),
                millis(state.created_at),
                millis(state.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_escalation_state(&self, alert_id: &str) -> Result<Option<EscalationState>> {
        let sql = format!("SELECT {STATE_COLUMNS} FROM escalation_states WHERE alert_id = ?1");
        Ok(self
            .conn()
            .query_row(&sql, params![alert_id], row_to_state)
            .optional()?)
    }

    /// Active states whose next step is due at or before `now`, oldest first.
    pub fn due_escalations(&self, now: DateTime<Utc>) -> Result<Vec<EscalationState>> {
        let sql = format!(
            "SELECT {STATE_COLUMNS} FROM escalation_states
             WHERE phase = 'active' AND next_escalation_at <= ?1
             ORDER BY next_escalation_at ASC, alert_id ASC"
        );
        let mut stmt = self.conn().prepare_cached(&sql)?;
        let rows = stmt.query_map(params![millis(now)], row_to_state)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Moves an active state from `from_level` to `to_level`. The update only
    /// applies if nobody else moved the state first; returns whether it did.
    pub fn advance_escalation(
        &self,
        alert_id: &str,
        from_level: i32,
        to_level: i32,
        next_escalation_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let updated = self.conn().execute(
            "UPDATE escalation_states
             SET current_level = ?1, next_escalation_at = ?2, updated_at = ?3
             WHERE alert_id = ?4 AND current_level = ?5 AND phase = 'active'",
            params![
                to_level,
                millis(next_escalation_at),
                millis(now),
                alert_id,
                from_level
            ],
        )?;
        Ok(updated == 1)
    }

    /// Pushes back the next check of an active state. Level and `updated_at`
    /// stay as they are.
    pub fn defer_escalation(
        &self,
        alert_id: &str,
        level: i32,
        next_escalation_at: DateTime<Utc>,
    ) -> Result<bool> {
        let updated = self.conn().execute(
            "UPDATE escalation_states SET next_escalation_at = ?1
             WHERE alert_id = ?2 AND current_level = ?3 AND phase = 'active'",
            params![millis(next_escalation_at), alert_id, level],
        )?;
        Ok(updated == 1)
    }

    /// Leaves the `active` phase. Returns false when the state is missing or
    /// already finished.
    pub fn set_escalation_phase(
        &self,
        alert_id: &str,
        phase: EscalationPhase,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let updated = self.conn().execute(
            "UPDATE escalation_states SET phase = ?1, updated_at = ?2
             WHERE alert_id = ?3 AND phase = 'active'",
            params![phase.as_str(), millis(now), alert_id],
        )?;
        Ok(updated == 1)
    }
}
