use rusqlite::Connection;

use crate::error::Result;

const ALERTS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS alerts (
    id TEXT PRIMARY KEY,
    rule_id TEXT NOT NULL,
    metric_name TEXT NOT NULL,
    severity TEXT NOT NULL,
    team_id TEXT NOT NULL,
    status TEXT NOT NULL,
    labels TEXT NOT NULL DEFAULT '{}',
    created_at INTEGER NOT NULL,
    acknowledged_at INTEGER,
    resolved_at INTEGER,
    resolution TEXT
);
CREATE INDEX IF NOT EXISTS idx_alerts_rule_time ON alerts(rule_id, created_at);
CREATE INDEX IF NOT EXISTS idx_alerts_team ON alerts(team_id);

CREATE TABLE IF NOT EXISTS alert_rules (
    id TEXT PRIMARY KEY,
    team_id TEXT NOT NULL,
    name TEXT NOT NULL,
    metric_name TEXT NOT NULL,
    max_alerts_per_hour INTEGER
);
";

const SUPPRESSION_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS maintenance_windows (
    id TEXT PRIMARY KEY,
    team_id TEXT,
    name TEXT NOT NULL,
    starts_at INTEGER NOT NULL,
    ends_at INTEGER NOT NULL,
    timezone TEXT NOT NULL DEFAULT 'UTC',
    affected_systems TEXT NOT NULL DEFAULT '[]',
    affected_severities TEXT NOT NULL DEFAULT '[]',
    suppress_all INTEGER NOT NULL DEFAULT 0,
    enabled INTEGER NOT NULL DEFAULT 1,
    recurrence TEXT,
    priority INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    CHECK (ends_at > starts_at)
);
CREATE INDEX IF NOT EXISTS idx_mw_range ON maintenance_windows(starts_at, ends_at);

CREATE TABLE IF NOT EXISTS suppression_rules (
    id TEXT PRIMARY KEY,
    team_id TEXT,
    name TEXT NOT NULL,
    rule_type TEXT NOT NULL,
    condition TEXT NOT NULL,
    suppression_minutes INTEGER NOT NULL,
    max_alerts_per_window INTEGER,
    window_minutes INTEGER,
    limit_scope TEXT NOT NULL DEFAULT 'rule',
    group_by TEXT NOT NULL DEFAULT '[]',
    priority INTEGER NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS rate_limit_windows (
    scope TEXT NOT NULL,
    scope_id TEXT NOT NULL,
    max_alerts INTEGER NOT NULL,
    window_minutes INTEGER NOT NULL,
    current_count INTEGER NOT NULL DEFAULT 0,
    window_start INTEGER NOT NULL,
    next_reset INTEGER NOT NULL,
    PRIMARY KEY (scope, scope_id)
);

CREATE TABLE IF NOT EXISTS suppression_logs (
    id TEXT PRIMARY KEY,
    alert_id TEXT NOT NULL,
    team_id TEXT NOT NULL,
    rule_id TEXT NOT NULL,
    suppressed INTEGER NOT NULL,
    reason TEXT NOT NULL,
    suppress_until INTEGER,
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_suppression_logs_alert ON suppression_logs(alert_id);
CREATE INDEX IF NOT EXISTS idx_suppression_logs_time ON suppression_logs(created_at);
";

const GROUPS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS alert_groups (
    id TEXT PRIMARY KEY,
    team_id TEXT NOT NULL,
    group_key TEXT NOT NULL,
    first_alert_id TEXT NOT NULL,
    last_alert_id TEXT NOT NULL,
    alert_count INTEGER NOT NULL,
    severities TEXT NOT NULL DEFAULT '[]',
    first_alert_at INTEGER NOT NULL,
    last_alert_at INTEGER NOT NULL,
    suppression_applied INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_groups_key ON alert_groups(team_id, group_key, last_alert_at);

CREATE TABLE IF NOT EXISTS alert_group_members (
    group_id TEXT NOT NULL,
    alert_id TEXT NOT NULL,
    suppressed INTEGER NOT NULL DEFAULT 0,
    joined_at INTEGER NOT NULL,
    PRIMARY KEY (group_id, alert_id)
);
CREATE INDEX IF NOT EXISTS idx_group_members_alert ON alert_group_members(alert_id);
";

const ESCALATION_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS escalation_configs (
    team_id TEXT PRIMARY KEY,
    config TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS severity_routing (
    id TEXT PRIMARY KEY,
    team_id TEXT NOT NULL,
    severity TEXT NOT NULL,
    assigned_users TEXT NOT NULL DEFAULT '[]',
    assigned_channels TEXT NOT NULL DEFAULT '[]',
    initial_delay_minutes INTEGER NOT NULL DEFAULT 0,
    escalation_interval_minutes INTEGER NOT NULL,
    max_escalation_level INTEGER NOT NULL,
    business_hours_only INTEGER NOT NULL DEFAULT 0,
    weekend_escalation INTEGER NOT NULL DEFAULT 0,
    auto_acknowledge_minutes INTEGER,
    auto_resolve_minutes INTEGER,
    enabled INTEGER NOT NULL DEFAULT 1,
    priority INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_routing_team_sev ON severity_routing(team_id, severity);

CREATE TABLE IF NOT EXISTS on_call_schedules (
    id TEXT PRIMARY KEY,
    team_id TEXT NOT NULL,
    name TEXT NOT NULL,
    schedule_type TEXT NOT NULL,
    timezone TEXT NOT NULL DEFAULT 'UTC',
    effective_from INTEGER NOT NULL,
    effective_until INTEGER,
    applicable_severities TEXT NOT NULL DEFAULT '[]',
    enabled INTEGER NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS on_call_entries (
    id TEXT PRIMARY KEY,
    schedule_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    starts_at INTEGER NOT NULL,
    ends_at INTEGER NOT NULL,
    is_primary INTEGER NOT NULL DEFAULT 1,
    backup_user TEXT,
    is_override INTEGER NOT NULL DEFAULT 0,
    override_reason TEXT,
    original_user TEXT,
    created_at INTEGER NOT NULL,
    CHECK (ends_at > starts_at)
);
CREATE INDEX IF NOT EXISTS idx_entries_range ON on_call_entries(schedule_id, starts_at, ends_at);

CREATE TABLE IF NOT EXISTS alert_assignments (
    id TEXT PRIMARY KEY,
    alert_id TEXT NOT NULL,
    assigned_to TEXT NOT NULL,
    assigned_by TEXT NOT NULL,
    reason TEXT NOT NULL,
    level INTEGER NOT NULL,
    expected_response_minutes INTEGER NOT NULL,
    assigned_at INTEGER NOT NULL,
    acknowledged_at INTEGER,
    response_time_minutes INTEGER
);
CREATE INDEX IF NOT EXISTS idx_assignments_alert ON alert_assignments(alert_id, assigned_at);

CREATE TABLE IF NOT EXISTS escalation_states (
    alert_id TEXT PRIMARY KEY,
    team_id TEXT NOT NULL,
    severity TEXT NOT NULL,
    routing_id TEXT,
    current_level INTEGER NOT NULL,
    next_escalation_at INTEGER NOT NULL,
    phase TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_escalation_due ON escalation_states(phase, next_escalation_at);

CREATE TABLE IF NOT EXISTS team_members (
    team_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    role TEXT NOT NULL,
    PRIMARY KEY (team_id, user_id)
);
";

/// Creates every table and index. Safe to run on an existing database.
pub(crate) fn apply(conn: &Connection) -> Result<()> {
    conn.execute_batch(ALERTS_SCHEMA)?;
    conn.execute_batch(SUPPRESSION_SCHEMA)?;
    conn.execute_batch(GROUPS_SCHEMA)?;
    conn.execute_batch(ESCALATION_SCHEMA)?;
    Ok(())
}
