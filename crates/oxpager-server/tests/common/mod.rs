#![allow(dead_code)]

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chrono::{DateTime, TimeZone, Utc};
use oxpager_common::condition::{Condition, ConditionField};
use oxpager_common::types::*;
use oxpager_escalation::dispatch::RecordingDispatcher;
use oxpager_server::app;
use oxpager_server::config::{SeedFile, ServerConfig};
use oxpager_server::seed::apply_seed;
use oxpager_server::state::AppState;
use oxpager_storage::PagerStore;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

pub const TEAM: &str = "team-t";

pub struct TestContext {
    pub temp_dir: TempDir,
    pub state: AppState,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub app: axum::Router,
}

/// Monday 2024-03-04 at `h:m` UTC.
pub fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap()
}

pub fn cpu_alert(id: &str, created_at: DateTime<Utc>) -> AlertRecord {
    AlertRecord::new(id, "rule-cpu", "cpu_high", Severity::High, TEAM, created_at)
}

/// Team T: a cpu_high rule capped at 5 per hour, high-severity routing with
/// no delay and a 30 minute interval, and alice on call (backup bob) from
/// then on.
pub fn standard_seed() -> SeedFile {
    let mut prefs = BTreeMap::new();
    prefs.insert(
        Severity::High,
        ChannelPreference {
            immediate: vec!["push".into()],
            escalation: vec!["sms".into()],
        },
    );
    SeedFile {
        alert_rules: vec![AlertRule {
            id: "rule-cpu".into(),
            team_id: TEAM.into(),
            name: "CPU high".into(),
            metric_name: "cpu_high".into(),
            max_alerts_per_hour: Some(5),
        }],
        escalation_configs: vec![EscalationConfig {
            team_id: TEAM.into(),
            business_hours: BusinessHours {
                timezone: "UTC".into(),
                weekday: TimeRange {
                    start: chrono::NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                    end: chrono::NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
                },
                weekend: None,
            },
            escalation_chain: vec!["lead".into()],
            severity_overrides: BTreeMap::new(),
            notification_preferences: prefs,
            auto_resolution: BTreeMap::new(),
            primary_contacts: vec!["contact".into()],
            escalation_contacts: vec![],
        }],
        severity_routing: vec![SeverityRouting {
            id: "route-high".into(),
            team_id: TEAM.into(),
            severity: Severity::High,
            assigned_users: vec![],
            assigned_channels: vec![],
            initial_delay_minutes: 0,
            escalation_interval_minutes: 30,
            max_escalation_level: 3,
            business_hours_only: false,
            weekend_escalation: false,
            auto_acknowledge_minutes: None,
            auto_resolve_minutes: None,
            enabled: true,
            priority: 0,
        }],
        on_call_schedules: vec![OnCallSchedule {
            id: "sched-1".into(),
            team_id: TEAM.into(),
            name: "Primary".into(),
            schedule_type: ScheduleType::Rotation,
            timezone: "UTC".into(),
            effective_from: at(0, 0),
            effective_until: None,
            applicable_severities: vec![],
            enabled: true,
            created_at: at(0, 0),
        }],
        on_call_entries: vec![OnCallEntry {
            id: "entry-1".into(),
            schedule_id: "sched-1".into(),
            user_id: "alice".into(),
            starts_at: at(0, 0),
            ends_at: at(0, 0) + chrono::Duration::days(365 * 100),
            is_primary: true,
            backup_user: Some("bob".into()),
            is_override: false,
            override_reason: None,
            original_user: None,
            created_at: at(0, 0),
        }],
        team_members: vec![TeamMember {
            team_id: TEAM.into(),
            user_id: "alice".into(),
            role: TeamRole::Member,
        }],
        ..Default::default()
    }
}

pub fn custom_rule(id: &str, condition: Condition) -> SuppressionRule {
    SuppressionRule {
        id: id.into(),
        team_id: Some(TEAM.into()),
        name: id.into(),
        rule_type: RuleType::Custom,
        condition,
        suppression_minutes: 15,
        max_alerts_per_window: None,
        window_minutes: None,
        limit_scope: RateLimitScope::Rule,
        group_by: vec![],
        priority: 10,
        enabled: true,
        created_at: at(0, 0),
    }
}

/// Overwrites a stored rule's condition column behind the store's back,
/// the way a hand-edited database would.
pub fn corrupt_rule_condition(ctx: &TestContext, rule_id: &str, condition_json: &str) {
    let conn = rusqlite::Connection::open(ctx.state.config.database_path()).unwrap();
    let changed = conn
        .execute(
            "UPDATE suppression_rules SET condition = ?1 WHERE id = ?2",
            rusqlite::params![condition_json, rule_id],
        )
        .unwrap();
    assert_eq!(changed, 1);
}

pub fn metric_condition() -> Condition {
    Condition::Equals {
        field: ConditionField::MetricName,
        value: "cpu_high".into(),
    }
}

pub fn build_test_context() -> Result<TestContext> {
    build_test_context_with(standard_seed())
}

pub fn build_test_context_with(seed: SeedFile) -> Result<TestContext> {
    oxpager_common::id::init(1, 1);

    let temp_dir = tempfile::tempdir()?;
    let config = ServerConfig {
        data_dir: temp_dir.path().to_string_lossy().to_string(),
        ..Default::default()
    };
    let store = Arc::new(PagerStore::open(&config.database_path())?);
    apply_seed(&store, &seed, at(0, 0))?;

    let directory = oxpager_server::state::load_directory(&config, &store)?;
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let state = AppState::new(store, dispatcher.clone(), Arc::new(directory), config);
    let app = app::build_http_app(state.clone());

    Ok(TestContext {
        temp_dir,
        state,
        dispatcher,
        app,
    })
}

pub async fn request_json(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value, Option<String>) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");
    let req = match body {
        Some(body) => builder.body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request should build");

    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should be handled");

    let status = resp.status();
    let trace_id = resp
        .headers()
        .get("x-trace-id")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice::<Value>(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
    };

    (status, json, trace_id)
}
