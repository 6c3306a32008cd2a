use crate::logging::TraceId;
use crate::pipeline::{self, run_blocking, PipelineError};
use crate::state::AppState;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use oxpager_alert::error::{GroupingError, SuppressionError};
use oxpager_common::types::{
    AlertAssignment, AlertGroup, AlertRecord, GroupMember, Severity, SuppressionLogEntry,
};
use oxpager_escalation::assignment::current_responder;
use oxpager_escalation::error::EscalationError;
use oxpager_escalation::oncall::{current_on_call, OnCallResolution};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Response envelope shared by every endpoint.
#[derive(Serialize)]
pub struct ApiResponse<T>
where
    T: Serialize,
{
    /// 0 on success
    pub err_code: i32,
    pub err_msg: String,
    pub trace_id: String,
    pub data: Option<T>,
}

pub fn success_response<T>(status: StatusCode, trace_id: &str, data: T) -> Response
where
    T: Serialize,
{
    (
        status,
        Json(ApiResponse {
            err_code: 0,
            err_msg: "success".to_string(),
            trace_id: trace_id.to_string(),
            data: Some(data),
        }),
    )
        .into_response()
}

fn to_custom_error_code(code: &str) -> i32 {
    match code {
        "bad_request" => 1001,
        "forbidden" => 1003,
        "not_found" => 1004,
        "conflict" => 1005,
        "unknown_rule" => 1201,
        "routing_gap" => 1202,
        "invalid_config" => 1203,
        "storage_error" => 1501,
        "internal_error" => 1500,
        _ => 1999,
    }
}

pub fn error_response(status: StatusCode, trace_id: &str, code: &str, msg: &str) -> Response {
    (
        status,
        Json(ApiResponse::<Value> {
            err_code: to_custom_error_code(code),
            err_msg: msg.to_string(),
            trace_id: trace_id.to_string(),
            data: None,
        }),
    )
        .into_response()
}

fn storage_failure(trace_id: &str, what: &str, e: &dyn std::fmt::Display) -> Response {
    tracing::error!(trace_id, error = %e, "{what}");
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        trace_id,
        "storage_error",
        "Database error",
    )
}

fn escalation_error_response(trace_id: &str, e: &EscalationError) -> Response {
    match e {
        EscalationError::AlertNotFound(_) => {
            error_response(StatusCode::NOT_FOUND, trace_id, "not_found", &e.to_string())
        }
        EscalationError::NotTeamMember { .. } => {
            error_response(StatusCode::FORBIDDEN, trace_id, "forbidden", &e.to_string())
        }
        EscalationError::AlertClosed(_) => {
            error_response(StatusCode::CONFLICT, trace_id, "conflict", &e.to_string())
        }
        EscalationError::RoutingGap { .. } => {
            error_response(StatusCode::CONFLICT, trace_id, "routing_gap", &e.to_string())
        }
        EscalationError::InvalidTimezone(_) => error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            trace_id,
            "invalid_config",
            &e.to_string(),
        ),
        EscalationError::Storage(_) => storage_failure(trace_id, "Escalation storage error", e),
    }
}

// ---- Health ----

#[derive(Serialize)]
struct HealthResponse {
    version: String,
    uptime_secs: i64,
    storage_status: String,
    audit_write_failures: u64,
    dispatch_failures: u64,
}

async fn health(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let reachable = run_blocking(&state, |state| state.store.read(|view| view.get_alert(""))).await;
    let storage_status = match reachable {
        Ok(_) => "ok",
        Err(e) => {
            tracing::warn!(error = %e, "Health check could not reach the store");
            "unavailable"
        }
    };
    success_response(
        StatusCode::OK,
        &trace_id,
        HealthResponse {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: (Utc::now() - state.start_time).num_seconds(),
            storage_status: storage_status.to_string(),
            audit_write_failures: state.counters.audit_failures(),
            dispatch_failures: state.counters.dispatch_failure_count(),
        },
    )
}

// ---- Alerts ----

/// An alert raised by the detection pipeline.
#[derive(Debug, Deserialize)]
pub struct IngestAlertRequest {
    /// Generated when omitted
    #[serde(default)]
    pub id: Option<String>,
    pub rule_id: String,
    pub metric_name: String,
    pub severity: Severity,
    pub team_id: String,
    /// Defaults to the time of ingestion
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl IngestAlertRequest {
    fn into_record(self, now: DateTime<Utc>) -> AlertRecord {
        let mut record = AlertRecord::new(
            self.id.unwrap_or_else(oxpager_common::id::next_id),
            self.rule_id,
            self.metric_name,
            self.severity,
            self.team_id,
            self.created_at.unwrap_or(now),
        );
        record.labels = self.labels;
        record
    }
}

async fn ingest_alert(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Json(req): Json<IngestAlertRequest>,
) -> impl IntoResponse {
    if req.rule_id.trim().is_empty() || req.team_id.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            "rule_id and team_id are required",
        );
    }
    let now = Utc::now();
    let alert = req.into_record(now);

    match pipeline::ingest(&state, &alert, now).await {
        Ok(outcome) => success_response(StatusCode::CREATED, &trace_id, outcome),
        Err(PipelineError::AlreadyIngested(id)) => error_response(
            StatusCode::CONFLICT,
            &trace_id,
            "conflict",
            &format!("Alert '{id}' was already ingested"),
        ),
        Err(PipelineError::Suppression(SuppressionError::RuleNotFound(rule_id))) => error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            &trace_id,
            "unknown_rule",
            &format!("Alert rule '{rule_id}' does not exist"),
        ),
        Err(PipelineError::Suppression(SuppressionError::MalformedCondition { rule_id, source }))
        | Err(PipelineError::Grouping(GroupingError::MalformedCondition { rule_id, source })) => {
            tracing::warn!(rule_id = %rule_id, error = %source, "Rule condition is malformed");
            error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                &trace_id,
                "invalid_config",
                &format!("Rule '{rule_id}' has a malformed condition: {source}"),
            )
        }
        Err(PipelineError::Escalation(e)) => escalation_error_response(&trace_id, &e),
        Err(e) => storage_failure(&trace_id, "Alert ingestion failed", &e),
    }
}

#[derive(Debug, Deserialize)]
pub struct AcknowledgeRequest {
    pub user_id: String,
}

async fn acknowledge_alert(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(alert_id): Path<String>,
    Json(req): Json<AcknowledgeRequest>,
) -> impl IntoResponse {
    match pipeline::acknowledge(&state, &alert_id, &req.user_id, Utc::now()).await {
        Ok(ack) => success_response(StatusCode::OK, &trace_id, ack),
        Err(PipelineError::Escalation(e)) => escalation_error_response(&trace_id, &e),
        Err(e) => storage_failure(&trace_id, "Acknowledgment failed", &e),
    }
}

#[derive(Serialize)]
struct AssignmentsResponse {
    assignments: Vec<AlertAssignment>,
    current_responder: Option<AlertAssignment>,
}

async fn list_assignments(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(alert_id): Path<String>,
) -> impl IntoResponse {
    let id = alert_id.clone();
    let result = run_blocking(&state, move |state| {
        state.store.read(|view| {
            let alert = view.get_alert(&id)?;
            let assignments = view.assignments_for_alert(&id)?;
            Ok((alert, assignments))
        })
    })
    .await;
    match result {
        Ok((None, _)) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            &format!("Alert '{alert_id}' not found"),
        ),
        Ok((Some(_), assignments)) => {
            let current = current_responder(&assignments).cloned();
            success_response(
                StatusCode::OK,
                &trace_id,
                AssignmentsResponse {
                    assignments,
                    current_responder: current,
                },
            )
        }
        Err(e) => storage_failure(&trace_id, "Failed to load assignments", &e),
    }
}

async fn list_suppression_logs(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(alert_id): Path<String>,
) -> impl IntoResponse {
    let logs = run_blocking(&state, move |state| {
        state
            .store
            .read(|view| view.suppression_logs_for_alert(&alert_id))
    })
    .await;
    match logs {
        Ok(logs) => success_response::<Vec<SuppressionLogEntry>>(StatusCode::OK, &trace_id, logs),
        Err(e) => storage_failure(&trace_id, "Failed to load suppression logs", &e),
    }
}

// ---- Groups ----

#[derive(Serialize)]
struct GroupResponse {
    #[serde(flatten)]
    group: AlertGroup,
    span_minutes: i64,
    highest_severity: Option<Severity>,
    members: Vec<GroupMember>,
}

async fn get_group(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(group_id): Path<String>,
) -> impl IntoResponse {
    let id = group_id.clone();
    let result = run_blocking(&state, move |state| {
        state.store.read(|view| {
            let Some(group) = view.get_group(&id)? else {
                return Ok(None);
            };
            let members = view.group_members(&id)?;
            Ok(Some((group, members)))
        })
    })
    .await;
    match result {
        Ok(Some((group, members))) => success_response(
            StatusCode::OK,
            &trace_id,
            GroupResponse {
                span_minutes: group.span().num_minutes(),
                highest_severity: group.highest_severity(),
                group,
                members,
            },
        ),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            &format!("Group '{group_id}' not found"),
        ),
        Err(e) => storage_failure(&trace_id, "Failed to load group", &e),
    }
}

// ---- On-call ----

#[derive(Debug, Deserialize)]
struct OnCallParams {
    #[serde(default)]
    severity: Option<Severity>,
}

#[derive(Serialize)]
struct OnCallResponse {
    team_id: String,
    severity: Severity,
    on_call: Option<OnCallResolution>,
}

async fn team_on_call(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(team_id): Path<String>,
    Query(params): Query<OnCallParams>,
) -> impl IntoResponse {
    let severity = params.severity.unwrap_or(Severity::High);
    let team = team_id.clone();
    let result = run_blocking(&state, move |state| -> Result<_, EscalationError> {
        state
            .store
            .read(|view| Ok(current_on_call(view, &team, severity, Utc::now())))?
    })
    .await;
    match result {
        Ok(on_call) => success_response(
            StatusCode::OK,
            &trace_id,
            OnCallResponse {
                team_id,
                severity,
                on_call,
            },
        ),
        Err(PipelineError::Escalation(e)) => escalation_error_response(&trace_id, &e),
        Err(e) => storage_failure(&trace_id, "Failed to resolve on-call", &e),
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/alerts", post(ingest_alert))
        .route("/v1/alerts/{id}/acknowledge", post(acknowledge_alert))
        .route("/v1/alerts/{id}/assignments", get(list_assignments))
        .route("/v1/alerts/{id}/suppression-logs", get(list_suppression_logs))
        .route("/v1/groups/{id}", get(get_group))
        .route("/v1/teams/{team_id}/on-call", get(team_on_call))
}
