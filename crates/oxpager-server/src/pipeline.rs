//! Ingestion of one alert: suppression, grouping, routing, then audit and
//! dispatch once the decision is committed.

use chrono::{DateTime, Utc};
use oxpager_alert::error::{GroupingError, SuppressionError};
use oxpager_alert::rate_limit::record_hits;
use oxpager_common::types::{AlertGroup, AlertRecord, SuppressionDecision, SuppressionLogEntry};
use oxpager_escalation::assignment::{self, Acknowledgment};
use oxpager_escalation::dispatch::dispatch_all;
use oxpager_escalation::error::EscalationError;
use oxpager_escalation::routing::{route_alert, RoutedAlert};
use oxpager_storage::{StorageError, TransientError};
use serde::Serialize;
use tokio::task::JoinError;

use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Pipeline: alert '{0}' was already ingested")]
    AlreadyIngested(String),

    #[error(transparent)]
    Suppression(#[from] SuppressionError),

    #[error(transparent)]
    Grouping(#[from] GroupingError),

    #[error(transparent)]
    Escalation(#[from] EscalationError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Pipeline: blocking task failed: {0}")]
    Task(#[from] JoinError),
}

impl TransientError for PipelineError {
    fn is_transient(&self) -> bool {
        match self {
            PipelineError::AlreadyIngested(_) => false,
            PipelineError::Suppression(e) => e.is_transient(),
            PipelineError::Grouping(e) => e.is_transient(),
            PipelineError::Escalation(e) => e.is_transient(),
            PipelineError::Storage(e) => e.is_transient(),
            PipelineError::Task(_) => false,
        }
    }
}

/// Everything that happened to an ingested alert.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub alert_id: String,
    pub decision: SuppressionDecision,
    pub group: AlertGroup,
    /// Rate-limit windows the allowed alert counted against
    pub rate_limit_hits: usize,
    /// `None` for suppressed alerts and routing gaps
    pub routing: Option<RoutedAlert>,
    /// Set when nobody could be found to take the alert
    pub routing_gap: Option<String>,
}

/// Runs blocking store work on tokio's blocking pool so request handlers
/// and schedulers never hold a runtime worker while SQLite waits on a lock.
pub async fn run_blocking<F, T, E>(state: &AppState, f: F) -> Result<T, PipelineError>
where
    F: FnOnce(&AppState) -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<PipelineError> + Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state))
        .await?
        .map_err(Into::into)
}

/// Decides, groups and routes `alert` in one unit of work, then writes the
/// audit entry and hands any dispatch to the dispatcher.
///
/// A routing gap does not undo the decision: the alert stays recorded and
/// grouped, and the gap is reported in the outcome.
pub async fn ingest(
    state: &AppState,
    alert: &AlertRecord,
    now: DateTime<Utc>,
) -> Result<IngestOutcome, PipelineError> {
    let record = alert.clone();
    let outcome = run_blocking(state, move |state| {
        let outcome = decide(state, &record, now)?;
        write_audit(state, &record, &outcome.decision, now);
        Ok::<_, PipelineError>(outcome)
    })
    .await?;

    if let Some(gap) = &outcome.routing_gap {
        tracing::error!(alert_id = %alert.id, team_id = %alert.team_id, error = %gap, "Alert has no responder");
    }
    if let Some(request) = outcome.routing.as_ref().and_then(|r| r.dispatch.as_ref()) {
        let failed = dispatch_all(state.dispatcher.as_ref(), std::slice::from_ref(request)).await;
        state.counters.add_dispatch_failures(failed);
    }

    tracing::info!(
        alert_id = %alert.id,
        team_id = %alert.team_id,
        suppressed = outcome.decision.suppressed,
        reason = %outcome.decision.reason,
        group_id = %outcome.group.id,
        "Alert ingested"
    );
    Ok(outcome)
}

fn decide(
    state: &AppState,
    alert: &AlertRecord,
    now: DateTime<Utc>,
) -> Result<IngestOutcome, PipelineError> {
    state.store.unit_of_work(|view| {
        if view.get_alert(&alert.id)?.is_some() {
            return Err(PipelineError::AlreadyIngested(alert.id.clone()));
        }
        let decision = state.engine.evaluate(view, alert, now)?;
        view.insert_alert(alert)?;

        let rate_limit_hits = if decision.suppressed {
            0
        } else {
            record_hits(view, alert, now)?
        };
        let group = state.grouper.attach(
            view,
            alert,
            decision.suppressed,
            decision.metadata.suppress_all,
            now,
        )?;

        let (routing, routing_gap) = if decision.suppressed {
            (None, None)
        } else {
            match route_alert(view, alert, now) {
                Ok(routed) => (Some(routed), None),
                Err(e @ EscalationError::RoutingGap { .. }) => (None, Some(e.to_string())),
                Err(e) => return Err(e.into()),
            }
        };

        Ok(IngestOutcome {
            alert_id: alert.id.clone(),
            decision,
            group,
            rate_limit_hits,
            routing,
            routing_gap,
        })
    })
}

/// Log-after, best effort: a failed write is logged and counted but never
/// fails the ingestion.
fn write_audit(state: &AppState, alert: &AlertRecord, decision: &SuppressionDecision, now: DateTime<Utc>) {
    let entry = SuppressionLogEntry::from_decision(alert, decision, now);
    if let Err(e) = state.store.read(|view| view.insert_suppression_log(&entry)) {
        state.counters.add_audit_failure();
        tracing::error!(
            alert_id = %alert.id,
            error = %e,
            "Failed to write suppression log"
        );
    }
}

/// Acknowledges an alert on behalf of `user_id`, checked against the team
/// directory.
pub async fn acknowledge(
    state: &AppState,
    alert_id: &str,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<Acknowledgment, PipelineError> {
    let alert_id = alert_id.to_string();
    let user_id = user_id.to_string();
    run_blocking(state, move |state| {
        state.store.unit_of_work(|view| {
            assignment::acknowledge(view, state.directory.as_ref(), &alert_id, &user_id, now)
        })
    })
    .await
}
