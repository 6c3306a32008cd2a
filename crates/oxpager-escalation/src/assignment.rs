use chrono::{DateTime, Utc};
use oxpager_common::types::{
    AlertAssignment, AlertRecord, AlertStatus, AssignmentReason, EscalationPhase, Severity,
    TeamRole,
};
use oxpager_storage::StoreView;
use serde::Serialize;

use crate::directory::{TeamDirectory, SYSTEM_USER};
use crate::error::{EscalationError, Result};

/// Who takes over an alert, on whose behalf, and why.
#[derive(Debug, Clone, Copy)]
pub struct Handoff<'a> {
    pub assignee: &'a str,
    pub assigned_by: &'a str,
    pub reason: AssignmentReason,
    pub level: u32,
}

/// Records the handoff of `alert` to a new responder.
///
/// The expected response time comes from `severity` (the routed severity,
/// which may differ from the alert's own after overrides).
pub fn assign(
    view: &StoreView<'_>,
    alert: &AlertRecord,
    severity: Severity,
    handoff: Handoff<'_>,
    now: DateTime<Utc>,
) -> Result<AlertAssignment> {
    let assignment = AlertAssignment {
        id: oxpager_common::id::next_id(),
        alert_id: alert.id.clone(),
        assigned_to: handoff.assignee.to_string(),
        assigned_by: handoff.assigned_by.to_string(),
        reason: handoff.reason,
        level: handoff.level,
        expected_response_minutes: severity.expected_response_minutes(),
        assigned_at: now,
        acknowledged_at: None,
        response_time_minutes: None,
    };
    view.insert_assignment(&assignment)?;
    tracing::info!(
        alert_id = %alert.id,
        assignee = handoff.assignee,
        level = handoff.level,
        reason = %handoff.reason,
        expected_response_minutes = assignment.expected_response_minutes,
        "Alert assigned"
    );
    Ok(assignment)
}

/// Result of an acknowledgment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Acknowledgment {
    pub alert_id: String,
    pub acknowledged_by: String,
    /// False when the alert was already acknowledged or resolved
    pub alert_updated: bool,
    /// The assignment that was stamped, if one was still open
    pub assignment: Option<AlertAssignment>,
}

/// Acknowledges an alert on behalf of `user_id`.
///
/// The user must be a team member with role `member` or above; the
/// [`SYSTEM_USER`] is exempt. The latest open assignment is stamped with the
/// acknowledgment and its response time, and escalation stops.
pub fn acknowledge(
    view: &StoreView<'_>,
    directory: &dyn TeamDirectory,
    alert_id: &str,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<Acknowledgment> {
    let alert = view
        .get_alert(alert_id)?
        .ok_or_else(|| EscalationError::AlertNotFound(alert_id.to_string()))?;

    if user_id != SYSTEM_USER && !directory.has_role(&alert.team_id, user_id, TeamRole::Member) {
        return Err(EscalationError::NotTeamMember {
            user_id: user_id.to_string(),
            team_id: alert.team_id.clone(),
        });
    }
    record_acknowledgment(view, alert_id, user_id, now)
}

/// Acknowledges without a membership check. Used by the sweep for
/// auto-acknowledgment on behalf of [`SYSTEM_USER`].
///
/// Only an active alert is acknowledged. A resolved alert is rejected and an
/// already acknowledged one is left untouched, so response times are
/// stamped once.
pub(crate) fn record_acknowledgment(
    view: &StoreView<'_>,
    alert_id: &str,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<Acknowledgment> {
    if !view.acknowledge_alert(alert_id, now)? {
        let alert = view
            .get_alert(alert_id)?
            .ok_or_else(|| EscalationError::AlertNotFound(alert_id.to_string()))?;
        if alert.status == AlertStatus::Resolved {
            return Err(EscalationError::AlertClosed(alert_id.to_string()));
        }
        tracing::debug!(alert_id, user_id, "Alert already acknowledged");
        return Ok(Acknowledgment {
            alert_id: alert_id.to_string(),
            acknowledged_by: user_id.to_string(),
            alert_updated: false,
            assignment: None,
        });
    }

    let mut assignment = view.latest_open_assignment(alert_id)?;
    if let Some(open) = assignment.as_mut() {
        let response_time = (now - open.assigned_at).num_minutes().max(0);
        if view.acknowledge_assignment(&open.id, now, response_time)? {
            open.acknowledged_at = Some(now);
            open.response_time_minutes = Some(response_time);
        }
    }
    view.set_escalation_phase(alert_id, EscalationPhase::Acknowledged, now)?;

    tracing::info!(
        alert_id,
        user_id,
        response_time_minutes = ?assignment.as_ref().and_then(|a| a.response_time_minutes),
        "Alert acknowledged"
    );
    Ok(Acknowledgment {
        alert_id: alert_id.to_string(),
        acknowledged_by: user_id.to_string(),
        alert_updated: true,
        assignment,
    })
}

/// The assignment currently responsible for an alert: the first one that
/// was acknowledged, otherwise the most recent unacknowledged one.
pub fn current_responder(assignments: &[AlertAssignment]) -> Option<&AlertAssignment> {
    assignments
        .iter()
        .filter(|a| a.acknowledged_at.is_some())
        .min_by_key(|a| (a.acknowledged_at, a.assigned_at))
        .or_else(|| {
            assignments
                .iter()
                .filter(|a| a.acknowledged_at.is_none())
                .max_by_key(|a| (a.assigned_at, a.level))
        })
}
