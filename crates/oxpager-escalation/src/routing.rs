use chrono::{DateTime, Duration, Utc};
use oxpager_common::types::{
    AlertAssignment, AlertRecord, AlertStatus, AssignmentReason, BusinessHours, EscalationConfig,
    EscalationPhase, EscalationState, Severity, SeverityRouting,
};
use oxpager_storage::StoreView;
use serde::Serialize;

use crate::assignment::{assign, Handoff};
use crate::business_hours::{is_business_hours, is_weekend};
use crate::directory::SYSTEM_USER;
use crate::error::Result;
use crate::oncall::{resolve_responder, Responder};
use crate::DispatchRequest;

/// The routing row that applies: enabled, matching severity, lowest
/// priority value, ties broken by id.
pub fn resolve_routing(rows: &[SeverityRouting], severity: Severity) -> Option<&SeverityRouting> {
    rows.iter()
        .filter(|r| r.enabled && r.severity == severity)
        .min_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)))
}

/// Time the state must sit at `current_level` before moving on. Level -1 is
/// the initial delay before the first assignment.
pub fn step_delay(policy: &SeverityRouting, current_level: i32) -> Duration {
    if current_level < 0 {
        Duration::minutes(i64::from(policy.initial_delay_minutes))
    } else {
        Duration::minutes(i64::from(policy.escalation_interval_minutes))
    }
}

/// Whether an alert sitting at `current_level` since `last_change` should
/// move to the next level at `now`.
///
/// False once the alert is acknowledged or resolved, at the policy's max
/// level, before the level's delay has elapsed, or (for business-hours-only
/// policies) outside business hours. Weekend escalation, when enabled,
/// allows any time on Saturday and Sunday.
pub fn should_escalate(
    alert: &AlertRecord,
    current_level: i32,
    policy: &SeverityRouting,
    hours: Option<&BusinessHours>,
    last_change: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<bool> {
    if alert.status != AlertStatus::Active {
        return Ok(false);
    }
    if current_level >= 0 && current_level as u32 >= policy.max_escalation_level {
        return Ok(false);
    }
    if now - last_change < step_delay(policy, current_level) {
        return Ok(false);
    }
    if policy.business_hours_only {
        if let Some(hours) = hours {
            let weekend_ok = policy.weekend_escalation && is_weekend(hours, now)?;
            if !weekend_ok && !is_business_hours(hours, now)? {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

/// Channels for a handoff at `level`: the policy's channels, then the team's
/// immediate (level 0) or escalation (level 1+) preferences for the severity.
/// Duplicates are dropped, first occurrence kept.
pub fn dispatch_channels(
    policy: Option<&SeverityRouting>,
    config: Option<&EscalationConfig>,
    severity: Severity,
    level: u32,
) -> Vec<String> {
    let mut channels: Vec<String> = policy
        .map(|p| p.assigned_channels.clone())
        .unwrap_or_default();
    if let Some(pref) = config.and_then(|c| c.notification_preferences.get(&severity)) {
        let extra = if level == 0 {
            &pref.immediate
        } else {
            &pref.escalation
        };
        channels.extend(extra.iter().cloned());
    }
    let mut seen = std::collections::HashSet::new();
    channels.retain(|c| seen.insert(c.clone()));
    channels
}

/// How long an unacknowledged alert stays open before it is auto-resolved.
/// `None` unless the team enables auto-resolution for the severity; the
/// policy's timeout wins over the team's.
pub fn auto_resolve_after(
    policy: &SeverityRouting,
    config: Option<&EscalationConfig>,
    severity: Severity,
) -> Option<Duration> {
    let auto = config?.auto_resolution.get(&severity)?;
    if !auto.enabled {
        return None;
    }
    let minutes = policy.auto_resolve_minutes.unwrap_or(auto.timeout_minutes);
    Some(Duration::minutes(i64::from(minutes)))
}

/// The earliest auto-acknowledge or auto-resolve deadline still ahead of
/// `now`, if the policy and team config set any.
pub fn next_auto_deadline(
    alert: &AlertRecord,
    policy: &SeverityRouting,
    config: Option<&EscalationConfig>,
    severity: Severity,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let auto_ack = policy
        .auto_acknowledge_minutes
        .map(|m| Duration::minutes(i64::from(m)));
    let auto_resolve = auto_resolve_after(policy, config, severity);
    [auto_ack, auto_resolve]
        .into_iter()
        .flatten()
        .map(|after| alert.created_at + after)
        .filter(|deadline| *deadline > now)
        .min()
}

/// When the sweep should next look at an alert: `candidate`, pulled earlier
/// if an auto-acknowledge or auto-resolve deadline falls before it.
pub fn next_check_at(
    candidate: DateTime<Utc>,
    alert: &AlertRecord,
    policy: &SeverityRouting,
    config: Option<&EscalationConfig>,
    severity: Severity,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    match next_auto_deadline(alert, policy, config, severity, now) {
        Some(deadline) => candidate.min(deadline),
        None => candidate,
    }
}

/// Outcome of routing a newly allowed alert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutedAlert {
    /// Severity after the team's per-metric overrides
    pub severity: Severity,
    pub routing_id: Option<String>,
    pub responder: Responder,
    /// `None` while the policy's initial delay is pending
    pub assignment: Option<AlertAssignment>,
    pub escalation: Option<EscalationState>,
    pub dispatch: Option<DispatchRequest>,
}

/// Routes an allowed alert: applies severity overrides, picks the routing
/// policy, resolves the responder and starts the escalation timer.
///
/// With no initial delay the level 0 assignment is made immediately;
/// otherwise the timer starts at level -1 and the sweep assigns once the
/// delay has passed. Alerts without a routing policy are assigned once and
/// never escalate.
pub fn route_alert(
    view: &StoreView<'_>,
    alert: &AlertRecord,
    now: DateTime<Utc>,
) -> Result<RoutedAlert> {
    let config = view.get_escalation_config(&alert.team_id)?;
    let severity = config
        .as_ref()
        .map(|c| c.effective_severity(&alert.metric_name, alert.severity))
        .unwrap_or(alert.severity);
    let rows = view.severity_routing_for(&alert.team_id, severity)?;
    let policy = resolve_routing(&rows, severity);
    let responder = resolve_responder(view, &alert.team_id, severity, policy, config.as_ref(), now)?;

    let delayed = policy.is_some_and(|p| p.initial_delay_minutes > 0);
    let (assignment, dispatch) = if delayed {
        (None, None)
    } else {
        let assignment = assign(
            view,
            alert,
            severity,
            Handoff {
                assignee: &responder.user_id,
                assigned_by: SYSTEM_USER,
                reason: AssignmentReason::AutoSeverity,
                level: 0,
            },
            now,
        )?;
        let dispatch = DispatchRequest {
            alert_id: alert.id.clone(),
            assignee: responder.user_id.clone(),
            channels: dispatch_channels(policy, config.as_ref(), severity, 0),
            expected_response_minutes: assignment.expected_response_minutes,
            level: 0,
        };
        (Some(assignment), Some(dispatch))
    };

    let escalation = match policy {
        Some(policy) => {
            let level = if delayed { -1 } else { 0 };
            let state = EscalationState {
                alert_id: alert.id.clone(),
                team_id: alert.team_id.clone(),
                severity,
                routing_id: Some(policy.id.clone()),
                current_level: level,
                next_escalation_at: next_check_at(
                    now + step_delay(policy, level),
                    alert,
                    policy,
                    config.as_ref(),
                    severity,
                    now,
                ),
                phase: EscalationPhase::Active,
                created_at: now,
                updated_at: now,
            };
            view.insert_escalation_state(&state)?;
            Some(state)
        }
        None => {
            tracing::debug!(
                alert_id = %alert.id,
                severity = %severity,
                "No routing policy, alert will not escalate"
            );
            None
        }
    };

    Ok(RoutedAlert {
        severity,
        routing_id: policy.map(|p| p.id.clone()),
        responder,
        assignment,
        escalation,
        dispatch,
    })
}
