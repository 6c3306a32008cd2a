//! Periodic walk over due escalation timers.
//!
//! Every due state is handled in its own unit of work. Level changes are
//! compare-and-swap updates on the state's current level, so a state moves
//! at most one level per sweep even if two sweeps overlap.

use chrono::{DateTime, Utc};
use oxpager_common::types::{
    AlertRecord, AlertStatus, AssignmentReason, EscalationConfig, EscalationPhase,
    EscalationState, Resolution, SeverityRouting,
};
use oxpager_storage::{PagerStore, StoreView};
use serde::Serialize;
use std::sync::Arc;

use crate::assignment::{assign, record_acknowledgment, Handoff};
use crate::directory::SYSTEM_USER;
use crate::error::Result;
use crate::oncall::{current_on_call, escalation_targets, resolve_responder};
use crate::routing::{
    auto_resolve_after, dispatch_channels, next_auto_deadline, next_check_at, should_escalate,
    step_delay,
};
use crate::DispatchRequest;

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepReport {
    pub initial_assignments: usize,
    pub escalated: usize,
    pub auto_resolved: usize,
    pub auto_acknowledged: usize,
    pub exhausted: usize,
    pub deferred: usize,
    pub failed: usize,
    /// Handoffs to deliver once the sweep has committed
    pub dispatches: Vec<DispatchRequest>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.initial_assignments == 0
            && self.escalated == 0
            && self.auto_resolved == 0
            && self.auto_acknowledged == 0
            && self.exhausted == 0
            && self.failed == 0
    }

    fn record(&mut self, step: Step) {
        match step {
            Step::Assigned(request) => {
                self.initial_assignments += 1;
                self.dispatches.push(request);
            }
            Step::Escalated(request) => {
                self.escalated += 1;
                self.dispatches.push(request);
            }
            Step::AutoResolved => self.auto_resolved += 1,
            Step::AutoAcknowledged => self.auto_acknowledged += 1,
            Step::Exhausted => self.exhausted += 1,
            Step::Deferred => self.deferred += 1,
            Step::Skipped => {}
        }
    }
}

#[derive(Debug)]
enum Step {
    Assigned(DispatchRequest),
    Escalated(DispatchRequest),
    AutoResolved,
    AutoAcknowledged,
    Exhausted,
    Deferred,
    /// The state finished or moved since it was listed
    Skipped,
}

pub struct EscalationSweep {
    store: Arc<PagerStore>,
}

impl EscalationSweep {
    pub fn new(store: Arc<PagerStore>) -> Self {
        Self { store }
    }

    /// Processes every state due at `now`. A failure on one alert is logged
    /// and counted; the rest of the sweep carries on.
    pub fn run_once(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let due = self.store.read(|view| view.due_escalations(now))?;
        let mut report = SweepReport::default();

        for state in &due {
            match self
                .store
                .unit_of_work(|view| step(view, &state.alert_id, now))
            {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(
                        alert_id = %state.alert_id,
                        level = state.current_level,
                        error = %e,
                        "Escalation step failed"
                    );
                }
            }
        }

        if !report.is_empty() {
            tracing::info!(
                due = due.len(),
                initial_assignments = report.initial_assignments,
                escalated = report.escalated,
                auto_resolved = report.auto_resolved,
                auto_acknowledged = report.auto_acknowledged,
                exhausted = report.exhausted,
                failed = report.failed,
                "Escalation sweep finished"
            );
        }
        Ok(report)
    }
}

fn step(view: &StoreView<'_>, alert_id: &str, now: DateTime<Utc>) -> Result<Step> {
    let Some(state) = view.get_escalation_state(alert_id)? else {
        return Ok(Step::Skipped);
    };
    if state.phase != EscalationPhase::Active || state.next_escalation_at > now {
        return Ok(Step::Skipped);
    }

    let Some(alert) = view.get_alert(alert_id)? else {
        tracing::warn!(alert_id, "Escalating alert no longer exists");
        view.set_escalation_phase(alert_id, EscalationPhase::Exhausted, now)?;
        return Ok(Step::Exhausted);
    };
    match alert.status {
        AlertStatus::Active => {}
        AlertStatus::Acknowledged => {
            view.set_escalation_phase(alert_id, EscalationPhase::Acknowledged, now)?;
            return Ok(Step::Skipped);
        }
        AlertStatus::Resolved => {
            view.set_escalation_phase(alert_id, EscalationPhase::Resolved, now)?;
            return Ok(Step::Skipped);
        }
    }

    let policy = match state.routing_id.as_deref() {
        Some(id) => view.get_severity_routing(id)?,
        None => None,
    };
    let Some(policy) = policy else {
        tracing::warn!(alert_id, routing_id = ?state.routing_id, "Routing policy is gone");
        view.set_escalation_phase(alert_id, EscalationPhase::Exhausted, now)?;
        return Ok(Step::Exhausted);
    };
    let config = view.get_escalation_config(&state.team_id)?;
    let ctx = StepContext {
        state: &state,
        alert: &alert,
        policy: &policy,
        config: config.as_ref(),
        now,
    };

    if let Some(after) = auto_resolve_after(&policy, config.as_ref(), state.severity) {
        if now - alert.created_at >= after {
            view.resolve_alert(alert_id, now, Resolution::Auto)?;
            view.set_escalation_phase(alert_id, EscalationPhase::Resolved, now)?;
            tracing::info!(alert_id, "Alert auto-resolved");
            return Ok(Step::AutoResolved);
        }
    }

    if state.current_level >= 0 {
        if let Some(minutes) = policy.auto_acknowledge_minutes {
            if now - alert.created_at >= chrono::Duration::minutes(i64::from(minutes)) {
                record_acknowledgment(view, alert_id, SYSTEM_USER, now)?;
                return Ok(Step::AutoAcknowledged);
            }
        }
    }

    if state.current_level < 0 {
        return initial_assignment(view, &ctx);
    }

    let hours = config.as_ref().map(|c| &c.business_hours);
    if should_escalate(
        &alert,
        state.current_level,
        &policy,
        hours,
        state.updated_at,
        now,
    )? {
        return escalate(view, &ctx);
    }

    if state.current_level as u32 >= policy.max_escalation_level {
        tracing::info!(alert_id, level = state.current_level, "Escalation reached max level");
        return stop_escalating(view, &ctx);
    }

    // Interval not up yet, or outside business hours: look again later.
    let earliest = state.updated_at + step_delay(&policy, state.current_level);
    let candidate = if earliest > now {
        earliest
    } else {
        now + step_delay(&policy, state.current_level)
    };
    let next = ctx.next_check(candidate);
    view.defer_escalation(alert_id, state.current_level, next)?;
    tracing::debug!(alert_id, level = state.current_level, next = %next, "Escalation deferred");
    Ok(Step::Deferred)
}

struct StepContext<'a> {
    state: &'a EscalationState,
    alert: &'a AlertRecord,
    policy: &'a SeverityRouting,
    config: Option<&'a EscalationConfig>,
    now: DateTime<Utc>,
}

impl StepContext<'_> {
    fn next_check(&self, candidate: DateTime<Utc>) -> DateTime<Utc> {
        next_check_at(
            candidate,
            self.alert,
            self.policy,
            self.config,
            self.state.severity,
            self.now,
        )
    }

    fn auto_deadline(&self) -> Option<DateTime<Utc>> {
        next_auto_deadline(
            self.alert,
            self.policy,
            self.config,
            self.state.severity,
            self.now,
        )
    }

    fn request(&self, assignee: &str, level: u32, expected_response_minutes: u32) -> DispatchRequest {
        DispatchRequest {
            alert_id: self.alert.id.clone(),
            assignee: assignee.to_string(),
            channels: dispatch_channels(Some(self.policy), self.config, self.state.severity, level),
            expected_response_minutes,
            level,
        }
    }
}

/// No level is left to escalate to. The state finishes as exhausted unless
/// an auto-acknowledge or auto-resolve deadline is still ahead; then it stays
/// active at its level and the sweep comes back at that deadline.
fn stop_escalating(view: &StoreView<'_>, ctx: &StepContext<'_>) -> Result<Step> {
    let state = ctx.state;
    match ctx.auto_deadline() {
        Some(deadline) => {
            view.defer_escalation(&state.alert_id, state.current_level, deadline)?;
            tracing::info!(
                alert_id = %state.alert_id,
                level = state.current_level,
                next = %deadline,
                "Escalation exhausted, waiting for auto deadline"
            );
        }
        None => {
            view.set_escalation_phase(&state.alert_id, EscalationPhase::Exhausted, ctx.now)?;
        }
    }
    Ok(Step::Exhausted)
}

/// The initial delay has passed: hand the alert to its first responder.
fn initial_assignment(view: &StoreView<'_>, ctx: &StepContext<'_>) -> Result<Step> {
    let state = ctx.state;
    let responder = resolve_responder(
        view,
        &state.team_id,
        state.severity,
        Some(ctx.policy),
        ctx.config,
        ctx.now,
    )?;
    let next = ctx.next_check(ctx.now + step_delay(ctx.policy, 0));
    if !view.advance_escalation(&state.alert_id, -1, 0, next, ctx.now)? {
        return Ok(Step::Skipped);
    }
    let assignment = assign(
        view,
        ctx.alert,
        state.severity,
        Handoff {
            assignee: &responder.user_id,
            assigned_by: SYSTEM_USER,
            reason: AssignmentReason::AutoSeverity,
            level: 0,
        },
        ctx.now,
    )?;
    Ok(Step::Assigned(ctx.request(
        &responder.user_id,
        0,
        assignment.expected_response_minutes,
    )))
}

/// Moves the alert one level up to the next escalation target.
fn escalate(view: &StoreView<'_>, ctx: &StepContext<'_>) -> Result<Step> {
    let state = ctx.state;
    let from_level = state.current_level;
    let to_level = from_level + 1;

    let assignments = view.assignments_for_alert(&state.alert_id)?;
    let level0 = assignments
        .iter()
        .find(|a| a.level == 0)
        .map(|a| a.assigned_to.as_str())
        .unwrap_or_default();
    let on_call = current_on_call(view, &state.team_id, state.severity, ctx.now)?;
    let targets = escalation_targets(level0, on_call.as_ref(), ctx.config);

    // Level L goes to target L-1.
    let Some(target) = targets.get(from_level as usize) else {
        tracing::warn!(
            alert_id = %state.alert_id,
            level = to_level,
            "No escalation target left"
        );
        return stop_escalating(view, ctx);
    };

    let next = ctx.next_check(ctx.now + step_delay(ctx.policy, to_level));
    if !view.advance_escalation(&state.alert_id, from_level, to_level, next, ctx.now)? {
        return Ok(Step::Skipped);
    }
    let assignment = assign(
        view,
        ctx.alert,
        state.severity,
        Handoff {
            assignee: target,
            assigned_by: SYSTEM_USER,
            reason: AssignmentReason::Escalation,
            level: to_level as u32,
        },
        ctx.now,
    )?;
    Ok(Step::Escalated(ctx.request(
        target,
        to_level as u32,
        assignment.expected_response_minutes,
    )))
}
