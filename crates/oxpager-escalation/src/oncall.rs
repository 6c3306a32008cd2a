use chrono::{DateTime, Utc};
use oxpager_common::types::{EscalationConfig, OnCallEntry, OnCallSchedule, Severity, SeverityRouting};
use oxpager_storage::StoreView;
use serde::Serialize;

use crate::error::{EscalationError, Result};

/// Who is on call right now, and through which schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OnCallResolution {
    pub user_id: String,
    pub is_primary: bool,
    pub schedule_id: String,
    pub schedule_name: String,
    pub backup_user: Option<String>,
    pub is_override: bool,
}

/// Where a responder was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponderSource {
    OnCall,
    RoutingAssignee,
    TeamContact,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Responder {
    pub user_id: String,
    pub source: ResponderSource,
    /// The on-call resolution, when the responder came from a schedule
    pub on_call: Option<OnCallResolution>,
}

fn applies_to(schedule: &OnCallSchedule, severity: Severity, now: DateTime<Utc>) -> bool {
    schedule.is_effective_at(now)
        && (schedule.applicable_severities.is_empty()
            || schedule.applicable_severities.contains(&severity))
}

/// Picks the on-call user from schedules (oldest first) and the entries
/// covering `now` in each.
///
/// An override entry takes over its `original_user`'s coverage in the same
/// schedule for as long as both overlap. Primary entries beat backup
/// entries, then the older schedule wins, then the older entry.
pub fn pick_on_call(
    candidates: &[(OnCallSchedule, Vec<OnCallEntry>)],
    severity: Severity,
    now: DateTime<Utc>,
) -> Option<OnCallResolution> {
    let mut best: Option<(bool, usize, usize, &OnCallSchedule, &OnCallEntry)> = None;

    for (sched_idx, (schedule, entries)) in candidates.iter().enumerate() {
        if !applies_to(schedule, severity, now) {
            continue;
        }
        let covering: Vec<&OnCallEntry> = entries.iter().filter(|e| e.contains(now)).collect();
        let overridden: Vec<&str> = covering
            .iter()
            .filter(|e| e.is_override)
            .filter_map(|e| e.original_user.as_deref())
            .collect();

        for (entry_idx, entry) in covering.iter().enumerate() {
            if !entry.is_override && overridden.contains(&entry.user_id.as_str()) {
                continue;
            }
            let rank = (!entry.is_primary, sched_idx, entry_idx);
            let better = best
                .as_ref()
                .is_none_or(|(p, s, e, _, _)| rank < (*p, *s, *e));
            if better {
                best = Some((rank.0, rank.1, rank.2, schedule, entry));
            }
        }
    }

    best.map(|(_, _, _, schedule, entry)| OnCallResolution {
        user_id: entry.user_id.clone(),
        is_primary: entry.is_primary,
        schedule_id: schedule.id.clone(),
        schedule_name: schedule.name.clone(),
        backup_user: entry.backup_user.clone(),
        is_override: entry.is_override,
    })
}

/// The team's on-call user for `severity` at `now`.
pub fn current_on_call(
    view: &StoreView<'_>,
    team_id: &str,
    severity: Severity,
    now: DateTime<Utc>,
) -> Result<Option<OnCallResolution>> {
    let mut candidates = Vec::new();
    for schedule in view.schedules_for_team(team_id)? {
        if !applies_to(&schedule, severity, now) {
            continue;
        }
        let entries = view.entries_covering(&schedule.id, now)?;
        candidates.push((schedule, entries));
    }
    Ok(pick_on_call(&candidates, severity, now))
}

/// Who gets the level 0 assignment: the on-call user, else the routing
/// policy's first assignee, else the team's first primary contact.
pub fn resolve_responder(
    view: &StoreView<'_>,
    team_id: &str,
    severity: Severity,
    policy: Option<&SeverityRouting>,
    config: Option<&EscalationConfig>,
    now: DateTime<Utc>,
) -> Result<Responder> {
    if let Some(on_call) = current_on_call(view, team_id, severity, now)? {
        return Ok(Responder {
            user_id: on_call.user_id.clone(),
            source: ResponderSource::OnCall,
            on_call: Some(on_call),
        });
    }
    if let Some(user) = policy.and_then(|p| p.assigned_users.first()) {
        return Ok(Responder {
            user_id: user.clone(),
            source: ResponderSource::RoutingAssignee,
            on_call: None,
        });
    }
    if let Some(user) = config.and_then(|c| c.primary_contacts.first()) {
        tracing::info!(team_id, severity = %severity, user_id = %user, "Routing to team contact");
        return Ok(Responder {
            user_id: user.clone(),
            source: ResponderSource::TeamContact,
            on_call: None,
        });
    }
    Err(EscalationError::RoutingGap {
        team_id: team_id.to_string(),
        severity,
    })
}

/// Ordered escalation targets for levels 1, 2, ...: the on-call backup, the
/// escalation chain, then the escalation contacts. Users already listed, and
/// the level 0 assignee, are skipped.
pub fn escalation_targets(
    level0_assignee: &str,
    on_call: Option<&OnCallResolution>,
    config: Option<&EscalationConfig>,
) -> Vec<String> {
    let backup = on_call.and_then(|o| o.backup_user.clone());
    let chain = config.map(|c| c.escalation_chain.as_slice()).unwrap_or_default();
    let contacts = config
        .map(|c| c.escalation_contacts.as_slice())
        .unwrap_or_default();

    let mut targets: Vec<String> = Vec::new();
    for user in backup.iter().chain(chain).chain(contacts) {
        if user != level0_assignee && !targets.contains(user) {
            targets.push(user.clone());
        }
    }
    targets
}
