use anyhow::Result;
use chrono::{DateTime, Utc};
use oxpager_storage::{PagerStore, StorageError};
use serde::Serialize;

use crate::config::SeedFile;

/// How many records of each kind a seed file wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub alert_rules: usize,
    pub maintenance_windows: usize,
    pub suppression_rules: usize,
    pub escalation_configs: usize,
    pub severity_routing: usize,
    pub on_call_schedules: usize,
    pub on_call_entries: usize,
    pub team_members: usize,
}

pub fn load_seed_file(path: &str) -> Result<SeedFile> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read seed file '{}': {}", path, e))?;
    let seed: SeedFile = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse seed file '{}': {}", path, e))?;
    Ok(seed)
}

/// Writes every entity of the seed in one unit of work; existing records
/// with the same id are replaced. Nothing is written if any record is
/// rejected (e.g. a window that ends before it starts).
pub fn apply_seed(store: &PagerStore, seed: &SeedFile, now: DateTime<Utc>) -> Result<SeedReport> {
    let report = store.unit_of_work(|view| {
        for rule in &seed.alert_rules {
            view.upsert_alert_rule(rule)?;
        }
        for window in &seed.maintenance_windows {
            view.upsert_maintenance_window(window)?;
        }
        for rule in &seed.suppression_rules {
            view.upsert_suppression_rule(rule)?;
        }
        for config in &seed.escalation_configs {
            view.upsert_escalation_config(config, now)?;
        }
        for routing in &seed.severity_routing {
            view.upsert_severity_routing(routing)?;
        }
        for schedule in &seed.on_call_schedules {
            view.upsert_on_call_schedule(schedule)?;
        }
        for entry in &seed.on_call_entries {
            view.upsert_on_call_entry(entry)?;
        }
        for member in &seed.team_members {
            view.upsert_team_member(member)?;
        }
        Ok::<_, StorageError>(SeedReport {
            alert_rules: seed.alert_rules.len(),
            maintenance_windows: seed.maintenance_windows.len(),
            suppression_rules: seed.suppression_rules.len(),
            escalation_configs: seed.escalation_configs.len(),
            severity_routing: seed.severity_routing.len(),
            on_call_schedules: seed.on_call_schedules.len(),
            on_call_entries: seed.on_call_entries.len(),
            team_members: seed.team_members.len(),
        })
    })?;

    tracing::info!(
        alert_rules = report.alert_rules,
        maintenance_windows = report.maintenance_windows,
        suppression_rules = report.suppression_rules,
        escalation_configs = report.escalation_configs,
        severity_routing = report.severity_routing,
        on_call_schedules = report.on_call_schedules,
        on_call_entries = report.on_call_entries,
        team_members = report.team_members,
        "Seed applied"
    );
    Ok(report)
}
