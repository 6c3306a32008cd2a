use oxpager_common::types::{
    AlertRule, EscalationConfig, MaintenanceWindow, OnCallEntry, OnCallSchedule, SeverityRouting,
    SuppressionRule, TeamMember, TeamRole,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_database_file")]
    pub database_file: String,

    #[serde(default)]
    pub escalation: EscalationSchedulerConfig,
    #[serde(default)]
    pub housekeeping: HousekeepingConfig,
    #[serde(default)]
    pub grouping: GroupingConfig,

    /// Static team membership consulted for acknowledgments
    #[serde(default)]
    pub teams: Vec<TeamConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            data_dir: default_data_dir(),
            database_file: default_database_file(),
            escalation: EscalationSchedulerConfig::default(),
            housekeeping: HousekeepingConfig::default(),
            grouping: GroupingConfig::default(),
            teams: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationSchedulerConfig {
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for EscalationSchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HousekeepingConfig {
    #[serde(default = "default_housekeeping_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_suppression_log_retention_days")]
    pub suppression_log_retention_days: u32,
    #[serde(default = "default_group_retention_hours")]
    pub group_retention_hours: u32,
}

impl Default for HousekeepingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_housekeeping_interval_secs(),
            suppression_log_retention_days: default_suppression_log_retention_days(),
            group_retention_hours: default_group_retention_hours(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupingConfig {
    /// Window used when no grouping rule names its own
    #[serde(default = "default_group_window_minutes")]
    pub default_window_minutes: u32,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            default_window_minutes: default_group_window_minutes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamConfig {
    pub id: String,
    #[serde(default)]
    pub members: Vec<TeamMemberConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamMemberConfig {
    pub user_id: String,
    #[serde(default = "default_member_role")]
    pub role: TeamRole,
}

fn default_http_port() -> u16 {
    8080
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_database_file() -> String {
    "oxpager.db".to_string()
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_housekeeping_interval_secs() -> u64 {
    3600
}

fn default_suppression_log_retention_days() -> u32 {
    30
}

fn default_group_retention_hours() -> u32 {
    24
}

fn default_group_window_minutes() -> u32 {
    oxpager_alert::grouping::DEFAULT_GROUP_WINDOW_MINUTES
}

fn default_member_role() -> TeamRole {
    TeamRole::Member
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config '{path}': {e}"))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config '{path}': {e}"))?;
        Ok(config)
    }

    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.database_file)
    }

    /// Members listed under `[[teams]]`, flattened.
    pub fn team_members(&self) -> Vec<TeamMember> {
        self.teams
            .iter()
            .flat_map(|team| {
                team.members.iter().map(|m| TeamMember {
                    team_id: team.id.clone(),
                    user_id: m.user_id.clone(),
                    role: m.role,
                })
            })
            .collect()
    }
}

// ---- Seed file types (used by the `init-seed` CLI subcommand) ----

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub alert_rules: Vec<AlertRule>,
    #[serde(default)]
    pub maintenance_windows: Vec<MaintenanceWindow>,
    #[serde(default)]
    pub suppression_rules: Vec<SuppressionRule>,
    #[serde(default)]
    pub escalation_configs: Vec<EscalationConfig>,
    #[serde(default)]
    pub severity_routing: Vec<SeverityRouting>,
    #[serde(default)]
    pub on_call_schedules: Vec<OnCallSchedule>,
    #[serde(default)]
    pub on_call_entries: Vec<OnCallEntry>,
    #[serde(default)]
    pub team_members: Vec<TeamMember>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.escalation.sweep_interval_secs, 60);
        assert_eq!(config.housekeeping.interval_secs, 3600);
        assert_eq!(config.housekeeping.suppression_log_retention_days, 30);
        assert_eq!(config.housekeeping.group_retention_hours, 24);
        assert_eq!(config.grouping.default_window_minutes, 60);
        assert_eq!(config.database_path(), PathBuf::from("data/oxpager.db"));
    }

    #[test]
    fn teams_flatten_into_members() {
        let config: ServerConfig = toml::from_str(
            r#"
            http_port = 9000

            [escalation]
            sweep_interval_secs = 15

            [[teams]]
            id = "payments"
            members = [
                { user_id = "alice", role = "admin" },
                { user_id = "bob" },
            ]
            "#,
        )
        .unwrap();
        assert_eq!(config.http_port, 9000);
        assert_eq!(config.escalation.sweep_interval_secs, 15);
        let members = config.team_members();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].role, TeamRole::Admin);
        assert_eq!(members[1].role, TeamRole::Member);
    }
}
