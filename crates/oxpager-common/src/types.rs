use crate::condition::Condition;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Implements `as_str`, `Display` and `FromStr` for a fieldless enum stored as
/// TEXT in the database and exchanged as lowercase strings over the API.
macro_rules! text_enum {
    ($ty:ident, $label:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(format!(concat!("unknown ", $label, ": {}"), s)),
                }
            }
        }
    };
}

/// Alert severity, ordered from least to most urgent.
///
/// # Examples
///
/// ```
/// use oxpager_common::types::Severity;
///
/// let sev: Severity = "high".parse().unwrap();
/// assert_eq!(sev, Severity::High);
/// assert_eq!(sev.to_string(), "high");
/// assert!(Severity::Critical > Severity::Info);
/// assert_eq!(sev.expected_response_minutes(), 30);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

text_enum!(Severity, "severity", {
    Info => "info",
    Low => "low",
    Medium => "medium",
    High => "high",
    Critical => "critical",
});

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Info,
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    /// Minutes a responder has to acknowledge an alert of this severity.
    pub fn expected_response_minutes(&self) -> u32 {
        match self {
            Severity::Critical => 15,
            Severity::High => 30,
            Severity::Medium => 60,
            Severity::Low => 240,
            Severity::Info => 480,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
}

text_enum!(AlertStatus, "alert status", {
    Active => "active",
    Acknowledged => "acknowledged",
    Resolved => "resolved",
});

impl AlertStatus {
    /// Active and acknowledged alerts still count as open incidents.
    pub fn is_open(&self) -> bool {
        matches!(self, AlertStatus::Active | AlertStatus::Acknowledged)
    }
}

/// How an alert reached the resolved state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Manual,
    Auto,
}

text_enum!(Resolution, "resolution", {
    Manual => "manual",
    Auto => "auto",
});

/// An alert as produced by the detection pipeline and annotated by this core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: String,
    pub rule_id: String,
    pub metric_name: String,
    pub severity: Severity,
    pub team_id: String,
    pub status: AlertStatus,
    /// Dimensions reported with the alert (e.g. host=web-01, region=eu)
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub acknowledged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolution: Option<Resolution>,
}

impl AlertRecord {
    /// Builds a freshly raised, active alert.
    pub fn new(
        id: impl Into<String>,
        rule_id: impl Into<String>,
        metric_name: impl Into<String>,
        severity: Severity,
        team_id: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            rule_id: rule_id.into(),
            metric_name: metric_name.into(),
            severity,
            team_id: team_id.into(),
            status: AlertStatus::Active,
            labels: BTreeMap::new(),
            created_at,
            acknowledged_at: None,
            resolved_at: None,
            resolution: None,
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// The detection rule an alert was raised by. Owned by the detection pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub team_id: String,
    pub name: String,
    pub metric_name: String,
    /// Cap on alerts for this rule in any trailing hour; `None` disables the check
    #[serde(default)]
    pub max_alerts_per_hour: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recurrence {
    Daily,
    Weekly,
}

text_enum!(Recurrence, "recurrence", {
    Daily => "daily",
    Weekly => "weekly",
});

impl Recurrence {
    pub fn period(&self) -> Duration {
        match self {
            Recurrence::Daily => Duration::days(1),
            Recurrence::Weekly => Duration::weeks(1),
        }
    }
}

/// A scheduled period during which matching alerts are silenced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceWindow {
    pub id: String,
    /// `None` makes the window global
    #[serde(default)]
    pub team_id: Option<String>,
    pub name: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Metric names targeted by the window
    #[serde(default)]
    pub affected_systems: Vec<String>,
    #[serde(default)]
    pub affected_severities: Vec<Severity>,
    #[serde(default)]
    pub suppress_all: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub recurrence: Option<Recurrence>,
    /// Higher wins when several windows match the same alert
    #[serde(default)]
    pub priority: i32,
    pub created_at: DateTime<Utc>,
}

impl MaintenanceWindow {
    pub fn has_valid_range(&self) -> bool {
        self.ends_at > self.starts_at
    }

    /// Inclusive on both ends.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.starts_at <= now && now <= self.ends_at
    }

    pub fn applies_to(&self, metric_name: &str, severity: Severity) -> bool {
        self.suppress_all
            || self.affected_systems.iter().any(|m| m == metric_name)
            || self.affected_severities.contains(&severity)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    Duplicate,
    RateLimit,
    Maintenance,
    Grouping,
    Threshold,
    Custom,
}

text_enum!(RuleType, "rule type", {
    Duplicate => "duplicate",
    RateLimit => "rate_limit",
    Maintenance => "maintenance",
    Grouping => "grouping",
    Threshold => "threshold",
    Custom => "custom",
});

/// What a rate-limit window counts against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitScope {
    Rule,
    Team,
    Metric,
    Severity,
    Global,
}

text_enum!(RateLimitScope, "rate limit scope", {
    Rule => "rule",
    Team => "team",
    Metric => "metric",
    Severity => "severity",
    Global => "global",
});

/// A team-defined (or global) suppression policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuppressionRule {
    pub id: String,
    #[serde(default)]
    pub team_id: Option<String>,
    pub name: String,
    pub rule_type: RuleType,
    pub condition: Condition,
    #[serde(default = "default_suppression_minutes")]
    pub suppression_minutes: u32,
    /// Only meaningful for `rate_limit` rules
    #[serde(default)]
    pub max_alerts_per_window: Option<u32>,
    #[serde(default)]
    pub window_minutes: Option<u32>,
    #[serde(default = "default_limit_scope")]
    pub limit_scope: RateLimitScope,
    /// Label keys folded into the group key (`grouping` rules)
    #[serde(default)]
    pub group_by: Vec<String>,
    /// Higher is evaluated first
    pub priority: i32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

/// Fixed-window counter for one (scope, scope id) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitWindow {
    pub scope: RateLimitScope,
    pub scope_id: String,
    pub max_alerts: u32,
    pub window_minutes: u32,
    pub current_count: u32,
    pub window_start: DateTime<Utc>,
    pub next_reset: DateTime<Utc>,
}

impl RateLimitWindow {
    /// Count as seen at `now`, treating a window past its reset as empty.
    pub fn effective_count(&self, now: DateTime<Utc>) -> u32 {
        if now >= self.next_reset {
            0
        } else {
            self.current_count
        }
    }

    pub fn is_exhausted(&self, now: DateTime<Utc>) -> bool {
        self.effective_count(now) >= self.max_alerts
    }
}

/// A cluster of related alerts collapsed under one key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertGroup {
    pub id: String,
    pub team_id: String,
    pub group_key: String,
    pub first_alert_id: String,
    pub last_alert_id: String,
    pub alert_count: u32,
    pub severities: BTreeSet<Severity>,
    pub first_alert_at: DateTime<Utc>,
    pub last_alert_at: DateTime<Utc>,
    pub suppression_applied: bool,
}

impl AlertGroup {
    /// Computed on read rather than stored.
    pub fn span(&self) -> Duration {
        self.last_alert_at - self.first_alert_at
    }

    pub fn highest_severity(&self) -> Option<Severity> {
        self.severities.iter().next_back().copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMember {
    pub group_id: String,
    pub alert_id: String,
    pub suppressed: bool,
    pub joined_at: DateTime<Utc>,
}

/// Wall-clock range within a day, `start` inclusive and `end` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessHours {
    /// IANA zone name, e.g. "Europe/Berlin"
    #[serde(default = "default_timezone")]
    pub timezone: String,
    pub weekday: TimeRange,
    /// Saturday/Sunday coverage; `None` means weekends are outside business hours
    #[serde(default)]
    pub weekend: Option<TimeRange>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelPreference {
    #[serde(default)]
    pub immediate: Vec<String>,
    #[serde(default)]
    pub escalation: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoResolution {
    pub enabled: bool,
    pub timeout_minutes: u32,
}

/// Per-team escalation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationConfig {
    pub team_id: String,
    pub business_hours: BusinessHours,
    /// Ordered responder user ids consulted as escalation levels increase
    #[serde(default)]
    pub escalation_chain: Vec<String>,
    /// Metric name to the severity it is routed as
    #[serde(default)]
    pub severity_overrides: BTreeMap<String, Severity>,
    #[serde(default)]
    pub notification_preferences: BTreeMap<Severity, ChannelPreference>,
    #[serde(default)]
    pub auto_resolution: BTreeMap<Severity, AutoResolution>,
    #[serde(default)]
    pub primary_contacts: Vec<String>,
    #[serde(default)]
    pub escalation_contacts: Vec<String>,
}

impl EscalationConfig {
    pub fn effective_severity(&self, metric_name: &str, severity: Severity) -> Severity {
        self.severity_overrides
            .get(metric_name)
            .copied()
            .unwrap_or(severity)
    }
}

/// Per team × severity routing policy row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityRouting {
    pub id: String,
    pub team_id: String,
    pub severity: Severity,
    #[serde(default)]
    pub assigned_users: Vec<String>,
    #[serde(default)]
    pub assigned_channels: Vec<String>,
    #[serde(default)]
    pub initial_delay_minutes: u32,
    #[serde(default = "default_escalation_interval")]
    pub escalation_interval_minutes: u32,
    #[serde(default = "default_max_escalation_level")]
    pub max_escalation_level: u32,
    #[serde(default)]
    pub business_hours_only: bool,
    #[serde(default)]
    pub weekend_escalation: bool,
    #[serde(default)]
    pub auto_acknowledge_minutes: Option<u32>,
    #[serde(default)]
    pub auto_resolve_minutes: Option<u32>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Lower wins
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleType {
    Rotation,
    Fixed,
    FollowTheSun,
}

text_enum!(ScheduleType, "schedule type", {
    Rotation => "rotation",
    Fixed => "fixed",
    FollowTheSun => "follow_the_sun",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnCallSchedule {
    pub id: String,
    pub team_id: String,
    pub name: String,
    pub schedule_type: ScheduleType,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    pub effective_from: DateTime<Utc>,
    #[serde(default)]
    pub effective_until: Option<DateTime<Utc>>,
    pub applicable_severities: Vec<Severity>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl OnCallSchedule {
    pub fn is_effective_at(&self, now: DateTime<Utc>) -> bool {
        self.enabled
            && self.effective_from <= now
            && self.effective_until.is_none_or(|until| now <= until)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnCallEntry {
    pub id: String,
    pub schedule_id: String,
    pub user_id: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[serde(default = "default_true")]
    pub is_primary: bool,
    #[serde(default)]
    pub backup_user: Option<String>,
    #[serde(default)]
    pub is_override: bool,
    #[serde(default)]
    pub override_reason: Option<String>,
    /// The user whose shift an override entry covers
    #[serde(default)]
    pub original_user: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OnCallEntry {
    pub fn has_valid_range(&self) -> bool {
        self.ends_at > self.starts_at
    }

    /// Half-open: `[starts_at, ends_at)`.
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.starts_at <= now && now < self.ends_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentReason {
    Manual,
    AutoSeverity,
    Escalation,
    Rotation,
}

text_enum!(AssignmentReason, "assignment reason", {
    Manual => "manual",
    AutoSeverity => "auto_severity",
    Escalation => "escalation",
    Rotation => "rotation",
});

/// One handoff of responsibility for an alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertAssignment {
    pub id: String,
    pub alert_id: String,
    pub assigned_to: String,
    pub assigned_by: String,
    pub reason: AssignmentReason,
    pub level: u32,
    pub expected_response_minutes: u32,
    pub assigned_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub response_time_minutes: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscalationPhase {
    Active,
    Acknowledged,
    Resolved,
    Exhausted,
}

text_enum!(EscalationPhase, "escalation phase", {
    Active => "active",
    Acknowledged => "acknowledged",
    Resolved => "resolved",
    Exhausted => "exhausted",
});

/// Timer row the escalation sweep works from, one per routed alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationState {
    pub alert_id: String,
    pub team_id: String,
    pub severity: Severity,
    pub routing_id: Option<String>,
    /// `-1` while the level 0 assignment is still waiting out the initial delay
    pub current_level: i32,
    pub next_escalation_at: DateTime<Utc>,
    pub phase: EscalationPhase,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionReason {
    MaintenanceWindow,
    DuplicateAlert,
    RateLimitExceeded,
    CustomRule,
    NoSuppression,
}

text_enum!(SuppressionReason, "suppression reason", {
    MaintenanceWindow => "maintenance_window",
    DuplicateAlert => "duplicate_alert",
    RateLimitExceeded => "rate_limit_exceeded",
    CustomRule => "custom_rule",
    NoSuppression => "no_suppression",
});

/// Details explaining which check produced a decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_window_id: Option<String>,
    #[serde(default)]
    pub suppress_all: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_alert_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suppression_rule_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_scope: Option<RateLimitScope>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuppressionDecision {
    pub suppressed: bool,
    pub reason: SuppressionReason,
    pub suppress_until: Option<DateTime<Utc>>,
    pub metadata: DecisionMetadata,
}

impl SuppressionDecision {
    pub fn allow() -> Self {
        Self {
            suppressed: false,
            reason: SuppressionReason::NoSuppression,
            suppress_until: None,
            metadata: DecisionMetadata::default(),
        }
    }

    pub fn suppress(
        reason: SuppressionReason,
        until: DateTime<Utc>,
        metadata: DecisionMetadata,
    ) -> Self {
        Self {
            suppressed: true,
            reason,
            suppress_until: Some(until),
            metadata,
        }
    }
}

/// Immutable audit record of one suppression decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuppressionLogEntry {
    pub id: String,
    pub alert_id: String,
    pub team_id: String,
    pub rule_id: String,
    pub suppressed: bool,
    pub reason: SuppressionReason,
    pub suppress_until: Option<DateTime<Utc>>,
    pub metadata: DecisionMetadata,
    pub created_at: DateTime<Utc>,
}

impl SuppressionLogEntry {
    pub fn from_decision(
        alert: &AlertRecord,
        decision: &SuppressionDecision,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: crate::id::next_id(),
            alert_id: alert.id.clone(),
            team_id: alert.team_id.clone(),
            rule_id: alert.rule_id.clone(),
            suppressed: decision.suppressed,
            reason: decision.reason,
            suppress_until: decision.suppress_until,
            metadata: decision.metadata.clone(),
            created_at: now,
        }
    }
}

/// Team membership roles, ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamRole {
    Viewer,
    Member,
    Admin,
    Owner,
}

text_enum!(TeamRole, "team role", {
    Viewer => "viewer",
    Member => "member",
    Admin => "admin",
    Owner => "owner",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    pub team_id: String,
    pub user_id: String,
    pub role: TeamRole,
}

fn default_true() -> bool {
    true
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_suppression_minutes() -> u32 {
    60
}

fn default_limit_scope() -> RateLimitScope {
    RateLimitScope::Rule
}

fn default_escalation_interval() -> u32 {
    30
}

fn default_max_escalation_level() -> u32 {
    3
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap()
    }

    #[test]
    fn severity_orders_by_urgency() {
        let mut all = Severity::ALL.to_vec();
        all.reverse();
        all.sort();
        assert_eq!(all, Severity::ALL.to_vec());
        assert!(Severity::High > Severity::Medium);
        assert!("bogus".parse::<Severity>().is_err());
        assert_eq!("CRITICAL".parse::<Severity>(), Ok(Severity::Critical));
    }

    #[test]
    fn expected_response_follows_fixed_lookup() {
        let minutes: Vec<u32> = Severity::ALL
            .iter()
            .map(Severity::expected_response_minutes)
            .collect();
        assert_eq!(minutes, vec![480, 240, 60, 30, 15]);
    }

    #[test]
    fn maintenance_window_bounds_are_inclusive() {
        let window = MaintenanceWindow {
            id: "mw-1".into(),
            team_id: None,
            name: "db upgrade".into(),
            starts_at: at(10, 0),
            ends_at: at(12, 0),
            timezone: "UTC".into(),
            affected_systems: vec!["db_latency".into()],
            affected_severities: vec![],
            suppress_all: false,
            enabled: true,
            recurrence: None,
            priority: 0,
            created_at: at(9, 0),
        };
        assert!(window.is_active_at(at(10, 0)));
        assert!(window.is_active_at(at(12, 0)));
        assert!(!window.is_active_at(at(12, 1)));
        assert!(window.applies_to("db_latency", Severity::Low));
        assert!(!window.applies_to("cpu_high", Severity::Low));
    }

    #[test]
    fn on_call_entry_is_half_open() {
        let entry = OnCallEntry {
            id: "e-1".into(),
            schedule_id: "s-1".into(),
            user_id: "alice".into(),
            starts_at: at(8, 0),
            ends_at: at(16, 0),
            is_primary: true,
            backup_user: None,
            is_override: false,
            override_reason: None,
            original_user: None,
            created_at: at(0, 0),
        };
        assert!(entry.contains(at(8, 0)));
        assert!(!entry.contains(at(16, 0)));
    }

    #[test]
    fn rate_limit_window_resets_after_next_reset() {
        let window = RateLimitWindow {
            scope: RateLimitScope::Rule,
            scope_id: "r-1".into(),
            max_alerts: 3,
            window_minutes: 10,
            current_count: 3,
            window_start: at(10, 0),
            next_reset: at(10, 10),
        };
        assert!(window.is_exhausted(at(10, 5)));
        assert!(!window.is_exhausted(at(10, 10)));
        assert_eq!(window.effective_count(at(10, 11)), 0);
    }

    #[test]
    fn severity_keyed_maps_round_trip_through_json() {
        let mut prefs = BTreeMap::new();
        prefs.insert(
            Severity::High,
            ChannelPreference {
                immediate: vec!["push".into()],
                escalation: vec!["sms".into()],
            },
        );
        let json = serde_json::to_string(&prefs).unwrap();
        assert!(json.contains("\"high\""));
        let back: BTreeMap<Severity, ChannelPreference> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, prefs);
    }
}
