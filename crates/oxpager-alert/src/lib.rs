//! Suppression and grouping for incoming alerts.
//!
//! [`suppression::SuppressionEngine`] decides whether an alert is silenced,
//! checking maintenance windows, duplicates, the rule's hourly rate limit and
//! team-defined suppression rules in that order. [`grouping::AlertGrouper`]
//! then records the alert in a rolling group whether or not it was silenced.
//!
//! The engine never writes. It reads through [`SuppressionLookup`], which the
//! storage layer's [`StoreView`] implements; tests substitute an in-memory
//! fake.

pub mod error;
pub mod grouping;
pub mod housekeeping;
pub mod maintenance;
pub mod rate_limit;
pub mod suppression;


use chrono::{DateTime, Utc};
use oxpager_common::types::{
    AlertRecord, AlertRule, MaintenanceWindow, RateLimitScope, RateLimitWindow, SuppressionRule,
};
use oxpager_storage::{StorageError, StoreView};

/// Read access the suppression engine needs.
///
/// Implementations must return maintenance windows and suppression rules in
/// evaluation order (see the storage queries of the same purpose).
pub trait SuppressionLookup {
    /// The detection rule an alert was raised by.
    fn find_rule(&self, rule_id: &str) -> Result<Option<AlertRule>, StorageError>;

    /// Enabled windows covering `now` for the team (or global), highest
    /// priority first, most recently created first within a priority.
    fn maintenance_windows_at(
        &self,
        team_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<MaintenanceWindow>, StorageError>;

    /// Latest active/acknowledged alert on the rule created at or after `since`.
    fn recent_open_alert(
        &self,
        rule_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<AlertRecord>, StorageError>;

    /// Alerts on the rule created at or after `since`.
    fn rule_alert_count(&self, rule_id: &str, since: DateTime<Utc>) -> Result<u32, StorageError>;

    /// Enabled team or global suppression rules, descending priority then id.
    fn suppression_rules(&self, team_id: &str) -> Result<Vec<SuppressionRule>, StorageError>;

    fn rate_limit_window(
        &self,
        scope: RateLimitScope,
        scope_id: &str,
    ) -> Result<Option<RateLimitWindow>, StorageError>;
}

impl SuppressionLookup for StoreView<'_> {
    fn find_rule(&self, rule_id: &str) -> Result<Option<AlertRule>, StorageError> {
        self.get_alert_rule(rule_id)
    }

    fn maintenance_windows_at(
        &self,
        team_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<MaintenanceWindow>, StorageError> {
        self.active_maintenance_windows(team_id, now)
    }

    fn recent_open_alert(
        &self,
        rule_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<AlertRecord>, StorageError> {
        self.latest_open_alert_for_rule(rule_id, since)
    }

    fn rule_alert_count(&self, rule_id: &str, since: DateTime<Utc>) -> Result<u32, StorageError> {
        self.count_rule_alerts_since(rule_id, since)
    }

    fn suppression_rules(&self, team_id: &str) -> Result<Vec<SuppressionRule>, StorageError> {
        self.enabled_suppression_rules(team_id)
    }

    fn rate_limit_window(
        &self,
        scope: RateLimitScope,
        scope_id: &str,
    ) -> Result<Option<RateLimitWindow>, StorageError> {
        self.get_rate_limit_window(scope, scope_id)
    }
}
