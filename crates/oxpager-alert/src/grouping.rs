use chrono::{DateTime, Duration, Utc};
use oxpager_common::types::{AlertGroup, AlertRecord, GroupMember, RuleType, SuppressionRule};
use oxpager_storage::StoreView;
use std::collections::BTreeSet;

use crate::error::GroupingError;

pub const DEFAULT_GROUP_WINDOW_MINUTES: u32 = 60;

/// Collapses related alerts into rolling groups.
///
/// Alerts share a group when they have the same key and arrive while the
/// group is still open, i.e. within the grouping window of its last alert.
#[derive(Debug, Clone)]
pub struct AlertGrouper {
    default_window: Duration,
}

impl Default for AlertGrouper {
    fn default() -> Self {
        Self::new(DEFAULT_GROUP_WINDOW_MINUTES)
    }
}

impl AlertGrouper {
    pub fn new(default_window_minutes: u32) -> Self {
        Self {
            default_window: Duration::minutes(i64::from(default_window_minutes)),
        }
    }

    /// Records `alert` as a member of its group, extending the open group or
    /// seeding a new one. Suppressed alerts are recorded too.
    ///
    /// `suppress_all` marks that a suppress-all maintenance window silenced
    /// the alert; only that flags the group as suppressed.
    pub fn attach(
        &self,
        view: &StoreView<'_>,
        alert: &AlertRecord,
        suppressed: bool,
        suppress_all: bool,
        now: DateTime<Utc>,
    ) -> Result<AlertGroup, GroupingError> {
        let rule = grouping_rule(view, alert)?;
        let key = group_key(alert, rule.as_ref().map(|r| r.group_by.as_slice()));
        let window = rule
            .as_ref()
            .map(|r| Duration::minutes(i64::from(r.suppression_minutes)))
            .unwrap_or(self.default_window);

        let group = match view.find_open_group(&alert.team_id, &key, now - window)? {
            Some(mut group) => {
                group.last_alert_id = alert.id.clone();
                group.alert_count += 1;
                group.severities.insert(alert.severity);
                group.last_alert_at = group.last_alert_at.max(now);
                group.suppression_applied |= suppress_all;
                view.update_group(&group)?;
                tracing::debug!(
                    group_id = %group.id,
                    alert_id = %alert.id,
                    alert_count = group.alert_count,
                    "Alert joined group"
                );
                group
            }
            None => {
                let group = AlertGroup {
                    id: oxpager_common::id::next_id(),
                    team_id: alert.team_id.clone(),
                    group_key: key,
                    first_alert_id: alert.id.clone(),
                    last_alert_id: alert.id.clone(),
                    alert_count: 1,
                    severities: BTreeSet::from([alert.severity]),
                    first_alert_at: now,
                    last_alert_at: now,
                    suppression_applied: suppress_all,
                };
                view.insert_group(&group)?;
                tracing::debug!(
                    group_id = %group.id,
                    group_key = %group.group_key,
                    alert_id = %alert.id,
                    "New alert group"
                );
                group
            }
        };

        view.add_group_member(&GroupMember {
            group_id: group.id.clone(),
            alert_id: alert.id.clone(),
            suppressed,
            joined_at: now,
        })?;
        Ok(group)
    }
}

/// The metric name, followed by `|k=v,...` over `group_by` label keys in
/// sorted order. Keys the alert does not carry are left out.
///
/// ```
/// use oxpager_alert::grouping::group_key;
/// use oxpager_common::types::{AlertRecord, Severity};
/// use chrono::Utc;
///
/// let alert = AlertRecord::new("a", "r", "cpu_high", Severity::High, "t", Utc::now())
///     .with_label("region", "eu")
///     .with_label("host", "web-01");
/// assert_eq!(group_key(&alert, None), "cpu_high");
/// let by = vec!["region".to_string(), "host".to_string()];
/// assert_eq!(group_key(&alert, Some(by.as_slice())), "cpu_high|host=web-01,region=eu");
/// ```
pub fn group_key(alert: &AlertRecord, group_by: Option<&[String]>) -> String {
    let Some(group_by) = group_by.filter(|g| !g.is_empty()) else {
        return alert.metric_name.clone();
    };
    let keys: BTreeSet<&str> = group_by.iter().map(String::as_str).collect();
    let parts: Vec<String> = keys
        .into_iter()
        .filter_map(|k| alert.labels.get(k).map(|v| format!("{k}={v}")))
        .collect();
    if parts.is_empty() {
        alert.metric_name.clone()
    } else {
        format!("{}|{}", alert.metric_name, parts.join(","))
    }
}

/// Highest-priority enabled grouping rule whose condition holds for `alert`.
fn grouping_rule(
    view: &StoreView<'_>,
    alert: &AlertRecord,
) -> Result<Option<SuppressionRule>, GroupingError> {
    for rule in view.enabled_suppression_rules(&alert.team_id)? {
        if rule.rule_type != RuleType::Grouping {
            continue;
        }
        let matched =
            rule.condition
                .evaluate(alert)
                .map_err(|source| GroupingError::MalformedCondition {
                    rule_id: rule.id.clone(),
                    source,
                })?;
        if matched {
            return Ok(Some(rule));
        }
    }
    Ok(None)
}
