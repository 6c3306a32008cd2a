use chrono::{DateTime, Duration, Utc};
use oxpager_common::types::{
    AlertRecord, DecisionMetadata, RuleType, SuppressionDecision, SuppressionReason,
};

use crate::error::{Result, SuppressionError};
use crate::maintenance::matching_window;
use crate::rate_limit::RateLimit;
use crate::SuppressionLookup;

/// Open alerts on the same rule within this many minutes make a duplicate.
pub const DUPLICATE_WINDOW_MINUTES: i64 = 30;
/// Trailing window for a rule's `max_alerts_per_hour`.
pub const RULE_RATE_WINDOW_MINUTES: i64 = 60;

/// Decides whether an alert is suppressed.
///
/// Checks run in a fixed order and the first hit wins:
///
/// 1. an active maintenance window covering the alert,
/// 2. an open alert on the same rule within [`DUPLICATE_WINDOW_MINUTES`],
/// 3. the rule's hourly cap,
/// 4. enabled suppression rules by descending priority.
///
/// The alert being evaluated must not be stored yet; it would otherwise be
/// counted against itself.
#[derive(Debug, Clone)]
pub struct SuppressionEngine {
    duplicate_window: Duration,
    rate_window: Duration,
}

impl Default for SuppressionEngine {
    fn default() -> Self {
        Self {
            duplicate_window: Duration::minutes(DUPLICATE_WINDOW_MINUTES),
            rate_window: Duration::minutes(RULE_RATE_WINDOW_MINUTES),
        }
    }
}

impl SuppressionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluate<L>(
        &self,
        lookup: &L,
        alert: &AlertRecord,
        now: DateTime<Utc>,
    ) -> Result<SuppressionDecision>
    where
        L: SuppressionLookup + ?Sized,
    {
        let rule = lookup
            .find_rule(&alert.rule_id)?
            .ok_or_else(|| SuppressionError::RuleNotFound(alert.rule_id.clone()))?;

        let windows = lookup.maintenance_windows_at(&alert.team_id, now)?;
        if let Some(window) = matching_window(&windows, alert, now) {
            tracing::debug!(
                alert_id = %alert.id,
                window_id = %window.id,
                "Alert inside maintenance window"
            );
            return Ok(SuppressionDecision::suppress(
                SuppressionReason::MaintenanceWindow,
                window.ends_at,
                DecisionMetadata {
                    maintenance_window_id: Some(window.id.clone()),
                    suppress_all: window.suppress_all,
                    ..Default::default()
                },
            ));
        }

        if let Some(original) = lookup
            .recent_open_alert(&alert.rule_id, now - self.duplicate_window)?
            .filter(|a| a.id != alert.id)
        {
            tracing::debug!(
                alert_id = %alert.id,
                duplicate_of = %original.id,
                "Duplicate alert"
            );
            return Ok(SuppressionDecision::suppress(
                SuppressionReason::DuplicateAlert,
                now + self.duplicate_window,
                DecisionMetadata {
                    duplicate_of: Some(original.id),
                    ..Default::default()
                },
            ));
        }

        if let Some(max) = rule.max_alerts_per_hour {
            let count = lookup.rule_alert_count(&rule.id, now - self.rate_window)?;
            if count >= max {
                tracing::debug!(
                    alert_id = %alert.id,
                    rule_id = %rule.id,
                    count,
                    max,
                    "Rule hourly cap reached"
                );
                return Ok(SuppressionDecision::suppress(
                    SuppressionReason::RateLimitExceeded,
                    now + self.rate_window,
                    DecisionMetadata {
                        rule_alert_count: Some(count),
                        ..Default::default()
                    },
                ));
            }
        }

        for rule in lookup.suppression_rules(&alert.team_id)? {
            if rule.rule_type == RuleType::Grouping {
                continue;
            }
            let matched = rule.condition.evaluate(alert).map_err(|source| {
                SuppressionError::MalformedCondition {
                    rule_id: rule.id.clone(),
                    source,
                }
            })?;
            if !matched {
                continue;
            }

            let mut metadata = DecisionMetadata {
                suppression_rule_id: Some(rule.id.clone()),
                ..Default::default()
            };
            if rule.rule_type == RuleType::RateLimit {
                let Some(limit) = RateLimit::for_rule(&rule, alert) else {
                    tracing::warn!(rule_id = %rule.id, "Rate limit rule without limits, skipped");
                    continue;
                };
                if !limit.is_exhausted(lookup, now)? {
                    continue;
                }
                metadata.rate_limit_scope = Some(limit.scope);
            }

            tracing::debug!(
                alert_id = %alert.id,
                suppression_rule_id = %rule.id,
                priority = rule.priority,
                "Suppression rule matched"
            );
            return Ok(SuppressionDecision::suppress(
                SuppressionReason::CustomRule,
                now + Duration::minutes(i64::from(rule.suppression_minutes)),
                metadata,
            ));
        }

        Ok(SuppressionDecision::allow())
    }
}
