use chrono::{DateTime, Utc};
use oxpager_common::types::{AlertRecord, RateLimitScope, RuleType, SuppressionRule};
use oxpager_storage::StoreView;

use crate::error::{Result, SuppressionError};
use crate::SuppressionLookup;

/// The fixed window a `rate_limit` suppression rule counts an alert against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimit {
    pub scope: RateLimitScope,
    pub scope_id: String,
    pub max_alerts: u32,
    pub window_minutes: u32,
}

impl RateLimit {
    /// Derives the window for `alert` under `rule`. `None` when the rule is
    /// not a rate-limit rule or lacks its limits.
    ///
    /// Scope ids are prefixed with the rule id so two rules sharing a scope
    /// keep separate counters.
    pub fn for_rule(rule: &SuppressionRule, alert: &AlertRecord) -> Option<Self> {
        if rule.rule_type != RuleType::RateLimit {
            return None;
        }
        let max_alerts = rule.max_alerts_per_window?;
        let window_minutes = rule.window_minutes.filter(|m| *m > 0)?;
        let scope_id = match rule.limit_scope {
            RateLimitScope::Rule => format!("{}:{}", rule.id, alert.rule_id),
            RateLimitScope::Team => format!("{}:{}", rule.id, alert.team_id),
            RateLimitScope::Metric => format!("{}:{}", rule.id, alert.metric_name),
            RateLimitScope::Severity => format!("{}:{}", rule.id, alert.severity),
            RateLimitScope::Global => rule.id.clone(),
        };
        Some(Self {
            scope: rule.limit_scope,
            scope_id,
            max_alerts,
            window_minutes,
        })
    }

    /// Whether the window already holds `max_alerts` hits at `now`. A missing
    /// window, or one past its reset, is not exhausted.
    pub fn is_exhausted<L>(&self, lookup: &L, now: DateTime<Utc>) -> Result<bool>
    where
        L: SuppressionLookup + ?Sized,
    {
        if self.max_alerts == 0 {
            return Ok(true);
        }
        Ok(lookup
            .rate_limit_window(self.scope, &self.scope_id)?
            .is_some_and(|w| w.is_exhausted(now)))
    }
}

/// Counts an allowed alert against every matching `rate_limit` rule of its
/// team. Returns how many windows took the hit.
pub fn record_hits(view: &StoreView<'_>, alert: &AlertRecord, now: DateTime<Utc>) -> Result<usize> {
    let mut counted = 0;
    for rule in view.enabled_suppression_rules(&alert.team_id)? {
        let Some(limit) = RateLimit::for_rule(&rule, alert) else {
            continue;
        };
        let matched = rule.condition.evaluate(alert).map_err(|source| {
            SuppressionError::MalformedCondition {
                rule_id: rule.id.clone(),
                source,
            }
        })?;
        if !matched {
            continue;
        }
        if view.record_rate_limit_hit(
            limit.scope,
            &limit.scope_id,
            limit.max_alerts,
            limit.window_minutes,
            now,
        )? {
            counted += 1;
        } else {
            tracing::debug!(
                rule_id = %rule.id,
                scope = %limit.scope,
                scope_id = %limit.scope_id,
                "Rate limit window already full"
            );
        }
    }
    Ok(counted)
}
