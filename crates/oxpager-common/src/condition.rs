//! Structured predicates attached to suppression rules.
//!
//! Conditions are stored as JSON and evaluated against a single alert:
//!
//! ```
//! use oxpager_common::condition::Condition;
//! use oxpager_common::types::{AlertRecord, Severity};
//! use chrono::Utc;
//!
//! let cond: Condition = serde_json::from_str(
//!     r#"{"op":"all","conditions":[
//!         {"op":"equals","field":"metric_name","value":"cpu_high"},
//!         {"op":"in_set","field":"severity","values":["low","medium"]}
//!     ]}"#,
//! ).unwrap();
//! let alert = AlertRecord::new("a1", "r1", "cpu_high", Severity::Low, "t1", Utc::now());
//! assert_eq!(cond.evaluate(&alert), Ok(true));
//! ```

use crate::types::{AlertRecord, Severity};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionField {
    MetricName,
    Severity,
    TeamId,
    RuleId,
}

impl std::fmt::Display for ConditionField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MetricName => write!(f, "metric_name"),
            Self::Severity => write!(f, "severity"),
            Self::TeamId => write!(f, "team_id"),
            Self::RuleId => write!(f, "rule_id"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    Equals {
        field: ConditionField,
        value: String,
    },
    InSet {
        field: ConditionField,
        values: Vec<String>,
    },
    /// Holds when every child holds; an empty list always holds.
    All { conditions: Vec<Condition> },
    /// Holds when any child holds; must not be empty.
    Any { conditions: Vec<Condition> },
}

/// A condition that cannot be evaluated meaningfully.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConditionError {
    #[error("unknown severity '{0}' in condition")]
    UnknownSeverity(String),

    #[error("'any' condition has no branches")]
    EmptyAny,

    #[error("'in_set' condition on {0} has no values")]
    EmptySet(ConditionField),
}

impl Condition {
    /// A condition with no constraints; matches every alert.
    pub fn always() -> Self {
        Condition::All {
            conditions: Vec::new(),
        }
    }

    /// Checks the structure without evaluating against an alert.
    pub fn validate(&self) -> Result<(), ConditionError> {
        match self {
            Condition::Equals { field, value } => check_value(*field, value),
            Condition::InSet { field, values } => {
                if values.is_empty() {
                    return Err(ConditionError::EmptySet(*field));
                }
                values.iter().try_for_each(|v| check_value(*field, v))
            }
            Condition::All { conditions } => conditions.iter().try_for_each(Condition::validate),
            Condition::Any { conditions } => {
                if conditions.is_empty() {
                    return Err(ConditionError::EmptyAny);
                }
                conditions.iter().try_for_each(Condition::validate)
            }
        }
    }

    /// Evaluates the predicate. The whole tree is validated first so a
    /// malformed branch is reported even when an earlier branch decides.
    pub fn evaluate(&self, alert: &AlertRecord) -> Result<bool, ConditionError> {
        self.validate()?;
        Ok(self.holds(alert))
    }

    fn holds(&self, alert: &AlertRecord) -> bool {
        match self {
            Condition::Equals { field, value } => field_matches(*field, value, alert),
            Condition::InSet { field, values } => {
                values.iter().any(|v| field_matches(*field, v, alert))
            }
            Condition::All { conditions } => conditions.iter().all(|c| c.holds(alert)),
            Condition::Any { conditions } => conditions.iter().any(|c| c.holds(alert)),
        }
    }
}

fn check_value(field: ConditionField, value: &str) -> Result<(), ConditionError> {
    if field == ConditionField::Severity && value.parse::<Severity>().is_err() {
        return Err(ConditionError::UnknownSeverity(value.to_string()));
    }
    Ok(())
}

fn field_matches(field: ConditionField, value: &str, alert: &AlertRecord) -> bool {
    match field {
        ConditionField::MetricName => alert.metric_name == value,
        ConditionField::TeamId => alert.team_id == value,
        ConditionField::RuleId => alert.rule_id == value,
        ConditionField::Severity => value
            .parse::<Severity>()
            .is_ok_and(|sev| sev == alert.severity),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn alert(metric: &str, severity: Severity) -> AlertRecord {
        AlertRecord::new("a-1", "rule-1", metric, severity, "team-a", Utc::now())
    }

    #[test]
    fn equals_and_in_set_match_fields() {
        let cond = Condition::All {
            conditions: vec![
                Condition::Equals {
                    field: ConditionField::MetricName,
                    value: "disk_full".into(),
                },
                Condition::InSet {
                    field: ConditionField::Severity,
                    values: vec!["low".into(), "info".into()],
                },
            ],
        };
        assert_eq!(cond.evaluate(&alert("disk_full", Severity::Low)), Ok(true));
        assert_eq!(cond.evaluate(&alert("disk_full", Severity::High)), Ok(false));
        assert_eq!(cond.evaluate(&alert("cpu_high", Severity::Low)), Ok(false));
    }

    #[test]
    fn empty_all_matches_everything() {
        assert_eq!(Condition::always().evaluate(&alert("x", Severity::Info)), Ok(true));
    }

    #[test]
    fn malformed_branches_are_reported_even_when_short_circuited() {
        let cond = Condition::Any {
            conditions: vec![
                Condition::Equals {
                    field: ConditionField::MetricName,
                    value: "x".into(),
                },
                Condition::Equals {
                    field: ConditionField::Severity,
                    value: "sev1".into(),
                },
            ],
        };
        assert_eq!(
            cond.evaluate(&alert("x", Severity::Info)),
            Err(ConditionError::UnknownSeverity("sev1".into()))
        );
        let empty = Condition::Any { conditions: vec![] };
        assert_eq!(empty.validate(), Err(ConditionError::EmptyAny));
    }

    #[test]
    fn deserializes_tagged_json() {
        let cond: Condition =
            serde_json::from_str(r#"{"op":"equals","field":"team_id","value":"team-a"}"#)
                .unwrap();
        assert_eq!(cond.evaluate(&alert("m", Severity::Medium)), Ok(true));
    }
}
