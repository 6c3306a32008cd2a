use oxpager_common::condition::ConditionError;
use oxpager_storage::{StorageError, TransientError};

/// Errors raised while deciding whether an alert is suppressed.
///
/// No variant carries a fallback verdict: callers must not treat a failed
/// evaluation as either "allowed" or "suppressed".
///
/// # Examples
///
/// ```rust
/// use oxpager_alert::error::SuppressionError;
///
/// let err = SuppressionError::RuleNotFound("rule-7".to_string());
/// assert!(err.to_string().contains("rule-7"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum SuppressionError {
    /// The alert references a detection rule that does not exist.
    #[error("Suppression: alert rule '{0}' not found")]
    RuleNotFound(String),

    /// A stored suppression rule carries a condition that cannot be evaluated.
    #[error("Suppression: malformed condition on rule '{rule_id}': {source}")]
    MalformedCondition {
        rule_id: String,
        #[source]
        source: ConditionError,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors raised while attaching an alert to a group.
#[derive(Debug, thiserror::Error)]
pub enum GroupingError {
    /// A grouping rule carries a condition that cannot be evaluated.
    #[error("Grouping: malformed condition on rule '{rule_id}': {source}")]
    MalformedCondition {
        rule_id: String,
        #[source]
        source: ConditionError,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl TransientError for SuppressionError {
    fn is_transient(&self) -> bool {
        matches!(self, SuppressionError::Storage(e) if e.is_transient())
    }
}

impl TransientError for GroupingError {
    fn is_transient(&self) -> bool {
        matches!(self, GroupingError::Storage(e) if e.is_transient())
    }
}

pub type Result<T> = std::result::Result<T, SuppressionError>;
