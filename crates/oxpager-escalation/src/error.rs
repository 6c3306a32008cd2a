use oxpager_common::types::Severity;
use oxpager_storage::{StorageError, TransientError};

/// Errors that can occur while routing, assigning or escalating alerts.
///
/// # Examples
///
/// ```rust
/// use oxpager_escalation::error::EscalationError;
/// use oxpager_common::types::Severity;
///
/// let err = EscalationError::RoutingGap {
///     team_id: "payments".to_string(),
///     severity: Severity::Critical,
/// };
/// assert!(err.to_string().contains("payments"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum EscalationError {
    /// Nobody is on call, the routing row has no assignees and the team has
    /// no primary contacts.
    #[error("Escalation: no responder for team '{team_id}' at severity {severity}")]
    RoutingGap { team_id: String, severity: Severity },

    /// Business hours name a timezone that is not in the IANA database.
    #[error("Escalation: invalid timezone '{0}'")]
    InvalidTimezone(String),

    /// The user may not act on the team's alerts.
    #[error("Escalation: user '{user_id}' is not a member of team '{team_id}'")]
    NotTeamMember { user_id: String, team_id: String },

    #[error("Escalation: alert '{0}' not found")]
    AlertNotFound(String),

    /// The alert was resolved and takes no further acknowledgments.
    #[error("Escalation: alert '{0}' is already resolved")]
    AlertClosed(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl TransientError for EscalationError {
    fn is_transient(&self) -> bool {
        matches!(self, EscalationError::Storage(e) if e.is_transient())
    }
}

/// Convenience `Result` alias for escalation operations.
pub type Result<T> = std::result::Result<T, EscalationError>;
