//! Routing, on-call resolution, assignment and escalation of allowed alerts.
//!
//! An alert that passed suppression is routed by its team and (possibly
//! overridden) severity to a [`SeverityRouting`] policy. The responder is the
//! current on-call user, falling back to the policy's assignees and then to
//! the team's primary contacts. The handoff is recorded as an
//! [`AlertAssignment`] and an escalation timer is started; the
//! [`sweep::EscalationSweep`] advances those timers.
//!
//! Physical delivery is out of scope: every handoff yields a
//! [`DispatchRequest`] that is passed to a [`Dispatcher`].
//!
//! [`SeverityRouting`]: oxpager_common::types::SeverityRouting
//! [`AlertAssignment`]: oxpager_common::types::AlertAssignment

pub mod assignment;
pub mod business_hours;
pub mod directory;
pub mod dispatch;
pub mod error;
pub mod oncall;
pub mod routing;
pub mod sweep;


use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

/// A request to notify one responder about one alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchRequest {
    pub alert_id: String,
    pub assignee: String,
    pub channels: Vec<String>,
    pub expected_response_minutes: u32,
    pub level: u32,
}

/// Hands dispatch requests to whatever delivers notifications (push, email,
/// SMS senders live outside this crate).
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Delivers the request.
    ///
    /// # Errors
    ///
    /// Returns an error if delivery could not be handed off.
    async fn dispatch(&self, request: &DispatchRequest) -> Result<()>;

    /// Short name used in logs (e.g. `"log"`).
    fn name(&self) -> &str;
}
