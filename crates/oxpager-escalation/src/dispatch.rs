use crate::{DispatchRequest, Dispatcher};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Mutex;

/// Writes every request to the log. The default when no delivery backend is
/// wired up.
pub struct LogDispatcher {
    instance_id: String,
}

impl LogDispatcher {
    pub fn new(instance_id: &str) -> Self {
        Self {
            instance_id: instance_id.to_string(),
        }
    }
}

impl Default for LogDispatcher {
    fn default() -> Self {
        Self::new("log")
    }
}

#[async_trait]
impl Dispatcher for LogDispatcher {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<()> {
        tracing::info!(
            dispatcher = %self.instance_id,
            alert_id = %request.alert_id,
            assignee = %request.assignee,
            level = request.level,
            channels = %request.channels.join(","),
            expected_response_minutes = request.expected_response_minutes,
            "Dispatch requested"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        &self.instance_id
    }
}

/// Keeps requests in memory so callers can inspect what was sent.
#[derive(Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<DispatchRequest>>,
}

impl RecordingDispatcher {
    pub fn sent(&self) -> Vec<DispatchRequest> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<()> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Hands every request to `dispatcher`. Failures are logged and counted but
/// never stop the remaining requests; returns the number that failed.
pub async fn dispatch_all(dispatcher: &dyn Dispatcher, requests: &[DispatchRequest]) -> usize {
    let mut failed = 0;
    for request in requests {
        if let Err(e) = dispatcher.dispatch(request).await {
            failed += 1;
            tracing::warn!(
                dispatcher = dispatcher.name(),
                alert_id = %request.alert_id,
                assignee = %request.assignee,
                error = %e,
                "Dispatch failed"
            );
        }
    }
    failed
}
