use chrono::Utc;
use oxpager_alert::housekeeping::{self, RetentionPolicy};
use oxpager_escalation::dispatch::dispatch_all;
use oxpager_escalation::sweep::EscalationSweep;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::pipeline::run_blocking;
use crate::state::AppState;

/// Advances escalation timers on a fixed tick.
pub struct EscalationScheduler {
    state: AppState,
    sweep: Arc<EscalationSweep>,
    tick_secs: u64,
}

impl EscalationScheduler {
    pub fn new(state: AppState) -> Self {
        let tick_secs = state.config.escalation.sweep_interval_secs.max(1);
        Self {
            sweep: Arc::new(EscalationSweep::new(state.store.clone())),
            state,
            tick_secs,
        }
    }

    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(tick_secs = self.tick_secs, "Escalation scheduler started");
        let mut tick = interval(Duration::from_secs(self.tick_secs));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tick.tick() => self.run_once().await,
            }
        }
        tracing::info!("Escalation scheduler stopped");
    }

    /// One sweep followed by delivery of the handoffs it produced.
    pub async fn run_once(&self) {
        let sweep = self.sweep.clone();
        match run_blocking(&self.state, move |_| sweep.run_once(Utc::now())).await {
            Ok(report) => {
                let failed = dispatch_all(self.state.dispatcher.as_ref(), &report.dispatches).await;
                self.state.counters.add_dispatch_failures(failed);
            }
            Err(e) => tracing::error!(error = %e, "Escalation sweep failed"),
        }
    }
}

/// Removes expired records and rolls maintenance windows forward.
pub struct HousekeepingScheduler {
    state: AppState,
    policy: RetentionPolicy,
    tick_secs: u64,
}

impl HousekeepingScheduler {
    pub fn new(state: AppState) -> Self {
        let cfg = &state.config.housekeeping;
        let policy = RetentionPolicy {
            suppression_log_days: cfg.suppression_log_retention_days,
            group_hours: cfg.group_retention_hours,
        };
        let tick_secs = cfg.interval_secs.max(1);
        Self {
            state,
            policy,
            tick_secs,
        }
    }

    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(tick_secs = self.tick_secs, "Housekeeping scheduler started");
        let mut tick = interval(Duration::from_secs(self.tick_secs));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tick.tick() => self.run_once().await,
            }
        }
        tracing::info!("Housekeeping scheduler stopped");
    }

    pub async fn run_once(&self) {
        let policy = self.policy;
        let result = run_blocking(&self.state, move |state| {
            housekeeping::run(&state.store, policy, Utc::now())
        })
        .await;
        match result {
            Ok(report) if !report.is_empty() => {
                tracing::info!(
                    suppression_logs_removed = report.suppression_logs_removed,
                    groups_removed = report.groups_removed,
                    rate_limit_windows_removed = report.rate_limit_windows_removed,
                    windows_rolled = report.windows_rolled,
                    windows_disabled = report.windows_disabled,
                    "Housekeeping finished"
                );
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Housekeeping failed"),
        }
    }
}
