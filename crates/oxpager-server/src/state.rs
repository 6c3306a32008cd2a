use crate::config::ServerConfig;
use chrono::{DateTime, Utc};
use oxpager_alert::grouping::AlertGrouper;
use oxpager_alert::suppression::SuppressionEngine;
use oxpager_escalation::directory::{StaticTeamDirectory, TeamDirectory};
use oxpager_escalation::Dispatcher;
use oxpager_storage::{PagerStore, StorageError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters exposed on the health endpoint.
#[derive(Debug, Default)]
pub struct Counters {
    /// Suppression log rows that could not be written
    pub audit_write_failures: AtomicU64,
    pub dispatch_failures: AtomicU64,
}

impl Counters {
    pub fn add_audit_failure(&self) {
        self.audit_write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_dispatch_failures(&self, n: usize) {
        self.dispatch_failures.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn audit_failures(&self) -> u64 {
        self.audit_write_failures.load(Ordering::Relaxed)
    }

    pub fn dispatch_failure_count(&self) -> u64 {
        self.dispatch_failures.load(Ordering::Relaxed)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<PagerStore>,
    pub engine: Arc<SuppressionEngine>,
    pub grouper: Arc<AlertGrouper>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub directory: Arc<dyn TeamDirectory>,
    pub counters: Arc<Counters>,
    pub start_time: DateTime<Utc>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(
        store: Arc<PagerStore>,
        dispatcher: Arc<dyn Dispatcher>,
        directory: Arc<dyn TeamDirectory>,
        config: ServerConfig,
    ) -> Self {
        Self {
            store,
            engine: Arc::new(SuppressionEngine::new()),
            grouper: Arc::new(AlertGrouper::new(config.grouping.default_window_minutes)),
            dispatcher,
            directory,
            counters: Arc::new(Counters::default()),
            start_time: Utc::now(),
            config: Arc::new(config),
        }
    }
}

/// Builds the membership table from `[[teams]]` plus members stored by
/// `init-seed`. Stored roles win over configured ones.
pub fn load_directory(
    config: &ServerConfig,
    store: &PagerStore,
) -> Result<StaticTeamDirectory, StorageError> {
    let mut directory = StaticTeamDirectory::default();
    for member in config.team_members() {
        directory.insert(&member.team_id, &member.user_id, member.role);
    }
    for member in store.read(|view| view.team_members())? {
        directory.insert(&member.team_id, &member.user_id, member.role);
    }
    Ok(directory)
}
