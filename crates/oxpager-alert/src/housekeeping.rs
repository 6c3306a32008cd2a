use chrono::{DateTime, Duration, Utc};
use oxpager_storage::{PagerStore, StorageError};
use serde::Serialize;

use crate::maintenance::next_occurrence;

/// How long expired records are kept before housekeeping removes them.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    pub suppression_log_days: u32,
    pub group_hours: u32,
}

/// What one housekeeping pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HousekeepingReport {
    pub suppression_logs_removed: usize,
    pub groups_removed: usize,
    pub rate_limit_windows_removed: usize,
    pub windows_rolled: usize,
    pub windows_disabled: usize,
}

impl HousekeepingReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Removes expired audit logs, stale groups and spent rate-limit windows,
/// then moves ended recurring maintenance windows to their next occurrence
/// and disables ended one-off windows.
///
/// Only records already past their expiry are touched, so running it twice
/// in a row changes nothing the second time.
pub fn run(
    store: &PagerStore,
    policy: RetentionPolicy,
    now: DateTime<Utc>,
) -> Result<HousekeepingReport, StorageError> {
    store.unit_of_work(|view| {
        let mut report = HousekeepingReport {
            suppression_logs_removed: view.cleanup_suppression_logs(
                now - Duration::days(i64::from(policy.suppression_log_days)),
            )?,
            groups_removed: view
                .cleanup_stale_groups(now - Duration::hours(i64::from(policy.group_hours)))?,
            rate_limit_windows_removed: view.delete_spent_rate_limit_windows(now)?,
            ..Default::default()
        };

        for window in view.ended_maintenance_windows(now)? {
            match next_occurrence(&window, now) {
                Some((starts_at, ends_at)) => {
                    view.reschedule_maintenance_window(&window.id, starts_at, ends_at)?;
                    tracing::info!(
                        window_id = %window.id,
                        starts_at = %starts_at,
                        ends_at = %ends_at,
                        "Maintenance window rolled forward"
                    );
                    report.windows_rolled += 1;
                }
                None => {
                    if view.disable_maintenance_window(&window.id)? {
                        tracing::info!(window_id = %window.id, "Maintenance window ended, disabled");
                        report.windows_disabled += 1;
                    }
                }
            }
        }
        Ok(report)
    })
}
