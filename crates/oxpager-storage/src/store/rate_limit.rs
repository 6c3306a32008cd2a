use chrono::{DateTime, Duration, Utc};
use oxpager_common::types::{RateLimitScope, RateLimitWindow};
use rusqlite::{params, OptionalExtension, Row};

use crate::codec::{millis, text, ts};
use crate::error::Result;
use crate::store::StoreView;

fn row_to_window(row: &Row<'_>) -> rusqlite::Result<RateLimitWindow> {
    Ok(RateLimitWindow {
        scope: text(row, 0)?,
        scope_id: row.get(1)?,
        max_alerts: row.get(2)?,
        window_minutes: row.get(3)?,
        current_count: row.get(4)?,
        window_start: ts(row, 5)?,
        next_reset: ts(row, 6)?,
    })
}

impl StoreView<'_> {
    pub fn get_rate_limit_window(
        &self,
        scope: RateLimitScope,
        scope_id: &str,
    ) -> Result<Option<RateLimitWindow>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT scope, scope_id, max_alerts, window_minutes, current_count, window_start,
                        next_reset
                 FROM rate_limit_windows WHERE scope = ?1 AND scope_id = ?2",
                params![scope.as_str(), scope_id],
                row_to_window,
            )
            .optional()?)
    }

    /// Counts one alert against the (scope, scope id) window.
    ///
    /// The window is created on first use and restarted once `next_reset` has
    /// passed. The increment only happens while the count is below
    /// `max_alerts`, so concurrent callers can never push it over the cap.
    /// Returns whether the hit was counted.
    pub fn record_rate_limit_hit(
        &self,
        scope: RateLimitScope,
        scope_id: &str,
        max_alerts: u32,
        window_minutes: u32,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let now_ms = millis(now);
        let reset_ms = millis(now + Duration::minutes(i64::from(window_minutes)));
        let conn = self.conn();

        conn.execute(
            "INSERT INTO rate_limit_windows (scope, scope_id, max_alerts, window_minutes,
                 current_count, window_start, next_reset)
             VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6)
             ON CONFLICT(scope, scope_id) DO NOTHING",
            params![
                scope.as_str(),
                scope_id,
                max_alerts,
                window_minutes,
                now_ms,
                reset_ms
            ],
        )?;

        conn.execute(
            "UPDATE rate_limit_windows
             SET current_count = 0, window_start = ?3, next_reset = ?4,
                 max_alerts = ?5, window_minutes = ?6
             WHERE scope = ?1 AND scope_id = ?2 AND next_reset <= ?3",
            params![
                scope.as_str(),
                scope_id,
                now_ms,
                reset_ms,
                max_alerts,
                window_minutes
            ],
        )?;

        let counted = conn.execute(
            "UPDATE rate_limit_windows SET current_count = current_count + 1
             WHERE scope = ?1 AND scope_id = ?2 AND current_count < max_alerts",
            params![scope.as_str(), scope_id],
        )?;
        Ok(counted == 1)
    }

    /// Drops windows that have passed their reset time. They are recreated on
    /// the next hit.
    pub fn delete_spent_rate_limit_windows(&self, now: DateTime<Utc>) -> Result<usize> {
        Ok(self.conn().execute(
            "DELETE FROM rate_limit_windows WHERE next_reset <= ?1",
            params![millis(now)],
        )?)
    }
}
