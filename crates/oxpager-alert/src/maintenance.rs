use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::Tz;
use oxpager_common::types::{AlertRecord, MaintenanceWindow};

/// The window that silences `alert` at `now`, if any.
///
/// `windows` must already be in precedence order (highest priority, then
/// most recently created); the first applicable one wins.
pub fn matching_window<'w>(
    windows: &'w [MaintenanceWindow],
    alert: &AlertRecord,
    now: DateTime<Utc>,
) -> Option<&'w MaintenanceWindow> {
    windows.iter().find(|w| {
        w.team_id.as_deref().is_none_or(|t| t == alert.team_id)
            && w.is_active_at(now)
            && w.applies_to(&alert.metric_name, alert.severity)
    })
}

/// Next occurrence of a recurring window that has ended before `now`.
///
/// Occurrences are stepped in the window's own timezone so a window set for
/// 02:00 local time stays at 02:00 across DST changes. Returns `None` for
/// one-off windows.
pub fn next_occurrence(
    window: &MaintenanceWindow,
    now: DateTime<Utc>,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let recurrence = window.recurrence?;
    let period = recurrence.period();
    let tz = match window.timezone.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            tracing::warn!(
                window_id = %window.id,
                timezone = %window.timezone,
                "Unknown maintenance window timezone, stepping in UTC"
            );
            Tz::UTC
        }
    };

    let behind = (now - window.ends_at).num_seconds().max(0);
    let mut steps = behind / period.num_seconds() + 1;
    loop {
        let starts_at = shift_local(window.starts_at, tz, period, steps)?;
        let ends_at = shift_local(window.ends_at, tz, period, steps)?;
        if ends_at >= now && ends_at > starts_at {
            return Some((starts_at, ends_at));
        }
        steps += 1;
    }
}

fn shift_local(ts: DateTime<Utc>, tz: Tz, period: Duration, steps: i64) -> Option<DateTime<Utc>> {
    let local = ts.with_timezone(&tz).naive_local();
    let shifted = local + Duration::seconds(period.num_seconds().checked_mul(steps)?);
    // A wall-clock time skipped by a DST jump lands one hour later.
    tz.from_local_datetime(&shifted)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(shifted + Duration::hours(1))).earliest())
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxpager_common::types::{Recurrence, Severity};

    fn utc(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, h, 0, 0).unwrap()
    }

    fn window(team: Option<&str>, recurrence: Option<Recurrence>) -> MaintenanceWindow {
        MaintenanceWindow {
            id: "mw".into(),
            team_id: team.map(String::from),
            name: "nightly".into(),
            starts_at: utc(1, 1),
            ends_at: utc(1, 3),
            timezone: "Europe/Berlin".into(),
            affected_systems: vec![],
            affected_severities: vec![Severity::Low],
            suppress_all: false,
            enabled: true,
            recurrence,
            priority: 0,
            created_at: utc(1, 0),
        }
    }

    #[test]
    fn matches_by_severity_and_team() {
        let windows = vec![window(Some("team-b"), None), window(None, None)];
        let low = AlertRecord::new("a", "r", "cpu", Severity::Low, "team-a", utc(1, 2));
        let high = AlertRecord::new("a", "r", "cpu", Severity::High, "team-a", utc(1, 2));

        let found = matching_window(&windows, &low, utc(1, 2)).unwrap();
        assert!(found.team_id.is_none());
        assert!(matching_window(&windows, &high, utc(1, 2)).is_none());
        assert!(matching_window(&windows, &low, utc(1, 4)).is_none());
    }

    #[test]
    fn one_off_window_has_no_next_occurrence() {
        assert!(next_occurrence(&window(None, None), utc(2, 0)).is_none());
    }

    #[test]
    fn daily_window_rolls_past_now() {
        let (starts, ends) = next_occurrence(&window(None, Some(Recurrence::Daily)), utc(4, 5)).unwrap();
        assert_eq!(starts, utc(5, 1));
        assert_eq!(ends, utc(5, 3));
    }

    #[test]
    fn daily_window_keeps_local_time_across_dst() {
        // Berlin switches to summer time on 2024-03-31; 02:00 CET becomes 01:00 UTC.
        let (starts, _) = next_occurrence(&window(None, Some(Recurrence::Daily)), utc(31, 12)).unwrap();
        assert_eq!(starts, Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap());
    }
}
