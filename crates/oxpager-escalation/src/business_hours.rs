use chrono::{DateTime, Datelike, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use oxpager_common::types::{BusinessHours, TimeRange};

use crate::error::{EscalationError, Result};

fn zone(hours: &BusinessHours) -> Result<Tz> {
    hours
        .timezone
        .parse::<Tz>()
        .map_err(|_| EscalationError::InvalidTimezone(hours.timezone.clone()))
}

/// `start` inclusive, `end` exclusive. A range whose end is before its start
/// wraps past midnight (e.g. 22:00 - 06:00).
fn in_range(range: &TimeRange, t: NaiveTime) -> bool {
    if range.start <= range.end {
        t >= range.start && t < range.end
    } else {
        t >= range.start || t < range.end
    }
}

/// Whether `now` falls on a Saturday or Sunday in the configured timezone.
pub fn is_weekend(hours: &BusinessHours, now: DateTime<Utc>) -> Result<bool> {
    let local = now.with_timezone(&zone(hours)?);
    Ok(matches!(local.weekday(), Weekday::Sat | Weekday::Sun))
}

/// Whether `now` is inside business hours, evaluated in the configured
/// timezone. Weekends only count when a weekend range is configured.
pub fn is_business_hours(hours: &BusinessHours, now: DateTime<Utc>) -> Result<bool> {
    let local = now.with_timezone(&zone(hours)?);
    let time = local.time();
    match local.weekday() {
        Weekday::Sat | Weekday::Sun => Ok(hours.weekend.as_ref().is_some_and(|r| in_range(r, time))),
        _ => Ok(in_range(&hours.weekday, time)),
    }
}
