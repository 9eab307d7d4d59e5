// SPDX-License-Identifier: Apache-2.0
//! Maintenance-window evaluator: decides whether a record currently
//! falls inside any active maintenance window, with daily/weekly recurrence.

use chrono::{TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use ims_kernel::{bpql, path, Record};

use crate::model::{Frequency, MaintenanceWindow};

const DAY_SECONDS: i64 = 86_400;
const WEEK_SECONDS: i64 = 604_800;

/// Is `window` active at `now` (Unix seconds, UTC), ignoring its condition?
///
/// For `daily`/`weekly`, active iff `now >= start` and
/// `(now - start) mod period` falls within `[0, duration]`.
pub fn is_active_now(window: &MaintenanceWindow, now: i64) -> bool {
    match window.frequency {
        Frequency::Once => window.start <= now && now <= window.end,
        Frequency::Daily => recurring_active(window, now, DAY_SECONDS),
        Frequency::Weekly => recurring_active(window, now, WEEK_SECONDS),
    }
}

fn recurring_active(window: &MaintenanceWindow, now: i64, period: i64) -> bool {
    if now < window.start {
        return false;
    }
    let duration = window.frequency_data.duration.unwrap_or(0);
    let elapsed = now - window.start;
    let offset_in_period = elapsed % period;
    offset_in_period <= duration
}

/// A maintenance window rendered for human display, with timestamps in the
/// store's configured IANA time zone.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedWindow {
    /// Window id.
    pub id: String,
    /// Window name.
    pub name: String,
    /// Maintenance key (grouping label).
    pub maintenance_key: String,
    /// `start`, rendered in the configured time zone.
    pub start_local: String,
    /// `end`, rendered in the configured time zone.
    pub end_local: String,
}

/// Render a window's timestamps for human display.
pub fn render_window_human(window: &MaintenanceWindow, tz: &Tz) -> RenderedWindow {
    RenderedWindow {
        id: window.id.clone(),
        name: window.name.clone(),
        maintenance_key: window.maintenance_key.clone(),
        start_local: format_ts(window.start, tz),
        end_local: format_ts(window.end, tz),
    }
}

fn format_ts(ts: i64, tz: &Tz) -> String {
    match Utc.timestamp_opt(ts, 0).single() {
        Some(dt) => dt
            .with_timezone(tz)
            .format("%Y-%m-%d %H:%M:%S %Z")
            .to_string(),
        None => ts.to_string(),
    }
}

/// Decide whether `record` is currently suppressed by any active window:
/// active-now windows whose `condition` also matches the record.
pub fn evaluate<'a>(
    record: &Record,
    windows: &'a [MaintenanceWindow],
    prefix: &str,
    now: i64,
) -> (bool, Vec<&'a MaintenanceWindow>) {
    let applied: Vec<&MaintenanceWindow> = windows
        .iter()
        .filter(|w| is_active_now(w, now))
        .filter(|w| bpql::evaluate(w.condition.as_ref(), record, prefix))
        .collect();
    (!applied.is_empty(), applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FrequencyData;
    use chrono::{TimeZone as _, Utc};

    fn window(frequency: Frequency, start: i64, end: i64, duration: i64) -> MaintenanceWindow {
        MaintenanceWindow {
            id: "w1".to_string(),
            maintenance_key: "k".to_string(),
            name: "test window".to_string(),
            start,
            end,
            frequency,
            frequency_data: FrequencyData {
                duration: Some(duration),
            },
            condition: None,
        }
    }

    #[test]
    fn once_is_active_within_bounds() {
        let w = window(Frequency::Once, 1000, 2000, 0);
        assert!(is_active_now(&w, 1500));
        assert!(!is_active_now(&w, 2500));
    }

    #[test]
    fn daily_recurrence_matches_time_of_day_window() {
        // start = 2024-01-01T00:00:00Z, duration=3600,
        // now = 2024-06-15T00:30:00Z -> active.
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap().timestamp();
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 0, 30, 0).unwrap().timestamp();
        let w = window(Frequency::Daily, start, start + 31_536_000, 3600);
        assert!(is_active_now(&w, now));
    }

    #[test]
    fn daily_recurrence_outside_duration_is_inactive() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap().timestamp();
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 2, 0, 0).unwrap().timestamp();
        let w = window(Frequency::Daily, start, start + 31_536_000, 3600);
        assert!(!is_active_now(&w, now));
    }

    #[test]
    fn weekly_recurrence() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap().timestamp();
        let now = start + 3 * WEEK_SECONDS + 1800;
        let w = window(Frequency::Weekly, start, start + 31_536_000, 3600);
        assert!(is_active_now(&w, now));
    }

    #[test]
    fn before_start_is_never_active() {
        let w = window(Frequency::Daily, 10_000, 10_000 + 31_536_000, 3600);
        assert!(!is_active_now(&w, 5_000));
    }
}
