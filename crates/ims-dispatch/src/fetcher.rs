// SPDX-License-Identifier: Apache-2.0
//! Scheduled fetchers: each plugin defining `fetch_events` is run on
//! its own cron/interval schedule, timeout-guarded, with results validated
//! and enqueued for dispatch.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::warn;

use ims_kernel::is_integration_key;
use ims_plugins::{FetchSchedule, PluginChain, PluginFilter};

use crate::model::validate_v2_payload;
use crate::sender::EventTask;

/// Compute `(wait until next fire, timeout for that invocation)`. For a
/// cron schedule the timeout is the distance between the next two
/// firings, matching the original's `croniter`-based computation in
/// `periodic_tasks.py`.
fn next_fire(schedule: &FetchSchedule) -> (Duration, Duration) {
    match schedule {
        FetchSchedule::Interval(interval) => (*interval, *interval),
        FetchSchedule::Cron(expr) => match normalize_cron(expr).parse::<cron::Schedule>() {
            Ok(parsed) => {
                let now = Utc::now();
                let mut upcoming = parsed.upcoming(Utc);
                let t1 = upcoming.next();
                let t2 = upcoming.next();
                match (t1, t2) {
                    (Some(t1), Some(t2)) => {
                        let wait = (t1 - now).to_std().unwrap_or(Duration::from_secs(10));
                        let timeout = (t2 - t1).to_std().unwrap_or(Duration::from_secs(10));
                        (wait, timeout)
                    }
                    _ => (Duration::from_secs(10), Duration::from_secs(10)),
                }
            }
            Err(err) => {
                warn!(expr = %expr, error = %err, "invalid cron expression, falling back to 10s");
                (Duration::from_secs(10), Duration::from_secs(10))
            }
        },
    }
}

/// The `cron` crate requires a leading seconds field (6–7 fields); the
/// spec and the original (`periodic_schedule.py`) use the standard
/// 5-field `minute hour day_of_month month_of_year day_of_week` form.
/// Prepend `"0 "` so a 5-field expression fires once a minute rather than
/// once a second, leaving already-6/7-field expressions untouched.
fn normalize_cron(expr: &str) -> String {
    if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    }
}

/// Validate one fetched event map against the v2 ingress rules and
/// require a valid `routing_key`, matching `run_fetch_events_method`'s
/// per-entry checks in the original.
fn validate_fetched_event(event: &Value) -> Result<String, String> {
    let routing_key = event
        .get("routing_key")
        .and_then(Value::as_str)
        .ok_or_else(|| "missing routing_key".to_string())?;
    if !is_integration_key(routing_key) {
        return Err(format!("invalid routing_key {routing_key:?}"));
    }
    validate_v2_payload(event).map_err(|err| err.to_string())?;
    Ok(routing_key.to_string())
}

/// Run one plugin's fetch-events loop forever: sleep until the next fire,
/// invoke `fetch_events` under a timeout equal to the schedule's period,
/// validate and enqueue every returned event. A timed-out or failed
/// invocation is logged and abandoned; the next tick proceeds normally.
pub async fn run_fetch_source(
    plugin: &dyn PluginFilter,
    schedule: FetchSchedule,
    base_url: String,
    enqueue: impl Fn(EventTask),
) -> ! {
    loop {
        let (wait, timeout) = next_fire(&schedule);
        tokio::time::sleep(wait).await;

        let events = match tokio::time::timeout(timeout, plugin.fetch_events()).await {
            Ok(Ok(events)) => events,
            Ok(Err(err)) => {
                warn!(plugin = plugin.name(), error = %err, "fetch_events failed");
                continue;
            }
            Err(_) => {
                warn!(plugin = plugin.name(), ?timeout, "fetch_events timed out, abandoning invocation");
                continue;
            }
        };

        for event in events {
            match validate_fetched_event(&event) {
                Ok(routing_key) => enqueue(EventTask {
                    routing_key,
                    payload: event,
                    base_url: base_url.clone(),
                    destination_type: crate::model::DestinationType::V2,
                }),
                Err(reason) => warn!(plugin = plugin.name(), reason, "fetch_events returned an invalid event, skipping"),
            }
        }
    }
}

/// Spawn one `run_fetch_source` task per plugin that defines a fetch
/// schedule, each holding its own clone of the chain so the borrowed
/// `&dyn PluginFilter` it drives lives as long as the task itself.
pub fn spawn_fetch_loops(
    chain: Arc<PluginChain>,
    base_url: String,
    enqueue: impl Fn(EventTask) + Clone + Send + Sync + 'static,
) {
    for index in chain.fetch_targets() {
        let chain = Arc::clone(&chain);
        let base_url = base_url.clone();
        let enqueue = enqueue.clone();
        tokio::spawn(async move {
            let plugin = chain.plugin_at(index);
            let schedule = plugin.fetch_schedule().unwrap_or_default();
            run_fetch_source(plugin, schedule, base_url, enqueue).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn interval_schedule_timeout_equals_interval() {
        let schedule = FetchSchedule::Interval(Duration::from_secs(30));
        let (wait, timeout) = next_fire(&schedule);
        assert_eq!(wait, Duration::from_secs(30));
        assert_eq!(timeout, Duration::from_secs(30));
    }

    #[test]
    fn five_field_cron_normalizes_and_parses() {
        assert_eq!(normalize_cron("*/5 * * * *"), "0 */5 * * * *");
        assert!("0 */5 * * * *".parse::<cron::Schedule>().is_ok());
        assert_eq!(normalize_cron("0 */5 * * * *"), "0 */5 * * * *");
    }

    #[test]
    fn cron_schedule_computes_wait_and_timeout() {
        let schedule = FetchSchedule::Cron("*/5 * * * *".to_string());
        let (wait, timeout) = next_fire(&schedule);
        assert!(wait <= Duration::from_secs(5 * 60));
        assert!(timeout > Duration::from_secs(0));
        assert!(timeout <= Duration::from_secs(5 * 60));
    }

    #[test]
    fn validates_routing_key_and_payload_shape() {
        let good = json!({
            "routing_key": "0123456789abcdef0123456789abcdef",
            "event_action": "trigger",
            "payload": {"severity": "info", "summary": "s", "source": "src"},
        });
        assert!(validate_fetched_event(&good).is_ok());

        let bad_key = json!({
            "routing_key": "nope",
            "event_action": "trigger",
            "payload": {"severity": "info", "summary": "s", "source": "src"},
        });
        assert!(validate_fetched_event(&bad_key).is_err());

        let missing_key = json!({"event_action": "resolve"});
        assert!(validate_fetched_event(&missing_key).is_err());
    }
}
