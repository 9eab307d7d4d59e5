// SPDX-License-Identifier: Apache-2.0
//! Activity poller: periodically pulls activity-log entries from the
//! IMS, deduplicates them, and launches per-incident webhook chains.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::sender::{IncidentChains, WebhookTask};
use crate::webhook;

/// Default dedupe retention: 30 days (`KEEP_ACTIVITY_SECONDS`).
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Port to the IMS activity-log API. Pagination (`offset`/`limit` until
/// `more=false`) is the implementor's responsibility; this trait returns
/// the fully paginated, un-reversed result for one poll window.
#[async_trait]
pub trait ActivityApi: Send + Sync {
    /// Fetch every log entry in `[since, until]`, newest first (as the
    /// IMS API returns them).
    async fn fetch_log_entries(&self, since: i64, until: i64, is_overview: bool) -> anyhow::Result<Vec<Value>>;
}

/// Transactional dedupe store: the check-and-insert pair for a
/// batch happens as a single logical operation to avoid double-delivery
/// across overlapping polls.
#[async_trait]
pub trait DedupeStore: Send + Sync {
    /// Given a batch of candidate ids (newest-last), return the subset not
    /// already recorded, and atomically record all of them (both the
    /// already-seen and the newly-seen) with `recorded_at`.
    async fn dedupe_and_record(&self, ids: &[(String, i64)]) -> Vec<String>;

    /// Drop entries recorded before `now - retention`.
    async fn sweep(&self, retention: Duration, now: i64);
}

/// The default, in-process dedupe store: an in-memory map swept
/// periodically, per the "prescribe one store" resolution (see
/// DESIGN.md) — no external document store or message broker dependency.
#[derive(Default)]
pub struct InMemoryDedupeStore {
    seen: Mutex<HashMap<String, i64>>,
}

#[async_trait]
impl DedupeStore for InMemoryDedupeStore {
    async fn dedupe_and_record(&self, ids: &[(String, i64)]) -> Vec<String> {
        let mut seen = self.seen.lock().await;
        let mut fresh = Vec::with_capacity(ids.len());
        for (id, recorded_at) in ids {
            if seen.insert(id.clone(), *recorded_at).is_none() {
                fresh.push(id.clone());
            }
        }
        fresh
    }

    async fn sweep(&self, retention: Duration, now: i64) {
        let cutoff = now - retention.as_secs() as i64;
        let mut seen = self.seen.lock().await;
        seen.retain(|_, recorded_at| *recorded_at >= cutoff);
    }
}

/// Periodic task configuration and dependencies for the activity poller.
pub struct ActivityPoller<A, D> {
    api: A,
    dedupe: Arc<D>,
    chains: IncidentChains,
    services_allowlist: Option<Vec<String>>,
    webhook_config: Option<Value>,
    webhook_url: String,
    is_overview: bool,
    interval: Duration,
    last_poll: AtomicI64,
}

impl<A: ActivityApi, D: DedupeStore> ActivityPoller<A, D> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        api: A,
        dedupe: Arc<D>,
        chains: IncidentChains,
        services_allowlist: Option<Vec<String>>,
        webhook_config: Option<Value>,
        webhook_url: String,
        is_overview: bool,
        interval: Duration,
    ) -> Self {
        Self {
            api,
            dedupe,
            chains,
            services_allowlist,
            webhook_config,
            webhook_url,
            is_overview,
            interval,
            last_poll: AtomicI64::new(0),
        }
    }

    /// Run one poll cycle at `now` (Unix seconds). Never propagates a
    /// per-entry failure; logs and continues so the tick always completes.
    #[instrument(skip(self))]
    pub async fn tick(&self, now: i64) {
        let since = match self.last_poll.load(Ordering::SeqCst) {
            0 => now - self.interval.as_secs() as i64,
            last => last,
        };

        let mut entries = match self.api.fetch_log_entries(since, now, self.is_overview).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(error = %err, "activity poll fetch failed, skipping this tick");
                return;
            }
        };
        entries.reverse(); // chronological order

        let candidates: Vec<(String, i64)> = entries
            .iter()
            .filter_map(|e| e.get("id").and_then(Value::as_str).map(|id| (id.to_string(), now)))
            .collect();
        let fresh_ids = self.dedupe.dedupe_and_record(&candidates).await;
        let fresh: std::collections::HashSet<&str> = fresh_ids.iter().map(String::as_str).collect();

        let mut chains: HashMap<String, Vec<WebhookTask>> = HashMap::new();
        let mut dup_count = 0usize;
        for entry in &entries {
            let Some(id) = entry.get("id").and_then(Value::as_str) else {
                continue;
            };
            if !fresh.contains(id) {
                dup_count += 1;
                continue;
            }
            let Some(incident_id) = webhook::incident_id(entry) else {
                warn!(entry_id = %id, "activity entry missing incident id, skipping");
                continue;
            };
            let Some(payload) = webhook::reconstruct(entry, self.services_allowlist.as_deref(), self.webhook_config.as_ref()) else {
                continue;
            };
            chains.entry(incident_id).or_default().push(WebhookTask {
                url: self.webhook_url.clone(),
                payload,
            });
        }

        for tasks in chains.into_values() {
            self.chains.launch(tasks);
        }

        info!(
            fetched = entries.len(),
            duplicates = dup_count,
            "activity poll tick complete"
        );
        self.last_poll.store(now, Ordering::SeqCst);
    }

    /// Run [`Self::tick`] forever at the configured interval.
    pub async fn run(self: Arc<Self>, clock: impl Fn() -> i64 + Send + 'static) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            self.tick(clock()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FixedApi {
        entries: Vec<Value>,
    }

    #[async_trait]
    impl ActivityApi for FixedApi {
        async fn fetch_log_entries(&self, _since: i64, _until: i64, _is_overview: bool) -> anyhow::Result<Vec<Value>> {
            Ok(self.entries.clone())
        }
    }

    fn entry(id: &str, incident: &str) -> Value {
        json!({
            "id": id,
            "type": "trigger_log_entry",
            "incident": {"id": incident, "summary": "s", "self": "u", "html_url": "u", "service": {"id": "svc1"}},
            "service": {"id": "svc1", "summary": "long"},
        })
    }

    #[tokio::test]
    async fn duplicate_entries_are_skipped_across_ticks() {
        let api = FixedApi {
            entries: vec![entry("e1", "inc1")],
        };
        let dedupe = Arc::new(InMemoryDedupeStore::default());
        let client = reqwest::Client::new();
        let plugins = Arc::new(ims_plugins::PluginChain::new(vec![]));
        let chains = IncidentChains::new(client, plugins);
        let poller = ActivityPoller::new(api, dedupe, chains, None, None, "http://dest".to_string(), true, Duration::from_secs(10));

        poller.tick(1000).await;
        poller.tick(1010).await;
        // Can't directly observe suppressed sends without a transport fake;
        // this test guards that dedupe_and_record treats a repeat id as not-fresh.
        let fresh_again = poller.dedupe.dedupe_and_record(&[("e1".to_string(), 1020)]).await;
        assert!(fresh_again.is_empty());
    }

    #[tokio::test]
    async fn sweep_drops_entries_past_retention() {
        let store = InMemoryDedupeStore::default();
        store.dedupe_and_record(&[("old".to_string(), 0)]).await;
        store.sweep(Duration::from_secs(100), 1000).await;
        let fresh = store.dedupe_and_record(&[("old".to_string(), 1000)]).await;
        assert_eq!(fresh, vec!["old".to_string()]);
    }
}
