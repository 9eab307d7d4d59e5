// SPDX-License-Identifier: Apache-2.0
//! Dispatcher: retrying HTTP senders for events and webhooks, run on
//! background workers consuming a persistent queue.
//!
//! Retry backoff constants are grounded on the original Celery task
//! configuration (`tasks.py`: `retry_backoff=15`, `retry_backoff_max=7200`).

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use reqwest::StatusCode;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use ims_plugins::PluginChain;

use crate::error::DispatchError;
use crate::model::DestinationType;

const BASE_BACKOFF: Duration = Duration::from_secs(15);
const MAX_BACKOFF: Duration = Duration::from_secs(2 * 60 * 60);
const MAX_WEBHOOK_ATTEMPTS: u32 = 10;
const FILTER_WARN_TIMEOUT: Duration = Duration::from_secs(5);

/// One event-dispatch unit of work.
#[derive(Debug, Clone)]
pub struct EventTask {
    pub routing_key: String,
    pub payload: Value,
    pub base_url: String,
    pub destination_type: DestinationType,
}

/// One webhook-dispatch unit of work.
#[derive(Debug, Clone)]
pub struct WebhookTask {
    pub url: String,
    pub payload: Value,
}

fn exponential_backoff(attempt: u32) -> Duration {
    let scaled = BASE_BACKOFF.saturating_mul(1u32 << attempt.min(16));
    scaled.min(MAX_BACKOFF)
}

fn throttled_backoff(attempt: u32) -> Duration {
    let jitter: f64 = rand::thread_rng().gen_range(3.0..5.0);
    Duration::from_secs_f64(jitter * f64::from(attempt + 1))
}

async fn post_once(client: &reqwest::Client, url: &str, payload: &Value) -> Result<(), DispatchError> {
    let response = client.post(url).json(payload).send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(DispatchError::Throttled);
    }
    if status.is_client_error() {
        return Err(DispatchError::ClientInvalid(status.as_u16()));
    }
    Err(DispatchError::ServerError(status.as_u16()))
}

/// Await `fut` with a warning logged if it exceeds 5 seconds, but never
/// cancel it: the pre-dispatch filtering timeout is advisory-only.
async fn await_with_warning<F, T>(fut: F, what: &str) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::pin!(fut);
    match tokio::time::timeout(FILTER_WARN_TIMEOUT, &mut fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!(%what, "plugin filter exceeded 5s, still awaiting it");
            fut.await
        }
    }
}

/// Send one event, at-least-once, with unbounded retry: transient and
/// throttled failures are retried forever. Returns once the request
/// succeeds or is dropped as a permanent client error.
pub async fn send_event(client: &reqwest::Client, plugins: &PluginChain, task: EventTask) {
    let filtered = await_with_warning(
        plugins.filter_event(task.payload, Some(task.routing_key.clone()), None),
        "filter_event",
    )
    .await;
    let Some((payload, routing_key, destination_type)) = filtered else {
        warn!(routing_key = %task.routing_key, "event suppressed by plugin chain");
        return;
    };
    let routing_key = routing_key.unwrap_or(task.routing_key);
    let destination_type = destination_type
        .map(|d| DestinationType::parse(&d))
        .unwrap_or(task.destination_type);
    let url = destination_type.url(&task.base_url, &routing_key);

    let mut attempt: u32 = 0;
    loop {
        match post_once(client, &url, &payload).await {
            Ok(()) => return,
            Err(DispatchError::ClientInvalid(status)) => {
                warn!(status, url = %url, "event dispatch permanently failed, dropping");
                return;
            }
            Err(DispatchError::Throttled) => {
                let wait = throttled_backoff(attempt);
                warn!(attempt, ?wait, url = %url, "event dispatch throttled (429), retrying");
                tokio::time::sleep(wait).await;
            }
            Err(err) => {
                let wait = exponential_backoff(attempt);
                warn!(attempt, error = %err, ?wait, url = %url, "event dispatch failed, retrying");
                tokio::time::sleep(wait).await;
            }
        }
        attempt += 1;
    }
}

/// Send one webhook notification, capped at 10 attempts.
pub async fn send_webhook(client: &reqwest::Client, plugins: &PluginChain, task: WebhookTask) {
    let filtered = await_with_warning(plugins.filter_webhook(task.payload, Some(task.url.clone())), "filter_webhook").await;
    let Some((payload, url)) = filtered else {
        warn!(url = %task.url, "webhook suppressed by plugin chain");
        return;
    };
    let url = url.unwrap_or(task.url);

    let mut attempt: u32 = 0;
    loop {
        match post_once(client, &url, &payload).await {
            Ok(()) => return,
            Err(DispatchError::ClientInvalid(status)) => {
                warn!(status, url = %url, "webhook dispatch permanently failed, dropping");
                return;
            }
            Err(err) => {
                if attempt + 1 >= MAX_WEBHOOK_ATTEMPTS {
                    warn!(attempt, error = %err, url = %url, "webhook dispatch exhausted retries, dropping");
                    return;
                }
                let wait = match err {
                    DispatchError::Throttled => throttled_backoff(attempt),
                    _ => exponential_backoff(attempt),
                };
                warn!(attempt, error = %err, ?wait, url = %url, "webhook dispatch failed, retrying");
                tokio::time::sleep(wait).await;
            }
        }
        attempt += 1;
    }
}

/// Background worker pool for event dispatch. Cross-event ordering is not
/// guaranteed, so a shared queue consumed by N workers is sufficient.
pub struct EventWorkers {
    sender: mpsc::UnboundedSender<EventTask>,
}

impl EventWorkers {
    /// Spawn `worker_count` tasks draining a shared queue.
    pub fn spawn(client: reqwest::Client, plugins: Arc<PluginChain>, worker_count: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<EventTask>();
        let rx = Arc::new(Mutex::new(rx));
        for _ in 0..worker_count.max(1) {
            let client = client.clone();
            let plugins = Arc::clone(&plugins);
            let rx = Arc::clone(&rx);
            tokio::spawn(async move {
                loop {
                    let task = {
                        let mut guard = rx.lock().await;
                        guard.recv().await
                    };
                    match task {
                        Some(task) => send_event(&client, &plugins, task).await,
                        None => break,
                    }
                }
            });
        }
        Self { sender: tx }
    }

    /// Enqueue an event for dispatch by one of the worker tasks.
    pub fn enqueue(&self, task: EventTask) {
        let _ = self.sender.send(task);
    }
}

/// Per-incident ordered webhook delivery: one sequential
/// chain per incident id, chains run concurrently with each other.
pub struct IncidentChains {
    client: reqwest::Client,
    plugins: Arc<PluginChain>,
}

impl IncidentChains {
    pub fn new(client: reqwest::Client, plugins: Arc<PluginChain>) -> Self {
        Self { client, plugins }
    }

    /// Launch a chain for one incident: `tasks` are delivered strictly in
    /// order; this call returns immediately, the chain runs in the
    /// background.
    pub fn launch(&self, tasks: Vec<WebhookTask>) {
        let client = self.client.clone();
        let plugins = Arc::clone(&self.plugins);
        tokio::spawn(async move {
            for task in tasks {
                send_webhook(&client, &plugins, task).await;
            }
        });
    }
}
