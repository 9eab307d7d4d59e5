// SPDX-License-Identifier: Apache-2.0
//! Plugin chain: ordered user-supplied filters run over events and
//! webhooks before dispatch, plus scheduled event sources.
//!
//! A "plugin" here is anything implementing [`PluginFilter`], registered at
//! process startup in a fixed list — native Rust has no analogue to
//! dynamically importing a Python module, so load order becomes
//! registration order (see DESIGN.md).

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use ims_kernel::is_integration_key;

use crate::error::PluginError;

/// Outcome of `filter_event`, expressed as a typed enum instead of a
/// variadic tuple return.
#[derive(Debug, Clone)]
pub enum EventOutcome {
    /// `null`: suppress the event; the pipeline stops.
    Suppress,
    /// The (possibly updated) event, with optional routing-key and
    /// destination-type overrides, and whether the chain should stop here.
    Continue {
        /// The new event payload.
        event: Value,
        /// Overridden routing key, if any.
        routing_key: Option<String>,
        /// Overridden destination type, if any.
        destination_type: Option<String>,
        /// If true, end the chain with this event accepted.
        stop: bool,
    },
}

/// Outcome of `filter_webhook`: `(webhook, url?, stop?)`.
#[derive(Debug, Clone)]
pub enum WebhookOutcome {
    /// `null`: suppress the webhook.
    Suppress,
    /// The (possibly updated) webhook payload, optional URL override, and
    /// stop flag.
    Continue {
        /// The new webhook payload.
        webhook: Value,
        /// Overridden destination URL, if any.
        url: Option<String>,
        /// If true, end the chain with this webhook accepted.
        stop: bool,
    },
}

/// A plugin's declared fetch-events schedule: either a cron
/// expression or a fixed interval in seconds.
#[derive(Debug, Clone)]
pub enum FetchSchedule {
    /// `m h dom mon dow`.
    Cron(String),
    /// Fixed interval.
    Interval(Duration),
}

impl Default for FetchSchedule {
    fn default() -> Self {
        Self::Interval(Duration::from_secs(10))
    }
}

/// A user-supplied filter/source, registered once at startup. Every method
/// has a default no-op implementation so a plugin implements only the
/// operations it needs.
#[async_trait]
pub trait PluginFilter: Send + Sync {
    /// Stable name, used in logs and error messages.
    fn name(&self) -> &'static str;

    /// Sort key; ties break by registration order. Plugins that
    /// don't care return the default of 100.
    fn order(&self) -> i32 {
        100
    }

    /// Filter (and possibly rewrite) an outbound event before dispatch.
    /// The default passes the event through unchanged.
    async fn filter_event(
        &self,
        event: Value,
        routing_key: Option<String>,
        destination_type: Option<String>,
    ) -> anyhow::Result<EventOutcome> {
        Ok(EventOutcome::Continue {
            event,
            routing_key,
            destination_type,
            stop: false,
        })
    }

    /// Filter (and possibly rewrite) an outbound webhook before dispatch.
    async fn filter_webhook(&self, webhook: Value, url: Option<String>) -> anyhow::Result<WebhookOutcome> {
        Ok(WebhookOutcome::Continue {
            webhook,
            url,
            stop: false,
        })
    }

    /// A scheduled event source. Plugins that don't define one return `None`.
    fn fetch_schedule(&self) -> Option<FetchSchedule> {
        None
    }

    /// Fetch a batch of events on this plugin's schedule. Only called if
    /// [`Self::fetch_schedule`] returns `Some`.
    async fn fetch_events(&self) -> anyhow::Result<Vec<Value>> {
        Ok(Vec::new())
    }
}

/// The ordered set of registered plugins: sorted by `order`, ties
/// broken by registration order.
pub struct PluginChain {
    plugins: Vec<Box<dyn PluginFilter>>,
}

impl PluginChain {
    /// Register `plugins` in the given order, then stably sort by
    /// declared `order` (absent/invalid already normalized to 999 by the
    /// plugin's own [`PluginFilter::order`] implementation).
    pub fn new(mut plugins: Vec<Box<dyn PluginFilter>>) -> Self {
        plugins.sort_by_key(|p| p.order());
        Self { plugins }
    }

    /// Run every plugin's `filter_event` in order. A plugin erroring or
    /// returning an invalid shape is logged and skipped so one bad plugin
    /// can't take down the chain; the pipeline continues with the
    /// pre-filter value.
    pub async fn filter_event(
        &self,
        mut event: Value,
        mut routing_key: Option<String>,
        mut destination_type: Option<String>,
    ) -> Option<(Value, Option<String>, Option<String>)> {
        for plugin in &self.plugins {
            let outcome = match plugin
                .filter_event(event.clone(), routing_key.clone(), destination_type.clone())
                .await
            {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(plugin = plugin.name(), error = %err, "plugin filter_event failed, skipping");
                    continue;
                }
            };
            match outcome {
                EventOutcome::Suppress => return None,
                EventOutcome::Continue {
                    event: new_event,
                    routing_key: new_key,
                    destination_type: new_dest,
                    stop,
                } => {
                    if let Some(key) = &new_key {
                        if !is_integration_key(key) {
                            warn!(plugin = plugin.name(), "filter_event returned an invalid routing key, skipping plugin");
                            continue;
                        }
                    }
                    if let Some(dest) = &new_dest {
                        if dest.is_empty() {
                            warn!(plugin = plugin.name(), "filter_event returned an empty destination type, skipping plugin");
                            continue;
                        }
                    }
                    event = new_event;
                    routing_key = new_key.or(routing_key);
                    destination_type = new_dest.or(destination_type);
                    if stop {
                        break;
                    }
                }
            }
        }
        Some((event, routing_key, destination_type))
    }

    /// Run every plugin's `filter_webhook` in order, analogous to
    /// [`Self::filter_event`].
    pub async fn filter_webhook(&self, mut webhook: Value, mut url: Option<String>) -> Option<(Value, Option<String>)> {
        for plugin in &self.plugins {
            let outcome = match plugin.filter_webhook(webhook.clone(), url.clone()).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(plugin = plugin.name(), error = %err, "plugin filter_webhook failed, skipping");
                    continue;
                }
            };
            match outcome {
                WebhookOutcome::Suppress => return None,
                WebhookOutcome::Continue {
                    webhook: new_webhook,
                    url: new_url,
                    stop,
                } => {
                    if let Some(candidate) = &new_url {
                        if url::Url::parse(candidate).is_err() {
                            warn!(plugin = plugin.name(), "filter_webhook returned a malformed URL, skipping plugin");
                            continue;
                        }
                    }
                    webhook = new_webhook;
                    url = new_url.or(url);
                    if stop {
                        break;
                    }
                }
            }
        }
        Some((webhook, url))
    }

    /// Indices of every registered plugin that defines a fetch schedule, in
    /// registration/priority order. Indices rather than references so a
    /// caller can hold the chain by `Arc` and borrow each plugin for the
    /// lifetime of its own spawned task instead of `self`'s.
    pub fn fetch_targets(&self) -> Vec<usize> {
        self.plugins
            .iter()
            .enumerate()
            .filter(|(_, p)| p.fetch_schedule().is_some())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn plugin_at(&self, index: usize) -> &dyn PluginFilter {
        self.plugins[index].as_ref()
    }
}

/// Validate a `filter_event` tuple's routing-key/destination-type shape
/// directly, for callers (tests, adapters) constructing plugin returns by
/// hand rather than through [`PluginFilter`].
pub fn validate_event_return(
    routing_key: Option<&str>,
    destination_type: Option<&str>,
) -> Result<(), PluginError> {
    if let Some(key) = routing_key {
        if !is_integration_key(key) {
            return Err(PluginError::BadReturn {
                plugin: "unknown",
                op: "filter_event",
                reason: format!("invalid routing key {key:?}"),
            });
        }
    }
    if let Some(dest) = destination_type {
        if dest.is_empty() {
            return Err(PluginError::BadReturn {
                plugin: "unknown",
                op: "filter_event",
                reason: "destination type is empty".to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Passthrough;
    #[async_trait]
    impl PluginFilter for Passthrough {
        fn name(&self) -> &'static str {
            "passthrough"
        }
    }

    struct Suppressor;
    #[async_trait]
    impl PluginFilter for Suppressor {
        fn name(&self) -> &'static str {
            "suppressor"
        }
        fn order(&self) -> i32 {
            50
        }
        async fn filter_event(
            &self,
            _event: Value,
            _routing_key: Option<String>,
            _destination_type: Option<String>,
        ) -> anyhow::Result<EventOutcome> {
            Ok(EventOutcome::Suppress)
        }
    }

    struct Failing;
    #[async_trait]
    impl PluginFilter for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn order(&self) -> i32 {
            10
        }
        async fn filter_event(
            &self,
            _event: Value,
            _routing_key: Option<String>,
            _destination_type: Option<String>,
        ) -> anyhow::Result<EventOutcome> {
            anyhow::bail!("boom")
        }
    }

    #[tokio::test]
    async fn passthrough_leaves_event_unchanged() {
        let chain = PluginChain::new(vec![Box::new(Passthrough)]);
        let result = chain
            .filter_event(json!({"a": 1}), Some("0123456789abcdef0123456789abcdef".to_string()), None)
            .await;
        assert!(result.is_some());
    }

    #[tokio::test]
    async fn suppressor_stops_the_pipeline() {
        let chain = PluginChain::new(vec![Box::new(Passthrough), Box::new(Suppressor)]);
        let result = chain.filter_event(json!({"a": 1}), None, None).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn failing_plugin_is_skipped_and_chain_continues() {
        let chain = PluginChain::new(vec![Box::new(Failing), Box::new(Passthrough)]);
        let result = chain.filter_event(json!({"a": 1}), None, None).await;
        assert_eq!(result.unwrap().0, json!({"a": 1}));
    }

    #[tokio::test]
    async fn chain_runs_in_order_by_declared_priority() {
        static ORDER: AtomicUsize = AtomicUsize::new(0);

        struct Recorder(i32, usize);
        #[async_trait]
        impl PluginFilter for Recorder {
            fn name(&self) -> &'static str {
                "recorder"
            }
            fn order(&self) -> i32 {
                self.0
            }
            async fn filter_event(
                &self,
                event: Value,
                routing_key: Option<String>,
                destination_type: Option<String>,
            ) -> anyhow::Result<EventOutcome> {
                assert_eq!(ORDER.fetch_add(1, Ordering::SeqCst), self.1);
                Ok(EventOutcome::Continue {
                    event,
                    routing_key,
                    destination_type,
                    stop: false,
                })
            }
        }

        let chain = PluginChain::new(vec![Box::new(Recorder(50, 1)), Box::new(Recorder(10, 0))]);
        chain.filter_event(json!({}), None, None).await;
        assert_eq!(ORDER.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn validate_event_return_rejects_bad_routing_key() {
        assert!(validate_event_return(Some("not-a-key"), None).is_err());
        assert!(validate_event_return(Some("0123456789abcdef0123456789abcdef"), None).is_ok());
    }
}
