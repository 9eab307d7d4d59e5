// SPDX-License-Identifier: Apache-2.0
//! Bridges the rule-driven enrichment engine into the plugin chain: the
//! rewrite it performs is itself the first filter every event passes
//! through, ahead of any operator-supplied plugin.

use async_trait::async_trait;

use ims_plugins::{EventOutcome, PluginFilter};
use ims_rules::{EnrichConfig, RuleSource, RuleStore};

pub struct EnrichmentPlugin<S> {
    store: std::sync::Arc<RuleStore<S>>,
    config: EnrichConfig,
}

impl<S> EnrichmentPlugin<S> {
    pub fn new(store: std::sync::Arc<RuleStore<S>>, config: EnrichConfig) -> Self {
        Self { store, config }
    }
}

#[async_trait]
impl<S: RuleSource + 'static> PluginFilter for EnrichmentPlugin<S> {
    fn name(&self) -> &'static str {
        "enrichment"
    }

    fn order(&self) -> i32 {
        0 // runs before any user-supplied filter
    }

    async fn filter_event(
        &self,
        mut event: serde_json::Value,
        routing_key: Option<String>,
        destination_type: Option<String>,
    ) -> anyhow::Result<EventOutcome> {
        let snapshot = self.store.snapshot();
        ims_rules::enrich(&mut event, &snapshot, &self.config);
        Ok(EventOutcome::Continue {
            event,
            routing_key,
            destination_type,
            stop: false,
        })
    }
}
