// SPDX-License-Identifier: Apache-2.0
//! Rule store: loads, orders, and caches rulesets, mapping tables,
//! maintenance windows, and correlation rules behind an atomically-swapped
//! snapshot.
//!
//! The backing collaborator (document store) is out of scope; this
//! module defines the [`RuleSource`] port and an in-memory snapshot cache,
//! grounded on `echo-app-core::config`'s store/service split and
//! `echo-sched::Scheduler`'s tick-loop shape for the periodic refresh.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use tracing::{info, instrument, warn};

use crate::error::RuleSourceError;
use crate::model::{CorrelationRule, MappingTable, MaintenanceWindow, Ruleset};

/// Default refresh cadence, per: "reloaded on timer (default one hour)".
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(3600);

/// A read-only, point-in-time view of all loaded rules.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Rulesets, each already sorted by `order`.
    pub rulesets: Vec<Ruleset>,
    /// Mapping tables keyed by name.
    pub mapping_tables: HashMap<String, MappingTable>,
    /// All maintenance windows.
    pub maintenance_windows: Vec<MaintenanceWindow>,
    /// Correlation rules, sorted by `order`.
    pub correlation_rules: Vec<CorrelationRule>,
}

/// Port to the backing collaborator that persists rules (a document store
/// in production; an in-memory fixture in tests). CRUD writes happen
/// through this same collaborator out-of-process; the store only reads.
#[async_trait]
pub trait RuleSource: Send + Sync {
    /// Load every ruleset with `active=true` rules only, unsorted.
    async fn load_rulesets(&self) -> Result<Vec<Ruleset>, RuleSourceError>;
    /// Load every mapping table.
    async fn load_mapping_tables(&self) -> Result<Vec<MappingTable>, RuleSourceError>;
    /// Load every maintenance window.
    async fn load_maintenance_windows(&self) -> Result<Vec<MaintenanceWindow>, RuleSourceError>;
    /// Load every correlation rule, unsorted.
    async fn load_correlation_rules(&self) -> Result<Vec<CorrelationRule>, RuleSourceError>;
}

/// Caches a [`Snapshot`] behind an atomically-swapped pointer so readers
/// never block on a refresh in progress.
pub struct RuleStore<S> {
    source: S,
    snapshot: ArcSwap<Snapshot>,
}

impl<S: RuleSource> RuleStore<S> {
    /// Create a store with an empty snapshot; call [`Self::load`] before
    /// serving traffic.
    pub fn new(source: S) -> Self {
        Self {
            source,
            snapshot: ArcSwap::from_pointee(Snapshot::default()),
        }
    }

    /// Current snapshot. Cheap: an `Arc` clone, never blocks on a refresh.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.load_full()
    }

    /// Load (or reload) everything from the source, sort rulesets and
    /// correlation rules by `order`, and atomically swap in the new
    /// snapshot. Triggered on startup, on a refresh-interval tick, on
    /// explicit invalidate, or after a CRUD write through the
    /// administrative API.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<(), RuleSourceError> {
        let mut rulesets = self.source.load_rulesets().await?;
        for ruleset in &mut rulesets {
            ruleset.sort();
        }

        let tables = self.source.load_mapping_tables().await?;
        let mapping_tables = tables.into_iter().map(|t| (t.name.clone(), t)).collect();

        let maintenance_windows = self.source.load_maintenance_windows().await?;

        let mut correlation_rules = self.source.load_correlation_rules().await?;
        correlation_rules.sort_by_key(|c| c.order);

        let snapshot = Snapshot {
            rulesets,
            mapping_tables,
            maintenance_windows,
            correlation_rules,
        };
        info!(
            rulesets = snapshot.rulesets.len(),
            tables = snapshot.mapping_tables.len(),
            windows = snapshot.maintenance_windows.len(),
            correlations = snapshot.correlation_rules.len(),
            "rule store snapshot refreshed"
        );
        self.snapshot.store(Arc::new(snapshot));
        Ok(())
    }

    /// Run a background refresh loop at `interval`, logging (not
    /// propagating) load failures so a transient backing-store outage
    /// never kills the process; readers keep serving the last-good
    /// snapshot.
    #[instrument(skip(self))]
    pub async fn run_refresh_loop(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately; already loaded at startup
        loop {
            ticker.tick().await;
            if let Err(err) = self.load().await {
                warn!(error = %err, "rule store refresh failed, serving stale snapshot");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Rule, RuleBody, RulesetType};

    struct FixedSource {
        rulesets: Vec<Ruleset>,
    }

    #[async_trait]
    impl RuleSource for FixedSource {
        async fn load_rulesets(&self) -> Result<Vec<Ruleset>, RuleSourceError> {
            Ok(self.rulesets.clone())
        }
        async fn load_mapping_tables(&self) -> Result<Vec<MappingTable>, RuleSourceError> {
            Ok(Vec::new())
        }
        async fn load_maintenance_windows(&self) -> Result<Vec<MaintenanceWindow>, RuleSourceError> {
            Ok(Vec::new())
        }
        async fn load_correlation_rules(&self) -> Result<Vec<CorrelationRule>, RuleSourceError> {
            Ok(Vec::new())
        }
    }

    fn rule(id: &str, order: i64) -> Rule {
        Rule {
            id: id.to_string(),
            order,
            active: true,
            when: None,
            selected_source_system: None,
            body: RuleBody::Composition(crate::model::CompositionRule { destinations: vec![] }),
        }
    }

    #[tokio::test]
    async fn load_sorts_rules_by_order() {
        let ruleset = Ruleset {
            name: "rs".to_string(),
            ruleset_type: RulesetType::MatchAll,
            rules: vec![rule("b", 2), rule("a", 1), rule("c", 1)],
        };
        let store = RuleStore::new(FixedSource {
            rulesets: vec![ruleset],
        });
        store.load().await.unwrap();
        let snap = store.snapshot();
        let ids: Vec<&str> = snap.rulesets[0].rules.iter().map(|r| r.id.as_str()).collect();
        // a and c tie at order 1; stable sort keeps insertion order.
        assert_eq!(ids, vec!["a", "c", "b"]);
    }

    #[tokio::test]
    async fn snapshot_reads_never_see_a_partial_load() {
        let store = Arc::new(RuleStore::new(FixedSource { rulesets: vec![] }));
        store.load().await.unwrap();
        let before = store.snapshot();
        store.load().await.unwrap();
        let after = store.snapshot();
        assert_eq!(before.rulesets.len(), after.rulesets.len());
    }
}
