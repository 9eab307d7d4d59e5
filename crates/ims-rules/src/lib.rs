// SPDX-License-Identifier: Apache-2.0
//! Rule store, enrichment engine, maintenance evaluator, and correlation
//! tagger for the IMS gateway.

pub mod correlation;
pub mod enrich;
pub mod error;
pub mod maintenance;
pub mod model;
pub mod store;

pub use enrich::{enrich, EnrichConfig};
pub use error::{RuleSourceError, RulesError};
pub use model::{
    CompositionRule, CompositionTarget, CorrelationRule, ExtractionRule, Frequency, FrequencyData,
    MappingRule, MappingTable, MaintenanceWindow, QueryTag, ResultTag, Rule, RuleBody, Ruleset,
    RulesetType, TableRow,
};
pub use store::{RuleSource, RuleStore, Snapshot, DEFAULT_REFRESH_INTERVAL};
