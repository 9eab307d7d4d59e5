// SPDX-License-Identifier: Apache-2.0
//! Placeholder [`RuleSource`] until a document-store-backed implementation
//! is wired in; the backing collaborator is explicitly out of scope.

use async_trait::async_trait;

use ims_rules::{CorrelationRule, MappingTable, MaintenanceWindow, RuleSource, RuleSourceError, Ruleset};

/// Serves an empty snapshot. Replace with a real [`RuleSource`] against
/// whatever document store holds operator-authored rules.
pub struct EmptyRuleSource;

#[async_trait]
impl RuleSource for EmptyRuleSource {
    async fn load_rulesets(&self) -> Result<Vec<Ruleset>, RuleSourceError> {
        Ok(Vec::new())
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
