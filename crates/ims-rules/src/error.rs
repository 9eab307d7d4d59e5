// SPDX-License-Identifier: Apache-2.0
//! Error types for the rule store and enrichment engine.

use thiserror::Error;

/// Errors surfaced while loading rules or applying them to a record.
///
/// Per the propagation policy: a malformed rule or condition never
/// aborts the record being enriched. Callers that receive [`RulesError`]
/// from [`crate::enrich::enrich`] paths log it and move to the next rule;
/// only [`RuleSourceError`] (failure to load a snapshot at all) is fatal to
/// a refresh cycle.
#[derive(Debug, Error)]
pub enum RulesError {
    /// An unparseable rule, condition, or regex. The owning rule is skipped.
    #[error("rule {rule_id} malformed: {reason}")]
    RuleMalformed {
        /// The offending rule's id.
        rule_id: String,
        /// Human-readable reason.
        reason: String,
    },

    /// A path accessor error while applying a rule.
    #[error(transparent)]
    Kernel(#[from] ims_kernel::KernelError),
}

/// Errors raised while loading a rule-store snapshot from its backing
/// collaborator (the document store is out of scope; this crate
/// only defines the trait and an in-memory test double).
#[derive(Debug, Error)]
pub enum RuleSourceError {
    /// The backing store is unreachable or returned malformed data.
    #[error("failed to load {what}: {reason}")]
    LoadFailed {
        /// What was being loaded (rulesets, tables, windows, correlations).
        what: &'static str,
        /// Human-readable reason.
        reason: String,
    },
}
