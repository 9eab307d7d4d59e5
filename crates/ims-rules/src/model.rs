// SPDX-License-Identifier: Apache-2.0
//! Rule, ruleset, mapping table, maintenance window, and correlation rule
//! types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use ims_kernel::Condition;

/// A single join key consumed by a [`MappingRule`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryTag {
    /// Field name, used both as the entity path segment and the table's
    /// column name.
    pub tag_name: String,
    /// If `false`, a missing value for this key aborts the rule.
    pub optional: bool,
}

/// A single output field produced by a [`MappingRule`] on a table hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultTag {
    /// Field name, used both as the destination path segment and the
    /// table's column name.
    pub tag_name: String,
    /// If `false`, an existing non-null destination value is preserved.
    pub override_existing: bool,
}

/// A named lookup against an operator-maintained table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingRule {
    /// Name of the referenced table (resolved via [`crate::store::RuleStore`]).
    pub table: String,
    /// Join keys.
    pub query_tags: Vec<QueryTag>,
    /// Output fields.
    pub result_tags: Vec<ResultTag>,
}

/// A single `(destination, value)` pair produced by a [`CompositionRule`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositionTarget {
    /// Destination path.
    pub destination: String,
    /// Literal value or a `${key}`-templated string.
    pub value: Value,
}

/// One or more literal/composed field writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositionRule {
    /// Destinations to write.
    pub destinations: Vec<CompositionTarget>,
}

/// Regex-extract-and-template-fill against a single source field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRule {
    /// Source path.
    pub source: String,
    /// Regex applied to the stringified source.
    pub regex: String,
    /// Template containing `$1..$N` placeholders.
    pub template: String,
    /// Destination path.
    pub destination: String,
}

/// The operation a [`Rule`] performs, tagged by kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleBody {
    /// Table lookup.
    Mapping(MappingRule),
    /// Literal/interpolated field writes.
    Composition(CompositionRule),
    /// Regex extraction into a template.
    Extraction(ExtractionRule),
}

/// One enrichment rule: a body plus the conditions gating it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// Stable identifier, used in debug traces and logs.
    pub id: String,
    /// Sort key within the ruleset; ties break by insertion order.
    pub order: i64,
    /// Only active (loaded) rules are ever present in a snapshot.
    pub active: bool,
    /// Guard condition; `None` always passes.
    pub when: Option<Condition>,
    /// Broken-regex-flagged pattern tested against `source_system`.
    pub selected_source_system: Option<String>,
    /// The rule's operation.
    pub body: RuleBody,
}

/// How a [`Ruleset`] stops iterating its rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RulesetType {
    /// Stop after the first rule that successfully applies.
    MatchFirst,
    /// Run every matching rule.
    MatchAll,
}

/// An ordered, typed collection of rules, sorted by `order` on every load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ruleset {
    /// Human name, used for trace/log output only.
    pub name: String,
    /// Stop-after-first vs run-all.
    pub ruleset_type: RulesetType,
    /// Rules, sorted ascending by `order` (stable: ties keep insertion order).
    pub rules: Vec<Rule>,
}

impl Ruleset {
    /// Sort rules by `order`, breaking ties by the existing (insertion) order.
    pub fn sort(&mut self) {
        self.rules.sort_by_key(|r| r.order);
    }
}

/// A row in an operator-maintained mapping table.
pub type TableRow = Map<String, Value>;

/// A named lookup table: an unordered bag of rows, queried by exact-match
/// join keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappingTable {
    /// Table name, referenced by [`MappingRule::table`].
    pub name: String,
    /// Rows.
    pub rows: Vec<TableRow>,
}

impl MappingTable {
    /// Find the first row whose fields match every entry in `query` exactly.
    pub fn lookup(&self, query: &Map<String, Value>) -> Option<&TableRow> {
        self.rows.iter().find(|row| {
            query
                .iter()
                .all(|(k, v)| row.get(k).map(|rv| rv == v).unwrap_or(false))
        })
    }
}

/// Recurrence for a [`MaintenanceWindow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    /// Active exactly once, between `start` and `end`.
    Once,
    /// Active daily, for `duration` seconds after each day's anchor.
    Daily,
    /// Active weekly, for `duration` seconds after each week's anchor.
    Weekly,
}

/// Recurrence parameters for `daily`/`weekly` windows.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FrequencyData {
    /// Active-slot length in seconds after each recurrence anchor.
    pub duration: Option<i64>,
}

/// A timed suppression predicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceWindow {
    /// Stable identifier.
    pub id: String,
    /// Operator-facing maintenance key (grouping label).
    pub maintenance_key: String,
    /// Human name.
    pub name: String,
    /// Unix seconds (UTC).
    pub start: i64,
    /// Unix seconds (UTC).
    pub end: i64,
    /// Recurrence.
    pub frequency: Frequency,
    /// Recurrence parameters.
    pub frequency_data: FrequencyData,
    /// Predicate; `None` always passes.
    pub condition: Option<Condition>,
}

/// A correlation rule: derives a synthetic correlation key from sorted
/// tag paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationRule {
    /// Stable identifier.
    pub id: String,
    /// BPQL filter text; only matching records produce a correlation.
    pub filter: String,
    /// Field paths to read and join, sorted lexicographically before use.
    pub tags: Vec<String>,
    /// Sort key among correlation rules.
    pub order: i64,
}
