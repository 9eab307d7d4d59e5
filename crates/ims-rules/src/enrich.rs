// SPDX-License-Identifier: Apache-2.0
//! Enrichment engine: applies ordered rulesets of mapping, composition,
//! and extraction rules to a record, then runs the maintenance evaluator
//! and correlation tagger and prunes falsy values.

use std::sync::OnceLock;

use chrono_tz::Tz;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::warn;

use ims_kernel::{bpql, path, regex_fix, Record};

use crate::correlation;
use crate::maintenance;
use crate::model::{CompositionRule, ExtractionRule, MappingRule, Rule, RuleBody, Ruleset, RulesetType};
use crate::store::Snapshot;

/// Per-process enrichment configuration: the prepend-prefix, debug tracing,
/// and the IANA time zone used for human-readable maintenance timestamps.
#[derive(Debug, Clone)]
pub struct EnrichConfig {
    /// Prepended to every non-absolute rule path.
    pub prepend_prefix: String,
    /// When set, every write also deposits a sibling trace under
    /// `enrichments.<destination>`.
    pub debug_trace: bool,
    /// Time zone for rendering maintenance-window timestamps.
    pub timezone: Tz,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            prepend_prefix: String::new(),
            debug_trace: false,
            timezone: Tz::UTC,
        }
    }
}

/// Run the full pipeline: enrichment rulesets, maintenance tagging,
/// correlation tagging, then falsy-value pruning.
pub fn enrich(record: &mut Record, snapshot: &Snapshot, cfg: &EnrichConfig) {
    for ruleset in &snapshot.rulesets {
        apply_ruleset(record, ruleset, snapshot, cfg);
    }

    let now = chrono::Utc::now().timestamp();
    let (in_maint, windows) = maintenance::evaluate(
        record,
        &snapshot.maintenance_windows,
        &cfg.prepend_prefix,
        now,
    );
    let is_maint_path = format!("{}is_in_maint", cfg.prepend_prefix);
    let _ = path::set(record, &is_maint_path, Value::Bool(in_maint));
    if in_maint {
        let rendered: Vec<_> = windows
            .iter()
            .map(|w| maintenance::render_window_human(w, &cfg.timezone))
            .collect();
        if let Ok(value) = serde_json::to_value(rendered) {
            let summary_path = format!("{}maintenance_windows_applied", cfg.prepend_prefix);
            let _ = path::set(record, &summary_path, value);
        }
    }

    correlation::tag(record, &snapshot.correlation_rules, &cfg.prepend_prefix);

    *record = prune_falsy(std::mem::take(record));
}

fn apply_ruleset(record: &mut Record, ruleset: &Ruleset, snapshot: &Snapshot, cfg: &EnrichConfig) {
    for rule in &ruleset.rules {
        if !source_system_selects(record, rule, cfg) {
            continue;
        }
        if !bpql::evaluate(rule.when.as_ref(), record, &cfg.prepend_prefix) {
            continue;
        }
        let wrote = apply_rule_body(record, rule, snapshot, cfg);
        if wrote {
            tracing::trace!(ruleset = %ruleset.name, rule_id = %rule.id, "rule applied");
            if ruleset.ruleset_type == RulesetType::MatchFirst {
                break;
            }
        }
    }
}

fn source_system_selects(record: &Record, rule: &Rule, cfg: &EnrichConfig) -> bool {
    let Some(pattern) = &rule.selected_source_system else {
        return true;
    };
    let field_path = path::make_path(&cfg.prepend_prefix, "source_system");
    let value = path::stringify(path::get(record, &field_path));
    match regex_fix::compile_broken_ci(pattern) {
        Ok(re) => re.is_match(&value),
        Err(err) => {
            warn!(rule_id = %rule.id, error = %err, "selected_source_system pattern invalid, skipping rule");
            false
        }
    }
}

fn apply_rule_body(record: &mut Record, rule: &Rule, snapshot: &Snapshot, cfg: &EnrichConfig) -> bool {
    match &rule.body {
        RuleBody::Mapping(mapping) => apply_mapping(record, rule, mapping, snapshot, cfg),
        RuleBody::Composition(composition) => apply_composition(record, rule, composition, cfg),
        RuleBody::Extraction(extraction) => apply_extraction(record, rule, extraction, cfg),
    }
}

fn apply_mapping(
    record: &mut Record,
    rule: &Rule,
    mapping: &MappingRule,
    snapshot: &Snapshot,
    cfg: &EnrichConfig,
) -> bool {
    let mut query = Map::new();
    for tag in &mapping.query_tags {
        let field_path = path::make_path(&cfg.prepend_prefix, &tag.tag_name);
        let value = path::get(record, &field_path);
        if value.is_null() {
            if !tag.optional {
                return false; // non-optional missing join key aborts the rule
            }
            continue;
        }
        query.insert(tag.tag_name.clone(), value.clone());
    }
    if query.is_empty() {
        return false;
    }

    let Some(table) = snapshot.mapping_tables.get(&mapping.table) else {
        warn!(rule_id = %rule.id, table = %mapping.table, "mapping table not found");
        return false;
    };
    let Some(row) = table.lookup(&query) else {
        return false;
    };

    let mut wrote = false;
    for tag in &mapping.result_tags {
        let dest_path = path::make_path(&cfg.prepend_prefix, &tag.tag_name);
        if !tag.override_existing && !path::get(record, &dest_path).is_null() {
            continue;
        }
        let Some(value) = row.get(&tag.tag_name) else {
            continue;
        };
        let value = value.clone();
        if path::set(record, &dest_path, value.clone()).is_ok() {
            wrote = true;
            trace_write(record, &cfg.prepend_prefix, &tag.tag_name, &value, "mapping", &rule.id, cfg.debug_trace);
        }
    }
    wrote
}

fn apply_composition(
    record: &mut Record,
    rule: &Rule,
    composition: &CompositionRule,
    cfg: &EnrichConfig,
) -> bool {
    let mut wrote = false;
    for target in &composition.destinations {
        let dest_path = path::make_path(&cfg.prepend_prefix, &target.destination);
        let value = match &target.value {
            Value::String(template) if has_placeholder(template) => {
                let scope = interpolation_scope(record, &cfg.prepend_prefix);
                match scope.and_then(|data| interpolate(template, data)) {
                    Some(filled) => Value::String(filled),
                    None => continue, // missing key aborts only this destination
                }
            }
            other => other.clone(),
        };
        if path::set(record, &dest_path, value.clone()).is_ok() {
            wrote = true;
            trace_write(record, &cfg.prepend_prefix, &target.destination, &value, "composition", &rule.id, cfg.debug_trace);
        }
    }
    wrote
}

fn apply_extraction(
    record: &mut Record,
    rule: &Rule,
    extraction: &ExtractionRule,
    cfg: &EnrichConfig,
) -> bool {
    let source_path = path::make_path(&cfg.prepend_prefix, &extraction.source);
    let source_value = path::get(record, &source_path);
    if source_value.is_null() {
        return false;
    }
    let input = stringify_source(source_value);

    let regex = match Regex::new(&extraction.regex) {
        Ok(re) => re,
        Err(err) => {
            warn!(rule_id = %rule.id, error = %err, "extraction regex invalid");
            return false;
        }
    };
    let Some(captures) = regex.captures(&input) else {
        return false;
    };

    let mut filled = extraction.template.clone();
    for i in 1..captures.len() {
        if let Some(m) = captures.get(i) {
            filled = filled.replace(&format!("${i}"), m.as_str());
        }
    }
    if placeholder_regex().is_match(&filled) {
        return false; // an unfilled $N placeholder means no write
    }

    let dest_path = path::make_path(&cfg.prepend_prefix, &extraction.destination);
    let value = Value::String(filled);
    if path::set(record, &dest_path, value.clone()).is_ok() {
        trace_write(record, &cfg.prepend_prefix, &extraction.destination, &value, "extraction", &rule.id, cfg.debug_trace);
        true
    } else {
        false
    }
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)]
    RE.get_or_init(|| Regex::new(r"\$\d+").unwrap())
}

fn stringify_source(value: &Value) -> String {
    match value {
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
        Value::Array(items) => items
            .iter()
            .map(path::stringify)
            .collect::<Vec<_>>()
            .join("\n"),
        other => path::stringify(other),
    }
}

fn has_placeholder(template: &str) -> bool {
    template.contains("${")
}

fn interpolation_scope<'a>(record: &'a Record, prefix: &str) -> Option<&'a Value> {
    let trimmed = prefix.trim_end_matches('.');
    if trimmed.is_empty() {
        Some(record)
    } else {
        let value = path::get(record, trimmed);
        if value.is_null() {
            None
        } else {
            Some(value)
        }
    }
}

/// Replace every `${key}` in `template` with `data[key]`'s stringified
/// value; `None` if any referenced key is absent, so a partially-filled
/// template is never written.
fn interpolate(template: &str, data: &Value) -> Option<String> {
    let mut out = String::with_capacity(template.len());
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'{') {
            let close = template[i + 2..].find('}')? + i + 2;
            let key = &template[i + 2..close];
            let value = path::get(data, key);
            if value.is_null() {
                return None;
            }
            out.push_str(&path::stringify(value));
            i = close + 1;
        } else {
            out.push(template[i..].chars().next()?);
            i += template[i..].chars().next()?.len_utf8();
        }
    }
    Some(out)
}

#[allow(clippy::too_many_arguments)]
fn trace_write(
    record: &mut Record,
    prefix: &str,
    destination: &str,
    value: &Value,
    rule_type: &str,
    rule_id: &str,
    enabled: bool,
) {
    if !enabled {
        return;
    }
    let dest = destination.trim_start_matches('.');
    let trace_path = format!("{prefix}enrichments.{dest}");
    let trace = serde_json::json!({
        "value": value,
        "rule_type": rule_type,
        "rule_id": rule_id,
    });
    let _ = path::set(record, &trace_path, trace);
}

/// Remove null, empty-string, and empty-container values from `value`,
/// recursively, while keeping `false` and numeric `0`.
pub fn prune_falsy(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut pruned = Map::new();
            for (key, v) in map {
                let v = prune_falsy(v);
                if !is_falsy(&v) {
                    pruned.insert(key, v);
                }
            }
            Value::Object(pruned)
        }
        Value::Array(items) => {
            let items: Vec<Value> = items
                .into_iter()
                .map(prune_falsy)
                .filter(|v| !is_falsy(v))
                .collect();
            Value::Array(items)
        }
        other => other,
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(m) => m.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CompositionTarget, MappingTable, QueryTag, ResultTag, TableRow};
    use serde_json::json;
    use std::collections::HashMap;

    fn rule(id: &str, order: i64, body: RuleBody) -> Rule {
        Rule {
            id: id.to_string(),
            order,
            active: true,
            when: None,
            selected_source_system: None,
            body,
        }
    }

    #[test]
    fn falsy_prune_keeps_false_and_zero() {
        let input = json!({"a": 0, "b": false, "c": null, "d": ""});
        let pruned = prune_falsy(input);
        assert_eq!(pruned, json!({"a": 0, "b": false}));
    }

    #[test]
    fn mapping_hit_writes_owner_unless_overridden() {
        let mut table = MappingTable {
            name: "apps".to_string(),
            rows: vec![],
        };
        let mut row: TableRow = Map::new();
        row.insert("app_id".to_string(), json!("42"));
        row.insert("owner".to_string(), json!("alice"));
        table.rows.push(row);

        let mut mapping_tables = HashMap::new();
        mapping_tables.insert("apps".to_string(), table);

        let snapshot = Snapshot {
            rulesets: vec![],
            mapping_tables,
            maintenance_windows: vec![],
            correlation_rules: vec![],
        };
        let cfg = EnrichConfig::default();

        let mapping_rule = rule(
            "r1",
            0,
            RuleBody::Mapping(MappingRule {
                table: "apps".to_string(),
                query_tags: vec![QueryTag {
                    tag_name: "app_id".to_string(),
                    optional: false,
                }],
                result_tags: vec![ResultTag {
                    tag_name: "owner".to_string(),
                    override_existing: false,
                }],
            }),
        );

        let mut record = json!({"app_id": "42"});
        assert!(apply_mapping(
            &mut record,
            &mapping_rule,
            match &mapping_rule.body {
                RuleBody::Mapping(m) => m,
                _ => unreachable!(),
            },
            &snapshot,
            &cfg
        ));
        assert_eq!(record["owner"], json!("alice"));

        let mut record2 = json!({"app_id": "42", "owner": "bob"});
        assert!(!apply_mapping(
            &mut record2,
            &mapping_rule,
            match &mapping_rule.body {
                RuleBody::Mapping(m) => m,
                _ => unreachable!(),
            },
            &snapshot,
            &cfg
        ));
        assert_eq!(record2["owner"], json!("bob"));
    }

    #[test]
    fn composition_interpolates_and_aborts_destination_on_missing_key() {
        let cfg = EnrichConfig::default();
        let rule = rule(
            "r2",
            0,
            RuleBody::Composition(CompositionRule {
                destinations: vec![CompositionTarget {
                    destination: "summary".to_string(),
                    value: json!("${source}: ${msg}"),
                }],
            }),
        );
        let composition = match &rule.body {
            RuleBody::Composition(c) => c,
            _ => unreachable!(),
        };

        let mut record = json!({"source": "db1", "msg": "down"});
        assert!(apply_composition(&mut record, &rule, composition, &cfg));
        assert_eq!(record["summary"], json!("db1: down"));

        let mut record2 = json!({"source": "db1"});
        assert!(!apply_composition(&mut record2, &rule, composition, &cfg));
        assert!(record2.get("summary").is_none());
    }

    #[test]
    fn extraction_fills_template_from_captures() {
        let cfg = EnrichConfig::default();
        let rule = rule(
            "r3",
            0,
            RuleBody::Extraction(ExtractionRule {
                source: "host".to_string(),
                regex: r"^host-(\d+)-(\w+)$".to_string(),
                template: "$2/$1".to_string(),
                destination: "tag".to_string(),
            }),
        );
        let extraction = match &rule.body {
            RuleBody::Extraction(e) => e,
            _ => unreachable!(),
        };
        let mut record = json!({"host": "host-42-prod"});
        assert!(apply_extraction(&mut record, &rule, extraction, &cfg));
        assert_eq!(record["tag"], json!("prod/42"));
    }

    #[test]
    fn extraction_atomicity_on_unfilled_placeholder() {
        let cfg = EnrichConfig::default();
        let rule = rule(
            "r4",
            0,
            RuleBody::Extraction(ExtractionRule {
                source: "host".to_string(),
                regex: r"^host-(\d+)$".to_string(),
                template: "$1/$2".to_string(),
                destination: "tag".to_string(),
            }),
        );
        let extraction = match &rule.body {
            RuleBody::Extraction(e) => e,
            _ => unreachable!(),
        };
        let mut record = json!({"host": "host-42"});
        assert!(!apply_extraction(&mut record, &rule, extraction, &cfg));
        assert!(record.get("tag").is_none());
    }

    #[test]
    fn match_first_ruleset_stops_after_first_write() {
        let r1 = rule(
            "a",
            0,
            RuleBody::Composition(CompositionRule {
                destinations: vec![CompositionTarget {
                    destination: "x".to_string(),
                    value: json!("first"),
                }],
            }),
        );
        let r2 = rule(
            "b",
            1,
            RuleBody::Composition(CompositionRule {
                destinations: vec![CompositionTarget {
                    destination: "x".to_string(),
                    value: json!("second"),
                }],
            }),
        );
        let ruleset = Ruleset {
            name: "rs".to_string(),
            ruleset_type: RulesetType::MatchFirst,
            rules: vec![r1, r2],
        };
        let snapshot = Snapshot {
            rulesets: vec![ruleset],
            mapping_tables: HashMap::new(),
            maintenance_windows: vec![],
            correlation_rules: vec![],
        };
        let cfg = EnrichConfig::default();
        let mut record = json!({});
        apply_ruleset(&mut record, &snapshot.rulesets[0], &snapshot, &cfg);
        assert_eq!(record["x"], json!("first"));
    }
}
