// SPDX-License-Identifier: Apache-2.0
//! Correlation tagger: derives per-rule correlation keys from record
//! fields and writes them under `correlations.<key>`.

use serde_json::Value;
use tracing::warn;

use ims_kernel::{bpql, path, Record};

use crate::model::CorrelationRule;

/// Apply every correlation rule whose filter matches `record`, writing a
/// `correlations.<tags joined by +>` field for each that produces a value.
pub fn tag(record: &mut Record, rules: &[CorrelationRule], prefix: &str) {
    for rule in rules {
        let condition = match bpql::parse(&rule.filter) {
            Ok(cond) => cond,
            Err(err) => {
                warn!(rule_id = %rule.id, error = %err, "correlation filter failed to parse, skipping rule");
                continue;
            }
        };
        if !bpql::evaluate(Some(&condition), record, prefix) {
            continue;
        }
        let Some((key, value)) = correlation_value(record, rule, prefix) else {
            continue;
        };
        let dest = format!("{prefix}correlations.{key}");
        if let Err(err) = path::set(record, &dest, Value::String(value)) {
            warn!(rule_id = %rule.id, error = %err, "failed to write correlation value");
        }
    }
}

/// Compute the `(key, value)` pair a correlation rule would produce, or
/// `None` if any tag is missing/empty (no correlation is produced).
fn correlation_value(record: &Record, rule: &CorrelationRule, prefix: &str) -> Option<(String, String)> {
    let mut tags = rule.tags.clone();
    tags.sort();

    let mut values = Vec::with_capacity(tags.len());
    for tag in &tags {
        let field_path = path::make_path(prefix, tag);
        let raw = path::get(record, &field_path);
        let text = path::stringify(raw);
        if raw.is_null() || text.is_empty() {
            return None;
        }
        values.push(text);
    }
    if tags.is_empty() {
        return None;
    }
    Some((tags.join("+"), values.join("+")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn correlation_writes_sorted_joined_key() {
        // tags [host, service]; record {host:h1, service:s1}
        // -> correlations.host+service = "h1+s1"
        let rules = vec![CorrelationRule {
            id: "c1".to_string(),
            filter: r#"host = "h1""#.to_string(),
            tags: vec!["service".to_string(), "host".to_string()],
            order: 0,
        }];
        let mut record = json!({"host": "h1", "service": "s1"});
        tag(&mut record, &rules, "");
        assert_eq!(record["correlations"]["host+service"], json!("h1+s1"));
    }

    #[test]
    fn missing_tag_value_produces_nothing() {
        let rules = vec![CorrelationRule {
            id: "c1".to_string(),
            filter: r#"host = "h1""#.to_string(),
            tags: vec!["service".to_string(), "host".to_string()],
            order: 0,
        }];
        let mut record = json!({"host": "h1"});
        tag(&mut record, &rules, "");
        assert!(record.get("correlations").is_none());
    }

    #[test]
    fn non_matching_filter_skips_rule() {
        let rules = vec![CorrelationRule {
            id: "c1".to_string(),
            filter: r#"host = "other""#.to_string(),
            tags: vec!["host".to_string()],
            order: 0,
        }];
        let mut record = json!({"host": "h1"});
        tag(&mut record, &rules, "");
        assert!(record.get("correlations").is_none());
    }
}
