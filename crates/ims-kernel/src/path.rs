// SPDX-License-Identifier: Apache-2.0
//! Dotted-path accessor over a [`Record`].
//!
//! A path segment is either a map key or, when every character in the
//! segment is a digit, a sequence index. Missing intermediate keys read as
//! `null`; writes create intermediate maps as needed.

use serde_json::{Map, Value};

use crate::error::KernelError;

/// A JSON-shaped event/webhook record: null, bool, number, string, map, or
/// ordered sequence. Kept identical to `serde_json::Value` so the tree stays
/// JSON-round-trippable end to end.
pub type Record = Value;

/// Resolve the effective path for a rule given the store's configured
/// prepend-prefix: a leading `.` makes `path` absolute (the prefix is
/// ignored); otherwise the prefix is prepended verbatim.
pub fn make_path(prefix: &str, path: &str) -> String {
    match path.strip_prefix('.') {
        Some(rest) => rest.to_string(),
        None => format!("{prefix}{path}"),
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('.').filter(|s| !s.is_empty())
}

fn as_index(segment: &str) -> Option<usize> {
    if segment.is_empty() {
        return None;
    }
    segment.parse::<usize>().ok()
}

/// Read the value at `path`, or `Value::Null` if any segment is missing.
pub fn get<'a>(record: &'a Record, path: &str) -> &'a Value {
    static NULL: Value = Value::Null;
    let mut current = record;
    for segment in segments(path) {
        current = match current {
            Value::Object(map) => match map.get(segment) {
                Some(v) => v,
                None => return &NULL,
            },
            Value::Array(arr) => match as_index(segment).and_then(|i| arr.get(i)) {
                Some(v) => v,
                None => return &NULL,
            },
            _ => return &NULL,
        };
    }
    current
}

/// Write `value` at `path`, creating intermediate maps as needed.
///
/// Numeric segments index into sequences, extending them with `null` up to
/// the target index. Fails if a non-terminal segment addresses an existing
/// scalar (neither map nor array).
pub fn set(record: &mut Record, path: &str, value: Value) -> Result<(), KernelError> {
    let segs: Vec<&str> = segments(path).collect();
    if segs.is_empty() {
        *record = value;
        return Ok(());
    }
    set_segments(record, path, &segs, value)
}

fn set_segments(
    node: &mut Value,
    full_path: &str,
    segs: &[&str],
    value: Value,
) -> Result<(), KernelError> {
    let (head, rest) = (segs[0], &segs[1..]);

    if node.is_null() {
        *node = if as_index(head).is_some() {
            Value::Array(Vec::new())
        } else {
            Value::Object(Map::new())
        };
    }

    match node {
        Value::Object(map) => {
            if rest.is_empty() {
                map.insert(head.to_string(), value);
                Ok(())
            } else {
                let child = map.entry(head.to_string()).or_insert(Value::Null);
                set_segments(child, full_path, rest, value)
            }
        }
        Value::Array(arr) => {
            let idx = as_index(head).ok_or_else(|| KernelError::PathNotAMap {
                path: full_path.to_string(),
                segment: head.to_string(),
            })?;
            if idx >= arr.len() {
                arr.resize(idx + 1, Value::Null);
            }
            if rest.is_empty() {
                arr[idx] = value;
                Ok(())
            } else {
                set_segments(&mut arr[idx], full_path, rest, value)
            }
        }
        _ => Err(KernelError::PathNotAMap {
            path: full_path.to_string(),
            segment: head.to_string(),
        }),
    }
}

/// Delete the value at `path`. A missing path is a no-op.
pub fn delete(record: &mut Record, path: &str) {
    let segs: Vec<&str> = segments(path).collect();
    let Some((last, init)) = segs.split_last() else {
        return;
    };
    let mut current = record;
    for segment in init {
        current = match current {
            Value::Object(map) => match map.get_mut(*segment) {
                Some(v) => v,
                None => return,
            },
            Value::Array(arr) => match as_index(segment).and_then(|i| arr.get_mut(i)) {
                Some(v) => v,
                None => return,
            },
            _ => return,
        };
    }
    match current {
        Value::Object(map) => {
            map.remove(*last);
        }
        Value::Array(arr) => {
            if let Some(idx) = as_index(last) {
                if idx < arr.len() {
                    arr[idx] = Value::Null;
                }
            }
        }
        _ => {}
    }
}

/// Stringify a value the way the condition evaluator needs its left operand:
/// the textual form used for `=`/`!=`/`IN`/`NOT IN` comparisons.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn make_path_respects_leading_dot() {
        assert_eq!(make_path("event.", "field"), "event.field");
        assert_eq!(make_path("event.", ".absolute"), "absolute");
    }

    #[test]
    fn get_missing_is_null() {
        let r = json!({"a": {"b": 1}});
        assert!(get(&r, "a.c").is_null());
        assert!(get(&r, "x.y.z").is_null());
    }

    #[test]
    fn get_indexes_sequences() {
        let r = json!({"items": [10, 20, 30]});
        assert_eq!(get(&r, "items.1"), &json!(20));
        assert!(get(&r, "items.9").is_null());
    }

    #[test]
    fn set_creates_intermediate_maps() {
        let mut r = json!({});
        set(&mut r, "a.b.c", json!(42)).unwrap();
        assert_eq!(get(&r, "a.b.c"), &json!(42));
    }

    #[test]
    fn path_round_trip() {
        // get(set(r, p, v), p) == v for paths that don't traverse a sequence.
        let mut r = json!({"existing": "x"});
        set(&mut r, "fresh.nested.leaf", json!("value")).unwrap();
        assert_eq!(get(&r, "fresh.nested.leaf"), &json!("value"));
    }

    #[test]
    fn set_through_scalar_fails() {
        let mut r = json!({"a": "scalar"});
        let err = set(&mut r, "a.b", json!(1)).unwrap_err();
        assert!(matches!(err, KernelError::PathNotAMap { .. }));
    }

    #[test]
    fn set_extends_arrays_with_nulls() {
        let mut r = json!({"items": [1]});
        set(&mut r, "items.3", json!("x")).unwrap();
        assert_eq!(r["items"], json!([1, null, null, "x"]));
    }

    #[test]
    fn delete_removes_leaf() {
        let mut r = json!({"a": {"b": 1, "c": 2}});
        delete(&mut r, "a.b");
        assert_eq!(r, json!({"a": {"c": 2}}));
    }
}
