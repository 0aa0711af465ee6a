//! Structural diff between two arbitrary JSON-like values.
//!
//! The shape of the payload is implementation-private (spec.md §4.D only
//! requires it be stable and symmetric for a given pair of implementations),
//! but it is still a real recursive patch rather than a whole-value
//! replacement: object fields are diffed key by key (sorted, for byte-stable
//! output across runs) and same-length arrays are diffed element by
//! element. Anything else — scalar changes, type changes, length changes —
//! falls back to a whole-value replacement at that position.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum DiffPayload {
    Unchanged,
    /// Replace the whole value at this position.
    Set { value: Value },
    Object {
        changes: BTreeMap<String, DiffPayload>,
        removed: Vec<String>,
    },
    Array {
        items: Vec<DiffPayload>,
    },
}

pub fn structural_diff(a: &Value, b: &Value) -> DiffPayload {
    if a == b {
        return DiffPayload::Unchanged;
    }

    match (a, b) {
        (Value::Object(a_map), Value::Object(b_map)) => {
            let mut changes = BTreeMap::new();
            for (key, b_val) in b_map {
                let a_val = a_map.get(key).unwrap_or(&Value::Null);
                let d = structural_diff(a_val, b_val);
                if d != DiffPayload::Unchanged {
                    changes.insert(key.clone(), d);
                }
            }
            let removed: Vec<String> = a_map
                .keys()
                .filter(|k| !b_map.contains_key(*k))
                .cloned()
                .collect();
            DiffPayload::Object { changes, removed }
        }
        (Value::Array(a_items), Value::Array(b_items)) if a_items.len() == b_items.len() => {
            let items = a_items
                .iter()
                .zip(b_items.iter())
                .map(|(x, y)| structural_diff(x, y))
                .collect();
            DiffPayload::Array { items }
        }
        _ => DiffPayload::Set { value: b.clone() },
    }
}

/// Reconstruct the new value from an old value and a diff produced by
/// `structural_diff(old, new)`. Lets a subscriber that only ever sees deltas
/// (never a re-fetched snapshot) maintain its own up-to-date copy.
pub fn apply_diff(old: &Value, diff: &DiffPayload) -> Value {
    match diff {
        DiffPayload::Unchanged => old.clone(),
        DiffPayload::Set { value } => value.clone(),
        DiffPayload::Object { changes, removed } => {
            let mut map = match old {
                Value::Object(m) => m.clone(),
                _ => serde_json::Map::new(),
            };
            for key in removed {
                map.remove(key);
            }
            for (key, sub_diff) in changes {
                let old_field = map.get(key).cloned().unwrap_or(Value::Null);
                map.insert(key.clone(), apply_diff(&old_field, sub_diff));
            }
            Value::Object(map)
        }
        DiffPayload::Array { items } => {
            let old_items = match old {
                Value::Array(a) => a.as_slice(),
                _ => &[],
            };
            let new_items = items
                .iter()
                .enumerate()
                .map(|(i, d)| apply_diff(old_items.get(i).unwrap_or(&Value::Null), d))
                .collect();
            Value::Array(new_items)
        }
    }
}
