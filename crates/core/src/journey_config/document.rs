//! Generic merge over nested JSON documents.
//!
//! Objects merge key by key. Anything else (arrays, scalars, null) in the patch replaces
//! the base value wholesale, so a patch touching an array must carry the full array.

use serde_json::{Map, Value};

pub fn merge(base: &Value, patch: &Value) -> Value {
    let mut merged = base.clone();
    merge_into(&mut merged, patch);
    merged
}

pub fn merge_into(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, patch_value) in patch {
                match target.get_mut(key) {
                    Some(existing) if existing.is_object() && patch_value.is_object() => {
                        merge_into(existing, patch_value);
                    }
                    _ => {
                        target.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

/// Drops object entries whose value is null, at every depth.
pub fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(entries) => Value::Object(
            entries
                .into_iter()
                .filter(|(_, value)| !value.is_null())
                .map(|(key, value)| (key, strip_nulls(value)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_nulls).collect()),
        other => other,
    }
}
