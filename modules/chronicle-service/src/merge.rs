//! Deep, right-biased merge of memory documents.
//!
//! Objects present on both sides are merged key by key. Everything else
//! (scalars, arrays, an object meeting a non-object) is replaced by the
//! incoming value. Keys only present in the existing document survive.

use serde_json::{Map, Value};

/// Merge `new` into a copy of `old`. Neither input is modified.
pub fn merge(old: &Map<String, Value>, new: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = old.clone();
    for (key, incoming) in new {
        let value = match (merged.get(key), incoming) {
            (Some(Value::Object(existing)), Value::Object(update)) => {
                Value::Object(merge(existing, update))
            }
            _ => incoming.clone(),
        };
        merged.insert(key.clone(), value);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("fixture must be an object"),
        }
    }

    #[test]
    fn test_merge_is_idempotent() {
        let doc = obj(json!({
            "memory": "hello",
            "nested": {"a": [1, 2], "b": {"c": null}},
            "n": 3.5
        }));
        assert_eq!(merge(&doc, &doc), doc);
    }

    #[test]
    fn test_scalar_leaves_take_new_value() {
        let old = obj(json!({"k": {"deep": true}, "s": "old", "n": 1}));
        let new = obj(json!({"k": 7, "s": null, "n": "one"}));
        let merged = merge(&old, &new);
        assert_eq!(merged["k"], json!(7));
        assert_eq!(merged["s"], Value::Null);
        assert_eq!(merged["n"], json!("one"));
    }

    #[test]
    fn test_nested_objects_recurse() {
        let merged = merge(&obj(json!({"a": {"x": 1}})), &obj(json!({"a": {"y": 2}})));
        assert_eq!(Value::Object(merged), json!({"a": {"x": 1, "y": 2}}));
    }

    #[test]
    fn test_untouched_keys_survive() {
        let merged = merge(&obj(json!({"a": 1, "b": 2})), &obj(json!({"a": 9})));
        assert_eq!(Value::Object(merged), json!({"a": 9, "b": 2}));
    }

    #[test]
    fn test_arrays_are_replaced_not_concatenated() {
        let merged = merge(&obj(json!({"tags": [1, 2]})), &obj(json!({"tags": [3]})));
        assert_eq!(merged["tags"], json!([3]));
    }

    #[test]
    fn test_object_replaces_scalar() {
        let merged = merge(&obj(json!({"a": "flat"})), &obj(json!({"a": {"x": 1}})));
        assert_eq!(merged["a"], json!({"x": 1}));
    }

    #[test]
    fn test_inputs_untouched() {
        let old = obj(json!({"a": {"x": 1}}));
        let new = obj(json!({"a": {"y": 2}}));
        let _ = merge(&old, &new);
        assert_eq!(Value::Object(old), json!({"a": {"x": 1}}));
        assert_eq!(Value::Object(new), json!({"a": {"y": 2}}));
    }
}
