//! Canonical JSON and content hashing
//!
//! Snapshot binding depends on two logically identical JSON values hashing
//! identically regardless of the key order they arrived in. Canonicalization
//! rebuilds every object with its keys inserted in lexicographic order, so
//! the result does not depend on whether `serde_json` was compiled with
//! `preserve_order` somewhere in the dependency graph.

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Recursively sort object keys; arrays map element-wise, scalars pass through.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            let mut out = Map::with_capacity(map.len());
            for key in keys {
                out.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

/// Compact JSON text of the canonical form
pub fn canonical_json(value: &Value) -> String {
    // Serializing a Value cannot fail: keys are always strings.
    serde_json::to_string(&canonicalize(value)).unwrap_or_default()
}

/// `hex(sha256(json(canonicalize(value))))`
pub fn content_hash(value: &Value) -> String {
    sha256_hex(canonical_json(value).as_bytes())
}

/// Content hash of any serializable value
pub fn hash_serializable<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    Ok(content_hash(&serde_json::to_value(value)?))
}

/// Lowercase hex SHA-256
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_key_order_does_not_change_hash() {
        let a = json!({"a": 1, "b": 2});
        let b = json!({"b": 2, "a": 1});
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn test_nested_objects_are_sorted() {
        let value = json!({"z": {"y": 1, "x": [ {"d": 1, "c": 2} ]}, "a": null});
        assert_eq!(
            canonical_json(&value),
            r#"{"a":null,"z":{"x":[{"c":2,"d":1}],"y":1}}"#
        );
    }

    #[test]
    fn test_array_order_is_significant() {
        assert_ne!(content_hash(&json!([1, 2])), content_hash(&json!([2, 1])));
    }

    #[test]
    fn test_hash_is_64_hex_chars() {
        let hash = content_hash(&json!({"to": "cancelled"}));
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_scalars_pass_through() {
        for value in [json!(null), json!(true), json!(1.5), json!("text")] {
            assert_eq!(canonicalize(&value), value);
        }
    }

    fn object_entries() -> impl Strategy<Value = Vec<(String, i64)>> {
        prop::collection::btree_map("[a-z]{1,6}", any::<i64>(), 1..12)
            .prop_map(|m| m.into_iter().collect())
    }

    proptest! {
        #[test]
        fn prop_permutation_invariant(entries in object_entries(), seed in any::<u64>()) {
            let mut shuffled = entries.clone();
            // Deterministic rotation stands in for a shuffle.
            let len = shuffled.len();
            shuffled.rotate_left((seed as usize) % len);
            shuffled.reverse();

            let original: Map<String, Value> =
                entries.into_iter().map(|(k, v)| (k, json!(v))).collect();
            let permuted: Map<String, Value> =
                shuffled.into_iter().map(|(k, v)| (k, json!(v))).collect();

            let nested_a = json!({"outer": Value::Object(original.clone()), "list": [Value::Object(original)]});
            let nested_b = json!({"list": [Value::Object(permuted.clone())], "outer": Value::Object(permuted)});

            prop_assert_eq!(content_hash(&nested_a), content_hash(&nested_b));
        }

        #[test]
        fn prop_canonicalize_is_idempotent(entries in object_entries()) {
            let value = Value::Object(entries.into_iter().map(|(k, v)| (k, json!(v))).collect());
            let once = canonicalize(&value);
            prop_assert_eq!(canonicalize(&once), once);
        }
    }
}
