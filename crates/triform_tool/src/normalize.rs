//! Canonical JSON for exported schemas and structured output.
//!
//! Canonical form is: object keys sorted recursively, arrays left in order,
//! two-space indentation. Equal values always produce identical bytes.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Sort object keys recursively
#[must_use]
pub fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, canonicalize(v)))
                .collect();
            Value::Object(sorted.into_iter().collect::<Map<String, Value>>())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Canonical pretty string
///
/// # Errors
///
/// Returns error if serialization fails
pub fn to_canonical_string(value: &Value) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&canonicalize(value.clone()))
}

/// Canonical compact bytes, used for fingerprinting
///
/// # Errors
///
/// Returns error if serialization fails
pub fn to_canonical_bytes(value: &Value) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(&canonicalize(value.clone()))
}
