//! Content hashing for change detection
//!
//! Two payloads with the same content produce the same hash no matter how the
//! source ordered their keys.

use crate::domain::Result;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// SHA-256 of the canonical JSON form of `payload`, hex encoded
///
/// # Examples
///
/// ```
/// use erp_sync::core::hashing::content_hash;
/// use serde_json::json;
///
/// let a = content_hash(&json!({"BOM_PART_ID": "P-7", "CUST_ORDER_ID": "SO-1"})).unwrap();
/// let b = content_hash(&json!({"CUST_ORDER_ID": "SO-1", "BOM_PART_ID": "P-7"})).unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.len(), 64);
/// ```
pub fn content_hash(payload: &Value) -> Result<String> {
    let canonical = serde_json::to_string(&canonicalize(payload))?;

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// Recursively sorts object keys
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, canonicalize(v))).collect();
            Value::Object(sorted.into_iter().map(|(k, v)| (k.clone(), v)).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        _ => value.clone(),
    }
}
