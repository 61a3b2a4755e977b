//! Cache key hashing
//!
//! Turns a heterogeneous, ordered sequence of key components into a
//! canonical string that is insensitive to object key insertion order, and
//! provides the SHA-256 digest used to derive stable namespace prefixes for
//! cached functions.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// An ordered sequence of arbitrary key components.
///
/// Sequence order is always significant; object key order never is.
pub type QueryKey = Vec<Value>;

/// Hashes a query key into its canonical string form.
///
/// Objects are serialized with their keys sorted recursively, so two keys
/// that are structurally equal produce identical strings regardless of
/// insertion order. Pure and deterministic.
pub fn hash_key(query_key: &[Value]) -> String {
    let mut out = String::new();
    out.push('[');
    for (i, component) in query_key.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_canonical(&mut out, component);
    }
    out.push(']');
    out
}

/// SHA-256 digest of a string, hex-encoded.
pub fn hash_string(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::from(key.as_str()).to_string());
                out.push(':');
                write_canonical(out, &map[key.as_str()]);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        // scalars already serialize canonically
        scalar => out.push_str(&scalar.to_string()),
    }
}
