//! Canonical JSON rendering and content hashing.
//!
//! Snapshot ids and commit ids are derived from the canonical form, so two
//! values that differ only in object key order must render identically.

use serde_json::Value;

/// Snapshot id reserved for "no content" (deletions).
pub const NO_CONTENT_SNAPSHOT_ID: &str = "no-content";

/// Render a JSON value with object keys sorted at every depth and no
/// insignificant whitespace.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Strings are rendered through serde_json for correct escaping.
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// blake3 hex digest of arbitrary bytes.
pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(blake3::hash(bytes).as_bytes())
}

/// Content hash of a JSON value (hash of its canonical form).
pub fn content_hash(value: &Value) -> String {
    hash_bytes(canonical_json(value).as_bytes())
}

/// Snapshot id for optional content; `None` maps to the shared tombstone id.
pub fn snapshot_id(content: Option<&Value>) -> String {
    match content {
        Some(value) => content_hash(value),
        None => NO_CONTENT_SNAPSHOT_ID.to_string(),
    }
}

/// Structural equality after canonicalisation.
pub fn canonical_eq(a: &Value, b: &Value) -> bool {
    canonical_json(a) == canonical_json(b)
}
