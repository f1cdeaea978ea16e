//! Shared helpers for plugins that model a file as a keyed set of entities.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use lix_core::{DetectedChange, LixError, Result};

/// Entities of one file, keyed by entity id.
pub(crate) type EntityMap = BTreeMap<String, Value>;

/// Changes turning `before` into `after`, ordered by entity id.
pub(crate) fn diff(schema_key: &str, schema_version: &str, before: &EntityMap, after: &EntityMap) -> Vec<DetectedChange> {
    let mut changes = Vec::new();
    for (id, content) in after {
        if before.get(id) != Some(content) {
            changes.push(DetectedChange {
                entity_id: id.clone(),
                schema_key: schema_key.to_string(),
                schema_version: schema_version.to_string(),
                snapshot_content: Some(content.clone()),
            });
        }
    }
    for id in before.keys().filter(|id| !after.contains_key(*id)) {
        changes.push(DetectedChange {
            entity_id: id.clone(),
            schema_key: schema_key.to_string(),
            schema_version: schema_version.to_string(),
            snapshot_content: None,
        });
    }
    changes.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
    changes
}

/// Apply changes of `schema_key` to an entity map; other schemas are skipped.
pub(crate) fn apply(entities: &mut EntityMap, schema_key: &str, changes: Vec<DetectedChange>) {
    for change in changes {
        if change.schema_key != schema_key {
            debug!("Skipping {} change for {}", change.schema_key, change.entity_id);
            continue;
        }
        match change.snapshot_content {
            Some(content) => {
                entities.insert(change.entity_id, content);
            }
            None => {
                entities.remove(&change.entity_id);
            }
        }
    }
}

/// Zero-padded position id, so entity ids sort in document order.
pub(crate) fn position_id(position: usize) -> String {
    format!("{position:08}")
}

/// Decode file bytes as UTF-8.
pub(crate) fn utf8<'a>(plugin: &str, data: &'a [u8]) -> Result<&'a str> {
    std::str::from_utf8(data).map_err(|e| LixError::plugin(plugin, format!("file is not valid UTF-8: {e}")))
}

/// Concatenate the `field` string of every entity ordered by `position`.
pub(crate) fn join_positional(plugin: &str, entities: &EntityMap, field: &str) -> Result<Vec<u8>> {
    let mut parts: Vec<(u64, &str)> = Vec::with_capacity(entities.len());
    for (id, content) in entities {
        let position = content.get("position").and_then(Value::as_u64);
        let text = content.get(field).and_then(Value::as_str);
        match (position, text) {
            (Some(position), Some(text)) => parts.push((position, text)),
            _ => {
                return Err(LixError::plugin(
                    plugin,
                    format!("entity {id} is missing 'position' or '{field}'"),
                ))
            }
        }
    }
    parts.sort_by_key(|(position, _)| *position);
    Ok(parts.into_iter().flat_map(|(_, text)| text.bytes()).collect())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_diff_upserts_and_deletes() {
        let before: EntityMap = [("a".to_string(), json!(1)), ("b".to_string(), json!(2))].into();
        let after: EntityMap = [("a".to_string(), json!(1)), ("c".to_string(), json!(3))].into();
        let changes = diff("k", "1.0", &before, &after);

        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].entity_id, "b");
        assert!(changes[0].snapshot_content.is_none());
        assert_eq!(changes[1].entity_id, "c");
    }

    #[test]
    fn test_apply_skips_other_schemas() {
        let mut entities = EntityMap::new();
        apply(
            &mut entities,
            "k",
            vec![DetectedChange {
                entity_id: "x".into(),
                schema_key: "other".into(),
                schema_version: "1.0".into(),
                snapshot_content: Some(json!(1)),
            }],
        );
        assert!(entities.is_empty());
    }
}
