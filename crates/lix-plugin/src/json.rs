//! JSON plugin: one entity per leaf value, addressed by JSON pointer.

use std::cmp::Ordering;

use serde_json::{json, Map, Value};

use lix_core::{ApplyRequest, DetectRequest, DetectedChange, LixError, Plugin, Result};

use crate::entities::{apply, diff, utf8, EntityMap};

pub const JSON_PLUGIN_KEY: &str = "plugin_json";
pub const JSON_POINTER_SCHEMA_KEY: &str = "plugin_json_pointer";
const SCHEMA_VERSION: &str = "1.0";

/// Entity id of a leaf at the document root.
const ROOT_ENTITY_ID: &str = "#";

fn escape_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

fn pointer_of(path: &[Value]) -> String {
    path.iter()
        .map(|segment| match segment {
            Value::String(key) => format!("/{}", escape_token(key)),
            other => format!("/{other}"),
        })
        .collect()
}

/// Collect every leaf (scalar, empty object, empty array) with its path.
fn leaves(value: &Value, path: &mut Vec<Value>, out: &mut EntityMap) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                path.push(Value::String(key.clone()));
                leaves(child, path, out);
                path.pop();
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (index, child) in items.iter().enumerate() {
                path.push(json!(index));
                leaves(child, path, out);
                path.pop();
            }
        }
        leaf => {
            let pointer = pointer_of(path);
            let id = if pointer.is_empty() {
                ROOT_ENTITY_ID.to_string()
            } else {
                pointer.clone()
            };
            out.insert(id, json!({ "pointer": pointer, "path": path.clone(), "value": leaf }));
        }
    }
}

fn compare_paths(a: &[Value], b: &[Value]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        let ordering = match (x, y) {
            (Value::Number(x), Value::Number(y)) => x.as_u64().cmp(&y.as_u64()),
            (Value::String(x), Value::String(y)) => x.cmp(y),
            (Value::Number(_), _) => Ordering::Less,
            _ => Ordering::Greater,
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a.len().cmp(&b.len())
}

fn insert_at(target: &mut Value, path: &[Value], leaf: Value) -> Result<()> {
    let Some((head, rest)) = path.split_first() else {
        *target = leaf;
        return Ok(());
    };

    let child = match head {
        Value::String(key) => {
            if !target.is_object() {
                *target = Value::Object(Map::new());
            }
            let Value::Object(map) = target else {
                return Err(LixError::internal("object expected"));
            };
            map.entry(key.clone()).or_insert(Value::Null)
        }
        Value::Number(index) => {
            let index = index
                .as_u64()
                .ok_or_else(|| LixError::plugin(JSON_PLUGIN_KEY, format!("invalid array index {index}")))?
                as usize;
            if !target.is_array() {
                *target = Value::Array(Vec::new());
            }
            let Value::Array(items) = target else {
                return Err(LixError::internal("array expected"));
            };
            if items.len() <= index {
                items.resize(index + 1, Value::Null);
            }
            &mut items[index]
        }
        other => {
            return Err(LixError::plugin(
                JSON_PLUGIN_KEY,
                format!("invalid path segment {other}"),
            ))
        }
    };
    insert_at(child, rest, leaf)
}

/// Tracks `.json` documents leaf by leaf. Round trips are semantic: the
/// rendered document is pretty-printed with sorted keys.
#[derive(Debug, Default, Clone)]
pub struct JsonPlugin;

impl JsonPlugin {
    pub fn new() -> Self {
        Self
    }

    fn entities(data: &[u8]) -> Result<EntityMap> {
        let text = utf8(JSON_PLUGIN_KEY, data)?;
        let mut out = EntityMap::new();
        if text.trim().is_empty() {
            return Ok(out);
        }
        let document: Value = serde_json::from_str(text)
            .map_err(|e| LixError::plugin(JSON_PLUGIN_KEY, format!("invalid JSON: {e}")))?;
        leaves(&document, &mut Vec::new(), &mut out);
        Ok(out)
    }

    fn render(entities: &EntityMap) -> Result<Vec<u8>> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }

        let mut items: Vec<(&[Value], &Value)> = Vec::with_capacity(entities.len());
        for (id, content) in entities {
            let path = content.get("path").and_then(Value::as_array);
            let value = content.get("value");
            match (path, value) {
                (Some(path), Some(value)) => items.push((path.as_slice(), value)),
                _ => {
                    return Err(LixError::plugin(
                        JSON_PLUGIN_KEY,
                        format!("entity {id} is missing 'path' or 'value'"),
                    ))
                }
            }
        }
        items.sort_by(|a, b| compare_paths(a.0, b.0));

        let mut document = Value::Null;
        for (path, value) in items {
            insert_at(&mut document, path, value.clone())?;
        }

        let mut bytes = serde_json::to_vec_pretty(&document)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

impl Plugin for JsonPlugin {
    fn key(&self) -> &str {
        JSON_PLUGIN_KEY
    }

    fn detect_changes_glob(&self) -> &str {
        "**/*.json"
    }

    fn schemas(&self) -> Vec<Value> {
        vec![json!({
            "x-lix-key": JSON_POINTER_SCHEMA_KEY,
            "x-lix-version": SCHEMA_VERSION,
            "x-lix-primary-key": ["pointer"],
            "type": "object",
            "properties": {
                "pointer": { "type": "string" },
                "path": { "type": "array" },
                "value": {}
            },
            "required": ["pointer", "path"],
            "additionalProperties": false
        })]
    }

    fn detect_changes(&self, request: DetectRequest) -> Result<Vec<DetectedChange>> {
        let before = match &request.before {
            Some(file) => Self::entities(&file.data)?,
            None => EntityMap::new(),
        };
        let after = Self::entities(&request.after.data)?;
        Ok(diff(JSON_POINTER_SCHEMA_KEY, SCHEMA_VERSION, &before, &after))
    }

    fn apply_changes(&self, request: ApplyRequest) -> Result<Vec<u8>> {
        let mut entities = Self::entities(&request.file.data)?;
        apply(&mut entities, JSON_POINTER_SCHEMA_KEY, request.changes);
        Self::render(&entities)
    }
}
