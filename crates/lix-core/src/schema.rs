//! Entity schema definitions.
//!
//! Schemas are JSON-schema-like objects carrying `x-lix-*` extension keys.
//! Parsing here is pure; persistence and the immutability check live in the
//! store's registry.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{LixError, Result};

pub const FILE_DESCRIPTOR_SCHEMA_KEY: &str = "lix_file_descriptor";
pub const ACCOUNT_SCHEMA_KEY: &str = "lix_account";
pub const LOG_SCHEMA_KEY: &str = "lix_log";

/// Separator used when a primary key spans several properties.
pub const PRIMARY_KEY_SEPARATOR: &str = "~";

/// A `x-lix-foreign-keys` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub properties: Vec<String>,
    pub references: ForeignKeyTarget,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyTarget {
    #[serde(rename = "schemaKey")]
    pub schema_key: String,
    pub properties: Vec<String>,
}

/// A parsed, shape-checked schema.
#[derive(Debug, Clone, PartialEq)]
pub struct LixSchema {
    pub key: String,
    pub version: String,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,

    /// Declared property names.
    pub properties: Vec<String>,
    pub definition: Value,
}

fn invalid(key: &str, message: impl Into<String>) -> LixError {
    LixError::SchemaValidation {
        key: key.to_string(),
        message: message.into(),
    }
}

fn is_semver_like(version: &str) -> bool {
    let parts: Vec<&str> = version.split('.').collect();
    (2..=3).contains(&parts.len())
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

impl LixSchema {
    /// Parse and shape-check a schema definition.
    pub fn parse(definition: Value) -> Result<Self> {
        let obj = definition
            .as_object()
            .ok_or_else(|| invalid("?", "schema must be a JSON object"))?;

        let key = obj
            .get("x-lix-key")
            .and_then(Value::as_str)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| invalid("?", "x-lix-key must be a non-empty string"))?
            .to_string();

        if !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(invalid(&key, "x-lix-key may only contain [A-Za-z0-9_]"));
        }

        let version = obj
            .get("x-lix-version")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid(&key, "x-lix-version must be a string"))?
            .to_string();
        if !is_semver_like(&version) {
            return Err(invalid(
                &key,
                format!("x-lix-version '{version}' is not MAJOR.MINOR[.PATCH]"),
            ));
        }

        if obj.get("type").and_then(Value::as_str) != Some("object") {
            return Err(invalid(&key, "type must be \"object\""));
        }

        let properties: Vec<String> = obj
            .get("properties")
            .and_then(Value::as_object)
            .ok_or_else(|| invalid(&key, "properties must be an object"))?
            .keys()
            .cloned()
            .collect();

        let primary_key: Vec<String> = obj
            .get("x-lix-primary-key")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        if primary_key.is_empty() {
            return Err(invalid(&key, "x-lix-primary-key must list at least one property"));
        }
        if let Some(missing) = primary_key.iter().find(|p| !properties.contains(p)) {
            return Err(invalid(
                &key,
                format!("primary key property '{missing}' is not declared"),
            ));
        }

        let foreign_keys: Vec<ForeignKey> = match obj.get("x-lix-foreign-keys") {
            Some(raw) => serde_json::from_value(raw.clone())
                .map_err(|e| invalid(&key, format!("x-lix-foreign-keys: {e}")))?,
            None => Vec::new(),
        };
        for fk in &foreign_keys {
            if fk.properties.len() != fk.references.properties.len() {
                return Err(invalid(&key, "foreign key property counts differ"));
            }
        }

        Ok(Self {
            key,
            version,
            primary_key,
            foreign_keys,
            properties,
            definition,
        })
    }

    fn property_schema(&self, name: &str) -> Option<&Value> {
        self.definition.get("properties")?.get(name)
    }

    /// Validate snapshot content against this schema.
    pub fn validate(&self, content: &Value) -> Result<()> {
        let obj = content
            .as_object()
            .ok_or_else(|| invalid(&self.key, "snapshot content must be an object"))?;

        if let Some(required) = self.definition.get("required").and_then(Value::as_array) {
            for name in required.iter().filter_map(Value::as_str) {
                if !obj.contains_key(name) {
                    return Err(invalid(&self.key, format!("missing required property '{name}'")));
                }
            }
        }

        let closed = self.definition.get("additionalProperties") == Some(&Value::Bool(false));
        for (name, value) in obj {
            match self.property_schema(name) {
                Some(prop) => {
                    if let Some(expected) = prop.get("type") {
                        if !type_matches(expected, value) {
                            return Err(invalid(
                                &self.key,
                                format!("property '{name}' expected type {expected}"),
                            ));
                        }
                    }
                }
                None if closed => {
                    return Err(invalid(&self.key, format!("unknown property '{name}'")));
                }
                None => {}
            }
        }
        Ok(())
    }

    /// Derive the entity id from the primary key properties of `content`.
    pub fn entity_id(&self, content: &Value) -> Result<String> {
        let mut parts = Vec::with_capacity(self.primary_key.len());
        for prop in &self.primary_key {
            let value = content
                .get(prop)
                .filter(|v| !v.is_null())
                .ok_or_else(|| {
                    invalid(&self.key, format!("primary key property '{prop}' is missing"))
                })?;
            parts.push(match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            });
        }
        Ok(parts.join(PRIMARY_KEY_SEPARATOR))
    }
}

fn type_matches(expected: &Value, value: &Value) -> bool {
    match expected {
        Value::String(name) => single_type_matches(name, value),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .any(|name| single_type_matches(name, value)),
        _ => true,
    }
}

fn single_type_matches(name: &str, value: &Value) -> bool {
    match name {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

/// Schemas registered when a database is opened.
pub fn builtin_schemas() -> Vec<Value> {
    vec![
        json!({
            "x-lix-key": FILE_DESCRIPTOR_SCHEMA_KEY,
            "x-lix-version": "1.0",
            "x-lix-primary-key": ["id"],
            "type": "object",
            "properties": {
                "id": { "type": "string" },
                "path": { "type": "string" },
                "metadata": { "type": ["object", "null"] }
            },
            "required": ["id", "path"],
            "additionalProperties": false
        }),
        json!({
            "x-lix-key": ACCOUNT_SCHEMA_KEY,
            "x-lix-version": "1.0",
            "x-lix-primary-key": ["id"],
            "type": "object",
            "properties": {
                "id": { "type": "string" },
                "name": { "type": "string" }
            },
            "required": ["id", "name"],
            "additionalProperties": false
        }),
        json!({
            "x-lix-key": LOG_SCHEMA_KEY,
            "x-lix-version": "1.0",
            "x-lix-primary-key": ["id"],
            "type": "object",
            "properties": {
                "id": { "type": "string" },
                "key": { "type": "string" },
                "message": { "type": "string" },
                "level": { "type": "string" }
            },
            "required": ["id", "key", "message", "level"],
            "additionalProperties": false
        }),
    ]
}
