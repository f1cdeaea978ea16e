//! Schema registry.
//!
//! A `(key, version)` pair is immutable once stored: registering it again
//! with an equal definition is a no-op, anything else is rejected with
//! [`LixError::SchemaConflict`].

use rusqlite::{params, OptionalExtension};
use serde_json::Value;
use tracing::debug;

use lix_core::canonical::{canonical_eq, canonical_json};
use lix_core::{LixError, LixSchema, Result};

use crate::sqlite::{db_err, StoreTx};

/// Result of [`StoreTx::register_schema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Inserted,
    Unchanged,
}

fn version_parts(version: &str) -> Vec<u64> {
    version
        .split('.')
        .map(|p| p.parse().unwrap_or(0))
        .collect()
}

impl StoreTx<'_> {
    /// Store a schema definition.
    pub fn register_schema(&self, definition: Value) -> Result<RegisterOutcome> {
        let schema = LixSchema::parse(definition)?;

        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT definition FROM stored_schema WHERE key = ?1 AND version = ?2",
                params![schema.key, schema.version],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;

        if let Some(text) = stored {
            let existing: Value = serde_json::from_str(&text)?;
            if canonical_eq(&existing, &schema.definition) {
                return Ok(RegisterOutcome::Unchanged);
            }
            return Err(LixError::SchemaConflict {
                key: schema.key,
                version: schema.version,
            });
        }

        self.conn
            .execute(
                "INSERT INTO stored_schema (key, version, definition, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    schema.key,
                    schema.version,
                    canonical_json(&schema.definition),
                    self.now()
                ],
            )
            .map_err(db_err)?;
        self.bump_generation();

        debug!("Registered schema {}@{}", schema.key, schema.version);
        Ok(RegisterOutcome::Inserted)
    }

    /// Look up one schema version.
    pub fn get_schema(&self, key: &str, version: &str) -> Result<Option<LixSchema>> {
        let stored: Option<String> = self
            .conn
            .prepare_cached("SELECT definition FROM stored_schema WHERE key = ?1 AND version = ?2")
            .map_err(db_err)?
            .query_row(params![key, version], |row| row.get(0))
            .optional()
            .map_err(db_err)?;

        stored
            .map(|text| LixSchema::parse(serde_json::from_str(&text)?))
            .transpose()
    }

    /// Look up one schema version or fail with `SchemaNotFound`.
    pub fn require_schema(&self, key: &str, version: &str) -> Result<LixSchema> {
        self.get_schema(key, version)?
            .ok_or_else(|| LixError::SchemaNotFound {
                key: key.to_string(),
                version: version.to_string(),
            })
    }

    /// Highest registered version of a schema key.
    pub fn latest_schema(&self, key: &str) -> Result<Option<LixSchema>> {
        Ok(self
            .list_schemas()?
            .into_iter()
            .filter(|s| s.key == key)
            .max_by_key(|s| version_parts(&s.version)))
    }

    /// Every stored schema, ordered by key then version.
    pub fn list_schemas(&self) -> Result<Vec<LixSchema>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT definition FROM stored_schema ORDER BY key, version")
            .map_err(db_err)?;
        let texts = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;

        let mut schemas = texts
            .iter()
            .map(|text| LixSchema::parse(serde_json::from_str(text)?))
            .collect::<Result<Vec<_>>>()?;
        schemas.sort_by(|a, b| {
            a.key
                .cmp(&b.key)
                .then_with(|| version_parts(&a.version).cmp(&version_parts(&b.version)))
        });
        Ok(schemas)
    }

    /// The highest version of each schema key.
    pub fn latest_schemas(&self) -> Result<Vec<LixSchema>> {
        let mut latest: Vec<LixSchema> = Vec::new();
        for schema in self.list_schemas()? {
            match latest.last_mut() {
                Some(last) if last.key == schema.key => *last = schema,
                _ => latest.push(schema),
            }
        }
        Ok(latest)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::LixStore;

    fn todo(version: &str, title_type: &str) -> Value {
        json!({
            "x-lix-key": "todo",
            "x-lix-version": version,
            "x-lix-primary-key": ["id"],
            "type": "object",
            "properties": {
                "id": { "type": "string" },
                "title": { "type": title_type }
            },
            "required": ["id"]
        })
    }

    #[test]
    fn test_register_is_idempotent() {
        let store = LixStore::open_memory(1).unwrap();
        let before = store.generation();
        store
            .transaction(|tx| {
                assert_eq!(tx.register_schema(todo("1.0", "string"))?, RegisterOutcome::Inserted);
                assert_eq!(tx.register_schema(todo("1.0", "string"))?, RegisterOutcome::Unchanged);
                Ok(())
            })
            .unwrap();
        assert_eq!(store.generation(), before + 1);
    }

    #[test]
    fn test_changed_definition_conflicts() {
        let store = LixStore::open_memory(1).unwrap();
        let err = store
            .transaction(|tx| {
                tx.register_schema(todo("1.0", "string"))?;
                tx.register_schema(todo("1.0", "number"))
            })
            .unwrap_err();
        assert!(matches!(err, LixError::SchemaConflict { ref key, .. } if key == "todo"));
    }

    #[test]
    fn test_latest_schema_compares_numerically() {
        let store = LixStore::open_memory(1).unwrap();
        store
            .transaction(|tx| {
                tx.register_schema(todo("1.2", "string"))?;
                tx.register_schema(todo("1.10", "string"))?;
                let latest = tx.latest_schema("todo")?.unwrap();
                assert_eq!(latest.version, "1.10");
                assert!(tx.latest_schemas()?.iter().any(|s| s.key == "lix_file_descriptor"));
                assert!(matches!(
                    tx.require_schema("todo", "9.9"),
                    Err(LixError::SchemaNotFound { .. })
                ));
                Ok(())
            })
            .unwrap();
    }
}
