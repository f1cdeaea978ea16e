//! Entity writes into a version: constraint checks, change creation and
//! staging.

use serde_json::Value;
use tracing::debug;

use lix_core::schema::FILE_DESCRIPTOR_SCHEMA_KEY;
use lix_core::{Change, EntityKey, LixError, LixSchema, NewChange, Result, GLOBAL_FILE_ID};

use crate::sqlite::StoreTx;

fn referenced_values<'v>(content: &'v Value, properties: &[String]) -> Option<Vec<&'v Value>> {
    properties
        .iter()
        .map(|p| content.get(p).filter(|v| !v.is_null()))
        .collect()
}

impl StoreTx<'_> {
    /// Reject writes that reference missing files or entities.
    pub fn check_constraints(&self, version_id: &str, change: &NewChange, schema: &LixSchema) -> Result<()> {
        let Some(content) = &change.snapshot_content else {
            return Ok(());
        };

        if change.file_id != GLOBAL_FILE_ID {
            let descriptor = EntityKey::new(&change.file_id, FILE_DESCRIPTOR_SCHEMA_KEY, GLOBAL_FILE_ID);
            if self.get_state(version_id, &descriptor)?.is_none() {
                return Err(LixError::foreign_key(format!(
                    "{} references file '{}' which does not exist in version {}",
                    change.key(),
                    change.file_id,
                    version_id
                )));
            }
        }

        for fk in &schema.foreign_keys {
            let Some(values) = referenced_values(content, &fk.properties) else {
                continue;
            };

            let targets = self.live_rows(version_id, None, Some(&fk.references.schema_key))?;
            let found = targets.iter().any(|row| {
                row.snapshot_content.as_ref().is_some_and(|target| {
                    fk.references
                        .properties
                        .iter()
                        .zip(&values)
                        .all(|(prop, value)| target.get(prop) == Some(*value))
                })
            });
            if !found {
                return Err(LixError::foreign_key(format!(
                    "{} references missing {} ({})",
                    change.key(),
                    fk.references.schema_key,
                    fk.properties.join(", ")
                )));
            }
        }

        Ok(())
    }

    /// Validate, append and stage one entity change in a version.
    pub fn write_entity(&self, version_id: &str, change: &NewChange) -> Result<Change> {
        let schema = self.require_schema(&change.schema_key, &change.schema_version)?;
        self.check_constraints(version_id, change, &schema)?;

        let created = self.create_change(change)?;
        self.apply_staged_change(version_id, &created)?;
        debug!("Staged {} in version {}", created.key(), version_id);
        Ok(created)
    }
}
