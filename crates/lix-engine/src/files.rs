//! Files as projections over entity state.
//!
//! A file is a `lix_file_descriptor` entity plus the entities its plugin
//! detected in its bytes. Bytes are rendered on demand and cached per
//! version.

use serde_json::Value;
use tracing::{debug, warn};

use lix_core::schema::FILE_DESCRIPTOR_SCHEMA_KEY;
use lix_core::{
    new_id, ApplyRequest, DetectRequest, DetectedChange, EntityKey, FileDescriptor, LixError, LixFile, NewChange,
    Plugin, PluginFile, Result, StateRow, GLOBAL_FILE_ID, OWN_ENTITY_PLUGIN_KEY,
};

use crate::transaction::LixTx;

/// A file to create or replace.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FileInput {
    /// Existing or caller-chosen id; a new one is generated otherwise.
    pub id: Option<String>,
    pub path: String,
    pub data: Vec<u8>,
    pub metadata: Option<Value>,
}

/// Paths are absolute, `/`-separated and name a file, not a directory.
pub(crate) fn check_path(path: &str) -> Result<()> {
    let invalid = |reason: &str| LixError::invalid_argument(format!("invalid file path '{path}': {reason}"));

    let Some(rest) = path.strip_prefix('/') else {
        return Err(invalid("must start with '/'"));
    };
    if rest.is_empty() || rest.ends_with('/') {
        return Err(invalid("must name a file"));
    }
    if rest.split('/').any(|s| s.is_empty() || s == "." || s == "..") {
        return Err(invalid("empty or relative segment"));
    }
    if path.contains('\\') {
        return Err(invalid("backslashes are not allowed"));
    }
    Ok(())
}

fn descriptor_of(row: StateRow) -> Result<Option<FileDescriptor>> {
    row.snapshot_content
        .map(serde_json::from_value::<FileDescriptor>)
        .transpose()
        .map_err(LixError::from)
}

impl LixTx<'_> {
    fn descriptor_key(id: &str) -> EntityKey {
        EntityKey::new(id, FILE_DESCRIPTOR_SCHEMA_KEY, GLOBAL_FILE_ID)
    }

    pub(crate) fn descriptor(&self, version_id: &str, id: &str) -> Result<Option<FileDescriptor>> {
        match self.tx.get_state(version_id, &Self::descriptor_key(id))? {
            Some(row) => descriptor_of(row),
            None => Ok(None),
        }
    }

    /// Every live file descriptor of a version, ordered by path.
    pub(crate) fn file_descriptors(&self, version_id: &str) -> Result<Vec<FileDescriptor>> {
        let mut files = Vec::new();
        for row in self
            .tx
            .live_rows(version_id, Some(GLOBAL_FILE_ID), Some(FILE_DESCRIPTOR_SCHEMA_KEY))?
        {
            if let Some(descriptor) = descriptor_of(row)? {
                files.push(descriptor);
            }
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    pub(crate) fn descriptor_by_path(&self, version_id: &str, path: &str) -> Result<Option<FileDescriptor>> {
        Ok(self
            .file_descriptors(version_id)?
            .into_iter()
            .find(|d| d.path == path))
    }

    /// Bytes of a file in a version, rendering and caching them on a miss.
    pub(crate) fn materialize_file(&self, version_id: &str, descriptor: &FileDescriptor) -> Result<Vec<u8>> {
        if let Some(data) = self.tx.cached_file_data(&descriptor.id, version_id)? {
            return Ok(data);
        }

        let Some(plugin) = self.lix.plugins.for_path(&descriptor.path) else {
            warn!(
                "No cached bytes and no plugin for {} in version {}",
                descriptor.path, version_id
            );
            return Ok(Vec::new());
        };

        let changes: Vec<DetectedChange> = self
            .tx
            .live_rows(version_id, Some(&descriptor.id), None)?
            .into_iter()
            .filter(|row| row.plugin_key == plugin.key())
            .map(|row| DetectedChange {
                entity_id: row.entity_id,
                schema_key: row.schema_key,
                schema_version: row.schema_version,
                snapshot_content: row.snapshot_content,
            })
            .collect();

        let data = plugin.apply_changes(ApplyRequest {
            file: PluginFile {
                id: descriptor.id.clone(),
                path: descriptor.path.clone(),
                data: Vec::new(),
            },
            changes,
        })?;

        {
            // Caching rendered bytes must not look like an edit of the file.
            let _guard = self.session.skip_change_control();
            self.write_file_at(
                version_id,
                FileInput {
                    id: Some(descriptor.id.clone()),
                    path: descriptor.path.clone(),
                    data: data.clone(),
                    metadata: descriptor.metadata.clone(),
                },
            )?;
        }
        debug!(
            "Rendered {} in version {} with {} ({} bytes)",
            descriptor.path,
            version_id,
            plugin.key(),
            data.len()
        );
        Ok(data)
    }

    /// Create or replace a file in a version and stage the entity changes
    /// its plugin detects.
    pub(crate) fn write_file_at(&self, version_id: &str, input: FileInput) -> Result<FileDescriptor> {
        check_path(&input.path)?;

        let existing = match &input.id {
            Some(id) => self.descriptor(version_id, id)?,
            None => self.descriptor_by_path(version_id, &input.path)?,
        };
        if let Some(other) = self.descriptor_by_path(version_id, &input.path)? {
            if existing.as_ref().map(|d| &d.id) != Some(&other.id) {
                return Err(LixError::invalid_argument(format!(
                    "path {} is already used by file {}",
                    input.path, other.id
                )));
            }
        }

        if self.session.is_change_control_skipped() {
            // Bookkeeping writes only refresh the cached bytes.
            let descriptor = existing.ok_or_else(|| LixError::FileNotFound {
                path: input.path.clone(),
            })?;
            self.tx.put_file_data(&descriptor.id, version_id, &input.data)?;
            return Ok(descriptor);
        }

        let id = existing
            .as_ref()
            .map(|d| d.id.clone())
            .or(input.id)
            .unwrap_or_else(new_id);
        let descriptor = FileDescriptor {
            id: id.clone(),
            path: input.path.clone(),
            metadata: input.metadata,
        };

        let plugin = self
            .lix
            .plugins
            .for_path(&descriptor.path)
            .ok_or_else(|| LixError::NoPlugin {
                path: descriptor.path.clone(),
            })?;
        let previous_plugin = existing
            .as_ref()
            .and_then(|d| self.lix.plugins.for_path(&d.path));
        let same_plugin = previous_plugin.is_some_and(|previous| previous.key() == plugin.key());

        let before = match &existing {
            Some(previous) if same_plugin => Some(PluginFile {
                id: id.clone(),
                path: previous.path.clone(),
                data: self.materialize_file(version_id, previous)?,
            }),
            _ => None,
        };

        if existing.as_ref() != Some(&descriptor) {
            let schema = self.schema_for(FILE_DESCRIPTOR_SCHEMA_KEY, None)?;
            self.write_state(
                version_id,
                NewChange {
                    entity_id: id.clone(),
                    schema_key: FILE_DESCRIPTOR_SCHEMA_KEY.to_string(),
                    schema_version: schema.version,
                    file_id: GLOBAL_FILE_ID.to_string(),
                    plugin_key: OWN_ENTITY_PLUGIN_KEY.to_string(),
                    snapshot_content: Some(serde_json::to_value(&descriptor)?),
                },
            )?;
        }

        if existing.is_some() && !same_plugin {
            // The file changed format; entities of the old one no longer apply.
            self.tombstone_file_entities(version_id, &id)?;
        }

        let changes = plugin.detect_changes(DetectRequest {
            before,
            after: PluginFile {
                id: id.clone(),
                path: descriptor.path.clone(),
                data: input.data,
            },
        })?;
        debug!(
            "{} detected {} change(s) in {}",
            plugin.key(),
            changes.len(),
            descriptor.path
        );
        for change in changes {
            self.write_state(
                version_id,
                NewChange {
                    entity_id: change.entity_id,
                    schema_key: change.schema_key,
                    schema_version: change.schema_version,
                    file_id: id.clone(),
                    plugin_key: plugin.key().to_string(),
                    snapshot_content: change.snapshot_content,
                },
            )?;
        }

        Ok(descriptor)
    }

    fn tombstone_file_entities(&self, version_id: &str, file_id: &str) -> Result<usize> {
        let rows = self.tx.live_rows(version_id, Some(file_id), None)?;
        let count = rows.len();
        for row in rows {
            self.write_state(
                version_id,
                NewChange {
                    entity_id: row.entity_id,
                    schema_key: row.schema_key,
                    schema_version: row.schema_version,
                    file_id: row.file_id,
                    plugin_key: row.plugin_key,
                    snapshot_content: None,
                },
            )?;
        }
        Ok(count)
    }

    /// Delete a file and every entity in it. Returns `false` when the file
    /// does not exist in the version.
    pub(crate) fn delete_file_by_id(&self, version_id: &str, id: &str) -> Result<bool> {
        let Some(descriptor) = self.descriptor(version_id, id)? else {
            return Ok(false);
        };

        let removed = self.tombstone_file_entities(version_id, id)?;
        let schema = self.schema_for(FILE_DESCRIPTOR_SCHEMA_KEY, None)?;
        self.write_state(
            version_id,
            NewChange {
                entity_id: id.to_string(),
                schema_key: FILE_DESCRIPTOR_SCHEMA_KEY.to_string(),
                schema_version: schema.version,
                file_id: GLOBAL_FILE_ID.to_string(),
                plugin_key: OWN_ENTITY_PLUGIN_KEY.to_string(),
                snapshot_content: None,
            },
        )?;
        self.tx.invalidate_file_data(id, version_id)?;

        debug!("Deleted {} ({} entities) in version {}", descriptor.path, removed, version_id);
        Ok(true)
    }

    // Active version

    /// Create or replace the file at `path`, keeping its id and metadata.
    pub fn write_file(&self, path: &str, data: &[u8]) -> Result<FileDescriptor> {
        let version_id = self.active_version_id();
        let metadata = self
            .descriptor_by_path(version_id, path)?
            .and_then(|d| d.metadata);
        self.write_file_at(
            version_id,
            FileInput {
                id: None,
                path: path.to_string(),
                data: data.to_vec(),
                metadata,
            },
        )
    }

    pub fn read_file(&self, path: &str) -> Result<LixFile> {
        let version_id = self.active_version_id();
        let descriptor = self
            .descriptor_by_path(version_id, path)?
            .ok_or_else(|| LixError::FileNotFound {
                path: path.to_string(),
            })?;
        let data = self.materialize_file(version_id, &descriptor)?;
        Ok(LixFile {
            id: descriptor.id,
            path: descriptor.path,
            data,
            metadata: descriptor.metadata,
        })
    }

    pub fn delete_file(&self, path: &str) -> Result<()> {
        let version_id = self.active_version_id();
        let descriptor = self
            .descriptor_by_path(version_id, path)?
            .ok_or_else(|| LixError::FileNotFound {
                path: path.to_string(),
            })?;
        self.delete_file_by_id(version_id, &descriptor.id)?;
        Ok(())
    }

    pub fn list_files(&self) -> Result<Vec<FileDescriptor>> {
        self.file_descriptors(self.active_version_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_path() {
        assert!(check_path("/a.json").is_ok());
        assert!(check_path("/docs/readme.md").is_ok());

        for bad in ["a.json", "/", "/docs/", "//a", "/a/../b", "/a\\b"] {
            let err = check_path(bad).unwrap_err();
            assert_eq!(err.error_code(), "INVALID_ARGUMENT", "{bad}");
        }
    }
}
