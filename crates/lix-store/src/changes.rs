//! Append-only change log and per-version staging.

use std::collections::BTreeMap;

use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

use lix_core::{new_id, Change, EntityKey, LixError, NewChange, Result};

use crate::sqlite::{db_err, StoreTx};

pub(crate) const CHANGE_COLUMNS: &str =
    "c.id, c.entity_id, c.schema_key, c.schema_version, c.file_id, c.plugin_key, c.snapshot_id, c.created_at";

pub(crate) fn row_to_change(row: &Row<'_>) -> rusqlite::Result<Change> {
    Ok(Change {
        id: row.get(0)?,
        entity_id: row.get(1)?,
        schema_key: row.get(2)?,
        schema_version: row.get(3)?,
        file_id: row.get(4)?,
        plugin_key: row.get(5)?,
        snapshot_id: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Whether `a` supersedes `b` when both touch the same entity.
pub(crate) fn is_newer(a: &Change, b: &Change) -> bool {
    (&a.created_at, &a.id) > (&b.created_at, &b.id)
}

impl StoreTx<'_> {
    /// Append a change to the log.
    ///
    /// The schema must be registered and live content must validate against
    /// it. The change is not visible in any version until it is staged or
    /// linked into a commit.
    pub fn create_change(&self, change: &NewChange) -> Result<Change> {
        if change.entity_id.is_empty() {
            return Err(LixError::invalid_argument("entity_id must not be empty"));
        }
        let schema = self.require_schema(&change.schema_key, &change.schema_version)?;
        if let Some(content) = &change.snapshot_content {
            schema.validate(content)?;
        }

        let snapshot_id = self.intern_snapshot(change.snapshot_content.as_ref())?;
        let created = Change {
            id: new_id(),
            entity_id: change.entity_id.clone(),
            schema_key: change.schema_key.clone(),
            schema_version: change.schema_version.clone(),
            file_id: change.file_id.clone(),
            plugin_key: change.plugin_key.clone(),
            snapshot_id,
            created_at: self.now(),
        };

        self.conn
            .prepare_cached(
                "INSERT INTO change (id, entity_id, schema_key, schema_version, file_id, plugin_key, snapshot_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .map_err(db_err)?
            .execute(params![
                created.id,
                created.entity_id,
                created.schema_key,
                created.schema_version,
                created.file_id,
                created.plugin_key,
                created.snapshot_id,
                created.created_at,
            ])
            .map_err(db_err)?;

        Ok(created)
    }

    /// Look up a change by id.
    pub fn get_change(&self, id: &str) -> Result<Option<Change>> {
        self.conn
            .prepare_cached(&format!("SELECT {CHANGE_COLUMNS} FROM change c WHERE c.id = ?1"))
            .map_err(db_err)?
            .query_row(params![id], row_to_change)
            .optional()
            .map_err(db_err)
    }

    /// Look up a change by id or fail with `ChangeNotFound`.
    pub fn require_change(&self, id: &str) -> Result<Change> {
        self.get_change(id)?
            .ok_or_else(|| LixError::ChangeNotFound { id: id.to_string() })
    }

    /// Record `change_id` as staged in a version.
    pub fn stage_change(&self, version_id: &str, change_id: &str) -> Result<()> {
        self.conn
            .prepare_cached("INSERT OR IGNORE INTO pending_change (version_id, change_id) VALUES (?1, ?2)")
            .map_err(db_err)?
            .execute(params![version_id, change_id])
            .map_err(db_err)?;
        Ok(())
    }

    /// Staged changes of a version, oldest first.
    pub fn pending_changes(&self, version_id: &str) -> Result<Vec<Change>> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!(
                "SELECT {CHANGE_COLUMNS} FROM pending_change p
                 JOIN change c ON c.id = p.change_id
                 WHERE p.version_id = ?1
                 ORDER BY c.created_at, c.id"
            ))
            .map_err(db_err)?;
        let changes = stmt
            .query_map(params![version_id], row_to_change)
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(changes)
    }

    /// The newest staged change per entity.
    pub fn latest_pending(&self, version_id: &str) -> Result<BTreeMap<EntityKey, Change>> {
        let mut latest: BTreeMap<EntityKey, Change> = BTreeMap::new();
        for change in self.pending_changes(version_id)? {
            let key = change.key();
            match latest.get(&key) {
                Some(current) if !is_newer(&change, current) => {}
                _ => {
                    latest.insert(key, change);
                }
            }
        }
        Ok(latest)
    }

    /// Newest staged change for one entity.
    pub fn latest_pending_for(&self, version_id: &str, key: &EntityKey) -> Result<Option<Change>> {
        self.conn
            .prepare_cached(&format!(
                "SELECT {CHANGE_COLUMNS} FROM pending_change p
                 JOIN change c ON c.id = p.change_id
                 WHERE p.version_id = ?1 AND c.entity_id = ?2 AND c.schema_key = ?3 AND c.file_id = ?4
                 ORDER BY c.created_at DESC, c.id DESC
                 LIMIT 1"
            ))
            .map_err(db_err)?
            .query_row(
                params![version_id, key.entity_id, key.schema_key, key.file_id],
                row_to_change,
            )
            .optional()
            .map_err(db_err)
    }

    /// Drop every staged change of a version. The changes stay in the log.
    pub fn discard_pending(&self, version_id: &str) -> Result<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM pending_change WHERE version_id = ?1", params![version_id])
            .map_err(db_err)?;
        if removed > 0 {
            debug!("Discarded {} staged changes in version {}", removed, version_id);
        }
        Ok(removed)
    }
}
