//! Core domain types for the change-control engine.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ulid::Ulid;

/// File id used by entities that do not belong to a file.
pub const GLOBAL_FILE_ID: &str = "lix";

/// Plugin key used by entities written directly through state views.
pub const OWN_ENTITY_PLUGIN_KEY: &str = "lix_own_entity";

/// Physical table holding materialized state rows.
pub const STATE_CACHE_TABLE: &str = "internal_state_cache";

/// Physical table holding rendered file bytes.
pub const FILE_DATA_CACHE_TABLE: &str = "internal_file_data_cache";

/// Generate a new unique id.
pub fn new_id() -> String {
    Ulid::new().to_string()
}

/// Immutable content-addressed value a change points to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Content hash, or the tombstone sentinel.
    pub id: String,

    /// `None` marks a deletion.
    pub content: Option<Value>,
}

/// Identity of an entity: `(entity_id, schema_key, file_id)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    pub entity_id: String,
    pub schema_key: String,
    pub file_id: String,
}

impl EntityKey {
    pub fn new(
        entity_id: impl Into<String>,
        schema_key: impl Into<String>,
        file_id: impl Into<String>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            schema_key: schema_key.into(),
            file_id: file_id.into(),
        }
    }
}

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.file_id, self.schema_key, self.entity_id)
    }
}

/// Immutable record of one entity mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub id: String,
    pub entity_id: String,
    pub schema_key: String,
    pub schema_version: String,
    pub file_id: String,
    pub plugin_key: String,
    pub snapshot_id: String,
    pub created_at: String,
}

impl Change {
    pub fn key(&self) -> EntityKey {
        EntityKey::new(&self.entity_id, &self.schema_key, &self.file_id)
    }

    /// Whether this change deletes its entity.
    pub fn is_tombstone(&self) -> bool {
        self.snapshot_id == crate::canonical::NO_CONTENT_SNAPSHOT_ID
    }
}

/// A change that has not been written yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewChange {
    pub entity_id: String,
    pub schema_key: String,
    pub schema_version: String,
    pub file_id: String,
    pub plugin_key: String,

    /// `None` writes a tombstone.
    pub snapshot_content: Option<Value>,
}

impl NewChange {
    pub fn key(&self) -> EntityKey {
        EntityKey::new(&self.entity_id, &self.schema_key, &self.file_id)
    }
}

/// Immutable bundle of changes plus parent pointers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub id: String,
    pub parent_ids: Vec<String>,
    pub change_ids: Vec<String>,
    pub author: String,
    pub description: String,
    pub created_at: String,
}

/// Mutable named pointer into the commit graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub id: String,
    pub name: String,
    pub commit_id: String,

    /// Parent version for copy-on-write reads.
    pub inherits_from_version_id: Option<String>,

    /// Commit the parent pointed to when this version was created.
    pub inherits_from_commit_id: Option<String>,

    pub created_at: String,
}

/// Where a new version starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionBase {
    /// The caller's active version.
    Active,
    /// The current commit of another version.
    Version(String),
    /// An explicit commit.
    Commit(String),
}

/// One materialized row of the state cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRow {
    pub entity_id: String,
    pub schema_key: String,
    pub file_id: String,
    pub version_id: String,
    pub plugin_key: String,
    pub snapshot_content: Option<Value>,
    pub schema_version: String,
    pub change_id: String,

    /// `None` while the change is staged and not yet committed.
    pub commit_id: Option<String>,

    pub inherited_from_version_id: Option<String>,
    pub inheritance_delete_marker: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl StateRow {
    pub fn key(&self) -> EntityKey {
        EntityKey::new(&self.entity_id, &self.schema_key, &self.file_id)
    }

    /// Whether the row hides the entity (own tombstone or delete marker).
    pub fn is_deleted(&self) -> bool {
        self.snapshot_content.is_none()
    }
}

/// Kinds of conflicts the engine reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Two changes to the same entity descend independently from a shared base.
    DivergingEntity,
}

/// A detected conflict. Returned as data, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub key: EntityKey,

    /// The conflicting change ids, ordered so the pair is order independent.
    pub change_ids: (String, String),

    /// Lowest common ancestor of the commits introducing the two changes.
    pub common_ancestor_commit_id: Option<String>,
}

/// Metadata of a file tracked by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub id: String,
    pub path: String,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// A file with its materialized contents.
#[derive(Debug, Clone, PartialEq)]
pub struct LixFile {
    pub id: String,
    pub path: String,
    pub data: Vec<u8>,
    pub metadata: Option<Value>,
}
