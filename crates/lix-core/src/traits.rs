//! Core traits defining the interfaces between components.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// A file as seen by a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginFile {
    pub id: String,
    pub path: String,
    pub data: Vec<u8>,
}

/// An entity-level change produced by (or fed to) a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedChange {
    pub entity_id: String,
    pub schema_key: String,
    pub schema_version: String,

    /// `None` deletes the entity.
    pub snapshot_content: Option<Value>,
}

/// Input of [`Plugin::detect_changes`].
#[derive(Debug, Clone)]
pub struct DetectRequest {
    /// Previous contents; `None` when the file is new.
    pub before: Option<PluginFile>,
    pub after: PluginFile,
}

/// Input of [`Plugin::apply_changes`].
#[derive(Debug, Clone)]
pub struct ApplyRequest {
    pub file: PluginFile,
    pub changes: Vec<DetectedChange>,
}

/// File-format plugin translating bytes to entity changes and back.
///
/// Both operations must be pure functions of their input: the engine calls
/// them speculatively and repeatedly.
pub trait Plugin: Send + Sync {
    /// Unique plugin key, stored on every change the plugin produces.
    fn key(&self) -> &str;

    /// Glob selecting the paths this plugin handles.
    fn detect_changes_glob(&self) -> &str;

    /// Schema definitions of the entities this plugin emits.
    fn schemas(&self) -> Vec<Value>;

    /// Entity changes turning `before` into `after`.
    fn detect_changes(&self, request: DetectRequest) -> Result<Vec<DetectedChange>>;

    /// New file bytes after applying `changes` to `file`.
    ///
    /// Applying the same changes to the same file must always yield the same
    /// bytes.
    fn apply_changes(&self, request: ApplyRequest) -> Result<Vec<u8>>;
}

/// Filesystem capability used to move files in and out of the engine.
///
/// Decorators wrap an inner implementation explicitly instead of
/// intercepting calls at runtime.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Read the whole file.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Create or replace a file, creating parent directories.
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Remove a file.
    async fn remove(&self, path: &Path) -> Result<()>;

    /// All regular files below `root`, relative to it, sorted.
    async fn list_files(&self, root: &Path) -> Result<Vec<PathBuf>>;
}
