//! The engine handle.

use std::path::Path;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::{debug, info};

use lix_core::{
    Commit, Conflict, LixConfig, LixError, LixFile, Result, Version, VersionBase, FileDescriptor,
};
use lix_plugin::PluginRegistry;
use lix_query::ast::{Literal, Statement};
use lix_query::{PlanCache, PlanCacheStats, ViewCatalog};
use lix_store::{LixStore, MergeOutcome, RegisterOutcome, SqlValue, StoreTx, MAIN_VERSION_NAME};

use crate::execute::QueryResult;
use crate::session::Session;
use crate::transaction::LixTx;

/// An open lix database.
///
/// One SQLite file holds the whole history. Every operation takes the
/// caller's [`Session`], which decides the version it reads and writes.
pub struct Lix {
    pub(crate) store: LixStore,
    pub(crate) plugins: PluginRegistry,
    pub(crate) plans: PlanCache,

    /// View catalog of the current schema generation.
    catalog: Mutex<Option<Arc<ViewCatalog>>>,

    pub(crate) config: LixConfig,
}

impl Lix {
    /// Open or create a database file with default settings.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = LixConfig::default();
        config.database.path = path.as_ref().to_path_buf();
        Self::open_with_config(config)
    }

    /// Open a throwaway in-memory database.
    pub fn open_memory() -> Result<Self> {
        let config = LixConfig::default();
        let store = LixStore::open_memory(config.database.node_id)?;
        Self::init(store, config)
    }

    /// Open the database named by `config.database.path`.
    pub fn open_with_config(config: LixConfig) -> Result<Self> {
        let store = LixStore::open(&config.database.path, &config.database)?;
        Self::init(store, config)
    }

    /// Write an exported database image to `path` and open it.
    pub fn import(bytes: &[u8], path: impl AsRef<Path>) -> Result<Self> {
        let mut config = LixConfig::default();
        config.database.path = path.as_ref().to_path_buf();
        let store = LixStore::import(bytes, path, &config.database)?;
        Self::init(store, config)
    }

    fn init(store: LixStore, config: LixConfig) -> Result<Self> {
        let store = store.with_max_inheritance_depth(config.engine.max_inheritance_depth);
        let plugins = PluginRegistry::from_config(&config.plugins)?;

        store.transaction(|tx| {
            for definition in plugins.schemas() {
                tx.register_schema(definition)?;
            }
            Ok(())
        })?;

        info!(
            "Lix ready with plugins {:?}, plan cache capacity {}",
            plugins,
            config.engine.plan_cache_capacity
        );
        Ok(Self {
            store,
            plans: PlanCache::new(config.engine.plan_cache_capacity),
            plugins,
            catalog: Mutex::new(None),
            config,
        })
    }

    /// Serialize the whole database into a standalone file image.
    pub fn export(&self) -> Result<Vec<u8>> {
        self.store.export()
    }

    /// A new session positioned on `main`.
    pub fn session(&self) -> Result<Session> {
        let main = self.store.transaction(|tx| tx.version_by_name(MAIN_VERSION_NAME))?;
        Ok(Session::new(main.id))
    }

    /// A new session positioned on the given version (id or name).
    pub fn session_at(&self, version: &str) -> Result<Session> {
        let version = self.store.transaction(|tx| tx.resolve_version(version))?;
        Ok(Session::new(version.id))
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    pub fn config(&self) -> &LixConfig {
        &self.config
    }

    /// Rewrite memo counters.
    pub fn plan_cache_stats(&self) -> PlanCacheStats {
        self.plans.stats()
    }

    /// Catalog of the current schema generation, rebuilt when it moved.
    pub(crate) fn catalog(&self, tx: &StoreTx<'_>) -> Result<Arc<ViewCatalog>> {
        let generation = self.store.generation();
        let mut cached = self
            .catalog
            .lock()
            .map_err(|_| LixError::internal("view catalog lock poisoned"))?;

        if let Some(catalog) = cached.as_ref().filter(|c| c.generation() == generation) {
            return Ok(catalog.clone());
        }

        let catalog = Arc::new(
            ViewCatalog::new(&tx.latest_schemas()?, generation)
                .with_max_inheritance_depth(self.config.engine.max_inheritance_depth),
        );
        debug!(
            "Built view catalog for generation {} ({} entity views)",
            generation,
            catalog.entity_views().count()
        );
        *cached = Some(catalog.clone());
        Ok(catalog)
    }

    /// Run `f` atomically. Any error rolls back every write it made,
    /// including schema registrations and the views built for them.
    ///
    /// Calls made while a transaction is open join it.
    pub async fn transaction<F, R>(&self, session: &Session, f: F) -> Result<R>
    where
        F: FnOnce(&LixTx<'_>) -> Result<R>,
    {
        self.store.transaction(|tx| f(&LixTx::new(self, session, tx)))
    }

    /// Run a statement against the logical views.
    pub async fn execute(
        &self,
        session: &Session,
        statement: impl Into<Statement>,
        params: &[Literal],
    ) -> Result<QueryResult> {
        let statement = statement.into();
        self.transaction(session, |tx| tx.execute(&statement, params)).await
    }

    // Graph

    /// Commit the active version's staged changes.
    pub async fn commit(&self, session: &Session, description: &str) -> Result<Commit> {
        self.transaction(session, |tx| tx.commit(description)).await
    }

    pub async fn create_version(
        &self,
        session: &Session,
        base: VersionBase,
        inherits_from: Option<&str>,
        name: Option<&str>,
    ) -> Result<Version> {
        self.transaction(session, |tx| tx.create_version(base, inherits_from, name))
            .await
    }

    /// Make another version (id or name) the session's active version.
    pub async fn switch_version(&self, session: &mut Session, version: &str) -> Result<Version> {
        let target = self.transaction(session, |tx| tx.resolve_version(version)).await?;
        info!(
            "Switching session from {} to {} ({})",
            session.active_version_id(),
            target.name,
            target.id
        );
        session.set_active_version(target.id.clone());
        Ok(target)
    }

    pub async fn delete_version(&self, session: &Session, version: &str) -> Result<()> {
        self.transaction(session, |tx| tx.delete_version(version)).await
    }

    pub async fn list_versions(&self, session: &Session) -> Result<Vec<Version>> {
        self.transaction(session, |tx| tx.list_versions()).await
    }

    pub async fn active_version(&self, session: &Session) -> Result<Version> {
        self.transaction(session, |tx| tx.active_version()).await
    }

    /// Point the active version back at `commit_id`.
    pub async fn restore_change_set(&self, session: &Session, commit_id: &str) -> Result<()> {
        self.transaction(session, |tx| tx.restore_change_set(commit_id)).await
    }

    /// Merge `source` (id or name) into the active version.
    pub async fn merge_version(&self, session: &Session, source: &str) -> Result<MergeOutcome> {
        self.transaction(session, |tx| tx.merge_version(source)).await
    }

    pub async fn detect_conflicts(
        &self,
        session: &Session,
        commit_a: &str,
        commit_b: &str,
    ) -> Result<Vec<Conflict>> {
        self.transaction(session, |tx| tx.detect_conflicts(commit_a, commit_b))
            .await
    }

    pub async fn detect_diverging_entity_conflict(
        &self,
        session: &Session,
        change_a: &str,
        change_b: &str,
    ) -> Result<Option<Conflict>> {
        self.transaction(session, |tx| tx.detect_diverging_entity_conflict(change_a, change_b))
            .await
    }

    /// Commits reachable from the active version, nearest first.
    pub async fn history(&self, session: &Session) -> Result<Vec<Commit>> {
        self.transaction(session, |tx| tx.history()).await
    }

    pub async fn register_schema(&self, session: &Session, definition: Value) -> Result<RegisterOutcome> {
        self.transaction(session, |tx| tx.register_schema(definition)).await
    }

    // Files

    pub async fn write_file(&self, session: &Session, path: &str, data: &[u8]) -> Result<FileDescriptor> {
        self.transaction(session, |tx| tx.write_file(path, data)).await
    }

    pub async fn read_file(&self, session: &Session, path: &str) -> Result<LixFile> {
        self.transaction(session, |tx| tx.read_file(path)).await
    }

    pub async fn delete_file(&self, session: &Session, path: &str) -> Result<()> {
        self.transaction(session, |tx| tx.delete_file(path)).await
    }

    pub async fn list_files(&self, session: &Session) -> Result<Vec<FileDescriptor>> {
        self.transaction(session, |tx| tx.list_files()).await
    }

    /// Call one of the engine's SQL functions directly.
    pub async fn call_function(&self, session: &Session, name: &str, args: &[Literal]) -> Result<SqlValue> {
        self.transaction(session, |tx| tx.call_function(name, args)).await
    }
}

impl std::fmt::Debug for Lix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lix")
            .field("path", &self.store.path())
            .field("plugins", &self.plugins)
            .finish()
    }
}
