//! Engine operations inside one open transaction.

use serde_json::Value;
use tracing::{debug, info};

use lix_core::{Commit, Conflict, LixError, LixSchema, NewChange, Result, StateRow, Version, VersionBase};
use lix_query::ast::{func, Expr, Literal, Select, SelectItem};
use lix_query::{compile_select, EngineState, ENGINE_FUNCTIONS};
use lix_store::{MergeOutcome, RegisterOutcome, SqlValue, StoreTx};

use crate::engine::Lix;
use crate::execute::sql_value;
use crate::session::Session;

/// Handle passed to [`Lix::transaction`] closures.
///
/// Everything done through it commits or rolls back together.
pub struct LixTx<'a> {
    pub(crate) lix: &'a Lix,
    pub(crate) session: &'a Session,
    pub(crate) tx: &'a StoreTx<'a>,
}

impl<'a> LixTx<'a> {
    pub(crate) fn new(lix: &'a Lix, session: &'a Session, tx: &'a StoreTx<'a>) -> Self {
        Self { lix, session, tx }
    }

    pub fn session(&self) -> &Session {
        self.session
    }

    pub fn active_version_id(&self) -> &str {
        self.session.active_version_id()
    }

    /// Preprocessor input for the session's current view of the database.
    pub(crate) fn engine_state(&self) -> Result<EngineState> {
        let catalog = self.lix.catalog(self.tx)?;
        Ok(EngineState::new(self.active_version_id(), catalog))
    }

    /// Schema to write with: the given version, or the newest one.
    pub(crate) fn schema_for(&self, key: &str, version: Option<&str>) -> Result<LixSchema> {
        match version {
            Some(version) => self.tx.require_schema(key, version),
            None => self.tx.latest_schema(key)?.ok_or_else(|| LixError::SchemaNotFound {
                key: key.to_string(),
                version: "latest".to_string(),
            }),
        }
    }

    /// Validate and stage one entity change.
    pub(crate) fn write_state(&self, version_id: &str, change: NewChange) -> Result<()> {
        self.tx.write_entity(version_id, &change)?;
        Ok(())
    }

    // Versions

    pub fn active_version(&self) -> Result<Version> {
        self.tx.require_version(self.active_version_id())
    }

    pub fn resolve_version(&self, id_or_name: &str) -> Result<Version> {
        self.tx.resolve_version(id_or_name)
    }

    pub fn list_versions(&self) -> Result<Vec<Version>> {
        self.tx.list_versions()
    }

    pub fn commit(&self, description: &str) -> Result<Commit> {
        self.tx.commit_version(
            self.active_version_id(),
            &self.lix.config.engine.author,
            description,
        )
    }

    /// Branch a new version.
    ///
    /// `inherits_from` names the version whose current state the new one
    /// reads through for entities it never touches.
    pub fn create_version(
        &self,
        base: VersionBase,
        inherits_from: Option<&str>,
        name: Option<&str>,
    ) -> Result<Version> {
        let from_commit = match base {
            VersionBase::Active => self.active_version()?.commit_id,
            VersionBase::Version(id) => self.tx.resolve_version(&id)?.commit_id,
            VersionBase::Commit(id) => self.tx.require_commit(&id)?.id,
        };
        let parent = inherits_from
            .map(|v| self.tx.resolve_version(v))
            .transpose()?;

        self.tx
            .create_version(&from_commit, parent.as_ref().map(|p| p.id.as_str()), name)
    }

    pub fn delete_version(&self, id_or_name: &str) -> Result<()> {
        let version = self.tx.resolve_version(id_or_name)?;
        self.tx.delete_version(&version.id, self.active_version_id())
    }

    pub fn restore_change_set(&self, commit_id: &str) -> Result<()> {
        self.tx.restore_change_set(self.active_version_id(), commit_id)
    }

    pub fn merge_version(&self, source: &str) -> Result<MergeOutcome> {
        let source = self.tx.resolve_version(source)?;
        let outcome = self.tx.merge_version(
            &source.id,
            self.active_version_id(),
            &self.lix.config.engine.author,
        )?;
        if let MergeOutcome::Conflicts(conflicts) = &outcome {
            info!("Merge of {} stopped on {} conflict(s)", source.name, conflicts.len());
        }
        Ok(outcome)
    }

    pub fn history(&self) -> Result<Vec<Commit>> {
        self.tx.history(self.active_version_id())
    }

    // Conflicts

    pub fn detect_conflicts(&self, commit_a: &str, commit_b: &str) -> Result<Vec<Conflict>> {
        self.tx.ensure_cache_fresh()?;
        self.tx.detect_conflicts(commit_a, commit_b)
    }

    pub fn detect_diverging_entity_conflict(&self, change_a: &str, change_b: &str) -> Result<Option<Conflict>> {
        self.tx.ensure_cache_fresh()?;
        self.tx.detect_diverging_entity_conflict(change_a, change_b)
    }

    // Schemas

    pub fn register_schema(&self, definition: Value) -> Result<RegisterOutcome> {
        let outcome = self.tx.register_schema(definition)?;
        debug!("Schema registration: {:?}", outcome);
        Ok(outcome)
    }

    // Cache

    /// Live rows of a version as the state cache holds them.
    pub fn live_state(&self, version_id: &str) -> Result<Vec<StateRow>> {
        self.tx.live_rows(version_id, None, None)
    }

    /// Live rows of a version derived from the change log and the commit
    /// graph, bypassing the cache. Ordered like [`LixTx::live_state`].
    pub fn derive_live_state(&self, version_id: &str) -> Result<Vec<StateRow>> {
        let mut rows: Vec<StateRow> = self
            .tx
            .materialize_version_state(version_id)?
            .into_iter()
            .filter(|row| !row.is_deleted())
            .collect();
        rows.sort_by(|a, b| {
            (&a.file_id, &a.schema_key, &a.entity_id).cmp(&(&b.file_id, &b.schema_key, &b.entity_id))
        });
        Ok(rows)
    }

    /// Drop every cached row; the next read rebuilds them.
    pub fn clear_cache(&self) -> Result<()> {
        self.tx.clear_cache()
    }

    /// Whether the next read has to rebuild the cache first.
    pub fn is_cache_stale(&self) -> Result<bool> {
        self.tx.is_cache_stale()
    }

    // Settings

    /// Front-end key/value setting; not change controlled.
    pub fn setting(&self, key: &str) -> Result<Option<String>> {
        self.tx.get_setting(key)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.tx.set_setting(key, value)
    }

    // Functions

    /// Evaluate `lix_ulid()`, `lix_timestamp()` or `lix_content_hash(json)`.
    pub fn call_function(&self, name: &str, args: &[Literal]) -> Result<SqlValue> {
        let lower = name.to_ascii_lowercase();
        if !ENGINE_FUNCTIONS.contains(&lower.as_str()) {
            return Err(LixError::UnknownFunction {
                name: name.to_string(),
            });
        }

        let call = func(lower, args.iter().cloned().map(Expr::Literal).collect());
        let compiled = compile_select(&Select::values(vec![SelectItem::aliased(call, "value")]), &[])?;
        let params: Vec<SqlValue> = compiled.params.iter().map(sql_value).collect();
        let rows = self.tx.query(&compiled.sql, &params)?;

        rows.rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .ok_or_else(|| LixError::internal(format!("{name} returned no value")))
    }
}
