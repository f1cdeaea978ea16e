//! Materialized per-version state.
//!
//! `internal_state_cache` holds the rows a version owns: the winner per
//! entity among the version's own commits and staged changes, tombstones
//! included. Entities a version inherits are never copied in; reads go
//! through [`lix_core::resolved_state_sql`], which falls back to the
//! inherited versions at query time. Everything here is derived from the
//! change log and commit graph and can be dropped and rebuilt at any time.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, info, warn};

use lix_core::canonical::canonical_json;
use lix_core::schema::FILE_DESCRIPTOR_SCHEMA_KEY;
use lix_core::{Change, EntityKey, Result, StateRow, Version, GLOBAL_FILE_ID};

use crate::changes::{is_newer, row_to_change, CHANGE_COLUMNS};
use crate::graph::CommitGraph;
use crate::snapshot::parse_content;
use crate::sqlite::{db_err, StoreTx};

/// Outcome of a cache read for one entity.
///
/// `Stale` is not an error: it tells the caller to derive the row from the
/// log instead of trusting the table.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Hit(StateRow),
    Miss,
    Stale,
}

/// Best change seen so far for one entity in one layer.
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub(crate) change: Change,

    /// Nearest commit linking the change; `None` while staged.
    pub(crate) commit_id: Option<String>,

    depth: usize,

    /// Oldest change seen for the entity, used as the row's `created_at`.
    first_seen: String,
}

impl Candidate {
    fn offer(slot: &mut BTreeMap<EntityKey, Candidate>, change: Change, commit_id: Option<String>, depth: usize) {
        let key = change.key();
        match slot.get_mut(&key) {
            None => {
                let first_seen = change.created_at.clone();
                slot.insert(
                    key,
                    Candidate {
                        change,
                        commit_id,
                        depth,
                        first_seen,
                    },
                );
            }
            Some(current) => {
                if change.created_at < current.first_seen {
                    current.first_seen = change.created_at.clone();
                }
                let wins = depth < current.depth
                    || (depth == current.depth && is_newer(&change, &current.change))
                    || (depth == current.depth && change.id == current.change.id && commit_id < current.commit_id);
                if wins {
                    current.change = change;
                    current.commit_id = commit_id;
                    current.depth = depth;
                }
            }
        }
    }
}

/// One level of a version's inheritance chain.
#[derive(Debug, Clone)]
struct Layer {
    version_id: String,
    commit_id: String,

    /// Commits reachable from here belong to the inherited layers.
    base_commit_id: Option<String>,
    include_staged: bool,
}

/// Columns of resolved rows, in [`row_to_state`] order.
const STATE_COLUMNS: &str = "entity_id, schema_key, file_id, version_id, plugin_key, snapshot_content, \
     schema_version, change_id, commit_id, inherited_from_version_id, inheritance_delete_marker, \
     created_at, updated_at";

/// Columns stored in `internal_state_cache`.
const CACHE_COLUMNS: &str = "entity_id, schema_key, file_id, version_id, plugin_key, snapshot_content, \
     schema_version, change_id, commit_id, created_at, updated_at";

fn row_to_state(row: &Row<'_>) -> rusqlite::Result<(StateRow, Option<String>)> {
    Ok((
        StateRow {
            entity_id: row.get(0)?,
            schema_key: row.get(1)?,
            file_id: row.get(2)?,
            version_id: row.get(3)?,
            plugin_key: row.get(4)?,
            snapshot_content: None,
            schema_version: row.get(6)?,
            change_id: row.get(7)?,
            commit_id: row.get(8)?,
            inherited_from_version_id: row.get(9)?,
            inheritance_delete_marker: row.get::<_, i64>(10)? != 0,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        },
        row.get(5)?,
    ))
}

fn with_content((mut row, raw): (StateRow, Option<String>)) -> Result<StateRow> {
    row.snapshot_content = parse_content(raw)?;
    Ok(row)
}

/// Row a version owns for its winning candidate.
fn own_row(version_id: &str, winner: &Candidate, content: Option<serde_json::Value>) -> StateRow {
    StateRow {
        entity_id: winner.change.entity_id.clone(),
        schema_key: winner.change.schema_key.clone(),
        file_id: winner.change.file_id.clone(),
        version_id: version_id.to_string(),
        plugin_key: winner.change.plugin_key.clone(),
        snapshot_content: content,
        schema_version: winner.change.schema_version.clone(),
        change_id: winner.change.id.clone(),
        commit_id: winner.commit_id.clone(),
        inherited_from_version_id: None,
        inheritance_delete_marker: false,
        created_at: winner.first_seen.clone(),
        updated_at: winner.change.created_at.clone(),
    }
}

impl StoreTx<'_> {
    // Derivation

    /// Winner per entity among the changes reachable from `tip` but not
    /// from `base`.
    pub(crate) fn committed_winners(
        &self,
        graph: &CommitGraph,
        tip: &str,
        base: Option<&str>,
        only: Option<&EntityKey>,
    ) -> Result<BTreeMap<EntityKey, Candidate>> {
        let mut depths = graph.ancestors(tip);
        if let Some(base) = base {
            for shared in graph.ancestors(base).into_keys() {
                depths.remove(&shared);
            }
        }
        let mut winners = BTreeMap::new();

        match only {
            Some(key) => {
                let mut stmt = self
                    .conn
                    .prepare_cached(&format!(
                        "SELECT cc.commit_id, {CHANGE_COLUMNS} FROM change c
                         JOIN lix_commit_change cc ON cc.change_id = c.id
                         WHERE c.entity_id = ?1 AND c.schema_key = ?2 AND c.file_id = ?3"
                    ))
                    .map_err(db_err)?;
                let rows = stmt
                    .query_map(params![key.entity_id, key.schema_key, key.file_id], |row| {
                        let commit_id: String = row.get(0)?;
                        let change = Change {
                            id: row.get(1)?,
                            entity_id: row.get(2)?,
                            schema_key: row.get(3)?,
                            schema_version: row.get(4)?,
                            file_id: row.get(5)?,
                            plugin_key: row.get(6)?,
                            snapshot_id: row.get(7)?,
                            created_at: row.get(8)?,
                        };
                        Ok((commit_id, change))
                    })
                    .map_err(db_err)?;
                for row in rows {
                    let (commit_id, change) = row.map_err(db_err)?;
                    if let Some(depth) = depths.get(&commit_id) {
                        Candidate::offer(&mut winners, change, Some(commit_id), *depth);
                    }
                }
            }
            None => {
                let mut stmt = self
                    .conn
                    .prepare_cached(&format!(
                        "SELECT {CHANGE_COLUMNS} FROM lix_commit_change cc
                         JOIN change c ON c.id = cc.change_id
                         WHERE cc.commit_id = ?1"
                    ))
                    .map_err(db_err)?;
                for (commit_id, depth) in &depths {
                    let changes = stmt
                        .query_map(params![commit_id], row_to_change)
                        .map_err(db_err)?;
                    for change in changes {
                        Candidate::offer(&mut winners, change.map_err(db_err)?, Some(commit_id.clone()), *depth);
                    }
                }
            }
        }

        Ok(winners)
    }

    /// The version followed by its inheritance chain, each pinned at the
    /// commit it is read from.
    fn layers(&self, version: &Version) -> Result<Vec<Layer>> {
        let mut layers = vec![Layer {
            version_id: version.id.clone(),
            commit_id: version.commit_id.clone(),
            base_commit_id: version.inherits_from_commit_id.clone(),
            include_staged: true,
        }];

        let mut seen: HashSet<String> = HashSet::from([version.id.clone()]);
        let mut current = version.clone();
        while let (Some(parent_id), Some(pinned)) = (
            current.inherits_from_version_id.clone(),
            current.inherits_from_commit_id.clone(),
        ) {
            if layers.len() > self.max_inheritance_depth {
                warn!("Inheritance chain of {} exceeds {} levels", version.id, self.max_inheritance_depth);
                break;
            }
            if !seen.insert(parent_id.clone()) {
                warn!("Inheritance cycle through version {}", parent_id);
                break;
            }
            let Some(parent) = self.get_version(&parent_id)? else {
                break;
            };
            layers.push(Layer {
                version_id: parent.id.clone(),
                commit_id: pinned,
                base_commit_id: parent.inherits_from_commit_id.clone(),
                include_staged: false,
            });
            current = parent;
        }

        Ok(layers)
    }

    fn layer_candidates(
        &self,
        graph: &CommitGraph,
        layer: &Layer,
        only: Option<&EntityKey>,
    ) -> Result<BTreeMap<EntityKey, Candidate>> {
        let mut candidates =
            self.committed_winners(graph, &layer.commit_id, layer.base_commit_id.as_deref(), only)?;
        if layer.include_staged {
            let staged = match only {
                Some(key) => self
                    .latest_pending_for(&layer.version_id, key)?
                    .into_iter()
                    .map(|c| (c.key(), c))
                    .collect(),
                None => self.latest_pending(&layer.version_id)?,
            };
            for (key, change) in staged {
                let first_seen = match candidates.get(&key) {
                    Some(c) if c.first_seen < change.created_at => c.first_seen.clone(),
                    _ => change.created_at.clone(),
                };
                candidates.insert(
                    key,
                    Candidate {
                        change,
                        commit_id: None,
                        depth: 0,
                        first_seen,
                    },
                );
            }
        }
        Ok(candidates)
    }

    fn resolve(&self, version: &Version, only: Option<&EntityKey>) -> Result<Vec<StateRow>> {
        let graph = self.commit_graph()?;
        let layers = self.layers(version)?;
        let maps = layers
            .iter()
            .map(|layer| self.layer_candidates(&graph, layer, only))
            .collect::<Result<Vec<_>>>()?;

        let keys: BTreeSet<&EntityKey> = maps.iter().flat_map(|m| m.keys()).collect();
        let mut rows = Vec::with_capacity(keys.len());

        for key in keys {
            let Some((level, winner)) = maps
                .iter()
                .enumerate()
                .find_map(|(i, m)| m.get(key).map(|c| (i, c)))
            else {
                continue;
            };

            let content = self.snapshot_content(&winner.change.snapshot_id)?;
            let delete_marker = level == 0
                && content.is_none()
                && maps[1..]
                    .iter()
                    .find_map(|m| m.get(key))
                    .is_some_and(|inherited| !inherited.change.is_tombstone());

            let mut row = own_row(&version.id, winner, content);
            row.inherited_from_version_id = (level > 0).then(|| layers[level].version_id.clone());
            row.inheritance_delete_marker = delete_marker;
            rows.push(row);
        }

        Ok(rows)
    }

    /// Derive every row of a version straight from the log and the graph.
    ///
    /// Includes tombstones; this is what the cache holds for the version.
    pub fn materialize_version_state(&self, version_id: &str) -> Result<Vec<StateRow>> {
        let version = self.require_version(version_id)?;
        self.resolve(&version, None)
    }

    /// Derive one entity of a version straight from the log and the graph.
    pub fn derive_entity(&self, version_id: &str, key: &EntityKey) -> Result<Option<StateRow>> {
        let version = self.require_version(version_id)?;
        Ok(self.resolve(&version, Some(key))?.into_iter().next())
    }

    /// Rows a version owns, without anything it inherits. This is what the
    /// cache stores for the version.
    fn own_rows(&self, version: &Version, only: Option<&EntityKey>) -> Result<Vec<StateRow>> {
        let graph = self.commit_graph()?;
        let own = Layer {
            version_id: version.id.clone(),
            commit_id: version.commit_id.clone(),
            base_commit_id: version.inherits_from_commit_id.clone(),
            include_staged: true,
        };
        let winners = self.layer_candidates(&graph, &own, only)?;
        let mut rows = Vec::with_capacity(winners.len());
        for winner in winners.values() {
            let content = self.snapshot_content(&winner.change.snapshot_id)?;
            rows.push(own_row(&version.id, winner, content));
        }
        Ok(rows)
    }

    // Staleness

    /// Flag the whole cache as untrustworthy.
    pub fn mark_cache_stale(&self) -> Result<()> {
        self.conn
            .execute(
                "UPDATE internal_cache_meta SET stale = 1, stale_since = coalesce(stale_since, ?1) WHERE id = 0",
                params![self.now()],
            )
            .map_err(db_err)?;
        Ok(())
    }

    pub fn is_cache_stale(&self) -> Result<bool> {
        let stale: i64 = self
            .conn
            .query_row("SELECT stale FROM internal_cache_meta WHERE id = 0", [], |row| row.get(0))
            .map_err(db_err)?;
        Ok(stale != 0)
    }

    /// When the cache was first marked stale, if it is.
    pub fn cache_stale_since(&self) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT stale_since FROM internal_cache_meta WHERE id = 0 AND stale = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map(Option::flatten)
            .map_err(db_err)
    }

    /// Drop every derived row and mark the cache stale.
    pub fn clear_cache(&self) -> Result<()> {
        self.mark_cache_stale()?;
        self.conn
            .execute_batch("DELETE FROM internal_state_cache; DELETE FROM internal_file_data_cache;")
            .map_err(db_err)?;
        info!("Cleared state cache");
        Ok(())
    }

    /// Re-derive every version and clear the stale flag.
    pub fn rebuild_cache(&self) -> Result<()> {
        self.conn
            .execute_batch("DELETE FROM internal_state_cache; DELETE FROM internal_file_data_cache;")
            .map_err(db_err)?;

        let mut total = 0usize;
        for version in self.list_versions()? {
            let rows = self.own_rows(&version, None)?;
            total += rows.len();
            for row in &rows {
                self.write_cache_row(row)?;
            }
        }

        self.conn
            .execute(
                "UPDATE internal_cache_meta SET stale = 0, stale_since = NULL WHERE id = 0",
                [],
            )
            .map_err(db_err)?;
        info!("Rebuilt state cache ({} rows)", total);
        Ok(())
    }

    /// Rebuild the cache if it is stale.
    pub fn ensure_cache_fresh(&self) -> Result<()> {
        if self.is_cache_stale()? {
            self.rebuild_cache()?;
        }
        Ok(())
    }

    // Reads

    /// Read one entity from the cache without deriving anything.
    pub fn lookup(&self, version_id: &str, key: &EntityKey) -> Result<CacheLookup> {
        if self.is_cache_stale()? {
            return Ok(CacheLookup::Stale);
        }

        let found = self
            .conn
            .prepare_cached(&format!(
                "SELECT {STATE_COLUMNS} FROM ({}) r
                 WHERE r.entity_id = ?1 AND r.schema_key = ?2 AND r.file_id = ?3 AND r.version_id = ?4",
                self.state_sql
            ))
            .map_err(db_err)?
            .query_row(
                params![key.entity_id, key.schema_key, key.file_id, version_id],
                row_to_state,
            )
            .optional()
            .map_err(db_err)?;

        match found {
            Some(raw) => Ok(CacheLookup::Hit(with_content(raw)?)),
            None => Ok(CacheLookup::Miss),
        }
    }

    /// Visible state of one entity, `None` when absent or deleted.
    ///
    /// A fresh cache answers directly, inherited rows included. While the
    /// cache is stale the row is derived and, when the version owns it,
    /// written back.
    pub fn get_state(&self, version_id: &str, key: &EntityKey) -> Result<Option<StateRow>> {
        let row = match self.lookup(version_id, key)? {
            CacheLookup::Hit(row) => Some(row),
            CacheLookup::Miss => None,
            CacheLookup::Stale => {
                let derived = self.derive_entity(version_id, key)?;
                if let Some(row) = derived.as_ref().filter(|r| r.inherited_from_version_id.is_none()) {
                    debug!("Populating cache for {} in {}", key, version_id);
                    self.write_cache_row(row)?;
                }
                derived
            }
        };
        Ok(row.filter(|r| !r.is_deleted()))
    }

    /// Live rows of a version, optionally limited to one file and/or schema.
    pub fn live_rows(
        &self,
        version_id: &str,
        file_id: Option<&str>,
        schema_key: Option<&str>,
    ) -> Result<Vec<StateRow>> {
        self.ensure_cache_fresh()?;
        let mut stmt = self
            .conn
            .prepare_cached(&format!(
                "SELECT {STATE_COLUMNS} FROM ({}) r
                 WHERE r.version_id = ?1
                   AND r.snapshot_content IS NOT NULL
                   AND (?2 IS NULL OR r.file_id = ?2)
                   AND (?3 IS NULL OR r.schema_key = ?3)
                 ORDER BY r.file_id, r.schema_key, r.entity_id",
                self.state_sql
            ))
            .map_err(db_err)?;
        let raw = stmt
            .query_map(params![version_id, file_id, schema_key], row_to_state)
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;
        raw.into_iter().map(with_content).collect()
    }

    // Writes

    /// Store a row the version owns.
    pub(crate) fn write_cache_row(&self, row: &StateRow) -> Result<()> {
        let content = row.snapshot_content.as_ref().map(canonical_json);
        self.conn
            .prepare_cached(&format!(
                "INSERT OR REPLACE INTO internal_state_cache ({CACHE_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
            ))
            .map_err(db_err)?
            .execute(params![
                row.entity_id,
                row.schema_key,
                row.file_id,
                row.version_id,
                row.plugin_key,
                content,
                row.schema_version,
                row.change_id,
                row.commit_id,
                row.created_at,
                row.updated_at,
            ])
            .map_err(db_err)?;
        Ok(())
    }

    /// Stage a change in a version and update its cache row.
    pub fn apply_staged_change(&self, version_id: &str, change: &Change) -> Result<()> {
        self.stage_change(version_id, &change.id)?;
        self.refresh_entity(version_id, &change.key())
    }

    /// Re-derive the row a version owns for one entity and invalidate the
    /// rendered file it belongs to.
    pub fn refresh_entity(&self, version_id: &str, key: &EntityKey) -> Result<()> {
        let version = self.require_version(version_id)?;
        match self.own_rows(&version, Some(key))?.into_iter().next() {
            Some(row) => self.write_cache_row(&row)?,
            None => {
                self.conn
                    .execute(
                        "DELETE FROM internal_state_cache
                         WHERE entity_id = ?1 AND schema_key = ?2 AND file_id = ?3 AND version_id = ?4",
                        params![key.entity_id, key.schema_key, key.file_id, version_id],
                    )
                    .map_err(db_err)?;
            }
        }

        if key.file_id != GLOBAL_FILE_ID {
            self.invalidate_file_data(&key.file_id, version_id)?;
        }
        if key.schema_key == FILE_DESCRIPTOR_SCHEMA_KEY {
            self.invalidate_file_data(&key.entity_id, version_id)?;
        }
        Ok(())
    }

    /// Replace every cache row of a version with freshly derived ones.
    ///
    /// Only the version's own rows are written, so a version that has not
    /// diverged from the one it inherits from costs nothing here.
    pub fn refresh_version_cache(&self, version_id: &str) -> Result<()> {
        let version = self.require_version(version_id)?;
        let rows = self.own_rows(&version, None)?;
        self.delete_version_cache(version_id)?;
        for row in &rows {
            self.write_cache_row(row)?;
        }
        debug!("Refreshed {} cache rows for version {}", rows.len(), version_id);
        Ok(())
    }

    /// Replace a version's rows with the changes a commit links.
    ///
    /// `winners` supplies the commit each change was originally reached
    /// through; changes without a winner are skipped.
    pub(crate) fn apply_commit_state(
        &self,
        version_id: &str,
        commit_id: &str,
        winners: &BTreeMap<EntityKey, Candidate>,
    ) -> Result<usize> {
        self.delete_version_cache(version_id)?;
        let mut applied = 0usize;
        for change in self.commit_changes(commit_id)? {
            let Some(winner) = winners.get(&change.key()).filter(|w| w.change.id == change.id) else {
                continue;
            };
            let content = self.snapshot_content(&change.snapshot_id)?;
            self.write_cache_row(&own_row(version_id, winner, content))?;
            applied += 1;
        }
        Ok(applied)
    }

    pub(crate) fn delete_version_cache(&self, version_id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM internal_state_cache WHERE version_id = ?1", params![version_id])
            .map_err(db_err)?;
        self.conn
            .execute("DELETE FROM internal_file_data_cache WHERE version_id = ?1", params![version_id])
            .map_err(db_err)?;
        Ok(())
    }

    /// Attach a new commit id to rows whose change was just committed.
    pub(crate) fn link_cache_rows(&self, version_id: &str, commit_id: &str, change_ids: &[String]) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "UPDATE internal_state_cache SET commit_id = ?1 WHERE version_id = ?2 AND change_id = ?3",
            )
            .map_err(db_err)?;
        for change_id in change_ids {
            stmt.execute(params![commit_id, version_id, change_id])
                .map_err(db_err)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::graph::MergeOutcome;
    use crate::LixStore;
    use lix_core::schema::ACCOUNT_SCHEMA_KEY;
    use lix_core::{NewChange, OWN_ENTITY_PLUGIN_KEY};

    fn account(id: &str, name: Option<&str>) -> NewChange {
        NewChange {
            entity_id: id.to_string(),
            schema_key: ACCOUNT_SCHEMA_KEY.to_string(),
            schema_version: "1.0".to_string(),
            file_id: GLOBAL_FILE_ID.to_string(),
            plugin_key: OWN_ENTITY_PLUGIN_KEY.to_string(),
            snapshot_content: name.map(|n| json!({"id": id, "name": n})),
        }
    }

    fn key(id: &str) -> EntityKey {
        EntityKey::new(id, ACCOUNT_SCHEMA_KEY, GLOBAL_FILE_ID)
    }

    fn write(tx: &StoreTx<'_>, version_id: &str, id: &str, name: Option<&str>) -> Result<Change> {
        let change = tx.create_change(&account(id, name))?;
        tx.apply_staged_change(version_id, &change)?;
        Ok(change)
    }

    fn content(tx: &StoreTx<'_>, version_id: &str, id: &str) -> Option<Value> {
        tx.get_state(version_id, &key(id)).unwrap().and_then(|r| r.snapshot_content)
    }

    #[test]
    fn test_staged_write_is_visible_before_commit() {
        let store = LixStore::open_memory(1).unwrap();
        store
            .transaction(|tx| {
                let main = tx.version_by_name("main")?;
                write(tx, &main.id, "a1", Some("Ada"))?;

                let row = tx.get_state(&main.id, &key("a1"))?.unwrap();
                assert!(row.commit_id.is_none());

                let commit = tx.commit_version(&main.id, "me", "add")?;
                let row = tx.get_state(&main.id, &key("a1"))?.unwrap();
                assert_eq!(row.commit_id.as_deref(), Some(commit.id.as_str()));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_inheritance_and_delete_marker() {
        let store = LixStore::open_memory(1).unwrap();
        store
            .transaction(|tx| {
                let main = tx.version_by_name("main")?;
                write(tx, &main.id, "a1", Some("Ada"))?;
                let c1 = tx.commit_version(&main.id, "me", "add")?;

                let child = tx.create_version(&c1.id, Some(&main.id), Some("child"))?;
                let row = tx.get_state(&child.id, &key("a1"))?.unwrap();
                assert_eq!(row.inherited_from_version_id.as_deref(), Some(main.id.as_str()));

                write(tx, &child.id, "a1", None)?;
                assert!(content(tx, &child.id, "a1").is_none());
                assert!(content(tx, &main.id, "a1").is_some());
                match tx.lookup(&child.id, &key("a1"))? {
                    CacheLookup::Hit(row) => {
                        assert!(row.inheritance_delete_marker);
                        assert!(row.inherited_from_version_id.is_none());
                    }
                    other => panic!("expected hit, got {other:?}"),
                }

                let rows = tx.materialize_version_state(&child.id)?;
                let tombstone = rows.iter().find(|r| r.entity_id == "a1").unwrap();
                assert!(tombstone.inheritance_delete_marker);
                assert!(tombstone.is_deleted());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_parent_changes_after_branching_are_not_inherited() {
        let store = LixStore::open_memory(1).unwrap();
        store
            .transaction(|tx| {
                let main = tx.version_by_name("main")?;
                write(tx, &main.id, "a1", Some("one"))?;
                tx.commit_version(&main.id, "me", "one")?;
                let child = tx.create_version(&main.commit_id, Some(&main.id), None)?;

                write(tx, &main.id, "a1", Some("two"))?;
                tx.commit_version(&main.id, "me", "two")?;

                assert_eq!(content(tx, &child.id, "a1"), Some(json!({"id": "a1", "name": "one"})));
                assert_eq!(content(tx, &main.id, "a1"), Some(json!({"id": "a1", "name": "two"})));
                Ok(())
            })
            .unwrap();
    }

    fn own_row_count(tx: &StoreTx<'_>, version_id: &str) -> i64 {
        tx.conn
            .query_row(
                "SELECT count(*) FROM internal_state_cache WHERE version_id = ?1",
                params![version_id],
                |row| row.get(0),
            )
            .unwrap()
    }

    fn commit_count(tx: &StoreTx<'_>) -> i64 {
        tx.conn
            .query_row("SELECT count(*) FROM lix_commit", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_branching_reads_through_without_copying() {
        let store = LixStore::open_memory(1).unwrap();
        store
            .transaction(|tx| {
                let main = tx.version_by_name("main")?;
                write(tx, &main.id, "a1", Some("Ada"))?;
                write(tx, &main.id, "a2", Some("Bob"))?;
                tx.commit_version(&main.id, "me", "add")?;
                let main_rows = tx.live_rows(&main.id, None, None)?;

                let child = tx.create_version(&main.commit_id, Some(&main.id), Some("child"))?;
                assert!(!tx.is_cache_stale()?);
                assert_eq!(own_row_count(tx, &child.id), 0);

                let inherited = tx.live_rows(&child.id, None, Some(ACCOUNT_SCHEMA_KEY))?;
                assert_eq!(inherited.len(), 2);
                assert!(inherited
                    .iter()
                    .all(|r| r.inherited_from_version_id.as_deref() == Some(main.id.as_str())));
                assert_eq!(tx.live_rows(&main.id, None, None)?, main_rows);

                // Only the entity the child writes becomes its own row.
                write(tx, &child.id, "a2", Some("Bea"))?;
                assert_eq!(own_row_count(tx, &child.id), 1);
                assert_eq!(content(tx, &child.id, "a2"), Some(json!({"id": "a2", "name": "Bea"})));
                assert_eq!(content(tx, &main.id, "a2"), Some(json!({"id": "a2", "name": "Bob"})));

                // Resolved rows agree with the derivation for both versions.
                for version_id in [&main.id, &child.id] {
                    for row in tx.materialize_version_state(version_id)? {
                        assert_eq!(tx.lookup(version_id, &row.key())?, CacheLookup::Hit(row));
                    }
                }
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_cache_matches_derivation_after_clear() {
        let store = LixStore::open_memory(1).unwrap();
        store
            .transaction(|tx| {
                let main = tx.version_by_name("main")?;
                write(tx, &main.id, "a1", Some("Ada"))?;
                write(tx, &main.id, "a2", Some("Bob"))?;
                tx.commit_version(&main.id, "me", "add")?;
                write(tx, &main.id, "a2", None)?;
                write(tx, &main.id, "a3", Some("Cy"))?;

                let before = tx.materialize_version_state(&main.id)?;
                tx.clear_cache()?;
                assert!(tx.is_cache_stale()?);
                assert!(tx.cache_stale_since()?.is_some());
                assert_eq!(tx.lookup(&main.id, &key("a1"))?, CacheLookup::Stale);

                // Lazy population of a single entity while stale.
                assert_eq!(content(tx, &main.id, "a1"), Some(json!({"id": "a1", "name": "Ada"})));

                tx.ensure_cache_fresh()?;
                assert!(!tx.is_cache_stale()?);
                for row in &before {
                    match tx.lookup(&main.id, &row.key())? {
                        CacheLookup::Hit(cached) => assert_eq!(&cached, row),
                        other => panic!("expected hit, got {other:?}"),
                    }
                }
                assert_eq!(tx.live_rows(&main.id, None, Some(ACCOUNT_SCHEMA_KEY))?.len(), 2);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_restore_reverts_pointer_and_state() {
        let store = LixStore::open_memory(1).unwrap();
        store
            .transaction(|tx| {
                let main = tx.version_by_name("main")?;
                write(tx, &main.id, "a1", Some("one"))?;
                let c1 = tx.commit_version(&main.id, "me", "one")?;
                write(tx, &main.id, "a1", Some("two"))?;
                write(tx, &main.id, "a2", Some("new"))?;
                let c2 = tx.commit_version(&main.id, "me", "two")?;
                write(tx, &main.id, "a3", Some("staged"))?;

                let commits_before = commit_count(tx);
                tx.restore_change_set(&main.id, &c1.id)?;
                assert_eq!(tx.require_version(&main.id)?.commit_id, c1.id);
                assert!(!tx.is_cache_stale()?);
                assert_eq!(commit_count(tx), commits_before);
                for row in tx.materialize_version_state(&main.id)? {
                    assert_eq!(tx.lookup(&main.id, &row.key())?, CacheLookup::Hit(row));
                }
                assert_eq!(own_row_count(tx, &main.id), 1);
                assert_eq!(content(tx, &main.id, "a1"), Some(json!({"id": "a1", "name": "one"})));
                assert!(content(tx, &main.id, "a2").is_none());
                assert!(content(tx, &main.id, "a3").is_none());
                assert!(tx.pending_changes(&main.id)?.is_empty());

                // History after the restore point is kept.
                assert!(tx.get_commit(&c2.id)?.is_some());
                assert_eq!(tx.history(&main.id)?[0].id, c1.id);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_merge_links_descendant_winners() {
        let store = LixStore::open_memory(1).unwrap();
        store
            .transaction(|tx| {
                let main = tx.version_by_name("main")?;
                write(tx, &main.id, "a1", Some("base"))?;
                let base = tx.commit_version(&main.id, "me", "base")?;

                let feature = tx.create_version(&base.id, None, Some("feature"))?;
                write(tx, &feature.id, "a1", Some("feature"))?;
                write(tx, &feature.id, "a2", Some("added"))?;
                tx.commit_version(&feature.id, "me", "feature work")?;

                write(tx, &main.id, "a3", Some("main only"))?;
                tx.commit_version(&main.id, "me", "main work")?;

                let outcome = tx.merge_version(&feature.id, &main.id, "me")?;
                let MergeOutcome::Merged(commit) = outcome else {
                    panic!("expected merge, got {outcome:?}");
                };
                assert_eq!(commit.parent_ids.len(), 2);
                assert_eq!(content(tx, &main.id, "a1"), Some(json!({"id": "a1", "name": "feature"})));
                assert!(content(tx, &main.id, "a2").is_some());
                assert!(content(tx, &main.id, "a3").is_some());

                assert_eq!(tx.merge_version(&feature.id, &main.id, "me")?, MergeOutcome::UpToDate);
                Ok(())
            })
            .unwrap();
    }
}
