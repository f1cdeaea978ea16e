//! Commit graph and versions.
//!
//! Commits are immutable and content addressed. Versions are the only
//! mutable rows; their `commit_id` moves with a compare-and-swap update so
//! a pointer never advances from a state the caller did not read.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use rusqlite::{params, OptionalExtension, Row};
use serde_json::json;
use tracing::{debug, info};

use lix_core::canonical::{canonical_json, hash_bytes};
use lix_core::{new_id, Change, Commit, LixError, Result, Version};

use crate::changes::{row_to_change, CHANGE_COLUMNS};
use crate::sqlite::{db_err, StoreTx};

/// Author recorded on commits the engine creates for itself.
pub const SYSTEM_AUTHOR: &str = "lix";

/// Name of the version created with a new database.
pub const MAIN_VERSION_NAME: &str = "main";

/// In-memory view of the commit DAG (child -> parents).
#[derive(Debug, Clone, Default)]
pub struct CommitGraph {
    parents: HashMap<String, Vec<String>>,
}

impl CommitGraph {
    /// Build a graph from `(commit, parents)` pairs.
    pub fn from_edges<I>(commits: I) -> Self
    where
        I: IntoIterator<Item = (String, Vec<String>)>,
    {
        let mut parents: HashMap<String, Vec<String>> = HashMap::new();
        for (id, ps) in commits {
            parents.entry(id).or_default().extend(ps);
        }
        for ps in parents.values_mut() {
            ps.sort();
            ps.dedup();
        }
        Self { parents }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.parents.contains_key(id)
    }

    pub fn parents(&self, id: &str) -> &[String] {
        self.parents.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every commit reachable from `tip` (itself included) with its shortest
    /// distance from `tip`.
    pub fn ancestors(&self, tip: &str) -> HashMap<String, usize> {
        let mut depths = HashMap::new();
        if !self.contains(tip) {
            return depths;
        }

        let mut queue = VecDeque::from([(tip.to_string(), 0usize)]);
        depths.insert(tip.to_string(), 0);
        while let Some((id, depth)) = queue.pop_front() {
            for parent in self.parents(&id) {
                if !depths.contains_key(parent) {
                    depths.insert(parent.clone(), depth + 1);
                    queue.push_back((parent.clone(), depth + 1));
                }
            }
        }
        depths
    }

    /// Whether `ancestor` is reachable from `descendant` (a commit is its own
    /// ancestor).
    pub fn is_ancestor(&self, ancestor: &str, descendant: &str) -> bool {
        self.ancestors(descendant).contains_key(ancestor)
    }

    /// Lowest common ancestor of two commits.
    ///
    /// Candidates are common ancestors that are not a proper ancestor of
    /// another common ancestor; ties go to the smallest summed distance, then
    /// to the smallest commit id.
    pub fn lowest_common_ancestor(&self, a: &str, b: &str) -> Option<String> {
        let from_a = self.ancestors(a);
        let from_b = self.ancestors(b);

        let common: BTreeSet<&String> = from_a.keys().filter(|c| from_b.contains_key(*c)).collect();
        if common.is_empty() {
            return None;
        }

        let mut dominated: HashSet<String> = HashSet::new();
        for commit in &common {
            for ancestor in self.ancestors(commit).into_keys() {
                if &&ancestor != commit {
                    dominated.insert(ancestor);
                }
            }
        }

        common
            .into_iter()
            .filter(|c| !dominated.contains(*c))
            .min_by(|x, y| {
                let dx = from_a[*x] + from_b[*x];
                let dy = from_a[*y] + from_b[*y];
                dx.cmp(&dy).then_with(|| x.cmp(y))
            })
            .cloned()
    }
}

/// Content address of a commit.
pub fn commit_id(
    parent_ids: &[String],
    change_ids: &[String],
    author: &str,
    description: &str,
    created_at: &str,
) -> String {
    let mut parents = parent_ids.to_vec();
    parents.sort();
    let mut changes = change_ids.to_vec();
    changes.sort();
    let body = json!({
        "parent_ids": parents,
        "change_ids": changes,
        "author": author,
        "description": description,
        "created_at": created_at,
    });
    hash_bytes(canonical_json(&body).as_bytes())
}

pub(crate) fn row_to_version(row: &Row<'_>) -> rusqlite::Result<Version> {
    Ok(Version {
        id: row.get(0)?,
        name: row.get(1)?,
        commit_id: row.get(2)?,
        inherits_from_version_id: row.get(3)?,
        inherits_from_commit_id: row.get(4)?,
        created_at: row.get(5)?,
    })
}

const VERSION_COLUMNS: &str =
    "id, name, commit_id, inherits_from_version_id, inherits_from_commit_id, created_at";

impl StoreTx<'_> {
    /// Load the whole commit graph.
    pub fn commit_graph(&self) -> Result<CommitGraph> {
        let mut commits: Vec<(String, Vec<String>)> = Vec::new();

        let mut stmt = self
            .conn
            .prepare_cached("SELECT id FROM lix_commit")
            .map_err(db_err)?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_err)?;
        for id in ids {
            commits.push((id.map_err(db_err)?, Vec::new()));
        }

        let mut stmt = self
            .conn
            .prepare_cached("SELECT child_id, parent_id FROM lix_commit_edge")
            .map_err(db_err)?;
        let edges = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(db_err)?;
        for edge in edges {
            let (child, parent) = edge.map_err(db_err)?;
            commits.push((child, vec![parent]));
        }

        Ok(CommitGraph::from_edges(commits))
    }

    /// Create a commit row with its edges and change links.
    pub fn insert_commit(
        &self,
        parent_ids: &[String],
        change_ids: &[String],
        author: &str,
        description: &str,
    ) -> Result<Commit> {
        let created_at = self.now();
        let id = commit_id(parent_ids, change_ids, author, description, &created_at);

        self.conn
            .execute(
                "INSERT INTO lix_commit (id, author, description, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![id, author, description, created_at],
            )
            .map_err(db_err)?;

        for parent in parent_ids {
            self.conn
                .prepare_cached("INSERT OR IGNORE INTO lix_commit_edge (parent_id, child_id) VALUES (?1, ?2)")
                .map_err(db_err)?
                .execute(params![parent, id])
                .map_err(|e| match db_err(e) {
                    LixError::ForeignKeyViolation { .. } => LixError::CommitNotFound {
                        id: parent.clone(),
                    },
                    other => other,
                })?;
        }

        for change in change_ids {
            self.conn
                .prepare_cached("INSERT OR IGNORE INTO lix_commit_change (commit_id, change_id) VALUES (?1, ?2)")
                .map_err(db_err)?
                .execute(params![id, change])
                .map_err(|e| match db_err(e) {
                    LixError::ForeignKeyViolation { .. } => LixError::ChangeNotFound {
                        id: change.clone(),
                    },
                    other => other,
                })?;
        }

        Ok(Commit {
            id,
            parent_ids: parent_ids.to_vec(),
            change_ids: change_ids.to_vec(),
            author: author.to_string(),
            description: description.to_string(),
            created_at,
        })
    }

    /// Look up a commit with its parents and changes.
    pub fn get_commit(&self, id: &str) -> Result<Option<Commit>> {
        let row: Option<(String, String, String)> = self
            .conn
            .prepare_cached("SELECT author, description, created_at FROM lix_commit WHERE id = ?1")
            .map_err(db_err)?
            .query_row(params![id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .optional()
            .map_err(db_err)?;

        let Some((author, description, created_at)) = row else {
            return Ok(None);
        };

        let parent_ids = self.string_column(
            "SELECT parent_id FROM lix_commit_edge WHERE child_id = ?1 ORDER BY parent_id",
            id,
        )?;
        let change_ids = self.string_column(
            "SELECT change_id FROM lix_commit_change WHERE commit_id = ?1 ORDER BY change_id",
            id,
        )?;

        Ok(Some(Commit {
            id: id.to_string(),
            parent_ids,
            change_ids,
            author,
            description,
            created_at,
        }))
    }

    /// Look up a commit or fail with `CommitNotFound`.
    pub fn require_commit(&self, id: &str) -> Result<Commit> {
        self.get_commit(id)?
            .ok_or_else(|| LixError::CommitNotFound { id: id.to_string() })
    }

    /// Remove a commit that nothing descends from.
    pub(crate) fn delete_commit(&self, id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM lix_commit WHERE id = ?1", params![id])
            .map_err(db_err)?;
        Ok(())
    }

    /// Changes linked into one commit.
    pub fn commit_changes(&self, commit_id: &str) -> Result<Vec<Change>> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!(
                "SELECT {CHANGE_COLUMNS} FROM lix_commit_change cc
                 JOIN change c ON c.id = cc.change_id
                 WHERE cc.commit_id = ?1
                 ORDER BY c.created_at, c.id"
            ))
            .map_err(db_err)?;
        let changes = stmt
            .query_map(params![commit_id], row_to_change)
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(changes)
    }

    /// Commits a change is linked into, oldest first.
    pub fn commits_of_change(&self, change_id: &str) -> Result<Vec<String>> {
        self.string_column(
            "SELECT cc.commit_id FROM lix_commit_change cc
             JOIN lix_commit k ON k.id = cc.commit_id
             WHERE cc.change_id = ?1
             ORDER BY k.created_at, k.id",
            change_id,
        )
    }

    fn string_column(&self, sql: &str, arg: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare_cached(sql).map_err(db_err)?;
        let values = stmt
            .query_map(params![arg], |row| row.get::<_, String>(0))
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(values)
    }

    /// Commits reachable from a version's tip, nearest first.
    pub fn history(&self, version_id: &str) -> Result<Vec<Commit>> {
        let version = self.require_version(version_id)?;
        let graph = self.commit_graph()?;

        let mut ordered: Vec<(usize, Commit)> = Vec::new();
        for (id, depth) in graph.ancestors(&version.commit_id) {
            ordered.push((depth, self.require_commit(&id)?));
        }
        ordered.sort_by(|(da, a), (db, b)| {
            da.cmp(db)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(ordered.into_iter().map(|(_, c)| c).collect())
    }

    // Versions

    /// Create the root commit and the `main` version of an empty database.
    pub(crate) fn bootstrap_graph(&self) -> Result<()> {
        let count: i64 = self
            .conn
            .query_row("SELECT count(*) FROM version", [], |row| row.get(0))
            .map_err(db_err)?;
        if count > 0 {
            return Ok(());
        }

        let root = self.insert_commit(&[], &[], SYSTEM_AUTHOR, "root")?;
        let main = Version {
            id: new_id(),
            name: MAIN_VERSION_NAME.to_string(),
            commit_id: root.id,
            inherits_from_version_id: None,
            inherits_from_commit_id: None,
            created_at: self.now(),
        };
        self.insert_version(&main)?;
        info!("Initialized repository with version {}", main.id);
        Ok(())
    }

    fn insert_version(&self, version: &Version) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO version (id, name, commit_id, inherits_from_version_id, inherits_from_commit_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    version.id,
                    version.name,
                    version.commit_id,
                    version.inherits_from_version_id,
                    version.inherits_from_commit_id,
                    version.created_at,
                ],
            )
            .map_err(|e| {
                if e.to_string().contains("UNIQUE constraint") {
                    LixError::VersionExists {
                        name: version.name.clone(),
                    }
                } else {
                    db_err(e)
                }
            })?;
        Ok(())
    }

    /// Look up a version by id.
    pub fn get_version(&self, id: &str) -> Result<Option<Version>> {
        self.conn
            .prepare_cached(&format!("SELECT {VERSION_COLUMNS} FROM version WHERE id = ?1"))
            .map_err(db_err)?
            .query_row(params![id], row_to_version)
            .optional()
            .map_err(db_err)
    }

    /// Look up a version or fail with `VersionNotFound`.
    pub fn require_version(&self, id: &str) -> Result<Version> {
        self.get_version(id)?
            .ok_or_else(|| LixError::VersionNotFound { id: id.to_string() })
    }

    /// Look up a version by its unique name.
    pub fn version_by_name(&self, name: &str) -> Result<Version> {
        self.conn
            .prepare_cached(&format!("SELECT {VERSION_COLUMNS} FROM version WHERE name = ?1"))
            .map_err(db_err)?
            .query_row(params![name], row_to_version)
            .optional()
            .map_err(db_err)?
            .ok_or_else(|| LixError::VersionNotFound { id: name.to_string() })
    }

    /// Resolve a version by id, falling back to its name.
    pub fn resolve_version(&self, id_or_name: &str) -> Result<Version> {
        match self.get_version(id_or_name)? {
            Some(version) => Ok(version),
            None => self.version_by_name(id_or_name),
        }
    }

    /// All versions ordered by creation.
    pub fn list_versions(&self) -> Result<Vec<Version>> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("SELECT {VERSION_COLUMNS} FROM version ORDER BY created_at, id"))
            .map_err(db_err)?;
        let versions = stmt
            .query_map([], row_to_version)
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(versions)
    }

    /// Move a version pointer from `expected` to `new`.
    ///
    /// Fails when the pointer no longer holds `expected`.
    pub(crate) fn advance_version(&self, version_id: &str, expected: &str, new: &str) -> Result<()> {
        let updated = self
            .conn
            .execute(
                "UPDATE version SET commit_id = ?3 WHERE id = ?1 AND commit_id = ?2",
                params![version_id, expected, new],
            )
            .map_err(db_err)?;
        if updated != 1 {
            return Err(LixError::internal(format!(
                "version {version_id} moved away from commit {expected}"
            )));
        }
        Ok(())
    }

    /// Branch a new version at `from_commit_id`.
    ///
    /// With `inherits_from`, entities the new version never touches are read
    /// from that version as of its current commit. Inherited state is never
    /// copied: only the changes reachable from `from_commit_id` and not from
    /// the pinned parent commit become rows of the new version, and other
    /// versions' rows are left alone.
    pub fn create_version(
        &self,
        from_commit_id: &str,
        inherits_from: Option<&str>,
        name: Option<&str>,
    ) -> Result<Version> {
        self.require_commit(from_commit_id)?;

        let (inherits_from_version_id, inherits_from_commit_id) = match inherits_from {
            Some(parent_id) => {
                let parent = self.require_version(parent_id)?;
                (Some(parent.id), Some(parent.commit_id))
            }
            None => (None, None),
        };

        let id = new_id();
        let name = match name {
            Some(n) if n.trim().is_empty() => {
                return Err(LixError::invalid_argument("version name must not be empty"))
            }
            Some(n) => n.to_string(),
            None => format!("version-{}", id.to_lowercase()),
        };

        let version = Version {
            id,
            name,
            commit_id: from_commit_id.to_string(),
            inherits_from_version_id,
            inherits_from_commit_id,
            created_at: self.now(),
        };
        self.insert_version(&version)?;
        self.refresh_version_cache(&version.id)?;

        info!("Created version {} ({}) at {}", version.name, version.id, version.commit_id);
        Ok(version)
    }

    /// Delete a version. Its commits stay in history.
    ///
    /// `active_version_id` is the caller's active version, which cannot be
    /// removed.
    pub fn delete_version(&self, id: &str, active_version_id: &str) -> Result<()> {
        let version = self.require_version(id)?;
        if version.id == active_version_id {
            return Err(LixError::VersionInUse {
                id: version.id,
                reason: "it is the active version".to_string(),
            });
        }

        let heirs: i64 = self
            .conn
            .query_row(
                "SELECT count(*) FROM version WHERE inherits_from_version_id = ?1",
                params![version.id],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        if heirs > 0 {
            return Err(LixError::VersionInUse {
                id: version.id,
                reason: format!("{heirs} version(s) inherit from it"),
            });
        }

        self.delete_version_cache(&version.id)?;
        self.conn
            .execute("DELETE FROM version WHERE id = ?1", params![version.id])
            .map_err(db_err)?;

        info!("Deleted version {} ({})", version.name, version.id);
        Ok(())
    }

    /// Link the version's staged changes into a new commit and advance it.
    ///
    /// Only the newest staged change per entity is linked. An empty staging
    /// area yields an empty commit.
    pub fn commit_version(&self, version_id: &str, author: &str, description: &str) -> Result<Commit> {
        let version = self.require_version(version_id)?;
        let staged = self.latest_pending(&version.id)?;
        let change_ids: Vec<String> = staged.values().map(|c| c.id.clone()).collect();

        let commit = self.insert_commit(
            std::slice::from_ref(&version.commit_id),
            &change_ids,
            author,
            description,
        )?;
        self.advance_version(&version.id, &version.commit_id, &commit.id)?;
        self.discard_pending(&version.id)?;
        self.link_cache_rows(&version.id, &commit.id, &change_ids)?;

        info!(
            "Committed {} change(s) to version {} as {}",
            change_ids.len(),
            version.name,
            commit.id
        );
        Ok(commit)
    }

    /// Point a version back at `target_commit_id` without losing history.
    ///
    /// The newest change per entity reachable from the target is bundled into
    /// a transient commit, the version's cache rows are replaced with the
    /// changes that commit links, the pointer moves to the target and the
    /// transient commit is dropped again. Staged changes of the version are
    /// discarded.
    pub fn restore_change_set(&self, version_id: &str, target_commit_id: &str) -> Result<()> {
        let version = self.require_version(version_id)?;
        self.require_commit(target_commit_id)?;

        let graph = self.commit_graph()?;
        let leaves = self.committed_winners(
            &graph,
            target_commit_id,
            version.inherits_from_commit_id.as_deref(),
            None,
        )?;
        let leaf_ids: Vec<String> = leaves.values().map(|c| c.change.id.clone()).collect();

        let interim = self.insert_commit(
            &[target_commit_id.to_string()],
            &leaf_ids,
            SYSTEM_AUTHOR,
            &format!("restore {target_commit_id}"),
        )?;

        self.discard_pending(&version.id)?;
        let applied = self.apply_commit_state(&version.id, &interim.id, &leaves)?;
        self.advance_version(&version.id, &version.commit_id, target_commit_id)?;
        self.delete_commit(&interim.id)?;

        info!(
            "Restored version {} to {} ({} entities)",
            version.name, target_commit_id, applied
        );
        Ok(())
    }

    /// Merge `source` into `target`.
    ///
    /// Diverging edits are returned untouched. Otherwise a merge commit with
    /// parents `[target tip, source tip]` links, for each entity whose winners
    /// differ, the change that descends from the other one.
    pub fn merge_version(&self, source_id: &str, target_id: &str, author: &str) -> Result<MergeOutcome> {
        let source = self.require_version(source_id)?;
        let target = self.require_version(target_id)?;
        if source.id == target.id {
            return Err(LixError::invalid_argument("cannot merge a version into itself"));
        }

        let graph = self.commit_graph()?;
        if graph.is_ancestor(&source.commit_id, &target.commit_id) {
            return Ok(MergeOutcome::UpToDate);
        }

        let conflicts = self.detect_conflicts(&source.commit_id, &target.commit_id)?;
        if !conflicts.is_empty() {
            debug!("Merge of {} into {} has {} conflict(s)", source.name, target.name, conflicts.len());
            return Ok(MergeOutcome::Conflicts(conflicts));
        }

        let ours = self.committed_winners(&graph, &target.commit_id, None, None)?;
        let theirs = self.committed_winners(&graph, &source.commit_id, None, None)?;

        let mut linked: Vec<String> = Vec::new();
        for (key, incoming) in &theirs {
            match ours.get(key) {
                None => linked.push(incoming.change.id.clone()),
                Some(current) if current.change.id == incoming.change.id => {}
                Some(current) => {
                    let (Some(ours_commit), Some(theirs_commit)) =
                        (current.commit_id.as_deref(), incoming.commit_id.as_deref())
                    else {
                        continue;
                    };
                    if graph.is_ancestor(ours_commit, theirs_commit) {
                        linked.push(incoming.change.id.clone());
                    } else {
                        linked.push(current.change.id.clone());
                    }
                }
            }
        }

        let commit = self.insert_commit(
            &[target.commit_id.clone(), source.commit_id.clone()],
            &linked,
            author,
            &format!("merge {} into {}", source.name, target.name),
        )?;
        self.advance_version(&target.id, &target.commit_id, &commit.id)?;
        self.refresh_version_cache(&target.id)?;

        info!("Merged {} into {} as {}", source.name, target.name, commit.id);
        Ok(MergeOutcome::Merged(commit))
    }
}

/// Result of [`StoreTx::merge_version`].
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// The target already contains the source.
    UpToDate,
    Merged(Commit),
    /// Nothing was written.
    Conflicts(Vec<lix_core::Conflict>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LixStore;

    fn graph(edges: &[(&str, &[&str])]) -> CommitGraph {
        CommitGraph::from_edges(edges.iter().map(|(c, ps)| {
            (c.to_string(), ps.iter().map(|p| p.to_string()).collect())
        }))
    }

    #[test]
    fn test_ancestor_depths() {
        // r <- a <- b, r <- c, merge m(b, c)
        let g = graph(&[("r", &[]), ("a", &["r"]), ("b", &["a"]), ("c", &["r"]), ("m", &["b", "c"])]);
        let depths = g.ancestors("m");
        assert_eq!(depths["m"], 0);
        assert_eq!(depths["c"], 1);
        assert_eq!(depths["r"], 2);
        assert!(g.is_ancestor("a", "m"));
        assert!(!g.is_ancestor("m", "a"));
        assert!(g.is_ancestor("a", "a"));
    }

    #[test]
    fn test_lowest_common_ancestor() {
        let g = graph(&[("r", &[]), ("a", &["r"]), ("b", &["a"]), ("c", &["a"]), ("d", &["r"])]);
        assert_eq!(g.lowest_common_ancestor("b", "c"), Some("a".to_string()));
        assert_eq!(g.lowest_common_ancestor("b", "d"), Some("r".to_string()));
        assert_eq!(g.lowest_common_ancestor("a", "b"), Some("a".to_string()));
        assert_eq!(g.lowest_common_ancestor("b", "c"), g.lowest_common_ancestor("c", "b"));
        assert_eq!(g.lowest_common_ancestor("b", "zz"), None);
    }

    #[test]
    fn test_criss_cross_lca_is_deterministic() {
        // Two merges of the same pair of branches: both x and y are best.
        let g = graph(&[
            ("r", &[]),
            ("x", &["r"]),
            ("y", &["r"]),
            ("m1", &["x", "y"]),
            ("m2", &["y", "x"]),
        ]);
        let lca = g.lowest_common_ancestor("m1", "m2");
        assert_eq!(lca, Some("x".to_string()));
        assert_eq!(lca, g.lowest_common_ancestor("m2", "m1"));
    }

    #[test]
    fn test_commit_id_is_order_independent() {
        let a = commit_id(&["p2".into(), "p1".into()], &["c1".into()], "me", "d", "t");
        let b = commit_id(&["p1".into(), "p2".into()], &["c1".into()], "me", "d", "t");
        assert_eq!(a, b);
        assert_ne!(a, commit_id(&["p1".into()], &["c1".into()], "me", "d", "t"));
    }

    #[test]
    fn test_create_and_delete_version() {
        let store = LixStore::open_memory(1).unwrap();
        store
            .transaction(|tx| {
                let main = tx.version_by_name("main")?;
                let child = tx.create_version(&main.commit_id, Some(&main.id), Some("child"))?;
                assert_eq!(child.inherits_from_commit_id.as_deref(), Some(main.commit_id.as_str()));
                assert!(!tx.is_cache_stale()?);

                assert!(matches!(
                    tx.create_version(&main.commit_id, None, Some("child")),
                    Err(LixError::VersionExists { .. })
                ));
                assert!(matches!(
                    tx.delete_version(&main.id, &child.id),
                    Err(LixError::VersionInUse { .. })
                ));
                assert!(matches!(
                    tx.delete_version(&child.id, &child.id),
                    Err(LixError::VersionInUse { .. })
                ));

                tx.delete_version(&child.id, &main.id)?;
                assert_eq!(tx.list_versions()?.len(), 1);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_empty_commit_advances_pointer() {
        let store = LixStore::open_memory(1).unwrap();
        store
            .transaction(|tx| {
                let main = tx.version_by_name("main")?;
                let commit = tx.commit_version(&main.id, "me", "nothing")?;
                assert_eq!(commit.parent_ids, vec![main.commit_id.clone()]);
                assert!(commit.change_ids.is_empty());
                assert_eq!(tx.require_version(&main.id)?.commit_id, commit.id);

                let history = tx.history(&main.id)?;
                assert_eq!(history.len(), 2);
                assert_eq!(history[0].id, commit.id);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_advance_version_is_compare_and_swap() {
        let store = LixStore::open_memory(1).unwrap();
        store
            .transaction(|tx| {
                let main = tx.version_by_name("main")?;
                let c1 = tx.insert_commit(&[main.commit_id.clone()], &[], "me", "one")?;
                assert!(tx.advance_version(&main.id, "stale", &c1.id).is_err());
                tx.advance_version(&main.id, &main.commit_id, &c1.id)?;
                Ok(())
            })
            .unwrap();
    }
}
