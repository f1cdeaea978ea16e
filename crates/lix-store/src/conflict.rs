//! Diverging-entity conflict detection.
//!
//! Conflicts are returned as data; nothing here writes.

use lix_core::{Change, Conflict, ConflictKind, Result};

use crate::graph::CommitGraph;
use crate::sqlite::StoreTx;

impl StoreTx<'_> {
    /// Commit that first introduced a change, if it was ever committed.
    fn introducing_commit(&self, change: &Change) -> Result<Option<String>> {
        Ok(self.commits_of_change(&change.id)?.into_iter().next())
    }

    fn diverging(&self, graph: &CommitGraph, a: &Change, b: &Change) -> Result<Option<Conflict>> {
        if a.id == b.id || a.key() != b.key() || a.snapshot_id == b.snapshot_id {
            return Ok(None);
        }

        let (Some(commit_a), Some(commit_b)) = (self.introducing_commit(a)?, self.introducing_commit(b)?)
        else {
            return Ok(None);
        };

        let ancestor = graph.lowest_common_ancestor(&commit_a, &commit_b);
        if ancestor.as_deref() == Some(commit_a.as_str()) || ancestor.as_deref() == Some(commit_b.as_str()) {
            // One change extends the other.
            return Ok(None);
        }

        let pair = if a.id <= b.id {
            (a.id.clone(), b.id.clone())
        } else {
            (b.id.clone(), a.id.clone())
        };
        Ok(Some(Conflict {
            kind: ConflictKind::DivergingEntity,
            key: a.key(),
            change_ids: pair,
            common_ancestor_commit_id: ancestor,
        }))
    }

    /// Whether two changes edit the same entity independently from a shared
    /// base. The result does not depend on argument order.
    pub fn detect_diverging_entity_conflict(&self, change_a: &str, change_b: &str) -> Result<Option<Conflict>> {
        let a = self.require_change(change_a)?;
        let b = self.require_change(change_b)?;
        let graph = self.commit_graph()?;
        self.diverging(&graph, &a, &b)
    }

    /// Diverging edits between the committed states of two commits.
    pub fn detect_conflicts(&self, commit_a: &str, commit_b: &str) -> Result<Vec<Conflict>> {
        self.require_commit(commit_a)?;
        self.require_commit(commit_b)?;

        let graph = self.commit_graph()?;
        let left = self.committed_winners(&graph, commit_a, None, None)?;
        let right = self.committed_winners(&graph, commit_b, None, None)?;

        let mut conflicts = Vec::new();
        for (key, ours) in &left {
            if let Some(theirs) = right.get(key) {
                if let Some(conflict) = self.diverging(&graph, &ours.change, &theirs.change)? {
                    conflicts.push(conflict);
                }
            }
        }
        Ok(conflicts)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use crate::LixStore;
    use lix_core::schema::ACCOUNT_SCHEMA_KEY;
    use lix_core::{NewChange, GLOBAL_FILE_ID, OWN_ENTITY_PLUGIN_KEY};

    fn account(id: &str, name: &str) -> NewChange {
        NewChange {
            entity_id: id.to_string(),
            schema_key: ACCOUNT_SCHEMA_KEY.to_string(),
            schema_version: "1.0".to_string(),
            file_id: GLOBAL_FILE_ID.to_string(),
            plugin_key: OWN_ENTITY_PLUGIN_KEY.to_string(),
            snapshot_content: Some(json!({"id": id, "name": name})),
        }
    }

    /// Commits `name` for entity `id` on a fresh branch of main's root and
    /// returns the change id.
    fn branch_edit(store: &LixStore, branch: &str, id: &str, name: &str, base: Option<&str>) -> String {
        store
            .transaction(|tx| {
                let main = tx.version_by_name("main")?;
                let from = base.map(str::to_string).unwrap_or(main.commit_id);
                let version = tx.create_version(&from, None, Some(branch))?;
                let change = tx.create_change(&account(id, name))?;
                tx.apply_staged_change(&version.id, &change)?;
                tx.commit_version(&version.id, "me", branch)?;
                Ok(change.id)
            })
            .unwrap()
    }

    #[test]
    fn test_sibling_edits_conflict() {
        let store = LixStore::open_memory(1).unwrap();
        let a = branch_edit(&store, "left", "a1", "left", None);
        let b = branch_edit(&store, "right", "a1", "right", None);

        let conflict = store
            .transaction(|tx| tx.detect_diverging_entity_conflict(&a, &b))
            .unwrap()
            .unwrap();
        assert!(conflict.common_ancestor_commit_id.is_some());

        let tips = store
            .transaction(|tx| {
                let left = tx.version_by_name("left")?;
                let right = tx.version_by_name("right")?;
                tx.detect_conflicts(&left.commit_id, &right.commit_id)
            })
            .unwrap();
        assert_eq!(tips, vec![conflict]);
    }

    #[test]
    fn test_linear_history_does_not_conflict() {
        let store = LixStore::open_memory(1).unwrap();
        let a = branch_edit(&store, "first", "a1", "one", None);
        let first_tip = store
            .transaction(|tx| Ok(tx.version_by_name("first")?.commit_id))
            .unwrap();
        let b = branch_edit(&store, "second", "a1", "two", Some(&first_tip));

        let result = store
            .transaction(|tx| tx.detect_diverging_entity_conflict(&a, &b))
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_identical_content_does_not_conflict() {
        let store = LixStore::open_memory(1).unwrap();
        let a = branch_edit(&store, "left", "a1", "same", None);
        let b = branch_edit(&store, "right", "a1", "same", None);
        let result = store
            .transaction(|tx| tx.detect_diverging_entity_conflict(&a, &b))
            .unwrap();
        assert!(result.is_none());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_conflict_detection_is_symmetric(left in "[a-z]{1,8}", right in "[a-z]{1,8}") {
            let store = LixStore::open_memory(1).unwrap();
            let a = branch_edit(&store, "left", "a1", &left, None);
            let b = branch_edit(&store, "right", "a1", &right, None);

            let ab = store.transaction(|tx| tx.detect_diverging_entity_conflict(&a, &b)).unwrap();
            let ba = store.transaction(|tx| tx.detect_diverging_entity_conflict(&b, &a)).unwrap();
            prop_assert_eq!(&ab, &ba);
            prop_assert_eq!(ab.is_some(), left != right);
        }
    }
}
