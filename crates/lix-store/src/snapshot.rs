//! Content-addressed snapshot store.

use rusqlite::{params, OptionalExtension};
use serde_json::Value;

use lix_core::canonical::{canonical_json, snapshot_id, NO_CONTENT_SNAPSHOT_ID};
use lix_core::{Result, Snapshot};

use crate::sqlite::{db_err, StoreTx};

/// Parse a JSON column, treating SQL NULL as no content.
pub(crate) fn parse_content(raw: Option<String>) -> Result<Option<Value>> {
    match raw {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

impl StoreTx<'_> {
    /// Store `content` if it is not present yet and return its id.
    ///
    /// `None` maps to the shared tombstone snapshot, which always exists.
    pub fn intern_snapshot(&self, content: Option<&Value>) -> Result<String> {
        let id = snapshot_id(content);
        if let Some(value) = content {
            self.conn
                .prepare_cached("INSERT OR IGNORE INTO snapshot (id, content) VALUES (?1, ?2)")
                .map_err(db_err)?
                .execute(params![id, canonical_json(value)])
                .map_err(db_err)?;
        }
        Ok(id)
    }

    /// Look up a snapshot by id.
    pub fn get_snapshot(&self, id: &str) -> Result<Option<Snapshot>> {
        if id == NO_CONTENT_SNAPSHOT_ID {
            return Ok(Some(Snapshot {
                id: id.to_string(),
                content: None,
            }));
        }

        let raw: Option<Option<String>> = self
            .conn
            .prepare_cached("SELECT content FROM snapshot WHERE id = ?1")
            .map_err(db_err)?
            .query_row(params![id], |row| row.get(0))
            .optional()
            .map_err(db_err)?;

        match raw {
            Some(content) => Ok(Some(Snapshot {
                id: id.to_string(),
                content: parse_content(content)?,
            })),
            None => Ok(None),
        }
    }

    /// Content of a snapshot, `None` for tombstones and unknown ids.
    pub fn snapshot_content(&self, id: &str) -> Result<Option<Value>> {
        Ok(self.get_snapshot(id)?.and_then(|s| s.content))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::LixStore;

    #[test]
    fn test_intern_deduplicates() {
        let store = LixStore::open_memory(1).unwrap();
        store
            .transaction(|tx| {
                let a = tx.intern_snapshot(Some(&json!({"x": 1, "y": [1, 2]})))?;
                let b = tx.intern_snapshot(Some(&json!({"y": [1, 2], "x": 1})))?;
                assert_eq!(a, b);

                let count: i64 = tx
                    .conn
                    .query_row("SELECT count(*) FROM snapshot WHERE id = ?1", [&a], |r| r.get(0))
                    .unwrap();
                assert_eq!(count, 1);

                let snapshot = tx.get_snapshot(&a)?.unwrap();
                assert_eq!(snapshot.content, Some(json!({"x": 1, "y": [1, 2]})));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_tombstone_is_shared() {
        let store = LixStore::open_memory(1).unwrap();
        store
            .transaction(|tx| {
                assert_eq!(tx.intern_snapshot(None)?, "no-content");
                assert_eq!(tx.intern_snapshot(None)?, "no-content");
                let snapshot = tx.get_snapshot("no-content")?.unwrap();
                assert!(snapshot.content.is_none());
                assert!(tx.get_snapshot("missing")?.is_none());
                Ok(())
            })
            .unwrap();
    }
}
