//! Rendered file bytes per version.

use rusqlite::{params, OptionalExtension};

use lix_core::Result;

use crate::sqlite::{db_err, StoreTx};

impl StoreTx<'_> {
    /// Cached bytes of a file in a version.
    pub fn cached_file_data(&self, file_id: &str, version_id: &str) -> Result<Option<Vec<u8>>> {
        self.conn
            .prepare_cached(
                "SELECT data FROM internal_file_data_cache WHERE file_id = ?1 AND version_id = ?2",
            )
            .map_err(db_err)?
            .query_row(params![file_id, version_id], |row| row.get(0))
            .optional()
            .map_err(db_err)
    }

    /// Store rendered bytes of a file in a version.
    pub fn put_file_data(&self, file_id: &str, version_id: &str, data: &[u8]) -> Result<()> {
        self.conn
            .prepare_cached(
                "INSERT OR REPLACE INTO internal_file_data_cache (file_id, version_id, data) VALUES (?1, ?2, ?3)",
            )
            .map_err(db_err)?
            .execute(params![file_id, version_id, data])
            .map_err(db_err)?;
        Ok(())
    }

    /// Forget the rendered bytes of a file in a version.
    pub fn invalidate_file_data(&self, file_id: &str, version_id: &str) -> Result<()> {
        self.conn
            .prepare_cached("DELETE FROM internal_file_data_cache WHERE file_id = ?1 AND version_id = ?2")
            .map_err(db_err)?
            .execute(params![file_id, version_id])
            .map_err(db_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::LixStore;

    #[test]
    fn test_file_data_roundtrip() {
        let store = LixStore::open_memory(1).unwrap();
        store
            .transaction(|tx| {
                let main = tx.version_by_name("main")?;
                assert!(tx.cached_file_data("f1", &main.id)?.is_none());

                tx.put_file_data("f1", &main.id, b"hello")?;
                tx.put_file_data("f1", &main.id, b"hello again")?;
                assert_eq!(tx.cached_file_data("f1", &main.id)?, Some(b"hello again".to_vec()));

                tx.invalidate_file_data("f1", &main.id)?;
                assert!(tx.cached_file_data("f1", &main.id)?.is_none());
                Ok(())
            })
            .unwrap();
    }
}
