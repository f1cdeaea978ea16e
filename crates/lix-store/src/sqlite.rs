//! SQLite connection handling and the transaction handle.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::functions::FunctionFlags;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info};

use lix_core::canonical::{content_hash, hash_bytes};
use lix_core::schema::builtin_schemas;
use lix_core::{new_id, resolved_state_sql, Clock, DatabaseConfig, LixError, Result, DEFAULT_MAX_INHERITANCE_DEPTH};

use crate::schema::SCHEMA;

/// Map a rusqlite error at the store boundary.
///
/// Foreign key failures keep their identity; everything else is a database
/// error.
pub(crate) fn db_err(e: rusqlite::Error) -> LixError {
    if let rusqlite::Error::SqliteFailure(ref err, _) = e {
        if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY {
            return LixError::foreign_key(e.to_string());
        }
    }
    LixError::database(e.to_string())
}

/// Rows returned by [`StoreTx::query`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

/// SQLite-backed store.
///
/// A single connection behind a blocking mutex; every operation runs inside
/// [`LixStore::transaction`] and receives a [`StoreTx`].
pub struct LixStore {
    conn: Arc<Mutex<Connection>>,
    clock: Arc<Clock>,

    /// Bumped whenever the set of registered schemas changes.
    generation: Arc<AtomicU64>,

    path: Option<PathBuf>,
    max_inheritance_depth: usize,

    /// Inheritance read-through rendered for `max_inheritance_depth`.
    state_sql: String,
}

impl LixStore {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>, config: &DatabaseConfig) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| LixError::database(format!("Failed to open database: {}", e)))?;

        Self::init(conn, config, Some(path.to_path_buf()))
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory(node_id: u16) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            LixError::database(format!("Failed to open in-memory database: {}", e))
        })?;

        let config = DatabaseConfig {
            node_id,
            wal_mode: false,
            ..DatabaseConfig::default()
        };
        Self::init(conn, &config, None)
    }

    /// Write an exported database to `path` and open it.
    pub fn import(bytes: &[u8], path: impl AsRef<Path>, config: &DatabaseConfig) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Err(LixError::invalid_argument(format!(
                "refusing to import over existing file {}",
                path.display()
            )));
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, bytes)?;
        info!("Imported {} bytes into {:?}", bytes.len(), path);
        Self::open(path, config)
    }

    fn init(conn: Connection, config: &DatabaseConfig, path: Option<PathBuf>) -> Result<Self> {
        Self::configure_connection(&conn, config, path.is_some())?;

        let clock = Arc::new(Clock::new(config.node_id));
        Self::register_functions(&conn, clock.clone())?;

        conn.execute_batch(SCHEMA)
            .map_err(|e| LixError::database(format!("Failed to initialize schema: {}", e)))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            clock,
            generation: Arc::new(AtomicU64::new(0)),
            path,
            max_inheritance_depth: DEFAULT_MAX_INHERITANCE_DEPTH,
            state_sql: resolved_state_sql(DEFAULT_MAX_INHERITANCE_DEPTH),
        };

        store.transaction(|tx| {
            tx.observe_persisted_clock()?;
            for definition in builtin_schemas() {
                tx.register_schema(definition)?;
            }
            tx.bootstrap_graph()
        })?;

        info!("Database opened at {:?}", store.path.as_deref().unwrap_or(Path::new(":memory:")));
        Ok(store)
    }

    /// Longest version inheritance chain followed when resolving state.
    pub fn with_max_inheritance_depth(mut self, depth: usize) -> Self {
        self.max_inheritance_depth = depth.max(1);
        self.state_sql = resolved_state_sql(self.max_inheritance_depth);
        self
    }

    fn configure_connection(conn: &Connection, config: &DatabaseConfig, on_disk: bool) -> Result<()> {
        let journal = if config.wal_mode && on_disk {
            "WAL"
        } else {
            "MEMORY"
        };
        conn.execute_batch(&format!(
            r#"
            PRAGMA journal_mode = {journal};
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = {cache};
            PRAGMA busy_timeout = {busy};
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            "#,
            cache = config.cache_size,
            busy = config.busy_timeout_ms,
        ))
        .map_err(|e| LixError::database(format!("Failed to configure connection: {}", e)))?;

        Ok(())
    }

    /// Engine functions callable from rewritten queries.
    fn register_functions(conn: &Connection, clock: Arc<Clock>) -> Result<()> {
        conn.create_scalar_function("lix_ulid", 0, FunctionFlags::SQLITE_UTF8, |_ctx| {
            Ok(new_id())
        })
        .map_err(db_err)?;

        conn.create_scalar_function("lix_timestamp", 0, FunctionFlags::SQLITE_UTF8, move |_ctx| {
            Ok(clock.now_string())
        })
        .map_err(db_err)?;

        conn.create_scalar_function(
            "lix_content_hash",
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                let text: Option<String> = ctx.get(0)?;
                Ok(text.map(|t| match serde_json::from_str(&t) {
                    Ok(value) => content_hash(&value),
                    Err(_) => hash_bytes(t.as_bytes()),
                }))
            },
        )
        .map_err(db_err)?;

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| LixError::database(e.to_string()))
    }

    fn handle<'a>(&'a self, conn: &'a Connection) -> StoreTx<'a> {
        StoreTx {
            conn,
            clock: &self.clock,
            generation: &self.generation,
            max_inheritance_depth: self.max_inheritance_depth,
            state_sql: &self.state_sql,
        }
    }

    /// Run `f` atomically.
    ///
    /// When the connection is already inside a transaction the closure joins
    /// it instead of opening a nested one. Any error rolls everything back.
    pub fn transaction<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&StoreTx<'_>) -> Result<R>,
    {
        let conn = self.lock()?;

        if !conn.is_autocommit() {
            debug!("Joining open transaction");
            return f(&self.handle(&conn));
        }

        let generation = self.generation();
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| LixError::database(e.to_string()))?;
        let result = f(&self.handle(&tx));
        let result = match result {
            Ok(value) => tx
                .commit()
                .map(|()| value)
                .map_err(|e| LixError::database(e.to_string())),
            Err(e) => Err(e),
        };

        if result.is_err() && self.generation() != generation {
            // Catalogs and plans built for schemas that were rolled back
            // must never match again.
            self.generation.fetch_add(1, Ordering::SeqCst);
            debug!("Rolled back a schema change; generation is now {}", self.generation());
        }
        result
    }

    /// Current schema catalog generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// The shared clock.
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Database path, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Serialize the whole database into a standalone file image.
    pub fn export(&self) -> Result<Vec<u8>> {
        let conn = self.lock()?;
        if !conn.is_autocommit() {
            return Err(LixError::invalid_argument(
                "cannot export while a transaction is open",
            ));
        }

        let dir = tempfile::tempdir()?;
        let target = dir.path().join("export.lix");
        let target_str = target
            .to_str()
            .ok_or_else(|| LixError::internal("temporary path is not valid UTF-8"))?;
        conn.execute("VACUUM INTO ?1", params![target_str])
            .map_err(db_err)?;

        let bytes = std::fs::read(&target)?;
        debug!("Exported database ({} bytes)", bytes.len());
        Ok(bytes)
    }
}

/// Handle to an open transaction.
///
/// Store operations are methods on this type, spread over the modules of
/// this crate.
pub struct StoreTx<'a> {
    pub(crate) conn: &'a Connection,
    pub(crate) clock: &'a Clock,
    pub(crate) generation: &'a AtomicU64,
    pub(crate) max_inheritance_depth: usize,
    pub(crate) state_sql: &'a str,
}

impl<'a> StoreTx<'a> {
    /// Run `f` within this transaction (nested calls reuse it).
    pub fn transaction<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&StoreTx<'a>) -> Result<R>,
    {
        f(self)
    }

    /// Next clock reading.
    pub fn now(&self) -> String {
        self.clock.now_string()
    }

    pub(crate) fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Execute a compiled read query.
    pub fn query(&self, sql: &str, params: &[SqlValue]) -> Result<QueryRows> {
        let mut stmt = self.conn.prepare(sql).map_err(db_err)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let width = columns.len();

        let mut rows = stmt
            .query(rusqlite::params_from_iter(params.iter()))
            .map_err(db_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(db_err)? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(row.get::<_, SqlValue>(i).map_err(db_err)?);
            }
            out.push(values);
        }

        Ok(QueryRows { columns, rows: out })
    }

    /// Read a front-end setting.
    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT value FROM internal_setting WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)
    }

    /// Write a front-end setting.
    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO internal_setting (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .map_err(db_err)?;
        Ok(())
    }

    /// Advance the clock past every persisted timestamp.
    fn observe_persisted_clock(&self) -> Result<()> {
        let latest: Option<String> = self
            .conn
            .query_row(
                "SELECT max(ts) FROM (
                     SELECT max(created_at) AS ts FROM change
                     UNION ALL SELECT max(created_at) FROM lix_commit
                     UNION ALL SELECT max(created_at) FROM version
                 )",
                [],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        if let Some(ts) = latest {
            self.clock.observe(&ts);
        }
        Ok(())
    }
}
