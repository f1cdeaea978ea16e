//! Database schema definitions.

/// Main schema SQL for initializing the database.
pub const SCHEMA: &str = r#"
-- Content-addressed snapshots; 'no-content' is the shared tombstone
CREATE TABLE IF NOT EXISTS snapshot (
    id TEXT PRIMARY KEY,
    content TEXT
);

INSERT OR IGNORE INTO snapshot (id, content) VALUES ('no-content', NULL);

-- Versioned entity schemas, immutable per (key, version)
CREATE TABLE IF NOT EXISTS stored_schema (
    key TEXT NOT NULL,
    version TEXT NOT NULL,
    definition TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (key, version)
);

-- Append-only change log
CREATE TABLE IF NOT EXISTS change (
    id TEXT PRIMARY KEY,
    entity_id TEXT NOT NULL,
    schema_key TEXT NOT NULL,
    schema_version TEXT NOT NULL,
    file_id TEXT NOT NULL,
    plugin_key TEXT NOT NULL,
    snapshot_id TEXT NOT NULL REFERENCES snapshot(id),
    created_at TEXT NOT NULL,
    FOREIGN KEY (schema_key, schema_version) REFERENCES stored_schema(key, version)
);

CREATE INDEX IF NOT EXISTS idx_change_entity ON change(entity_id, schema_key, file_id);
CREATE INDEX IF NOT EXISTS idx_change_created_at ON change(created_at);

-- Commit graph
CREATE TABLE IF NOT EXISTS lix_commit (
    id TEXT PRIMARY KEY,
    author TEXT NOT NULL,
    description TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS lix_commit_edge (
    parent_id TEXT NOT NULL REFERENCES lix_commit(id),
    child_id TEXT NOT NULL REFERENCES lix_commit(id) ON DELETE CASCADE,
    PRIMARY KEY (parent_id, child_id)
);

CREATE INDEX IF NOT EXISTS idx_commit_edge_child ON lix_commit_edge(child_id);

CREATE TABLE IF NOT EXISTS lix_commit_change (
    commit_id TEXT NOT NULL REFERENCES lix_commit(id) ON DELETE CASCADE,
    change_id TEXT NOT NULL REFERENCES change(id),
    PRIMARY KEY (commit_id, change_id)
);

CREATE INDEX IF NOT EXISTS idx_commit_change_change ON lix_commit_change(change_id);

-- Named, mutable pointers into the commit graph
CREATE TABLE IF NOT EXISTS version (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    commit_id TEXT NOT NULL REFERENCES lix_commit(id),
    inherits_from_version_id TEXT REFERENCES version(id),
    inherits_from_commit_id TEXT REFERENCES lix_commit(id),
    created_at TEXT NOT NULL
);

-- Changes written in a version but not yet committed
CREATE TABLE IF NOT EXISTS pending_change (
    version_id TEXT NOT NULL REFERENCES version(id) ON DELETE CASCADE,
    change_id TEXT NOT NULL REFERENCES change(id),
    PRIMARY KEY (version_id, change_id)
);

-- Rows each version owns (derived, rebuildable); inherited rows are read through
CREATE TABLE IF NOT EXISTS internal_state_cache (
    entity_id TEXT NOT NULL,
    schema_key TEXT NOT NULL,
    file_id TEXT NOT NULL,
    version_id TEXT NOT NULL,
    plugin_key TEXT NOT NULL,
    snapshot_content TEXT,
    schema_version TEXT NOT NULL,
    change_id TEXT NOT NULL,
    commit_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (entity_id, schema_key, file_id, version_id)
);

CREATE INDEX IF NOT EXISTS idx_state_cache_version ON internal_state_cache(version_id, schema_key);
CREATE INDEX IF NOT EXISTS idx_state_cache_file ON internal_state_cache(file_id, version_id);

CREATE TABLE IF NOT EXISTS internal_cache_meta (
    id INTEGER PRIMARY KEY CHECK (id = 0),
    stale INTEGER NOT NULL DEFAULT 0,
    stale_since TEXT
);

INSERT OR IGNORE INTO internal_cache_meta (id, stale, stale_since) VALUES (0, 0, NULL);

-- Rendered file bytes per version (derived, rebuildable)
CREATE TABLE IF NOT EXISTS internal_file_data_cache (
    file_id TEXT NOT NULL,
    version_id TEXT NOT NULL,
    data BLOB NOT NULL,
    PRIMARY KEY (file_id, version_id)
);

-- Small key/value settings used by front ends
CREATE TABLE IF NOT EXISTS internal_setting (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

pub use lix_core::{FILE_DATA_CACHE_TABLE, STATE_CACHE_TABLE};
