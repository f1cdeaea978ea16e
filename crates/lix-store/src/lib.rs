//! lix-store - SQLite storage layer for the lix engine
//!
//! This crate persists snapshots, schemas, the change log, the commit graph
//! and versions in a single SQLite file, and maintains the derived state and
//! file-data caches on top of them.

mod cache;
mod changes;
mod conflict;
mod files;
mod graph;
mod registry;
mod schema;
mod snapshot;
mod sqlite;
mod state;

pub use cache::CacheLookup;
pub use graph::{commit_id, CommitGraph, MergeOutcome, MAIN_VERSION_NAME, SYSTEM_AUTHOR};
pub use registry::RegisterOutcome;
pub use sqlite::{LixStore, QueryRows, StoreTx};

/// Dynamically typed SQL value used for query parameters and results.
pub use rusqlite::types::Value as SqlValue;

// Re-export schema for testing/migrations
pub use schema::{FILE_DATA_CACHE_TABLE, SCHEMA, STATE_CACHE_TABLE};
