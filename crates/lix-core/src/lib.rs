//! lix-core - Core types and traits for the lix change-control engine
//!
//! This crate provides the domain model (snapshots, changes, commits,
//! versions, state rows), the error taxonomy, configuration, the hybrid
//! logical clock, canonical JSON hashing and the plugin/filesystem traits
//! shared by every other crate.

pub mod canonical;
pub mod clock;
pub mod config;
pub mod error;
pub mod inheritance;
pub mod schema;
pub mod traits;
pub mod types;

pub use canonical::{canonical_json, content_hash, snapshot_id, NO_CONTENT_SNAPSHOT_ID};
pub use clock::{Clock, HybridLogicalClock};
pub use config::*;
pub use error::{LixError, Result};
pub use inheritance::{resolved_state_sql, DEFAULT_MAX_INHERITANCE_DEPTH};
pub use schema::LixSchema;
pub use traits::*;
pub use types::*;
