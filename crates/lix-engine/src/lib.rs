//! lix-engine - Embeddable change-control engine
//!
//! Ties the store, the query preprocessor and the plugins together behind
//! one handle, [`Lix`]. Callers read and write logical views, files and
//! versions; every write becomes an entity change that a commit links into
//! history.
//!
//! # Features
//!
//! - Logical views (`state`, `file`, one per schema) with instead-of writes
//! - File bytes rendered from entities through format plugins
//! - Versions with copy-on-write inheritance, restore and merge
//! - Explicit [`Session`]s instead of a global active version
//!
//! # Example
//!
//! ```rust,ignore
//! use lix_engine::{Lix, VersionBase};
//! use lix_engine::ast::{col, lit, Select};
//!
//! let lix = Lix::open_memory()?;
//! let session = lix.session()?;
//!
//! lix.write_file(&session, "/a.json", br#"{"x": 1}"#).await?;
//! lix.commit(&session, "add a.json").await?;
//!
//! let rows = lix
//!     .execute(&session, Select::star_from("file").filter(col("path").eq(lit("/a.json"))), &[])
//!     .await?;
//! ```

mod engine;
mod execute;
mod files;
mod fs;
mod session;
mod transaction;

pub use engine::Lix;
pub use execute::QueryResult;
pub use fs::{StdFileSystem, TracingFileSystem};
pub use session::{Session, SkipChangeControl};
pub use transaction::LixTx;

// Re-export for convenience
pub use lix_core::{
    Commit, Conflict, FileDescriptor, FileSystem, LixConfig, LixError, LixFile, Result, Version, VersionBase,
};
pub use lix_query::ast;
pub use lix_store::{MergeOutcome, RegisterOutcome, SqlValue};
