//! lix-plugin - Built-in file format plugins
//!
//! Plugins translate file bytes into entity changes and back. This crate
//! ships three of them and the registry that picks one per file path.
//!
//! # Plugins
//!
//! - [`JsonPlugin`]: one entity per leaf JSON pointer (`**/*.json`).
//! - [`MarkdownPlugin`]: one entity per top-level block (`**/*.md`).
//! - [`TextPlugin`]: one entity per line (`**/*.txt`).
//!
//! # Example
//!
//! ```rust
//! use lix_plugin::{Plugin, PluginRegistry};
//!
//! let registry = PluginRegistry::with_builtins();
//! let plugin = registry.for_path("/docs/readme.md").unwrap();
//! assert_eq!(plugin.key(), "plugin_md");
//! ```

mod entities;
mod glob;
mod json;
mod markdown;
mod registry;
mod text;

pub use glob::glob_match;
pub use json::{JsonPlugin, JSON_PLUGIN_KEY, JSON_POINTER_SCHEMA_KEY};
pub use markdown::{MarkdownPlugin, MARKDOWN_BLOCK_SCHEMA_KEY, MARKDOWN_PLUGIN_KEY};
pub use registry::PluginRegistry;
pub use text::{TextPlugin, TEXT_LINE_SCHEMA_KEY, TEXT_PLUGIN_KEY};

// Re-export the contract for convenience
pub use lix_core::{ApplyRequest, DetectRequest, DetectedChange, Plugin, PluginFile};
