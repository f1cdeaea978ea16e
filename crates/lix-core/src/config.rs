//! Configuration types for the lix engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::inheritance::DEFAULT_MAX_INHERITANCE_DEPTH;

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LixConfig {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Engine behaviour.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Plugin selection.
    #[serde(default)]
    pub plugins: PluginConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    /// Node ID for the hybrid logical clock (0-65535).
    #[serde(default = "default_node_id")]
    pub node_id: u16,

    /// Enable WAL mode (ignored for in-memory databases).
    #[serde(default = "default_true")]
    pub wal_mode: bool,

    /// SQLite cache size in KB (negative = KB, positive = pages).
    #[serde(default = "default_cache_size")]
    pub cache_size: i32,

    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            node_id: 1,
            wal_mode: true,
            cache_size: -64000, // 64MB
            busy_timeout_ms: 30000,
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Author recorded on commits when the caller gives none.
    #[serde(default = "default_author")]
    pub author: String,

    /// Number of rewritten query plans kept in the memo.
    #[serde(default = "default_plan_cache_capacity")]
    pub plan_cache_capacity: usize,

    /// Longest version inheritance chain followed when resolving state.
    #[serde(default = "default_max_inheritance_depth")]
    pub max_inheritance_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            author: default_author(),
            plan_cache_capacity: 256,
            max_inheritance_depth: DEFAULT_MAX_INHERITANCE_DEPTH,
        }
    }
}

/// Plugin configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Keys of built-in plugins to enable.
    #[serde(default = "default_plugins")]
    pub enabled: Vec<String>,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            enabled: default_plugins(),
        }
    }
}

// Default value functions

fn default_true() -> bool {
    true
}

fn default_node_id() -> u16 {
    1
}

fn default_cache_size() -> i32 {
    -64000
}

fn default_busy_timeout() -> u32 {
    30000
}

fn default_author() -> String {
    "anonymous".to_string()
}

fn default_plan_cache_capacity() -> usize {
    256
}

fn default_max_inheritance_depth() -> usize {
    DEFAULT_MAX_INHERITANCE_DEPTH
}

fn default_plugins() -> Vec<String> {
    vec![
        "plugin_json".to_string(),
        "plugin_md".to_string(),
        "plugin_text".to_string(),
    ]
}

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lix")
        .join("repo.lix")
}

impl LixConfig {
    /// Load configuration from file.
    pub fn load(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            crate::error::LixError::Config {
                message: format!("Failed to parse config: {}", e),
            }
        })?;
        Ok(config)
    }

    /// Load configuration from default paths.
    pub fn load_default() -> crate::error::Result<Self> {
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("lix").join("config.toml");
            if user_config.exists() {
                return Self::load(&user_config);
            }
        }

        let local_config = PathBuf::from("lix.toml");
        if local_config.exists() {
            return Self::load(&local_config);
        }

        Ok(Self::default())
    }
}
