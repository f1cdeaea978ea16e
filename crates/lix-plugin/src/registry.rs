//! Plugin lookup by key and by file path.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use lix_core::{LixError, Plugin, PluginConfig, Result};

use crate::glob::glob_match;
use crate::{JsonPlugin, MarkdownPlugin, TextPlugin};

/// Ordered set of plugins. The first plugin whose glob matches a path
/// handles that file.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn Plugin>>,
}

fn builtin(key: &str) -> Option<Arc<dyn Plugin>> {
    match key {
        crate::json::JSON_PLUGIN_KEY => Some(Arc::new(JsonPlugin::new())),
        crate::markdown::MARKDOWN_PLUGIN_KEY => Some(Arc::new(MarkdownPlugin::new())),
        crate::text::TEXT_PLUGIN_KEY => Some(Arc::new(TextPlugin::new())),
        _ => None,
    }
}

impl PluginRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in plugin.
    pub fn with_builtins() -> Self {
        Self::from_config(&PluginConfig::default()).unwrap_or_default()
    }

    /// Registry with the built-in plugins enabled in configuration.
    pub fn from_config(config: &PluginConfig) -> Result<Self> {
        let mut registry = Self::new();
        for key in &config.enabled {
            let plugin = builtin(key).ok_or_else(|| LixError::Config {
                message: format!("unknown plugin '{key}'"),
            })?;
            registry.register(plugin);
        }
        Ok(registry)
    }

    /// Add a plugin, replacing any plugin with the same key.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        debug!("Registering plugin {} ({})", plugin.key(), plugin.detect_changes_glob());
        match self.plugins.iter().position(|p| p.key() == plugin.key()) {
            Some(index) => self.plugins[index] = plugin,
            None => self.plugins.push(plugin),
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.iter().find(|p| p.key() == key).cloned()
    }

    /// Plugin handling a file path.
    pub fn for_path(&self, path: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins
            .iter()
            .find(|p| glob_match(p.detect_changes_glob(), path))
            .cloned()
    }

    pub fn plugins(&self) -> &[Arc<dyn Plugin>] {
        &self.plugins
    }

    /// Schemas of every registered plugin.
    pub fn schemas(&self) -> Vec<Value> {
        self.plugins.iter().flat_map(|p| p.schemas()).collect()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.plugins.iter().map(|p| p.key()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lix_core::LixSchema;

    #[test]
    fn test_builtins_by_path() {
        let registry = PluginRegistry::with_builtins();
        assert_eq!(registry.for_path("/a/b.json").map(|p| p.key().to_string()), Some("plugin_json".into()));
        assert_eq!(registry.for_path("/README.md").map(|p| p.key().to_string()), Some("plugin_md".into()));
        assert_eq!(registry.for_path("/notes.txt").map(|p| p.key().to_string()), Some("plugin_text".into()));
        assert!(registry.for_path("/image.png").is_none());
    }

    #[test]
    fn test_from_config_subset_and_unknown() {
        let registry = PluginRegistry::from_config(&PluginConfig {
            enabled: vec!["plugin_text".into()],
        })
        .unwrap();
        assert_eq!(registry.plugins().len(), 1);
        assert!(registry.for_path("/a.json").is_none());

        let err = PluginRegistry::from_config(&PluginConfig {
            enabled: vec!["plugin_csv".into()],
        })
        .unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_register_replaces_same_key() {
        let mut registry = PluginRegistry::with_builtins();
        registry.register(Arc::new(TextPlugin::new()));
        assert_eq!(registry.plugins().len(), 3);
    }

    #[test]
    fn test_builtin_schemas_parse() {
        for schema in PluginRegistry::with_builtins().schemas() {
            LixSchema::parse(schema).unwrap();
        }
    }
}
