//! Mod configuration, loaded from a TOML file.
//!
//! Only values live here; the behavior they steer belongs to the core.
//! Anything not in the file falls back to a sensible default, so an
//! empty file is a valid configuration.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigError;
use vadrigar_events::SteamId;

/// Expansion token in the plugin list standing for every registered
/// plugin.
pub const DEFAULT_PLUGINS_TOKEN: &str = "DEFAULT";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModConfig {
    /// SteamID64 of the server owner. The owner passes every permission
    /// check regardless of stored level.
    #[serde(default)]
    pub owner: Option<SteamId>,

    /// Ordered list of plugin names to load at startup. The `DEFAULT`
    /// token expands to all registered plugins.
    #[serde(default = "default_plugins")]
    pub plugins: Vec<String>,

    /// Search path for externally shipped plugin units, when the
    /// deployment supports them.
    #[serde(default)]
    pub plugins_path: Option<PathBuf>,

    /// Prefix that marks a chat line as a command (default "!").
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,

    /// Per-plugin configuration values (plugin name -> table).
    #[serde(default)]
    pub plugin_config: HashMap<String, toml::Value>,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Directory the log file lives in (default: working directory).
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Truncate the log once it grows past this many bytes.
    #[serde(default = "default_max_log_size")]
    pub max_size: u64,
}

fn default_plugins() -> Vec<String> {
    vec![DEFAULT_PLUGINS_TOKEN.to_string()]
}

fn default_command_prefix() -> String {
    "!".to_string()
}

fn default_max_log_size() -> u64 {
    3 * 1000 * 1000 // 3 MB
}

impl Default for ModConfig {
    fn default() -> Self {
        Self {
            owner: None,
            plugins: default_plugins(),
            plugins_path: None,
            command_prefix: default_command_prefix(),
            plugin_config: HashMap::new(),
            log: LogConfig::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: None,
            max_size: default_max_log_size(),
        }
    }
}

impl ModConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise start from defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ModConfig::default();
        assert_eq!(config.command_prefix, "!");
        assert_eq!(config.plugins, vec!["DEFAULT"]);
        assert!(config.owner.is_none());
    }

    #[test]
    fn test_parse_partial_file() {
        let config: ModConfig = toml::from_str(
            r#"
            owner = 76561198000000000
            plugins = ["DEFAULT", "clan_tags"]
            command_prefix = "."
            "#,
        )
        .unwrap();

        assert_eq!(config.owner, Some(76561198000000000));
        assert_eq!(config.plugins, vec!["DEFAULT", "clan_tags"]);
        assert_eq!(config.command_prefix, ".");
        assert_eq!(config.log.max_size, 3 * 1000 * 1000);
    }

    #[test]
    fn test_empty_file_is_valid() {
        let config: ModConfig = toml::from_str("").unwrap();
        assert_eq!(config.command_prefix, "!");
    }

    #[test]
    fn test_load_or_default_with_missing_file() {
        let config = ModConfig::load_or_default(Path::new("/does/not/exist.toml")).unwrap();
        assert_eq!(config.plugins, vec!["DEFAULT"]);
    }
}
