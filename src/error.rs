//! Error taxonomy for the management layer.
//!
//! Failures inside plugin-authored hooks and command handlers are never
//! surfaced as these types; they are caught at the dispatch boundary,
//! logged, and recovered. The errors here indicate operator mistakes and
//! are returned to whoever issued the operation.

use thiserror::Error;

use crate::commands::CommandId;
use crate::events::HookId;
use vadrigar_events::EventName;

/// A plugin could not be loaded.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no plugin registered under the name '{0}'")]
    UnknownPlugin(String),
    #[error("plugin unit reports the name '{actual}', not '{requested}'")]
    NameMismatch { requested: String, actual: String },
    #[error("plugin '{name}' failed during initialization: {reason:#}")]
    Init { name: String, reason: anyhow::Error },
}

/// A plugin could not be unloaded.
#[derive(Debug, Error)]
pub enum UnloadError {
    #[error("attempted to unload plugin '{0}' which is not loaded")]
    NotLoaded(String),
}

/// A hook or command removal did not match any registration.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no hook {id:?} registered on event '{event}'")]
    HookNotFound { event: EventName, id: HookId },
    #[error("no command registered with {0:?}")]
    CommandNotFound(CommandId),
}

/// The mod configuration file could not be read.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
