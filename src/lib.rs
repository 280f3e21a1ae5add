//! vadrigar extends a Quake-style dedicated game server with plugins
//! and scripting.
//!
//! The native hook layer feeds engine callbacks into a [`ModHost`],
//! which turns them into structured events, routes commands, runs
//! deferred tasks once per frame and manages plugin lifecycles. All of
//! that happens on a single simulation thread; background work hands
//! results back through the host's task queue.

pub mod channel;
pub mod commands;
pub mod config;
pub mod database;
pub mod error;
pub mod events;
pub mod handlers;
pub mod host;
pub mod logging;
pub mod plugin;
pub mod scheduler;

pub use channel::ChannelReply;
pub use commands::{
    CommandHandler, CommandId, CommandInvocation, CommandOutcome, CommandReply, CommandSource,
    CommandSpec, Permissions,
};
pub use config::ModConfig;
pub use database::{Database, MemoryDatabase};
pub use error::{ConfigError, LoadError, RegistryError, UnloadError};
pub use events::{EventRegistry, HookFn, HookId};
pub use handlers::RawOutcome;
pub use host::ModHost;
pub use plugin::{Plugin, PluginApi, PluginFactory, PluginManager};
pub use scheduler::{spawn_background, FrameTask, FrameTaskScheduler, TaskHandle};

// Re-export the vocabulary crate so plugins only need one dependency.
pub use vadrigar_events::{
    parse_variables, stringify_variables, Channel, ChannelKind, ClientId, DispatchOutcome, Engine,
    Event, EventName, HookReply, InfoMap, PlayerInfo, Priority, SteamId, Team, CS_ROUND_STATUS,
    CS_SERVERINFO, CS_VOTE_NO, CS_VOTE_STRING, CS_VOTE_YES,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
