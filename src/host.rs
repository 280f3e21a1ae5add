//! The process-scoped host context.
//!
//! One [`ModHost`] exists per process. It owns the event registry, the
//! command registry, the plugin manager and the frame task scheduler,
//! and is only ever touched from the simulation thread; the native
//! layer's callbacks (see `handlers`) all arrive on that thread. The
//! scheduler's [`TaskHandle`] is the single way back in from anywhere
//! else.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::commands::CommandRegistry;
use crate::config::ModConfig;
use crate::database::Database;
use crate::error::{LoadError, UnloadError};
use crate::events::EventRegistry;
use crate::plugin::{HostContext, PluginFactory, PluginManager};
use crate::scheduler::{FrameTaskScheduler, TaskHandle};
use vadrigar_events::{DispatchOutcome, Engine, Event};

pub struct ModHost {
    pub(crate) engine: Arc<dyn Engine>,
    pub(crate) config: ModConfig,
    pub(crate) events: EventRegistry,
    pub(crate) commands: CommandRegistry,
    pub(crate) plugins: PluginManager,
    pub(crate) scheduler: FrameTaskScheduler,
    pub(crate) database: Option<Arc<dyn Database>>,
    pub(crate) first_game: bool,
    pub(crate) ad_round_number: u32,
    init_time: Instant,
}

impl ModHost {
    pub fn new(engine: Arc<dyn Engine>, config: ModConfig) -> Self {
        Self {
            engine,
            config,
            events: EventRegistry::new(),
            commands: CommandRegistry::new(),
            plugins: PluginManager::new(),
            scheduler: FrameTaskScheduler::new(),
            database: None,
            first_game: true,
            ad_round_number: 0,
            init_time: Instant::now(),
        }
    }

    pub fn with_database(mut self, database: Arc<dyn Database>) -> Self {
        self.database = Some(database);
        self
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    pub fn config(&self) -> &ModConfig {
        &self.config
    }

    pub fn database(&self) -> Option<&Arc<dyn Database>> {
        self.database.as_ref()
    }

    /// Handle for enqueueing deferred work from any thread.
    pub fn task_handle(&self) -> TaskHandle {
        self.scheduler.handle()
    }

    /// Frames completed since startup.
    pub fn current_frame(&self) -> u64 {
        self.scheduler.current_frame()
    }

    /// Time since the host was constructed.
    pub fn uptime(&self) -> Duration {
        self.init_time.elapsed()
    }

    /// Direct access to the event registry, for the native layer and
    /// for tests. Plugins go through their [`PluginApi`] instead.
    ///
    /// [`PluginApi`]: crate::plugin::PluginApi
    pub fn events_mut(&mut self) -> &mut EventRegistry {
        &mut self.events
    }

    /// Direct access to the command registry, same caveat as
    /// [`events_mut`](Self::events_mut).
    pub fn commands_mut(&mut self) -> &mut CommandRegistry {
        &mut self.commands
    }

    /// Dispatch an event to its hooks.
    pub fn dispatch(&mut self, event: Event) -> DispatchOutcome {
        self.events.dispatch(event)
    }

    // ===== Plugin lifecycle =====

    /// Make a plugin available for loading.
    pub fn register_plugin(&mut self, name: impl Into<String>, factory: PluginFactory) {
        self.plugins.register_factory(name, factory);
    }

    pub fn is_plugin_loaded(&self, name: &str) -> bool {
        self.plugins.is_loaded(name)
    }

    pub fn loaded_plugins(&self) -> Vec<&str> {
        self.plugins.loaded_names()
    }

    /// Split the host into the plugin manager and a [`HostContext`] over
    /// the rest of the fields, so lifecycle operations can mutate the
    /// registries while the manager drives them.
    fn with_plugin_ctx<R>(
        &mut self,
        f: impl FnOnce(&mut PluginManager, &mut HostContext<'_>) -> R,
    ) -> R {
        let Self {
            events,
            commands,
            scheduler,
            engine,
            database,
            config,
            plugins,
            ..
        } = self;
        let mut ctx = HostContext {
            events,
            commands,
            tasks: scheduler.handle(),
            engine,
            database: database.as_ref(),
            config,
        };
        f(plugins, &mut ctx)
    }

    pub fn load_plugin(&mut self, name: &str) -> Result<(), LoadError> {
        self.with_plugin_ctx(|plugins, ctx| plugins.load(name, ctx))
    }

    pub fn unload_plugin(&mut self, name: &str) -> Result<(), UnloadError> {
        self.with_plugin_ctx(|plugins, ctx| plugins.unload(name, ctx))
    }

    pub fn reload_plugin(&mut self, name: &str) -> Result<(), LoadError> {
        self.with_plugin_ctx(|plugins, ctx| plugins.reload(name, ctx))
    }

    /// Load the configured plugin list (`DEFAULT` expands to every
    /// registered plugin).
    pub fn load_preset_plugins(&mut self) -> Result<(), LoadError> {
        self.with_plugin_ctx(|plugins, ctx| plugins.load_preset(ctx))
    }

    /// Initialization that has to wait until the engine has finished its
    /// own startup; runs once, triggered by the first new-game callback.
    pub(crate) fn late_init(&mut self) {
        info!("Loading preset plugins...");
        if let Err(e) = self.load_preset_plugins() {
            error!("Failed to load preset plugins: {:#}", e);
        }
        info!("We're good to go!");
    }
}
