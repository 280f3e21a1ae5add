//! Plugin units and their lifecycle.
//!
//! A plugin is a named unit of executable logic registered through a
//! factory. Loading instantiates it once and lets it register hooks and
//! commands through a [`PluginApi`]; the manager keeps a ledger of
//! everything a plugin owns so that unloading removes it all and can
//! never leave orphaned registrations behind.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::commands::{CommandHandler, CommandId, CommandRegistry, CommandSpec};
use crate::config::{ModConfig, DEFAULT_PLUGINS_TOKEN};
use crate::database::Database;
use crate::error::{LoadError, RegistryError, UnloadError};
use crate::events::{EventRegistry, HookFn, HookId};
use crate::scheduler::TaskHandle;
use vadrigar_events::{Engine, Event, EventName, Priority};

/// A unit of executable logic loaded into the host.
///
/// Implementations register their hooks and commands in `on_load`; all
/// interaction with the simulation afterwards happens inside those
/// closures or through deferred tasks.
pub trait Plugin {
    /// The unit's identity. Must match the name it was registered under.
    fn name(&self) -> &'static str;

    /// Human-readable description for listings.
    fn description(&self) -> &'static str {
        ""
    }

    /// Called once right after instantiation. Returning an error aborts
    /// the load and removes anything registered so far.
    fn on_load(&mut self, api: &mut PluginApi<'_>) -> anyhow::Result<()>;

    /// Called while unloading, after the `unload` event has been
    /// dispatched and before the plugin's registrations are removed.
    fn on_unload(&mut self, _api: &mut PluginApi<'_>) {}
}

/// Constructor for a plugin unit.
pub type PluginFactory = Box<dyn Fn() -> Box<dyn Plugin>>;

/// Everything a plugin has registered, kept in lockstep with the
/// registries for as long as the plugin is loaded.
#[derive(Default)]
pub struct PluginLedger {
    hooks: Vec<(EventName, HookId)>,
    commands: Vec<CommandId>,
}

impl PluginLedger {
    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    pub fn command_count(&self) -> usize {
        self.commands.len()
    }
}

/// Mutable registry access bundled for plugin lifecycle operations. The
/// host assembles one of these from its fields whenever the manager
/// needs to run.
pub struct HostContext<'a> {
    pub events: &'a mut EventRegistry,
    pub commands: &'a mut CommandRegistry,
    pub tasks: TaskHandle,
    pub engine: &'a Arc<dyn Engine>,
    pub database: Option<&'a Arc<dyn Database>>,
    pub config: &'a ModConfig,
}

/// The surface a plugin works against during `on_load`/`on_unload`.
///
/// Registrations made here are recorded in the plugin's ledger
/// automatically, which is what makes bulk removal on unload airtight.
pub struct PluginApi<'a> {
    plugin: &'a str,
    ledger: &'a mut PluginLedger,
    events: &'a mut EventRegistry,
    commands: &'a mut CommandRegistry,
    tasks: TaskHandle,
    engine: Arc<dyn Engine>,
    database: Option<Arc<dyn Database>>,
    config: &'a ModConfig,
}

impl<'a> PluginApi<'a> {
    fn new(plugin: &'a str, ledger: &'a mut PluginLedger, ctx: &'a mut HostContext<'_>) -> Self {
        Self {
            plugin,
            ledger,
            events: &mut *ctx.events,
            commands: &mut *ctx.commands,
            tasks: ctx.tasks.clone(),
            engine: Arc::clone(ctx.engine),
            database: ctx.database.map(Arc::clone),
            config: ctx.config,
        }
    }

    pub fn plugin_name(&self) -> &str {
        self.plugin
    }

    /// Register a hook on an event at the given priority tier.
    pub fn add_hook(&mut self, event: EventName, priority: Priority, handler: HookFn) -> HookId {
        let id = self.events.add_hook(event, self.plugin, priority, handler);
        self.ledger.hooks.push((event, id));
        id
    }

    /// Remove one of this plugin's hooks. Removing a hook the plugin
    /// does not own is an error.
    pub fn remove_hook(&mut self, event: EventName, id: HookId) -> Result<(), RegistryError> {
        let pos = self
            .ledger
            .hooks
            .iter()
            .position(|&(e, h)| e == event && h == id)
            .ok_or(RegistryError::HookNotFound { event, id })?;
        self.events.remove_hook(event, id)?;
        self.ledger.hooks.remove(pos);
        Ok(())
    }

    /// Register a command at the given global priority tier.
    pub fn add_command(
        &mut self,
        spec: CommandSpec,
        priority: Priority,
        handler: CommandHandler,
    ) -> CommandId {
        let id = self.commands.add_command(self.plugin, spec, priority, handler);
        self.ledger.commands.push(id);
        id
    }

    /// Remove one of this plugin's commands.
    pub fn remove_command(&mut self, id: CommandId) -> Result<(), RegistryError> {
        let pos = self
            .ledger
            .commands
            .iter()
            .position(|&c| c == id)
            .ok_or(RegistryError::CommandNotFound(id))?;
        self.commands.remove_command(id)?;
        self.ledger.commands.remove(pos);
        Ok(())
    }

    /// Handle for scheduling deferred work onto the simulation thread.
    pub fn tasks(&self) -> TaskHandle {
        self.tasks.clone()
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// The database handle, created lazily by the host. Plugins that
    /// never call this work without any backend configured.
    pub fn db(&self) -> anyhow::Result<Arc<dyn Database>> {
        self.database.clone().ok_or_else(|| {
            anyhow::anyhow!("plugin '{}' requested a database but none is configured", self.plugin)
        })
    }

    /// This plugin's own section of the configuration, if present.
    pub fn config_value(&self) -> Option<&toml::Value> {
        self.config.plugin_config.get(self.plugin)
    }

    /// The configured chat command prefix.
    pub fn command_prefix(&self) -> &str {
        &self.config.command_prefix
    }
}

struct LoadedPlugin {
    instance: Box<dyn Plugin>,
    ledger: PluginLedger,
}

/// Load/unload/reload of plugin units, and the mapping from plugin name
/// to instance and owned registrations.
pub struct PluginManager {
    factories: Vec<(String, PluginFactory)>,
    loaded: HashMap<String, LoadedPlugin>,
}

impl PluginManager {
    pub fn new() -> Self {
        Self {
            factories: Vec::new(),
            loaded: HashMap::new(),
        }
    }

    /// Make a plugin available for loading. Registering the same name
    /// again replaces the factory; an already-loaded instance keeps
    /// running until reloaded.
    pub fn register_factory(&mut self, name: impl Into<String>, factory: PluginFactory) {
        let name = name.into();
        if let Some(slot) = self.factories.iter_mut().find(|(n, _)| *n == name) {
            warn!(target: "plugins", "Replacing factory for plugin '{}'", name);
            slot.1 = factory;
        } else {
            self.factories.push((name, factory));
        }
    }

    /// Names of every registered plugin, in registration order.
    pub fn factory_names(&self) -> Vec<&str> {
        self.factories.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.contains_key(name)
    }

    pub fn loaded_names(&self) -> Vec<&str> {
        self.loaded.keys().map(String::as_str).collect()
    }

    /// Hook and command counts for a loaded plugin, for diagnostics.
    pub fn registration_counts(&self, name: &str) -> Option<(usize, usize)> {
        self.loaded
            .get(name)
            .map(|p| (p.ledger.hook_count(), p.ledger.command_count()))
    }

    /// Load a plugin by name. Loading a name that is already loaded
    /// routes through [`reload`](Self::reload).
    pub fn load(&mut self, name: &str, ctx: &mut HostContext<'_>) -> Result<(), LoadError> {
        if self.loaded.contains_key(name) {
            debug!(target: "plugins", "Plugin '{}' already loaded, reloading", name);
            return self.reload(name, ctx);
        }
        self.load_new(name, ctx)
    }

    fn load_new(&mut self, name: &str, ctx: &mut HostContext<'_>) -> Result<(), LoadError> {
        info!(target: "plugins", "Loading plugin '{}'...", name);

        let factory = self
            .factories
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, f)| f)
            .ok_or_else(|| LoadError::UnknownPlugin(name.to_string()))?;

        let mut instance = factory();
        if instance.name() != name {
            return Err(LoadError::NameMismatch {
                requested: name.to_string(),
                actual: instance.name().to_string(),
            });
        }

        let mut ledger = PluginLedger::default();
        let mut api = PluginApi::new(name, &mut ledger, ctx);
        if let Err(e) = instance.on_load(&mut api) {
            error!(
                target: "plugins",
                "Plugin '{}' failed to initialize: {:#}",
                name,
                e
            );
            // Roll back whatever it managed to register before failing.
            Self::teardown(&mut ledger, ctx);
            return Err(LoadError::Init {
                name: name.to_string(),
                reason: e,
            });
        }

        debug!(
            target: "plugins",
            "Plugin '{}' registered {} hook(s) and {} command(s)",
            name,
            ledger.hook_count(),
            ledger.command_count()
        );
        self.loaded
            .insert(name.to_string(), LoadedPlugin { instance, ledger });
        info!(target: "plugins", "Loaded plugin '{}'", name);
        Ok(())
    }

    /// Unload a plugin. The `unload` event goes out first, while the
    /// plugin's state is still valid, then every hook and command it
    /// owns is removed and the instance dropped.
    pub fn unload(&mut self, name: &str, ctx: &mut HostContext<'_>) -> Result<(), UnloadError> {
        info!(target: "plugins", "Unloading plugin '{}'...", name);

        let mut entry = self
            .loaded
            .remove(name)
            .ok_or_else(|| UnloadError::NotLoaded(name.to_string()))?;

        ctx.events.dispatch(Event::Unload {
            plugin: name.to_string(),
        });

        let mut api = PluginApi::new(name, &mut entry.ledger, ctx);
        let unload_result = catch_unwind(AssertUnwindSafe(|| {
            entry.instance.on_unload(&mut api);
        }));
        if let Err(panic) = unload_result {
            error!(
                target: "plugins",
                "Plugin '{}' panicked in on_unload: {:?}",
                name,
                panic
            );
        }

        Self::teardown(&mut entry.ledger, ctx);
        info!(target: "plugins", "Unloaded plugin '{}'", name);
        Ok(())
    }

    /// Unload (tolerating "not loaded") and load again from the factory.
    /// Failures surface to the caller; the plugin may end up absent.
    pub fn reload(&mut self, name: &str, ctx: &mut HostContext<'_>) -> Result<(), LoadError> {
        match self.unload(name, ctx) {
            Ok(()) | Err(UnloadError::NotLoaded(_)) => {}
        }
        self.load_new(name, ctx)
    }

    /// Load the configured plugin list, expanding the `DEFAULT` token to
    /// every registered plugin and dropping duplicate names. Stops at the
    /// first failure, which the caller reports.
    pub fn load_preset(&mut self, ctx: &mut HostContext<'_>) -> Result<(), LoadError> {
        let mut names: Vec<String> = Vec::new();
        for entry in &ctx.config.plugins {
            if entry == DEFAULT_PLUGINS_TOKEN {
                for name in self.factory_names() {
                    names.push(name.to_string());
                }
            } else {
                names.push(entry.clone());
            }
        }
        let mut seen = Vec::new();
        names.retain(|n| {
            if seen.contains(n) {
                false
            } else {
                seen.push(n.clone());
                true
            }
        });

        for name in names {
            self.load(&name, ctx)?;
        }
        Ok(())
    }

    /// Remove every registration in the ledger from the registries. A
    /// miss here means the ledger and a registry disagreed, which is a
    /// bug worth shouting about, but teardown continues.
    fn teardown(ledger: &mut PluginLedger, ctx: &mut HostContext<'_>) {
        for (event, id) in ledger.hooks.drain(..) {
            if let Err(e) = ctx.events.remove_hook(event, id) {
                error!(target: "plugins", "Ledger out of sync during teardown: {}", e);
            }
        }
        for id in ledger.commands.drain(..) {
            if let Err(e) = ctx.commands.remove_command(id) {
                error!(target: "plugins", "Ledger out of sync during teardown: {}", e);
            }
        }
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}
