//! Pattern-matched, permission-gated command table.
//!
//! Console and rcon lines are always treated as command candidates; chat
//! lines only when they carry the configured prefix (or when a command
//! opts into bare client-side invocation). The first registered command
//! that matches the word and passes the channel and permission checks is
//! the one that runs.

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{debug, error, warn};

use crate::database::Database;
use crate::error::RegistryError;
use vadrigar_events::{Channel, ChannelKind, Priority, PlayerInfo, SteamId};

/// Unique identifier for a registered command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandId(u64);

/// The permission level that always passes every check.
pub const PERM_OWNER: u8 = 5;

/// Who typed the line being handled.
#[derive(Debug, Clone)]
pub enum CommandSource {
    /// The server console or an rcon session; treated as the owner.
    Console,
    Player(PlayerInfo),
}

impl CommandSource {
    pub fn steam_id(&self) -> Option<SteamId> {
        match self {
            CommandSource::Console => None,
            CommandSource::Player(info) => Some(info.steam_id),
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            CommandSource::Console => "console",
            CommandSource::Player(info) => &info.name,
        }
    }
}

/// Everything a command handler gets to see about one invocation.
#[derive(Debug, Clone)]
pub struct CommandInvocation {
    pub source: CommandSource,
    /// The name the command matched under, without any prefix.
    pub name: String,
    /// Arguments after the command word, with shell-style quoting applied.
    pub args: Vec<String>,
    pub channel: Channel,
}

/// What a command handler had to say about the raw line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandReply {
    /// Let default processing of the line continue.
    Pass,
    /// Suppress default processing (e.g. don't echo the chat line).
    Stop,
}

/// The registry's verdict on one input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Nothing matched or passed checks; the engine handles the line.
    Unmatched,
    /// A handler ran and left default processing alone.
    Handled,
    /// A handler ran and asked for the line to be suppressed.
    Stopped,
}

pub type CommandHandler = Box<dyn FnMut(&CommandInvocation) -> anyhow::Result<CommandReply>>;

/// Static description of a command: names, gates and help text.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Primary name first, aliases after. Matched case-insensitively.
    pub names: Vec<String>,
    /// Minimum permission level (0-5) for regular invocation.
    pub permission: u8,
    /// If set, the invocation channel's kind must be in this list.
    pub channels: Option<Vec<ChannelKind>>,
    /// Channel kinds the command must not be invoked from.
    pub exclude_channels: Vec<ChannelKind>,
    /// Whether the command may be triggered as a client-side command,
    /// separate from chat and console.
    pub client_cmd: bool,
    /// Permission floor for the client-side form.
    pub client_cmd_permission: u8,
    /// Whether chat invocations must carry the command prefix.
    pub prefix: bool,
    /// One-line usage string for help output.
    pub usage: String,
}

impl CommandSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            names: vec![name.into().to_lowercase()],
            permission: 0,
            channels: None,
            exclude_channels: Vec::new(),
            client_cmd: false,
            client_cmd_permission: PERM_OWNER,
            prefix: true,
            usage: String::new(),
        }
    }

    pub fn alias(mut self, name: impl Into<String>) -> Self {
        self.names.push(name.into().to_lowercase());
        self
    }

    pub fn permission(mut self, level: u8) -> Self {
        self.permission = level;
        self
    }

    pub fn channels(mut self, kinds: Vec<ChannelKind>) -> Self {
        self.channels = Some(kinds);
        self
    }

    pub fn exclude_channels(mut self, kinds: Vec<ChannelKind>) -> Self {
        self.exclude_channels = kinds;
        self
    }

    pub fn client_cmd(mut self, permission: u8) -> Self {
        self.client_cmd = true;
        self.client_cmd_permission = permission;
        self
    }

    pub fn no_prefix(mut self) -> Self {
        self.prefix = false;
        self
    }

    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = usage.into();
        self
    }

    fn is_eligible_channel(&self, kind: ChannelKind) -> bool {
        if kind == ChannelKind::ClientCommand {
            return self.client_cmd;
        }
        if let Some(allowed) = &self.channels {
            if !allowed.contains(&kind) {
                return false;
            }
        }
        !self.exclude_channels.contains(&kind)
    }

    /// Match the command word against our names, honoring the prefix rule
    /// for chat-originated invocations. Console, rcon and client commands
    /// never require a prefix.
    fn is_eligible_name(&self, word: &str, kind: ChannelKind, prefix: &str) -> bool {
        let chat_originated =
            matches!(kind, ChannelKind::Chat | ChannelKind::TeamChat | ChannelKind::Tell);

        let bare = if chat_originated && self.prefix {
            match word.strip_prefix(prefix) {
                Some(rest) => rest,
                None => return false,
            }
        } else {
            word
        };

        self.names.iter().any(|n| n == bare)
    }
}

/// Resolves the permission level of an invoking identity. The designated
/// owner always evaluates to the owner level regardless of stored value.
pub struct Permissions<'a> {
    pub owner: Option<SteamId>,
    pub database: Option<&'a dyn Database>,
}

impl Permissions<'_> {
    pub fn level_of(&self, source: &CommandSource) -> u8 {
        let steam_id = match source {
            CommandSource::Console => return PERM_OWNER,
            CommandSource::Player(info) => info.steam_id,
        };

        if self.owner == Some(steam_id) {
            return PERM_OWNER;
        }

        match self.database {
            Some(db) => match db.get_permission(steam_id) {
                Ok(level) => level.min(PERM_OWNER),
                Err(e) => {
                    warn!(
                        target: "commands",
                        "Permission lookup for {} failed, treating as 0: {:#}",
                        steam_id,
                        e
                    );
                    0
                }
            },
            None => 0,
        }
    }
}

struct CommandEntry {
    id: CommandId,
    plugin: String,
    spec: CommandSpec,
    handler: CommandHandler,
}

/// All registered commands, ordered by a global priority tier and then
/// by registration order within a tier.
pub struct CommandRegistry {
    tiers: [Vec<CommandEntry>; 5],
    next_id: u64,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            tiers: Default::default(),
            next_id: 0,
        }
    }

    pub fn add_command(
        &mut self,
        plugin: &str,
        spec: CommandSpec,
        priority: Priority,
        handler: CommandHandler,
    ) -> CommandId {
        let id = CommandId(self.next_id);
        self.next_id += 1;

        debug!(
            target: "commands",
            "Registering command '{}' for plugin '{}'",
            spec.names.first().map(String::as_str).unwrap_or("?"),
            plugin
        );

        self.tiers[priority.index()].push(CommandEntry {
            id,
            plugin: plugin.to_string(),
            spec,
            handler,
        });
        id
    }

    pub fn remove_command(&mut self, id: CommandId) -> Result<(), RegistryError> {
        for tier in self.tiers.iter_mut() {
            if let Some(pos) = tier.iter().position(|entry| entry.id == id) {
                let entry = tier.remove(pos);
                debug!(
                    target: "commands",
                    "Removed command '{}' for plugin '{}'",
                    entry.spec.names.first().map(String::as_str).unwrap_or("?"),
                    entry.plugin
                );
                return Ok(());
            }
        }
        Err(RegistryError::CommandNotFound(id))
    }

    pub fn command_count(&self) -> usize {
        self.tiers.iter().map(|tier| tier.len()).sum()
    }

    /// Handle one console, rcon or recognized chat line.
    ///
    /// Scans candidates in descending tier and registration order, runs
    /// the first one whose name, channel and permission checks all pass,
    /// and reports what should happen to the raw line. A handler failure
    /// is logged and the line still counts as handled so the engine does
    /// not double-process bad input.
    pub fn handle_input(
        &mut self,
        source: &CommandSource,
        raw: &str,
        channel: Channel,
        prefix: &str,
        perms: &Permissions<'_>,
    ) -> CommandOutcome {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return CommandOutcome::Unmatched;
        }

        let tokens = tokenize(trimmed);
        let word = match tokens.first() {
            Some(word) => word.to_lowercase(),
            None => return CommandOutcome::Unmatched,
        };
        let kind = channel.kind();
        let is_client_cmd = kind == ChannelKind::ClientCommand;

        for tier in self.tiers.iter_mut() {
            for entry in tier.iter_mut() {
                if !entry.spec.is_eligible_name(&word, kind, prefix) {
                    continue;
                }
                if !entry.spec.is_eligible_channel(kind) {
                    continue;
                }

                let required = if is_client_cmd {
                    entry.spec.client_cmd_permission
                } else {
                    entry.spec.permission
                };
                if perms.level_of(source) < required {
                    continue;
                }

                let name = entry
                    .spec
                    .names
                    .first()
                    .cloned()
                    .unwrap_or_else(|| word.clone());
                debug!(
                    target: "commands",
                    "{} executed '{}' @ {}",
                    source.display_name(),
                    name,
                    channel
                );

                let invocation = CommandInvocation {
                    source: source.clone(),
                    name,
                    args: tokens[1..].to_vec(),
                    channel,
                };

                let reply =
                    catch_unwind(AssertUnwindSafe(|| (entry.handler)(&invocation)));
                return match reply {
                    Err(panic) => {
                        error!(
                            target: "commands",
                            "Command handler from plugin '{}' panicked: {:?}",
                            entry.plugin,
                            panic
                        );
                        CommandOutcome::Handled
                    }
                    Ok(Err(e)) => {
                        error!(
                            target: "commands",
                            "Command handler from plugin '{}' failed: {:#}",
                            entry.plugin,
                            e
                        );
                        CommandOutcome::Handled
                    }
                    Ok(Ok(CommandReply::Pass)) => CommandOutcome::Handled,
                    Ok(Ok(CommandReply::Stop)) => CommandOutcome::Stopped,
                };
            }
        }

        CommandOutcome::Unmatched
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Split a line into a command word and arguments with shell-style
/// quoting: double-quoted stretches keep their spaces, quotes themselves
/// are dropped. An unterminated quote runs to the end of the line.
pub fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for ch in input.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    tokens.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        tokens.push(current);
    }

    tokens
}
