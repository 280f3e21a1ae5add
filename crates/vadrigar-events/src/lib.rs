/// Core event types and engine boundary traits for vadrigar
///
/// This crate provides the foundational types for the event system,
/// allowing different crates to implement engines without circular
/// dependencies.
use serde::{Deserialize, Serialize};

pub mod game_events;
pub mod info;

pub use game_events::{Event, EventName};
pub use info::{parse_variables, stringify_variables, InfoMap};

/// Client slot number, as handed to us by the engine. Valid slots are
/// [0, sv_maxclients).
pub type ClientId = u32;

/// SteamID64 of a connected player. The engine guarantees these are
/// >= 64, so they never collide with client slots.
pub type SteamId = u64;

// ============================================================================
// Teams
// ============================================================================

/// The team a client is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Team {
    Free,
    Red,
    Blue,
    Spectator,
}

impl Team {
    pub fn as_str(&self) -> &'static str {
        match self {
            Team::Free => "free",
            Team::Red => "red",
            Team::Blue => "blue",
            Team::Spectator => "spectator",
        }
    }

    /// Parse the single-letter form used by the engine's "team" command.
    /// "a" (any) has no fixed team and returns None here.
    pub fn from_letter(letter: char) -> Option<Team> {
        match letter.to_ascii_lowercase() {
            'f' => Some(Team::Free),
            'r' => Some(Team::Red),
            'b' => Some(Team::Blue),
            's' => Some(Team::Spectator),
            _ => None,
        }
    }
}

impl std::fmt::Display for Team {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Priorities
// ============================================================================

/// Dispatch priority tier for hooks and commands. Dispatch runs highest
/// tier first; insertion order is preserved within a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    Highest,
    High,
    Normal,
    Low,
    Lowest,
}

impl Priority {
    /// All tiers in dispatch order.
    pub const ALL: [Priority; 5] = [
        Priority::Highest,
        Priority::High,
        Priority::Normal,
        Priority::Low,
        Priority::Lowest,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }
}

// ============================================================================
// Hook replies and dispatch outcomes
// ============================================================================

/// What a single hook had to say about an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookReply {
    /// No opinion; dispatch continues with the current payload.
    Pass,
    /// Stop dispatch immediately and cancel the underlying engine action.
    Cancel,
    /// Replace the event's text payload for all subsequent hooks.
    ReplaceText(String),
    /// Replace the event's keyed-variable payload for all subsequent hooks.
    ReplaceVars(InfoMap),
}

/// The aggregated result of dispatching an event to all of its hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No hooks were registered for the event. Callers proceed unchanged.
    Unhandled,
    /// Hooks ran; none cancelled or overrode the payload.
    Pass,
    /// A hook cancelled the event.
    Cancel,
    /// The final text payload after overrides.
    Text(String),
    /// The final keyed-variable payload after overrides.
    Vars(InfoMap),
}

impl DispatchOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DispatchOutcome::Cancel)
    }

    /// The replacement text, if any hook overrode it.
    pub fn text(&self) -> Option<&str> {
        match self {
            DispatchOutcome::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The replacement variables, if any hook overrode them.
    pub fn vars(&self) -> Option<&InfoMap> {
        match self {
            DispatchOutcome::Vars(m) => Some(m),
            _ => None,
        }
    }
}

// ============================================================================
// Channels
// ============================================================================

/// An abstract destination for an outgoing message. Channels are plain
/// data; delivery goes through the [`Engine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// The global chat everyone sees.
    Chat,
    /// The chat scoped to one team.
    TeamChat(Team),
    /// A private tell to a specific client.
    Tell(ClientId),
    /// The server console.
    Console,
    /// A command typed client-side rather than said in chat.
    ClientCommand(ClientId),
}

/// The channel's type, used by command allow/deny lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelKind {
    Chat,
    TeamChat,
    Tell,
    Console,
    ClientCommand,
}

impl Channel {
    pub fn kind(&self) -> ChannelKind {
        match self {
            Channel::Chat => ChannelKind::Chat,
            Channel::TeamChat(_) => ChannelKind::TeamChat,
            Channel::Tell(_) => ChannelKind::Tell,
            Channel::Console => ChannelKind::Console,
            Channel::ClientCommand(_) => ChannelKind::ClientCommand,
        }
    }

    pub fn name(&self) -> String {
        match self {
            Channel::Chat => "chat".to_string(),
            Channel::TeamChat(team) => format!("{}_team_chat", team),
            Channel::Tell(id) => format!("tell_{}", id),
            Channel::Console => "console".to_string(),
            Channel::ClientCommand(id) => format!("client_command_{}", id),
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

// ============================================================================
// Engine boundary
// ============================================================================

/// Index of the serverinfo configstring, which carries g_gameState.
pub const CS_SERVERINFO: u16 = 0;
/// Index of the configstring holding the current vote, empty if none.
pub const CS_VOTE_STRING: u16 = 9;
/// Yes-votes so far for the current vote.
pub const CS_VOTE_YES: u16 = 10;
/// No-votes so far for the current vote.
pub const CS_VOTE_NO: u16 = 11;
/// Round status block used by round-based game types.
pub const CS_ROUND_STATUS: u16 = 661;

/// A snapshot of one connected player, as the engine sees them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerInfo {
    pub id: ClientId,
    pub steam_id: SteamId,
    pub name: String,
    pub team: Team,
    /// The player's userinfo block (name, rate, model, ...).
    pub userinfo: InfoMap,
}

/// The native engine surface the scripting core talks to.
///
/// Everything the core needs from the host process goes through this
/// trait: cvars, configstrings, console output and the player table.
/// Implementations must be callable from background threads; the core
/// itself only mutates its own state on the simulation thread.
pub trait Engine: Send + Sync {
    fn get_cvar(&self, name: &str) -> Option<String>;
    fn set_cvar(&self, name: &str, value: &str);
    fn get_configstring(&self, index: u16) -> String;
    fn set_configstring(&self, index: u16, value: &str);
    /// Print text to the server console.
    fn console_print(&self, text: &str);
    /// Execute a command as if typed in the server console.
    fn console_command(&self, cmd: &str);
    /// Send a server command to one client, or to everyone if None.
    fn send_server_command(&self, client: Option<ClientId>, cmd: &str);
    fn players(&self) -> Vec<PlayerInfo>;
    fn player_info(&self, client: ClientId) -> Option<PlayerInfo>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_dispatch_order() {
        let mut sorted = Priority::ALL.to_vec();
        sorted.sort();
        assert_eq!(sorted, Priority::ALL.to_vec());
        assert!(Priority::Highest < Priority::Lowest);
    }

    #[test]
    fn test_team_letters() {
        assert_eq!(Team::from_letter('r'), Some(Team::Red));
        assert_eq!(Team::from_letter('B'), Some(Team::Blue));
        assert_eq!(Team::from_letter('a'), None);
        assert_eq!(Team::from_letter('x'), None);
    }

    #[test]
    fn test_channel_kinds() {
        assert_eq!(Channel::TeamChat(Team::Red).kind(), ChannelKind::TeamChat);
        assert_eq!(Channel::Tell(3).kind(), ChannelKind::Tell);
        assert_eq!(Channel::TeamChat(Team::Red).name(), "red_team_chat");
    }
}
