//! The fixed set of events the core dispatches, one variant per name.

use crate::info::InfoMap;
use crate::{Channel, ClientId, Team};

/// A server event with its argument payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A command arriving from a client ("say", "team", "score", ...).
    ClientCommand { client: ClientId, cmd: String },
    /// A command the server is about to send to a client, or to everyone
    /// when client is None.
    ServerCommand {
        client: Option<ClientId>,
        cmd: String,
    },
    /// A chat line, after say/say_team recognition.
    Chat {
        client: ClientId,
        msg: String,
        channel: Channel,
    },
    /// A vote has appeared on everyone's screen.
    VoteStarted {
        /// Who called it, when a prior vote_called dispatch identified them.
        caller: Option<ClientId>,
        vote: String,
        args: String,
    },
    /// A client tried to call a vote. Cancellable before the vote starts.
    VoteCalled {
        client: ClientId,
        vote: String,
        args: String,
    },
    /// A client cast a vote on the active vote.
    Vote { client: ClientId, yes: bool },
    /// The active vote concluded.
    VoteEnded { passed: bool },
    /// A client asked to switch teams. Cancellable. A request for "any"
    /// team carries no target.
    TeamSwitchAttempt {
        client: ClientId,
        old_team: Team,
        new_team: Option<Team>,
    },
    /// A client changed userinfo variables; only the changed keys are
    /// carried.
    Userinfo { client: ClientId, changed: InfoMap },
    /// One simulation frame.
    Frame,
    NewGame,
    Map { name: String, factory: String },
    SetConfigstring { index: u16, value: String },
    GameCountdown,
    RoundCountdown { round: u32 },
    RoundStart { round: u32 },
    PlayerConnect { client: ClientId },
    PlayerLoaded { client: ClientId },
    PlayerDisconnect {
        client: ClientId,
        reason: Option<String>,
    },
    PlayerSpawn { client: ClientId },
    KamikazeUse { client: ClientId },
    KamikazeExplode {
        client: ClientId,
        used_on_demand: bool,
    },
    ConsolePrint { text: String },
    /// A plugin is about to be unloaded; its state is still valid.
    Unload { plugin: String },
}

/// Registry key for an event. The set is fixed at process start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    ClientCommand,
    ServerCommand,
    Chat,
    VoteStarted,
    VoteCalled,
    Vote,
    VoteEnded,
    TeamSwitchAttempt,
    Userinfo,
    Frame,
    NewGame,
    Map,
    SetConfigstring,
    GameCountdown,
    RoundCountdown,
    RoundStart,
    PlayerConnect,
    PlayerLoaded,
    PlayerDisconnect,
    PlayerSpawn,
    KamikazeUse,
    KamikazeExplode,
    ConsolePrint,
    Unload,
}

impl EventName {
    /// Every event name, in declaration order. Used to pre-create the
    /// registry's queues.
    pub const ALL: [EventName; 24] = [
        EventName::ClientCommand,
        EventName::ServerCommand,
        EventName::Chat,
        EventName::VoteStarted,
        EventName::VoteCalled,
        EventName::Vote,
        EventName::VoteEnded,
        EventName::TeamSwitchAttempt,
        EventName::Userinfo,
        EventName::Frame,
        EventName::NewGame,
        EventName::Map,
        EventName::SetConfigstring,
        EventName::GameCountdown,
        EventName::RoundCountdown,
        EventName::RoundStart,
        EventName::PlayerConnect,
        EventName::PlayerLoaded,
        EventName::PlayerDisconnect,
        EventName::PlayerSpawn,
        EventName::KamikazeUse,
        EventName::KamikazeExplode,
        EventName::ConsolePrint,
        EventName::Unload,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::ClientCommand => "client_command",
            EventName::ServerCommand => "server_command",
            EventName::Chat => "chat",
            EventName::VoteStarted => "vote_started",
            EventName::VoteCalled => "vote_called",
            EventName::Vote => "vote",
            EventName::VoteEnded => "vote_ended",
            EventName::TeamSwitchAttempt => "team_switch_attempt",
            EventName::Userinfo => "userinfo",
            EventName::Frame => "frame",
            EventName::NewGame => "new_game",
            EventName::Map => "map",
            EventName::SetConfigstring => "set_configstring",
            EventName::GameCountdown => "game_countdown",
            EventName::RoundCountdown => "round_countdown",
            EventName::RoundStart => "round_start",
            EventName::PlayerConnect => "player_connect",
            EventName::PlayerLoaded => "player_loaded",
            EventName::PlayerDisconnect => "player_disconnect",
            EventName::PlayerSpawn => "player_spawn",
            EventName::KamikazeUse => "kamikaze_use",
            EventName::KamikazeExplode => "kamikaze_explode",
            EventName::ConsolePrint => "console_print",
            EventName::Unload => "unload",
        }
    }
}

impl std::fmt::Display for EventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Event {
    pub fn name(&self) -> EventName {
        match self {
            Event::ClientCommand { .. } => EventName::ClientCommand,
            Event::ServerCommand { .. } => EventName::ServerCommand,
            Event::Chat { .. } => EventName::Chat,
            Event::VoteStarted { .. } => EventName::VoteStarted,
            Event::VoteCalled { .. } => EventName::VoteCalled,
            Event::Vote { .. } => EventName::Vote,
            Event::VoteEnded { .. } => EventName::VoteEnded,
            Event::TeamSwitchAttempt { .. } => EventName::TeamSwitchAttempt,
            Event::Userinfo { .. } => EventName::Userinfo,
            Event::Frame => EventName::Frame,
            Event::NewGame => EventName::NewGame,
            Event::Map { .. } => EventName::Map,
            Event::SetConfigstring { .. } => EventName::SetConfigstring,
            Event::GameCountdown => EventName::GameCountdown,
            Event::RoundCountdown { .. } => EventName::RoundCountdown,
            Event::RoundStart { .. } => EventName::RoundStart,
            Event::PlayerConnect { .. } => EventName::PlayerConnect,
            Event::PlayerLoaded { .. } => EventName::PlayerLoaded,
            Event::PlayerDisconnect { .. } => EventName::PlayerDisconnect,
            Event::PlayerSpawn { .. } => EventName::PlayerSpawn,
            Event::KamikazeUse { .. } => EventName::KamikazeUse,
            Event::KamikazeExplode { .. } => EventName::KamikazeExplode,
            Event::ConsolePrint { .. } => EventName::ConsolePrint,
            Event::Unload { .. } => EventName::Unload,
        }
    }

    /// The event's text payload, for kinds that carry one.
    pub fn text(&self) -> Option<&str> {
        match self {
            Event::ClientCommand { cmd, .. } => Some(cmd),
            Event::ServerCommand { cmd, .. } => Some(cmd),
            Event::Chat { msg, .. } => Some(msg),
            Event::SetConfigstring { value, .. } => Some(value),
            Event::ConsolePrint { text } => Some(text),
            _ => None,
        }
    }

    /// Rebuild this event with its text payload replaced. Returns None
    /// for kinds that have no text payload; the override is ignored then.
    pub fn with_text(&self, new_text: &str) -> Option<Event> {
        let mut event = self.clone();
        match &mut event {
            Event::ClientCommand { cmd, .. } => *cmd = new_text.to_string(),
            Event::ServerCommand { cmd, .. } => *cmd = new_text.to_string(),
            Event::Chat { msg, .. } => *msg = new_text.to_string(),
            Event::SetConfigstring { value, .. } => *value = new_text.to_string(),
            Event::ConsolePrint { text } => *text = new_text.to_string(),
            _ => return None,
        }
        Some(event)
    }

    /// Rebuild this event with its keyed-variable payload replaced.
    /// Only userinfo events carry one.
    pub fn with_vars(&self, new_vars: InfoMap) -> Option<Event> {
        match self {
            Event::Userinfo { client, .. } => Some(Event::Userinfo {
                client: *client,
                changed: new_vars,
            }),
            _ => None,
        }
    }
}
