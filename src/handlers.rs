//! Low-level handlers, called by the native layer once per frame or
//! protocol event.
//!
//! This is the boundary where opaque engine strings become structured
//! events. Each handler dispatches the matching event, feeds recognized
//! command lines into the command registry, and tells the native layer
//! what to do with the raw input. A failure in here is logged and the
//! input passes through unmodified; only an explicit hook cancellation
//! suppresses the engine's own processing.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::commands::{CommandOutcome, CommandSource, Permissions};
use crate::config::ModConfig;
use crate::database::Database;
use crate::host::ModHost;
use std::sync::Arc;
use vadrigar_events::{
    parse_variables, stringify_variables, Channel, ClientId, DispatchOutcome, Event, EventName,
    InfoMap, Team, CS_ROUND_STATUS, CS_SERVERINFO, CS_VOTE_STRING,
};

// ===== Regular expressions over raw protocol lines =====

static RE_SAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)^say +"?(?P<msg>.+?)"?$"#).expect("say pattern"));
static RE_SAY_TEAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)^say_team +"?(?P<msg>.+?)"?$"#).expect("say_team pattern"));
static RE_CALLVOTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)^(?:cv|callvote) +(?P<cmd>[^ ]+)(?: "?(?P<args>.+?)"?)?$"#)
        .expect("callvote pattern")
});
static RE_VOTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^vote +(?P<arg>.)").expect("vote pattern"));
static RE_TEAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^team +(?P<arg>.)").expect("team pattern"));
static RE_VOTE_ENDED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^print "Vote (?P<result>passed|failed)\.\n"$"#).expect("vote_ended pattern")
});
static RE_USERINFO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^userinfo "(?P<vars>.+)"$"#).expect("userinfo pattern"));

/// What the native layer should do with the raw input it handed us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawOutcome {
    /// Let the engine process the input as-is.
    Pass,
    /// Let the engine process this replacement instead.
    Replace(String),
    /// Suppress the engine's own processing.
    Drop,
}

fn pass_or_replace(text: String, replaced: bool) -> RawOutcome {
    if replaced {
        RawOutcome::Replace(text)
    } else {
        RawOutcome::Pass
    }
}

fn perms_of<'a>(
    config: &ModConfig,
    database: &'a Option<Arc<dyn Database>>,
) -> Permissions<'a> {
    Permissions {
        owner: config.owner,
        database: database.as_deref(),
    }
}

impl ModHost {
    /// Console and rcon lines, processed as commands as if the owner
    /// typed them. This is how an operator drives the mod without
    /// connecting to the server.
    pub fn handle_rcon(&mut self, cmd: &str) {
        let perms = perms_of(&self.config, &self.database);
        self.commands.handle_input(
            &CommandSource::Console,
            cmd,
            Channel::Console,
            &self.config.command_prefix,
            &perms,
        );
    }

    /// Client commands: "say", "say_team", "team", "callvote" and
    /// friends. Parses them into higher-level events and reports back
    /// what the engine should do with the raw line.
    pub fn handle_client_command(&mut self, client: ClientId, cmd: &str) -> RawOutcome {
        let mut cmd = cmd.to_string();
        let mut replaced = false;

        match self.events.dispatch(Event::ClientCommand {
            client,
            cmd: cmd.clone(),
        }) {
            DispatchOutcome::Cancel => return RawOutcome::Drop,
            DispatchOutcome::Text(text) => {
                cmd = text;
                replaced = true;
            }
            _ => {}
        }

        // The client-side command form: no prefix, gated by its own
        // permission floor.
        if let Some(info) = self.engine.player_info(client) {
            let source = CommandSource::Player(info);
            let perms = perms_of(&self.config, &self.database);
            let outcome = self.commands.handle_input(
                &source,
                &cmd,
                Channel::ClientCommand(client),
                &self.config.command_prefix,
                &perms,
            );
            if outcome == CommandOutcome::Stopped {
                return RawOutcome::Drop;
            }
        }

        if let Some(caps) = RE_SAY.captures(&cmd) {
            let msg = caps["msg"].replace('"', "");
            return self.handle_chat_line(client, msg, Channel::Chat, cmd, replaced);
        }

        if let Some(caps) = RE_SAY_TEAM.captures(&cmd) {
            let msg = caps["msg"].replace('"', "");
            let team = self
                .engine
                .player_info(client)
                .map(|p| p.team)
                .unwrap_or(Team::Spectator);
            return self.handle_chat_line(client, msg, Channel::TeamChat(team), cmd, replaced);
        }

        if let Some(caps) = RE_CALLVOTE.captures(&cmd) {
            if !self.is_vote_active() {
                let vote = caps["cmd"].to_string();
                let args = caps
                    .name("args")
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default();
                // Remember who called it for the vote_started dispatch,
                // in case the vote goes through.
                self.events.set_caller(EventName::VoteStarted, client);
                if self
                    .events
                    .dispatch(Event::VoteCalled { client, vote, args })
                    .is_cancelled()
                {
                    return RawOutcome::Drop;
                }
            }
            return pass_or_replace(cmd, replaced);
        }

        if let Some(caps) = RE_VOTE.captures(&cmd) {
            if self.is_vote_active() {
                let arg = caps["arg"].to_lowercase();
                let yes = match arg.as_str() {
                    "y" | "1" => Some(true),
                    "n" | "2" => Some(false),
                    _ => None,
                };
                if let Some(yes) = yes {
                    if self
                        .events
                        .dispatch(Event::Vote { client, yes })
                        .is_cancelled()
                    {
                        return RawOutcome::Drop;
                    }
                }
            }
            return pass_or_replace(cmd, replaced);
        }

        if let Some(caps) = RE_TEAM.captures(&cmd) {
            let arg = caps["arg"].to_lowercase();
            let old_team = self
                .engine
                .player_info(client)
                .map(|p| p.team)
                .unwrap_or(Team::Spectator);

            // Joining the team you are already on is not an attempt.
            if arg.starts_with(&old_team.as_str()[..1]) {
                return pass_or_replace(cmd, replaced);
            }

            let letter = arg.chars().next().unwrap_or(' ');
            let new_team = match letter {
                'a' => Some(None),
                _ => Team::from_letter(letter).map(Some),
            };
            if let Some(new_team) = new_team {
                if self
                    .events
                    .dispatch(Event::TeamSwitchAttempt {
                        client,
                        old_team,
                        new_team,
                    })
                    .is_cancelled()
                {
                    return RawOutcome::Drop;
                }
            }
            return pass_or_replace(cmd, replaced);
        }

        if let Some(caps) = RE_USERINFO.captures(&cmd) {
            let new_info = parse_variables(&caps["vars"]);
            let old_info = self
                .engine
                .player_info(client)
                .map(|p| p.userinfo)
                .unwrap_or_default();

            let mut changed = InfoMap::new();
            for (key, value) in new_info.iter() {
                if old_info.get(key) != Some(value) {
                    changed.set(key, value);
                }
            }

            if !changed.is_empty() {
                match self.events.dispatch(Event::Userinfo { client, changed }) {
                    DispatchOutcome::Cancel => return RawOutcome::Drop,
                    DispatchOutcome::Vars(overrides) => {
                        let mut merged = new_info;
                        for (key, value) in overrides.iter() {
                            merged.set(key, value);
                        }
                        cmd = format!("userinfo \"{}\"", stringify_variables(&merged));
                        replaced = true;
                    }
                    _ => {}
                }
            }
        }

        pass_or_replace(cmd, replaced)
    }

    fn handle_chat_line(
        &mut self,
        client: ClientId,
        msg: String,
        channel: Channel,
        cmd: String,
        replaced: bool,
    ) -> RawOutcome {
        let mut msg = msg;
        match self.events.dispatch(Event::Chat {
            client,
            msg: msg.clone(),
            channel,
        }) {
            DispatchOutcome::Cancel => return RawOutcome::Drop,
            DispatchOutcome::Text(text) => msg = text,
            _ => {}
        }

        // Chat lines double as command invocations when prefixed.
        if let Some(info) = self.engine.player_info(client) {
            let source = CommandSource::Player(info);
            let perms = perms_of(&self.config, &self.database);
            let outcome = self.commands.handle_input(
                &source,
                &msg,
                channel,
                &self.config.command_prefix,
                &perms,
            );
            if outcome == CommandOutcome::Stopped {
                return RawOutcome::Drop;
            }
        }

        pass_or_replace(cmd, replaced)
    }

    /// Commands the server sends to clients. Recognizes vote results.
    pub fn handle_server_command(&mut self, client: Option<ClientId>, cmd: &str) -> RawOutcome {
        if let Some(id) = client {
            // A command headed for a client that has already vanished is
            // not worth dispatching.
            if self.engine.player_info(id).is_none() {
                return RawOutcome::Pass;
            }
        }

        let mut cmd = cmd.to_string();
        let mut replaced = false;
        match self.events.dispatch(Event::ServerCommand {
            client,
            cmd: cmd.clone(),
        }) {
            DispatchOutcome::Cancel => return RawOutcome::Drop,
            DispatchOutcome::Text(text) => {
                cmd = text;
                replaced = true;
            }
            _ => {}
        }

        if let Some(caps) = RE_VOTE_ENDED.captures(&cmd) {
            let passed = &caps["result"] == "passed";
            self.events.dispatch(Event::VoteEnded { passed });
        }

        pass_or_replace(cmd, replaced)
    }

    /// One simulation frame. Drains due deferred tasks first, then
    /// dispatches the frame event, so background work lands before any
    /// frame hook observes the world.
    pub fn handle_frame(&mut self) {
        let due = self.scheduler.begin_frame();
        for task in due {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| task(self)));
            if let Err(panic) = result {
                tracing::error!(
                    target: "scheduler",
                    "Deferred task panicked: {:?}",
                    panic
                );
            }
        }

        self.events.dispatch(Event::Frame);
    }

    /// Called early in the engine's launch of a new game. The first call
    /// triggers the host's late initialization.
    pub fn handle_new_game(&mut self, is_restart: bool) {
        if self.first_game {
            self.late_init();
            self.first_game = false;
        }

        if !is_restart {
            let name = self.engine.get_cvar("mapname").unwrap_or_default();
            let factory = self.engine.get_cvar("g_factory").unwrap_or_default();
            self.events.dispatch(Event::Map { name, factory });
        }

        self.events.dispatch(Event::NewGame);
    }

    /// The server is about to set a configstring. Recognizes vote
    /// starts, game-state changes and round transitions from the raw
    /// values.
    pub fn handle_set_configstring(&mut self, index: u16, value: &str) -> RawOutcome {
        let mut value = value.to_string();
        let mut replaced = false;

        match self.events.dispatch(Event::SetConfigstring {
            index,
            value: value.clone(),
        }) {
            DispatchOutcome::Cancel => return RawOutcome::Drop,
            DispatchOutcome::Text(text) => {
                value = text;
                replaced = true;
            }
            _ => {}
        }

        if index == CS_VOTE_STRING && !value.is_empty() {
            let mut words = value.split_whitespace();
            let vote = words.next().unwrap_or("").to_string();
            let args = words.collect::<Vec<_>>().join(" ");
            let caller = self.events.take_caller(EventName::VoteStarted);
            self.events.dispatch(Event::VoteStarted { caller, vote, args });
        } else if index == CS_SERVERINFO {
            self.check_game_state_change(&value);
        } else if index == CS_ROUND_STATUS {
            self.check_round_transition(&value);
        }

        pass_or_replace(value, replaced)
    }

    fn check_game_state_change(&mut self, new_value: &str) {
        let old_cs = parse_variables(&self.engine.get_configstring(CS_SERVERINFO));
        if old_cs.is_empty() {
            return;
        }
        let new_cs = parse_variables(new_value);
        let old_state = old_cs.get("g_gameState").unwrap_or("");
        let new_state = new_cs.get("g_gameState").unwrap_or("");
        if old_state == new_state {
            return;
        }

        match (old_state, new_state) {
            ("PRE_GAME", "IN_PROGRESS") => {}
            ("PRE_GAME", "COUNT_DOWN") => {
                self.ad_round_number = 1;
                self.events.dispatch(Event::GameCountdown);
            }
            ("COUNT_DOWN", "IN_PROGRESS") => {}
            ("IN_PROGRESS", "PRE_GAME") => {}
            ("COUNT_DOWN", "PRE_GAME") => {}
            _ => {
                warn!("Unknown game states: {} - {}", old_state, new_state);
            }
        }
    }

    /// Round countdown and start. Clan Arena carries the round number
    /// directly; Attack & Defend counts half-rounds with a turn flag and
    /// only reports the round on countdowns, so the last computed number
    /// is reused for the start.
    fn check_round_transition(&mut self, value: &str) {
        let cvars = parse_variables(value);
        if cvars.is_empty() {
            return;
        }

        let round_number = if cvars.contains_key("turn") {
            if cvars.get("state").and_then(|s| s.parse::<i32>().ok()) == Some(0) {
                return;
            }
            // The round cvar appears only on round countdown, and the
            // first round is 0, not 1.
            match (
                cvars.get("round").and_then(|r| r.parse::<u32>().ok()),
                cvars.get("turn").and_then(|t| t.parse::<u32>().ok()),
            ) {
                (Some(round), Some(turn)) => {
                    let number = round * 2 + 1 + turn;
                    self.ad_round_number = number;
                    number
                }
                _ => self.ad_round_number,
            }
        } else {
            match cvars.get("round").and_then(|r| r.parse::<u32>().ok()) {
                Some(round) => round,
                None => return,
            }
        };

        if round_number == 0 {
            return;
        }

        if cvars.contains_key("time") {
            self.events.dispatch(Event::RoundCountdown {
                round: round_number,
            });
        } else {
            self.events.dispatch(Event::RoundStart {
                round: round_number,
            });
        }
    }

    /// A player is trying to connect. Cancel blocks the connection; a
    /// text override becomes the message shown to them.
    pub fn handle_player_connect(&mut self, client: ClientId) -> DispatchOutcome {
        self.events.dispatch(Event::PlayerConnect { client })
    }

    /// A player finished loading into the game world. Fires a bit after
    /// the usual "connected" message, and not for bots.
    pub fn handle_player_loaded(&mut self, client: ClientId) -> DispatchOutcome {
        self.events.dispatch(Event::PlayerLoaded { client })
    }

    pub fn handle_player_disconnect(
        &mut self,
        client: ClientId,
        reason: Option<String>,
    ) -> DispatchOutcome {
        self.events
            .dispatch(Event::PlayerDisconnect { client, reason })
    }

    /// A player spawned. Spectators entering free-spectate also spawn,
    /// so hooks wanting "real" spawns have to filter.
    pub fn handle_player_spawn(&mut self, client: ClientId) -> DispatchOutcome {
        self.events.dispatch(Event::PlayerSpawn { client })
    }

    pub fn handle_kamikaze_use(&mut self, client: ClientId) -> DispatchOutcome {
        self.events.dispatch(Event::KamikazeUse { client })
    }

    pub fn handle_kamikaze_explode(
        &mut self,
        client: ClientId,
        used_on_demand: bool,
    ) -> DispatchOutcome {
        self.events.dispatch(Event::KamikazeExplode {
            client,
            used_on_demand,
        })
    }

    /// The server printed to its console. The text is mirrored into the
    /// log, which removes the need for separate stdout capture.
    pub fn handle_console_print(&mut self, text: &str) -> RawOutcome {
        if text.is_empty() {
            return RawOutcome::Pass;
        }

        debug!(target: "console", "{}", text.trim_end_matches('\n'));

        match self.events.dispatch(Event::ConsolePrint {
            text: text.to_string(),
        }) {
            DispatchOutcome::Cancel => RawOutcome::Drop,
            DispatchOutcome::Text(replacement) => RawOutcome::Replace(replacement),
            _ => RawOutcome::Pass,
        }
    }

    /// Whether a vote is currently on everyone's screen.
    pub fn is_vote_active(&self) -> bool {
        !self.engine.get_configstring(CS_VOTE_STRING).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_say_pattern() {
        let caps = RE_SAY.captures("say \"hello world\"").unwrap();
        assert_eq!(&caps["msg"], "hello world");
        let caps = RE_SAY.captures("say hi").unwrap();
        assert_eq!(&caps["msg"], "hi");
        assert!(RE_SAY.captures("say_team x").is_none());
    }

    #[test]
    fn test_say_team_pattern() {
        let caps = RE_SAY_TEAM.captures("say_team \"incoming mid\"").unwrap();
        assert_eq!(&caps["msg"], "incoming mid");
    }

    #[test]
    fn test_callvote_pattern() {
        let caps = RE_CALLVOTE.captures("callvote map overkill").unwrap();
        assert_eq!(&caps["cmd"], "map");
        assert_eq!(caps.name("args").unwrap().as_str(), "overkill");

        let caps = RE_CALLVOTE.captures("cv restart").unwrap();
        assert_eq!(&caps["cmd"], "restart");
        assert!(caps.name("args").is_none());
    }

    #[test]
    fn test_vote_and_team_patterns() {
        assert_eq!(&RE_VOTE.captures("vote y").unwrap()["arg"], "y");
        assert_eq!(&RE_VOTE.captures("vote 2").unwrap()["arg"], "2");
        assert_eq!(&RE_TEAM.captures("team s").unwrap()["arg"], "s");
        assert!(RE_TEAM.captures("teamsize 8").is_none());
    }

    #[test]
    fn test_vote_ended_pattern() {
        let caps = RE_VOTE_ENDED
            .captures("print \"Vote passed.\n\"")
            .unwrap();
        assert_eq!(&caps["result"], "passed");
        let caps = RE_VOTE_ENDED
            .captures("print \"Vote failed.\n\"")
            .unwrap();
        assert_eq!(&caps["result"], "failed");
        assert!(RE_VOTE_ENDED.captures("print \"Vote Xpassed.\n\"").is_none());
    }

    #[test]
    fn test_userinfo_pattern() {
        let caps = RE_USERINFO
            .captures("userinfo \"\\name\\dude\\rate\\25000\"")
            .unwrap();
        assert_eq!(&caps["vars"], "\\name\\dude\\rate\\25000");
    }
}
