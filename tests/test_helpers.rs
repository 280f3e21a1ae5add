/// Shared helpers for integration-testing the host.
///
/// Provides a recording in-memory engine and builders for hosts and
/// players, so tests can drive the handler bridge end to end and assert
/// on what reached the "engine".
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use vadrigar::{ClientId, Engine, InfoMap, ModConfig, ModHost, PlayerInfo, SteamId, Team};

// ============================================================================
// Recording Engine
// ============================================================================

#[derive(Default)]
pub struct FakeEngine {
    cvars: Mutex<HashMap<String, String>>,
    configstrings: Mutex<HashMap<u16, String>>,
    players: Mutex<Vec<PlayerInfo>>,
    pub console_output: Mutex<Vec<String>>,
    pub console_commands: Mutex<Vec<String>>,
    pub server_commands: Mutex<Vec<(Option<ClientId>, String)>>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_player(&self, id: ClientId, steam_id: SteamId, name: &str, team: Team) {
        let mut userinfo = InfoMap::new();
        userinfo.set("name", name);
        self.players.lock().unwrap().push(PlayerInfo {
            id,
            steam_id,
            name: name.to_string(),
            team,
            userinfo,
        });
    }

}

impl Engine for FakeEngine {
    fn get_cvar(&self, name: &str) -> Option<String> {
        self.cvars.lock().unwrap().get(name).cloned()
    }

    fn set_cvar(&self, name: &str, value: &str) {
        self.cvars
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
    }

    fn get_configstring(&self, index: u16) -> String {
        self.configstrings
            .lock()
            .unwrap()
            .get(&index)
            .cloned()
            .unwrap_or_default()
    }

    fn set_configstring(&self, index: u16, value: &str) {
        self.configstrings
            .lock()
            .unwrap()
            .insert(index, value.to_string());
    }

    fn console_print(&self, text: &str) {
        self.console_output.lock().unwrap().push(text.to_string());
    }

    fn console_command(&self, cmd: &str) {
        self.console_commands.lock().unwrap().push(cmd.to_string());
    }

    fn send_server_command(&self, client: Option<ClientId>, cmd: &str) {
        self.server_commands
            .lock()
            .unwrap()
            .push((client, cmd.to_string()));
    }

    fn players(&self) -> Vec<PlayerInfo> {
        self.players.lock().unwrap().clone()
    }

    fn player_info(&self, client: ClientId) -> Option<PlayerInfo> {
        self.players
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == client)
            .cloned()
    }
}

// ============================================================================
// Host Builders
// ============================================================================

pub fn test_host(engine: Arc<FakeEngine>) -> ModHost {
    ModHost::new(engine, ModConfig::default())
}

pub fn test_host_with_config(engine: Arc<FakeEngine>, config: ModConfig) -> ModHost {
    ModHost::new(engine, config)
}
