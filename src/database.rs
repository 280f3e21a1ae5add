//! Persistence and permission backend boundary.
//!
//! Plugins that only care about permissions work against any backend
//! through this trait. The in-tree [`MemoryDatabase`] keeps everything in
//! process memory and is what tests and permissionless setups run on; a
//! Redis-style backend lives outside this crate.

use dashmap::DashMap;

use vadrigar_events::SteamId;

pub trait Database: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    /// The stored permission level for an identity, 0 if none is stored.
    fn get_permission(&self, id: SteamId) -> anyhow::Result<u8>;
    fn set_permission(&self, id: SteamId, level: u8) -> anyhow::Result<()>;
}

/// A process-local key-value store.
#[derive(Default)]
pub struct MemoryDatabase {
    entries: DashMap<String, String>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn permission_key(id: SteamId) -> String {
        format!("players:{}:permission", id)
    }
}

impl Database for MemoryDatabase {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get_permission(&self, id: SteamId) -> anyhow::Result<u8> {
        match self.get(&Self::permission_key(id))? {
            Some(value) => Ok(value.parse::<u8>().unwrap_or(0).min(5)),
            None => Ok(0),
        }
    }

    fn set_permission(&self, id: SteamId, level: u8) -> anyhow::Result<()> {
        self.set(&Self::permission_key(id), &level.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set_round_trip() {
        let db = MemoryDatabase::new();
        assert_eq!(db.get("missing").unwrap(), None);
        db.set("motd", "welcome").unwrap();
        assert_eq!(db.get("motd").unwrap().as_deref(), Some("welcome"));
    }

    #[test]
    fn test_permission_defaults_to_zero() {
        let db = MemoryDatabase::new();
        assert_eq!(db.get_permission(7777).unwrap(), 0);
        db.set_permission(7777, 3).unwrap();
        assert_eq!(db.get_permission(7777).unwrap(), 3);
    }

    #[test]
    fn test_garbage_permission_value_reads_as_zero() {
        let db = MemoryDatabase::new();
        db.set("players:42:permission", "lots").unwrap();
        assert_eq!(db.get_permission(42).unwrap(), 0);
    }
}
