use std::collections::{BTreeMap, BTreeSet};

use mkutils_store::{Result, Store};

use crate::keyspace::KeySpace;

/// Server name to the players on it.
pub type DirectorySnapshot = BTreeMap<String, BTreeSet<String>>;

/// Read-only view over the presence hash. Every call reads the store afresh.
#[derive(Clone)]
pub struct PresenceQuery {
    store: Store,
    keys: KeySpace,
}

impl PresenceQuery {
    pub fn new(store: Store, keys: KeySpace) -> Self {
        Self { store, keys }
    }

    pub async fn snapshot(&self) -> Result<DirectorySnapshot> {
        let entries = self.store.hash_get_all(&self.keys.servers_key()).await?;
        Ok(entries
            .into_iter()
            .map(|(server, players)| (server, parse_players(&players)))
            .collect())
    }

    pub async fn online_servers(&self) -> Result<BTreeSet<String>> {
        Ok(self.snapshot().await?.into_keys().collect())
    }

    /// Every player on any server, each once.
    pub async fn online_players(&self) -> Result<BTreeSet<String>> {
        Ok(self.snapshot().await?.into_values().flatten().collect())
    }

    /// Players on `server`; empty for an unknown server.
    pub async fn players_on_server(&self, server: &str) -> Result<BTreeSet<String>> {
        Ok(self
            .store
            .hash_get(&self.keys.servers_key(), server)
            .await?
            .map(|players| parse_players(&players))
            .unwrap_or_default())
    }

    /// `None` when `server` is not online.
    pub async fn server_player_count(&self, server: &str) -> Result<Option<usize>> {
        Ok(self
            .store
            .hash_get(&self.keys.servers_key(), server)
            .await?
            .map(|players| parse_players(&players).len()))
    }

    /// The server `player` is on. Names compare case-insensitively.
    pub async fn player_server(&self, player: &str) -> Result<Option<String>> {
        let snapshot = self.snapshot().await?;
        Ok(snapshot.into_iter().find_map(|(server, players)| {
            players
                .iter()
                .any(|name| name.eq_ignore_ascii_case(player))
                .then_some(server)
        }))
    }

    pub async fn global_player_count(&self) -> Result<usize> {
        Ok(self.online_players().await?.len())
    }
}

/// Split a stored `;`-joined player list, skipping blanks.
pub(crate) fn parse_players(raw: &str) -> BTreeSet<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
