use std::collections::BTreeMap;
use std::sync::Arc;

use mkutils_store::{Store, StoreError, SyncStatus};
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::helpers::now_millis;
use crate::keyspace::KeySpace;
use crate::models::{PlayerName, player_name};
use crate::query::PresenceQuery;
use crate::relay::{PowerState, RemoteAction};
use crate::validation::{ValidationError, validate_server_name};

#[derive(Debug, Error)]
pub enum PresenceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("server '{0}' is not owned by this process")]
    NotOwner(String),
}

/// One player on an owned server.
#[derive(Debug, Clone, Copy)]
struct Presence {
    name: PlayerName,
    /// Unix millis of the join, used to order competing claims.
    joined_at: i64,
}

/// Players of one server, keyed by lowercased name.
type Roster = BTreeMap<PlayerName, Presence>;

/// Whether a local entry on `server` joined at `joined_at` is older than a claim.
/// Equal join times fall back to the server name, so every owner agrees on the order.
fn superseded_by(joined_at: i64, server: &str, claim_joined_at: i64, claim_server: &str) -> bool {
    server != claim_server && (joined_at, server) < (claim_joined_at, claim_server)
}

fn roster_key(name: &PlayerName) -> PlayerName {
    let mut key = *name;
    key.make_ascii_lowercase();
    key
}

/// Shared record of which players are on which game server.
///
/// Each process owns the servers it announced online and is the only writer of their
/// fields in the servers hash. Every change rewrites one field from the owner's local
/// roster, so writers on other processes never overwrite each other. The local roster
/// only changes after its field was written, so a failed call can simply be retried.
pub struct PresenceDirectory {
    store: Store,
    keys: KeySpace,
    owned: Mutex<BTreeMap<String, Roster>>,
}

impl PresenceDirectory {
    pub fn new(store: Store, keys: KeySpace) -> Self {
        Self {
            store,
            keys,
            owned: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn query(&self) -> PresenceQuery {
        PresenceQuery::new(self.store.clone(), self.keys.clone())
    }

    pub async fn owned_servers(&self) -> Vec<String> {
        self.owned.lock().await.keys().cloned().collect()
    }

    /// Local view of one owned server. `None` if not owned.
    pub async fn local_players(&self, server: &str) -> Option<Vec<PlayerName>> {
        self.owned
            .lock()
            .await
            .get(server)
            .map(|roster| roster.values().map(|presence| presence.name).collect())
    }

    /// Take ownership of `server` with no players and tell the network it is up.
    ///
    /// Announcing an owned server again resets it to empty.
    pub async fn announce_server_online(&self, server: &str) -> Result<(), PresenceError> {
        validate_server_name(server)?;
        {
            let mut owned = self.owned.lock().await;
            self.write_server(server, &Roster::new()).await?;
            owned.insert(server.to_string(), Roster::new());
        }
        info!(%server, "server announced online");
        self.publish(RemoteAction::ServerPowerAction {
            server: server.to_string(),
            state: PowerState::On,
        })
        .await
    }

    /// Release `server`, remove its entry and tell the network it is down.
    pub async fn announce_server_offline(&self, server: &str) -> Result<(), PresenceError> {
        {
            let mut owned = self.owned.lock().await;
            if !owned.contains_key(server) {
                return Err(PresenceError::NotOwner(server.to_string()));
            }
            self.store
                .hash_delete(&self.keys.servers_key(), server)
                .await?;
            owned.remove(server);
        }
        info!(%server, "server announced offline");
        self.publish(RemoteAction::ServerPowerAction {
            server: server.to_string(),
            state: PowerState::Off,
        })
        .await
    }

    /// Record `player` on the owned `server`, and off every other server.
    pub async fn on_player_connected_to_server(
        &self,
        player: &str,
        server: &str,
    ) -> Result<(), PresenceError> {
        let name = player_name(player)?;
        let key = roster_key(&name);
        let joined_at = now_millis();
        {
            let mut owned = self.owned.lock().await;
            let Some(roster) = owned.get(server) else {
                return Err(PresenceError::NotOwner(server.to_string()));
            };
            let mut next = roster.clone();
            next.insert(key, Presence { name, joined_at });

            let others: Vec<String> = owned
                .iter()
                .filter(|(other, roster)| other.as_str() != server && roster.contains_key(&key))
                .map(|(other, _)| other.clone())
                .collect();
            for other in &others {
                self.evict(&mut owned, other, &key).await?;
            }

            // Always written, so a retry repairs a field a failed attempt left stale
            self.write_server(server, &next).await?;
            owned.insert(server.to_string(), next);
        }
        debug!(%player, %server, "player connected");

        // Evictions elsewhere are best effort; the local write above already happened
        let claim = RemoteAction::PresenceClaim {
            player: player.to_string(),
            server: server.to_string(),
            joined_at,
        };
        if let Err(err) = self.publish(claim).await {
            warn!(%player, %server, "presence claim not published: {}", err);
        }
        Ok(())
    }

    /// Remove `player` from every owned server. Returns whether anything changed.
    pub async fn on_player_disconnected(&self, player: &str) -> Result<bool, PresenceError> {
        let key = roster_key(&player_name(player)?);
        let mut owned = self.owned.lock().await;
        let servers: Vec<String> = owned
            .iter()
            .filter(|(_, roster)| roster.contains_key(&key))
            .map(|(server, _)| server.clone())
            .collect();
        for server in &servers {
            self.evict(&mut owned, server, &key).await?;
        }
        if !servers.is_empty() {
            debug!(%player, "player disconnected");
        }
        Ok(!servers.is_empty())
    }

    /// Replace the player set of an owned server with the host's authoritative list.
    ///
    /// Players already present keep their join time.
    pub async fn sync_server_players(
        &self,
        server: &str,
        players: &[String],
    ) -> Result<(), PresenceError> {
        let names = players
            .iter()
            .map(|player| player_name(player))
            .collect::<Result<Vec<_>, _>>()?;

        let mut owned = self.owned.lock().await;
        let Some(current) = owned.get(server) else {
            return Err(PresenceError::NotOwner(server.to_string()));
        };
        let now = now_millis();
        let next: Roster = names
            .into_iter()
            .map(|name| {
                let key = roster_key(&name);
                let joined_at = current.get(&key).map_or(now, |presence| presence.joined_at);
                (key, Presence { name, joined_at })
            })
            .collect();

        self.write_server(server, &next).await?;
        debug!(%server, players = next.len(), "server players synced");
        owned.insert(server.to_string(), next);
        Ok(())
    }

    /// Another process reported `player` joining `server` at `joined_at`: drop the
    /// player from every other owned server where the local entry is older.
    ///
    /// Entries with the same join time are ordered by server name, so two owners
    /// handling each other's claims always keep exactly one entry.
    pub async fn handle_presence_claim(
        &self,
        player: &str,
        server: &str,
        joined_at: i64,
    ) -> Result<bool, PresenceError> {
        let Ok(name) = player_name(player) else {
            return Ok(false);
        };
        let key = roster_key(&name);
        let mut owned = self.owned.lock().await;
        let stale: Vec<String> = owned
            .iter()
            .filter(|(owned_server, roster)| {
                roster.get(&key).is_some_and(|presence| {
                    superseded_by(presence.joined_at, owned_server, joined_at, server)
                })
            })
            .map(|(owned_server, _)| owned_server.clone())
            .collect();
        for owned_server in &stale {
            self.evict(&mut owned, owned_server, &key).await?;
        }
        if !stale.is_empty() {
            debug!(%player, %server, "stale presence entry evicted");
        }
        Ok(!stale.is_empty())
    }

    /// Host call-in for a join on a game server.
    pub async fn notify_player_joined_server(
        &self,
        player: &str,
        server: &str,
    ) -> Result<(), PresenceError> {
        self.on_player_connected_to_server(player, server).await
    }

    /// Host call-in for a quit on a game server.
    pub async fn notify_player_left_server(
        &self,
        player: &str,
        server: &str,
    ) -> Result<(), PresenceError> {
        let key = roster_key(&player_name(player)?);
        let mut owned = self.owned.lock().await;
        if !owned.contains_key(server) {
            return Err(PresenceError::NotOwner(server.to_string()));
        }
        self.evict(&mut owned, server, &key).await?;
        Ok(())
    }

    /// Rewrite every owned field from local state, e.g. after the store came back.
    pub async fn resync_owned_servers(&self) -> Result<usize, PresenceError> {
        let owned = self.owned.lock().await;
        for (server, roster) in owned.iter() {
            self.write_server(server, roster).await?;
        }
        Ok(owned.len())
    }

    /// Rewrite owned fields every time the store recovers from a degraded or failed state.
    pub fn spawn_resync(
        self: &Arc<Self>,
        mut status: watch::Receiver<SyncStatus>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let directory = Arc::clone(self);
        tokio::spawn(async move {
            let mut healthy = status.borrow_and_update().is_healthy();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    changed = status.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                let now_healthy = status.borrow_and_update().is_healthy();
                if now_healthy && !healthy {
                    match directory.resync_owned_servers().await {
                        Ok(servers) => info!(servers, "presence entries rewritten after recovery"),
                        Err(err) => warn!("presence resync failed: {}", err),
                    }
                }
                healthy = now_healthy;
            }
        })
    }

    /// Remove `key` from one owned server's roster, committing only after the write.
    async fn evict(
        &self,
        owned: &mut BTreeMap<String, Roster>,
        server: &str,
        key: &PlayerName,
    ) -> Result<bool, StoreError> {
        let Some(roster) = owned.get(server) else {
            return Ok(false);
        };
        if !roster.contains_key(key) {
            return Ok(false);
        }
        let mut next = roster.clone();
        next.remove(key);
        self.write_server(server, &next).await?;
        owned.insert(server.to_string(), next);
        Ok(true)
    }

    async fn write_server(&self, server: &str, roster: &Roster) -> Result<(), StoreError> {
        let value = roster
            .values()
            .map(|presence| presence.name.as_str())
            .collect::<Vec<_>>()
            .join(";");
        self.store
            .hash_set_field(&self.keys.servers_key(), server, &value)
            .await
    }

    async fn publish(&self, action: RemoteAction) -> Result<(), PresenceError> {
        let payload = action.encode()?;
        self.store
            .publish(&self.keys.channel(action.kind()), &payload)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::ChannelKind;
    use mkutils_store::{ConnectionConfig, MemoryStore, StoreManager};
    use std::time::Duration;

    fn directory(store: &Store) -> PresenceDirectory {
        PresenceDirectory::new(store.clone(), KeySpace::default())
    }

    async fn field(store: &Store, server: &str) -> Option<String> {
        store
            .hash_get("mkUtils:BungeeAPI:Servers", server)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_announce_online_creates_empty_entry() {
        let store = Store::in_memory();
        let directory = directory(&store);

        directory.announce_server_online("lobby-1").await.unwrap();

        assert_eq!(field(&store, "lobby-1").await, Some(String::new()));
        assert_eq!(directory.owned_servers().await, vec!["lobby-1"]);
        assert_eq!(
            directory.query().server_player_count("lobby-1").await.unwrap(),
            Some(0)
        );
    }

    #[tokio::test]
    async fn test_power_actions_are_published() {
        let store = Store::in_memory();
        let directory = directory(&store);
        let channel = KeySpace::default().channel(ChannelKind::ServerPowerAction);
        let mut subscription = store.subscribe(&[channel.as_str()]).await.unwrap();

        directory.announce_server_online("lobby-1").await.unwrap();
        directory.announce_server_offline("lobby-1").await.unwrap();

        assert_eq!(subscription.recv().await.unwrap().payload, "lobby-1;on");
        assert_eq!(subscription.recv().await.unwrap().payload, "lobby-1;off");
        assert_eq!(field(&store, "lobby-1").await, None);
        assert!(directory.owned_servers().await.is_empty());
    }

    #[tokio::test]
    async fn test_players_move_between_owned_servers() {
        let store = Store::in_memory();
        let directory = directory(&store);
        directory.announce_server_online("lobby-1").await.unwrap();
        directory.announce_server_online("survival").await.unwrap();

        directory
            .on_player_connected_to_server("Steve", "lobby-1")
            .await
            .unwrap();
        directory
            .on_player_connected_to_server("Alex", "lobby-1")
            .await
            .unwrap();
        assert_eq!(field(&store, "lobby-1").await.unwrap(), "Alex;Steve");

        directory
            .on_player_connected_to_server("Steve", "survival")
            .await
            .unwrap();

        assert_eq!(field(&store, "lobby-1").await.unwrap(), "Alex");
        assert_eq!(field(&store, "survival").await.unwrap(), "Steve");
        let query = directory.query();
        assert_eq!(
            query.player_server("Steve").await.unwrap(),
            Some("survival".to_string())
        );
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let store = Store::in_memory();
        let directory = directory(&store);
        directory.announce_server_online("lobby-1").await.unwrap();
        directory
            .on_player_connected_to_server("Steve", "lobby-1")
            .await
            .unwrap();

        assert!(directory.on_player_disconnected("Steve").await.unwrap());
        let after_first = directory.query().snapshot().await.unwrap();
        assert!(!directory.on_player_disconnected("Steve").await.unwrap());
        let after_second = directory.query().snapshot().await.unwrap();

        assert_eq!(after_first, after_second);
        assert_eq!(field(&store, "lobby-1").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_ownership_is_enforced() {
        let store = Store::in_memory();
        let directory = directory(&store);

        assert!(matches!(
            directory
                .on_player_connected_to_server("Steve", "survival")
                .await,
            Err(PresenceError::NotOwner(server)) if server == "survival"
        ));
        assert!(matches!(
            directory.announce_server_offline("survival").await,
            Err(PresenceError::NotOwner(_))
        ));
        assert!(matches!(
            directory
                .sync_server_players("survival", &["Steve".to_string()])
                .await,
            Err(PresenceError::NotOwner(_))
        ));
        assert!(matches!(
            directory.announce_server_online("bad;name").await,
            Err(PresenceError::Validation(_))
        ));
        assert_eq!(field(&store, "survival").await, None);
    }

    #[tokio::test]
    async fn test_sync_replaces_player_set() {
        let store = Store::in_memory();
        let directory = directory(&store);
        directory.announce_server_online("lobby-1").await.unwrap();
        directory
            .on_player_connected_to_server("Notch", "lobby-1")
            .await
            .unwrap();

        directory
            .sync_server_players("lobby-1", &["Steve".to_string(), "Alex".to_string()])
            .await
            .unwrap();

        assert_eq!(field(&store, "lobby-1").await.unwrap(), "Alex;Steve");
        assert!(matches!(
            directory
                .sync_server_players("lobby-1", &["not valid".to_string()])
                .await,
            Err(PresenceError::Validation(_))
        ));
        assert_eq!(field(&store, "lobby-1").await.unwrap(), "Alex;Steve");
    }

    #[tokio::test]
    async fn test_left_server_only_touches_that_server() {
        let store = Store::in_memory();
        let directory = directory(&store);
        directory.announce_server_online("lobby-1").await.unwrap();
        directory
            .notify_player_joined_server("Steve", "lobby-1")
            .await
            .unwrap();
        directory
            .notify_player_left_server("Steve", "lobby-1")
            .await
            .unwrap();
        directory
            .notify_player_left_server("Steve", "lobby-1")
            .await
            .unwrap();

        assert_eq!(field(&store, "lobby-1").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_claim_from_another_process_evicts_stale_entry() {
        let store = Store::in_memory();
        let lobby = directory(&store);
        let survival = directory(&store);
        lobby.announce_server_online("lobby-1").await.unwrap();
        survival.announce_server_online("survival").await.unwrap();
        lobby
            .on_player_connected_to_server("Steve", "lobby-1")
            .await
            .unwrap();

        // The quit on lobby-1 was missed; survival sees the join first
        survival
            .on_player_connected_to_server("Steve", "survival")
            .await
            .unwrap();
        let later = now_millis() + 1;
        assert!(
            lobby
                .handle_presence_claim("Steve", "survival", later)
                .await
                .unwrap()
        );

        assert_eq!(field(&store, "lobby-1").await.unwrap(), "");
        assert_eq!(
            lobby.query().player_server("steve").await.unwrap(),
            Some("survival".to_string())
        );
        assert!(
            !lobby
                .handle_presence_claim("Steve", "survival", later)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_older_claim_keeps_newer_entry() {
        let store = Store::in_memory();
        let lobby = directory(&store);
        let survival = directory(&store);
        lobby.announce_server_online("lobby-1").await.unwrap();
        survival.announce_server_online("survival").await.unwrap();
        lobby
            .on_player_connected_to_server("Steve", "lobby-1")
            .await
            .unwrap();
        let lobby_join = now_millis() - 1_000;
        survival
            .on_player_connected_to_server("Steve", "survival")
            .await
            .unwrap();

        // lobby-1's claim is handled after survival already recorded the newer join
        assert!(
            !survival
                .handle_presence_claim("Steve", "lobby-1", lobby_join)
                .await
                .unwrap()
        );
        assert!(
            lobby
                .handle_presence_claim("Steve", "survival", now_millis())
                .await
                .unwrap()
        );

        assert_eq!(field(&store, "survival").await.unwrap(), "Steve");
        assert_eq!(field(&store, "lobby-1").await.unwrap(), "");
        assert_eq!(
            lobby.query().player_server("Steve").await.unwrap(),
            Some("survival".to_string())
        );
    }

    #[test]
    fn test_claims_are_totally_ordered() {
        assert!(superseded_by(10, "lobby-1", 11, "survival"));
        assert!(!superseded_by(11, "survival", 10, "lobby-1"));

        // Same millisecond: exactly one side gives way
        assert!(superseded_by(10, "lobby-1", 10, "survival"));
        assert!(!superseded_by(10, "survival", 10, "lobby-1"));

        assert!(!superseded_by(10, "lobby-1", 99, "lobby-1"));
    }

    #[tokio::test]
    async fn test_names_match_case_insensitively() {
        let store = Store::in_memory();
        let directory = directory(&store);
        directory.announce_server_online("lobby-1").await.unwrap();
        directory.announce_server_online("survival").await.unwrap();
        directory
            .on_player_connected_to_server("Steve", "lobby-1")
            .await
            .unwrap();

        directory
            .on_player_connected_to_server("steve", "survival")
            .await
            .unwrap();

        assert_eq!(field(&store, "lobby-1").await.unwrap(), "");
        assert_eq!(field(&store, "survival").await.unwrap(), "steve");
        assert!(directory.on_player_disconnected("STEVE").await.unwrap());
        assert_eq!(field(&store, "survival").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_claim_evicts_other_case_of_the_name() {
        let store = Store::in_memory();
        let lobby = directory(&store);
        lobby.announce_server_online("lobby-1").await.unwrap();
        lobby
            .on_player_connected_to_server("Steve", "lobby-1")
            .await
            .unwrap();

        assert!(
            lobby
                .handle_presence_claim("steve", "survival", now_millis() + 1)
                .await
                .unwrap()
        );
        assert_eq!(field(&store, "lobby-1").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_concurrent_writers_do_not_lose_updates() {
        let store = Store::in_memory();
        let lobby = Arc::new(directory(&store));
        let survival = Arc::new(directory(&store));
        lobby.announce_server_online("lobby-1").await.unwrap();
        survival.announce_server_online("survival").await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..20 {
            let lobby = lobby.clone();
            tasks.push(tokio::spawn(async move {
                lobby
                    .on_player_connected_to_server(&format!("Lobby{i}"), "lobby-1")
                    .await
            }));
            let survival = survival.clone();
            tasks.push(tokio::spawn(async move {
                survival
                    .on_player_connected_to_server(&format!("Survival{i}"), "survival")
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let query = lobby.query();
        assert_eq!(query.server_player_count("lobby-1").await.unwrap(), Some(20));
        assert_eq!(query.server_player_count("survival").await.unwrap(), Some(20));
        assert_eq!(query.global_player_count().await.unwrap(), 40);
    }

    #[tokio::test]
    async fn test_failed_connect_can_be_retried() {
        let memory = MemoryStore::new();
        let store = Store::from_memory(memory.clone());
        let directory = directory(&store);
        directory.announce_server_online("lobby-1").await.unwrap();

        memory.set_available(false);
        assert!(matches!(
            directory
                .on_player_connected_to_server("Steve", "lobby-1")
                .await,
            Err(PresenceError::Store(StoreError::Unavailable))
        ));
        assert_eq!(directory.local_players("lobby-1").await, Some(vec![]));

        memory.set_available(true);
        directory
            .on_player_connected_to_server("Steve", "lobby-1")
            .await
            .unwrap();
        assert_eq!(field(&store, "lobby-1").await.unwrap(), "Steve");
        assert_eq!(directory.query().global_player_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_disconnect_can_be_retried() {
        let memory = MemoryStore::new();
        let store = Store::from_memory(memory.clone());
        let directory = directory(&store);
        directory.announce_server_online("lobby-1").await.unwrap();
        directory
            .on_player_connected_to_server("Steve", "lobby-1")
            .await
            .unwrap();

        memory.set_available(false);
        assert!(directory.on_player_disconnected("Steve").await.is_err());
        assert!(directory.notify_player_left_server("Steve", "lobby-1").await.is_err());

        memory.set_available(true);
        assert!(directory.on_player_disconnected("Steve").await.unwrap());
        assert_eq!(field(&store, "lobby-1").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_failed_sync_and_offline_can_be_retried() {
        let memory = MemoryStore::new();
        let store = Store::from_memory(memory.clone());
        let directory = directory(&store);
        directory.announce_server_online("lobby-1").await.unwrap();

        memory.set_available(false);
        let players = vec!["Steve".to_string(), "Alex".to_string()];
        assert!(directory.sync_server_players("lobby-1", &players).await.is_err());
        assert!(directory.announce_server_offline("lobby-1").await.is_err());
        assert_eq!(directory.owned_servers().await, vec!["lobby-1"]);

        memory.set_available(true);
        directory.sync_server_players("lobby-1", &players).await.unwrap();
        assert_eq!(field(&store, "lobby-1").await.unwrap(), "Alex;Steve");
        directory.announce_server_offline("lobby-1").await.unwrap();
        assert_eq!(field(&store, "lobby-1").await, None);
        assert!(directory.owned_servers().await.is_empty());
    }

    #[tokio::test]
    async fn test_entries_are_rewritten_when_store_recovers() {
        let memory = MemoryStore::new();
        let config = ConnectionConfig {
            is_enabled: true,
            liveness_interval: Duration::from_millis(10),
            backoff_max: Duration::from_millis(20),
            failure_threshold: 2,
            ..ConnectionConfig::default()
        };
        let manager = Arc::new(
            StoreManager::with_memory(config, memory.clone())
                .await
                .unwrap(),
        );
        let liveness = manager.spawn_liveness();
        let directory = Arc::new(directory(&manager.store()));
        directory.announce_server_online("lobby-1").await.unwrap();
        directory
            .on_player_connected_to_server("Steve", "lobby-1")
            .await
            .unwrap();
        let resync = directory.spawn_resync(manager.watch_status(), manager.cancellation());

        // The store comes back without the entry, as after a restart
        manager
            .store()
            .hash_delete("mkUtils:BungeeAPI:Servers", "lobby-1")
            .await
            .unwrap();
        memory.set_available(false);
        let mut status = manager.watch_status();
        tokio::time::timeout(
            Duration::from_secs(2),
            status.wait_for(|s| !s.is_healthy()),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(
            directory
                .on_player_connected_to_server("Alex", "lobby-1")
                .await
                .is_err()
        );

        memory.set_available(true);
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if field(&manager.store(), "lobby-1").await.as_deref() == Some("Steve") {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        manager.shutdown().await;
        liveness.await.unwrap();
        resync.await.unwrap();
    }
}
