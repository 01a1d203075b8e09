use std::collections::{HashSet, VecDeque};
use std::future::Future;

use scc::HashMap;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::warn;

use crate::models::{Location, PlayerName};
use crate::relay::RemoteAction;

/// What the embedding runtime (a game server or proxy) can do for the relay.
///
/// Handlers only call the action methods for players `has_player` reported as local.
pub trait Host: Send + Sync + 'static {
    fn has_player(&self, player: &str) -> impl Future<Output = bool> + Send;

    fn has_permission(&self, player: &str, permission: &str) -> impl Future<Output = bool> + Send;

    fn connect(&self, player: &str, server: &str) -> impl Future<Output = ()> + Send;

    fn kick(&self, player: &str, reason: &str) -> impl Future<Output = ()> + Send;

    fn send_message(&self, player: &str, text: &str) -> impl Future<Output = ()> + Send;

    fn play_sound(
        &self,
        player: &str,
        sound: &str,
        volume: f32,
        pitch: f32,
    ) -> impl Future<Output = ()> + Send;

    fn teleport_to_player(
        &self,
        player: &str,
        target: &str,
        play_sound: bool,
    ) -> impl Future<Output = ()> + Send;

    fn teleport_to_location(
        &self,
        player: &str,
        location: &Location,
        play_sound: bool,
    ) -> impl Future<Output = ()> + Send;

    fn send_chat(&self, player: &str, text: &str) -> impl Future<Output = ()> + Send;
}

#[derive(Debug, Clone, Serialize)]
pub struct LocalPlayer {
    pub joined_at: i64,
    pub permissions: Vec<String>,
}

/// Host for an out-of-process runtime talking to the sidecar over HTTP.
///
/// The runtime reports its players through `/join`, `/leave` and `/sync`, and
/// polls `/actions/pending` for the actions the relay addressed to them.
pub struct SidecarHost {
    players: HashMap<PlayerName, LocalPlayer>,
    outbox: Mutex<VecDeque<RemoteAction>>,
    capacity: usize,
}

impl SidecarHost {
    pub fn new(outbox_capacity: usize) -> Self {
        Self {
            players: HashMap::new(),
            outbox: Mutex::new(VecDeque::new()),
            capacity: outbox_capacity.max(1),
        }
    }

    /// Record a local player, replacing the permissions of one already known.
    pub async fn player_joined(&self, player: PlayerName, permissions: Vec<String>, now: i64) {
        let entry = LocalPlayer {
            joined_at: now,
            permissions,
        };
        if let Err((name, entry)) = self.players.insert_async(player, entry).await {
            self.players
                .update_async(&name, |_, existing| existing.permissions = entry.permissions)
                .await;
        }
    }

    /// Returns whether the player was known.
    pub async fn player_left(&self, player: &str) -> bool {
        self.players.remove_async(player).await.is_some()
    }

    /// Replace the local player list. Players already known keep their permissions.
    pub async fn sync_players(&self, players: &[PlayerName], now: i64) {
        let keep: HashSet<PlayerName> = players.iter().copied().collect();
        self.players
            .retain_async(|name, _| keep.contains(name))
            .await;
        for player in players {
            let _ = self
                .players
                .insert_async(
                    *player,
                    LocalPlayer {
                        joined_at: now,
                        permissions: Vec::new(),
                    },
                )
                .await;
        }
    }

    pub async fn local_players(&self) -> Vec<PlayerName> {
        let mut names = Vec::new();
        self.players
            .retain_async(|name, _| {
                names.push(*name);
                true
            })
            .await;
        names.sort();
        names
    }

    /// Take every queued action, oldest first.
    pub async fn drain(&self) -> Vec<RemoteAction> {
        self.outbox.lock().await.drain(..).collect()
    }

    pub async fn pending(&self) -> usize {
        self.outbox.lock().await.len()
    }

    async fn enqueue(&self, action: RemoteAction) {
        let mut outbox = self.outbox.lock().await;
        if outbox.len() >= self.capacity {
            if let Some(dropped) = outbox.pop_front() {
                warn!(kind = ?dropped.kind(), "outbox full, dropping oldest action");
            }
        }
        outbox.push_back(action);
    }
}

impl Host for SidecarHost {
    async fn has_player(&self, player: &str) -> bool {
        self.players.read_async(player, |_, _| ()).await.is_some()
    }

    async fn has_permission(&self, player: &str, permission: &str) -> bool {
        self.players
            .read_async(player, |_, local| {
                local
                    .permissions
                    .iter()
                    .any(|granted| granted == permission || granted == "*")
            })
            .await
            .unwrap_or(false)
    }

    async fn connect(&self, player: &str, server: &str) {
        self.enqueue(RemoteAction::ConnectPlayer {
            player: player.to_string(),
            server: server.to_string(),
        })
        .await;
    }

    async fn kick(&self, player: &str, reason: &str) {
        self.enqueue(RemoteAction::KickPlayer {
            player: player.to_string(),
            reason: reason.to_string(),
            bypass_permission: None,
        })
        .await;
    }

    async fn send_message(&self, player: &str, text: &str) {
        self.enqueue(RemoteAction::SendMessage {
            players: vec![player.to_string()],
            text: text.to_string(),
            required_permission: None,
        })
        .await;
    }

    async fn play_sound(&self, player: &str, sound: &str, volume: f32, pitch: f32) {
        self.enqueue(RemoteAction::PlaySound {
            player: player.to_string(),
            sound: sound.to_string(),
            volume,
            pitch,
        })
        .await;
    }

    async fn teleport_to_player(&self, player: &str, target: &str, play_sound: bool) {
        self.enqueue(RemoteAction::TeleportToPlayer {
            player: player.to_string(),
            target: target.to_string(),
            play_sound,
        })
        .await;
    }

    async fn teleport_to_location(&self, player: &str, location: &Location, play_sound: bool) {
        self.enqueue(RemoteAction::TeleportToLocation {
            player: player.to_string(),
            location: location.clone(),
            play_sound,
        })
        .await;
    }

    async fn send_chat(&self, player: &str, text: &str) {
        self.enqueue(RemoteAction::SendChat {
            player: player.to_string(),
            text: text.to_string(),
        })
        .await;
    }
}
