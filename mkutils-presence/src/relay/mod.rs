//! Cross-server event relay over store pub/sub.
//!
//! Any process publishes a `RemoteAction`; every process whose `Dispatcher`
//! registered that kind receives it and acts if the addressed player is local.

mod channel;
mod dispatch;
mod message;

pub use channel::ChannelKind;
pub use dispatch::{DispatchOptions, DispatchOutcome, Dispatcher};
pub use message::{DecodeError, PowerState, RemoteAction};

use mkutils_store::{Store, StoreError};
use thiserror::Error;

use crate::directory::PresenceError;
use crate::keyspace::KeySpace;
use crate::models::Location;
use crate::validation::ValidationError;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("invalid relay message: {0}")]
    Validation(#[from] ValidationError),

    #[error("malformed payload on '{channel}': {source}")]
    Decode {
        channel: String,
        #[source]
        source: DecodeError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Presence(#[from] PresenceError),
}

/// Publishes actions for other processes to carry out.
#[derive(Clone)]
pub struct Relay {
    store: Store,
    keys: KeySpace,
}

impl Relay {
    pub fn new(store: Store, keys: KeySpace) -> Self {
        Self { store, keys }
    }

    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    /// Validate, encode and publish. Returns how many subscribers received it.
    /// Nothing is published when validation fails.
    pub async fn publish(&self, action: &RemoteAction) -> Result<usize, RelayError> {
        let payload = action.encode()?;
        let channel = self.keys.channel(action.kind());
        let receivers = self.store.publish(&channel, &payload).await?;
        tracing::debug!(%channel, receivers, "relay message published");
        Ok(receivers)
    }

    pub async fn connect_player(&self, player: &str, server: &str) -> Result<usize, RelayError> {
        self.publish(&RemoteAction::ConnectPlayer {
            player: player.to_string(),
            server: server.to_string(),
        })
        .await
    }

    pub async fn kick_player(
        &self,
        player: &str,
        reason: &str,
        bypass_permission: Option<&str>,
    ) -> Result<usize, RelayError> {
        self.publish(&RemoteAction::KickPlayer {
            player: player.to_string(),
            reason: reason.to_string(),
            bypass_permission: bypass_permission.map(str::to_string),
        })
        .await
    }

    pub async fn send_message(
        &self,
        players: &[String],
        text: &str,
        required_permission: Option<&str>,
    ) -> Result<usize, RelayError> {
        self.publish(&RemoteAction::SendMessage {
            players: players.to_vec(),
            text: text.to_string(),
            required_permission: required_permission.map(str::to_string),
        })
        .await
    }

    pub async fn play_sound(
        &self,
        player: &str,
        sound: &str,
        volume: f32,
        pitch: f32,
    ) -> Result<usize, RelayError> {
        self.publish(&RemoteAction::PlaySound {
            player: player.to_string(),
            sound: sound.to_string(),
            volume,
            pitch,
        })
        .await
    }

    pub async fn teleport_to_player(
        &self,
        player: &str,
        target: &str,
        play_sound: bool,
    ) -> Result<usize, RelayError> {
        self.publish(&RemoteAction::TeleportToPlayer {
            player: player.to_string(),
            target: target.to_string(),
            play_sound,
        })
        .await
    }

    pub async fn teleport_to_location(
        &self,
        player: &str,
        location: Location,
        play_sound: bool,
    ) -> Result<usize, RelayError> {
        self.publish(&RemoteAction::TeleportToLocation {
            player: player.to_string(),
            location,
            play_sound,
        })
        .await
    }

    pub async fn send_chat(&self, player: &str, text: &str) -> Result<usize, RelayError> {
        self.publish(&RemoteAction::SendChat {
            player: player.to_string(),
            text: text.to_string(),
        })
        .await
    }
}
