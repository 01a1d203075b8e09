use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use mkutils_store::{Store, StoreMessage, Subscription, backoff_delay};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{ChannelKind, RelayError, RemoteAction};
use crate::directory::PresenceDirectory;
use crate::host::Host;
use crate::keyspace::KeySpace;
use crate::models::HostRole;

const RESUBSCRIBE_BASE: Duration = Duration::from_millis(500);
const RESUBSCRIBE_MAX: Duration = Duration::from_secs(30);

type Handler = Arc<dyn Fn(RemoteAction) -> BoxFuture<'static, Result<(), RelayError>> + Send + Sync>;

#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    pub keys: KeySpace,
    /// Log game servers powering on and off (proxy only).
    pub log_power_actions: bool,
}

/// What happened to one received message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled,
    /// Not a relay channel of this namespace.
    UnknownChannel,
    /// A relay channel this process has no handler for.
    Unregistered,
    /// The payload did not decode.
    Malformed,
    /// The handler returned an error.
    Failed,
}

/// Routes received messages to the handler registered for their kind.
#[derive(Clone)]
pub struct Dispatcher {
    keys: KeySpace,
    handlers: HashMap<ChannelKind, Handler>,
}

impl Dispatcher {
    pub fn new(keys: KeySpace) -> Self {
        Self {
            keys,
            handlers: HashMap::new(),
        }
    }

    /// Register `handler` for `kind`, replacing any previous one.
    pub fn register<F, Fut>(&mut self, kind: ChannelKind, handler: F)
    where
        F: Fn(RemoteAction) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), RelayError>> + Send + 'static,
    {
        self.handlers
            .insert(kind, Arc::new(move |action| handler(action).boxed()));
    }

    /// The standard handler table for a game server or a proxy.
    ///
    /// Presence claims are only handled when a directory is given.
    pub fn for_role<H: Host>(
        role: HostRole,
        host: Arc<H>,
        directory: Option<Arc<PresenceDirectory>>,
        options: DispatchOptions,
    ) -> Self {
        let mut dispatcher = Self::new(options.keys.clone());

        for kind in ChannelKind::for_role(role) {
            if kind == ChannelKind::PresenceClaim {
                if let Some(directory) = &directory {
                    let directory = directory.clone();
                    dispatcher.register(kind, move |action| {
                        let directory = directory.clone();
                        async move {
                            if let RemoteAction::PresenceClaim {
                                player,
                                server,
                                joined_at,
                            } = action
                            {
                                directory
                                    .handle_presence_claim(&player, &server, joined_at)
                                    .await?;
                            }
                            Ok(())
                        }
                    });
                }
                continue;
            }

            let host = host.clone();
            let log_power_actions = options.log_power_actions;
            dispatcher.register(kind, move |action| {
                let host = host.clone();
                async move {
                    perform(host.as_ref(), action, log_power_actions).await;
                    Ok(())
                }
            });
        }

        dispatcher
    }

    pub fn kinds(&self) -> Vec<ChannelKind> {
        let mut kinds: Vec<ChannelKind> = self.handlers.keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn channels(&self) -> Vec<String> {
        self.kinds()
            .into_iter()
            .map(|kind| self.keys.channel(kind))
            .collect()
    }

    /// Decode and handle one message. Never fails; problems are logged.
    pub async fn dispatch(&self, message: &StoreMessage) -> DispatchOutcome {
        let Some(kind) = self.keys.channel_kind(&message.channel) else {
            debug!(channel = %message.channel, "ignoring message on unknown channel");
            return DispatchOutcome::UnknownChannel;
        };
        let Some(handler) = self.handlers.get(&kind) else {
            return DispatchOutcome::Unregistered;
        };

        let action = match RemoteAction::decode(kind, &message.payload) {
            Ok(action) => action,
            Err(source) => {
                let err = RelayError::Decode {
                    channel: message.channel.clone(),
                    source,
                };
                warn!(payload = %message.payload, "dropping relay message: {}", err);
                return DispatchOutcome::Malformed;
            }
        };

        match handler(action).await {
            Ok(()) => DispatchOutcome::Handled,
            Err(err) => {
                error!(channel = %message.channel, "relay handler failed: {}", err);
                DispatchOutcome::Failed
            }
        }
    }

    /// Subscribe to every registered channel and handle messages on a background task.
    ///
    /// Fails only if the first subscription fails. Afterwards the task resubscribes with
    /// capped backoff whenever the subscription closes, and stops on cancellation.
    pub async fn listen(
        self,
        store: Store,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<()>, RelayError> {
        let channels = self.channels();
        let subscription = subscribe(&store, &channels).await?;
        info!(channels = channels.len(), "relay listener subscribed");
        Ok(tokio::spawn(self.run(store, channels, subscription, cancel)))
    }

    async fn run(
        self,
        store: Store,
        channels: Vec<String>,
        mut subscription: Subscription,
        cancel: CancellationToken,
    ) {
        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("relay listener stopped");
                    return;
                }
                message = subscription.recv() => message,
            };

            match message {
                Some(message) => {
                    self.dispatch(&message).await;
                }
                None => {
                    warn!("relay subscription closed, resubscribing");
                    match resubscribe(&store, &channels, &cancel).await {
                        Some(fresh) => subscription = fresh,
                        None => return,
                    }
                }
            }
        }
    }
}

async fn subscribe(store: &Store, channels: &[String]) -> Result<Subscription, RelayError> {
    let channels: Vec<&str> = channels.iter().map(String::as_str).collect();
    Ok(store.subscribe(&channels).await?)
}

/// Retry until subscribed. `None` when cancelled first.
async fn resubscribe(
    store: &Store,
    channels: &[String],
    cancel: &CancellationToken,
) -> Option<Subscription> {
    let mut failures = 0;
    loop {
        match subscribe(store, channels).await {
            Ok(subscription) => {
                info!(failures, "relay listener resubscribed");
                return Some(subscription);
            }
            Err(err) => {
                failures += 1;
                let delay = backoff_delay(RESUBSCRIBE_BASE, RESUBSCRIBE_MAX, failures);
                warn!(failures, ?delay, "relay resubscribe failed: {}", err);
                tokio::select! {
                    _ = cancel.cancelled() => return None,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

/// Carry out `action` if it concerns a player on this host.
async fn perform<H: Host>(host: &H, action: RemoteAction, log_power_actions: bool) {
    match action {
        RemoteAction::ConnectPlayer { player, server } => {
            if host.has_player(&player).await {
                host.connect(&player, &server).await;
            }
        }
        RemoteAction::KickPlayer {
            player,
            reason,
            bypass_permission,
        } => {
            if !host.has_player(&player).await {
                return;
            }
            if let Some(permission) = &bypass_permission {
                if host.has_permission(&player, permission).await {
                    debug!(%player, %permission, "kick bypassed");
                    return;
                }
            }
            host.kick(&player, &reason).await;
        }
        RemoteAction::SendMessage {
            players,
            text,
            required_permission,
        } => {
            for player in &players {
                if !host.has_player(player).await {
                    continue;
                }
                if let Some(permission) = &required_permission {
                    if !host.has_permission(player, permission).await {
                        continue;
                    }
                }
                host.send_message(player, &text).await;
            }
        }
        RemoteAction::PlaySound {
            player,
            sound,
            volume,
            pitch,
        } => {
            if host.has_player(&player).await {
                host.play_sound(&player, &sound, volume, pitch).await;
            }
        }
        RemoteAction::TeleportToPlayer {
            player,
            target,
            play_sound,
        } => {
            if host.has_player(&player).await {
                host.teleport_to_player(&player, &target, play_sound).await;
            }
        }
        RemoteAction::TeleportToLocation {
            player,
            location,
            play_sound,
        } => {
            if host.has_player(&player).await {
                host.teleport_to_location(&player, &location, play_sound).await;
            }
        }
        RemoteAction::SendChat { player, text } => {
            if host.has_player(&player).await {
                host.send_chat(&player, &text).await;
            }
        }
        RemoteAction::ServerPowerAction { server, state } => {
            if log_power_actions {
                info!(%server, state = state.as_str(), "game server power state changed");
            }
        }
        // Owned by the presence directory
        RemoteAction::PresenceClaim { .. } => {}
    }
}
