use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ChannelKind;
use crate::models::Location;
use crate::validation::{
    FIELD_SEPARATOR, LIST_SEPARATOR, ValidationError, validate_finite, validate_player_list,
    validate_player_name, validate_required_field, validate_server_name, validate_text_field,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    On,
    Off,
}

impl PowerState {
    pub fn as_str(self) -> &'static str {
        match self {
            PowerState::On => "on",
            PowerState::Off => "off",
        }
    }
}

/// A request for another process on the network to act on a player or server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RemoteAction {
    /// Move a player to another server (proxy).
    ConnectPlayer { player: String, server: String },
    /// Disconnect a player unless they hold `bypass_permission` (proxy).
    KickPlayer {
        player: String,
        reason: String,
        #[serde(default)]
        bypass_permission: Option<String>,
    },
    /// Message each listed player holding `required_permission`, if given (proxy).
    SendMessage {
        players: Vec<String>,
        text: String,
        #[serde(default)]
        required_permission: Option<String>,
    },
    PlaySound {
        player: String,
        sound: String,
        volume: f32,
        pitch: f32,
    },
    TeleportToPlayer {
        player: String,
        target: String,
        play_sound: bool,
    },
    TeleportToLocation {
        player: String,
        location: Location,
        play_sound: bool,
    },
    /// Make the player say `text` in chat.
    SendChat { player: String, text: String },
    /// A game server came online or went offline.
    ServerPowerAction { server: String, state: PowerState },
    /// `player` joined `server` at `joined_at` (unix millis). Other owners drop
    /// entries for the player that are older than the claim.
    PresenceClaim {
        player: String,
        server: String,
        joined_at: i64,
    },
}

/// Why a received payload could not be turned back into an action.
#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("expected {expected} fields, got {actual}")]
    FieldCount { expected: &'static str, actual: usize },

    #[error("field '{field}' is not a number: '{value}'")]
    InvalidNumber { field: &'static str, value: String },

    #[error("field '{field}' is not a boolean: '{value}'")]
    InvalidBool { field: &'static str, value: String },

    #[error("unknown power state '{0}'")]
    InvalidPowerState(String),

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

impl RemoteAction {
    pub fn kind(&self) -> ChannelKind {
        match self {
            RemoteAction::ConnectPlayer { .. } => ChannelKind::ConnectPlayer,
            RemoteAction::KickPlayer { .. } => ChannelKind::KickPlayer,
            RemoteAction::SendMessage { .. } => ChannelKind::SendMessage,
            RemoteAction::PlaySound { .. } => ChannelKind::PlaySound,
            RemoteAction::TeleportToPlayer { .. } => ChannelKind::TeleportToPlayer,
            RemoteAction::TeleportToLocation { .. } => ChannelKind::TeleportToLocation,
            RemoteAction::SendChat { .. } => ChannelKind::SendChat,
            RemoteAction::ServerPowerAction { .. } => ChannelKind::ServerPowerAction,
            RemoteAction::PresenceClaim { .. } => ChannelKind::PresenceClaim,
        }
    }

    /// Check every field against the wire format's reserved characters.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            RemoteAction::ConnectPlayer { player, server }
            | RemoteAction::PresenceClaim { player, server, .. } => {
                validate_player_name(player)?;
                validate_server_name(server)
            }
            RemoteAction::KickPlayer {
                player,
                reason,
                bypass_permission,
            } => {
                validate_player_name(player)?;
                validate_text_field("reason", reason)?;
                validate_optional("bypass_permission", bypass_permission.as_deref())
            }
            RemoteAction::SendMessage {
                players,
                text,
                required_permission,
            } => {
                if players.is_empty() {
                    return Err(ValidationError::PlayerListEmpty);
                }
                validate_player_list(players)?;
                validate_text_field("text", text)?;
                validate_optional("required_permission", required_permission.as_deref())
            }
            RemoteAction::PlaySound {
                player,
                sound,
                volume,
                pitch,
            } => {
                validate_player_name(player)?;
                validate_required_field("sound", sound)?;
                validate_finite("volume", f64::from(*volume))?;
                validate_finite("pitch", f64::from(*pitch))
            }
            RemoteAction::TeleportToPlayer { player, target, .. } => {
                validate_player_name(player)?;
                validate_player_name(target)
            }
            RemoteAction::TeleportToLocation {
                player, location, ..
            } => {
                validate_player_name(player)?;
                validate_required_field("world", &location.world)?;
                validate_finite("x", location.x)?;
                validate_finite("y", location.y)?;
                validate_finite("z", location.z)
            }
            RemoteAction::SendChat { player, text } => {
                validate_player_name(player)?;
                validate_text_field("text", text)
            }
            RemoteAction::ServerPowerAction { server, .. } => validate_server_name(server),
        }
    }

    /// Render the payload in the `;`-separated wire format.
    pub fn encode(&self) -> Result<String, ValidationError> {
        self.validate()?;

        let fields: Vec<String> = match self {
            RemoteAction::ConnectPlayer { player, server } => {
                vec![player.clone(), server.clone()]
            }
            RemoteAction::PresenceClaim {
                player,
                server,
                joined_at,
            } => vec![player.clone(), server.clone(), joined_at.to_string()],
            RemoteAction::KickPlayer {
                player,
                reason,
                bypass_permission,
            } => {
                let mut fields = vec![player.clone(), reason.clone()];
                fields.extend(bypass_permission.clone());
                fields
            }
            RemoteAction::SendMessage {
                players,
                text,
                required_permission,
            } => {
                let mut fields = vec![players.join(","), text.clone()];
                fields.extend(required_permission.clone());
                fields
            }
            RemoteAction::PlaySound {
                player,
                sound,
                volume,
                pitch,
            } => vec![
                player.clone(),
                sound.clone(),
                volume.to_string(),
                pitch.to_string(),
            ],
            RemoteAction::TeleportToPlayer {
                player,
                target,
                play_sound,
            } => vec![player.clone(), target.clone(), play_sound.to_string()],
            RemoteAction::TeleportToLocation {
                player,
                location,
                play_sound,
            } => vec![
                player.clone(),
                location.world.clone(),
                location.x.to_string(),
                location.y.to_string(),
                location.z.to_string(),
                play_sound.to_string(),
            ],
            RemoteAction::SendChat { player, text } => vec![player.clone(), text.clone()],
            RemoteAction::ServerPowerAction { server, state } => {
                vec![server.clone(), state.as_str().to_string()]
            }
        };

        Ok(fields.join(";"))
    }

    /// Parse a payload received on the channel of `kind`.
    pub fn decode(kind: ChannelKind, payload: &str) -> Result<Self, DecodeError> {
        let fields: Vec<&str> = payload.split(FIELD_SEPARATOR).collect();

        let action = match kind {
            ChannelKind::ConnectPlayer => {
                let [player, server] = exact::<2>(&fields, "2")?;
                RemoteAction::ConnectPlayer {
                    player: player.to_string(),
                    server: server.to_string(),
                }
            }
            ChannelKind::PresenceClaim => {
                let [player, server, joined_at] = exact::<3>(&fields, "3")?;
                RemoteAction::PresenceClaim {
                    player: player.to_string(),
                    server: server.to_string(),
                    joined_at: number("joined_at", joined_at)?,
                }
            }
            ChannelKind::KickPlayer => match fields.as_slice() {
                [player, reason] => RemoteAction::KickPlayer {
                    player: player.to_string(),
                    reason: reason.to_string(),
                    bypass_permission: None,
                },
                [player, reason, permission] => RemoteAction::KickPlayer {
                    player: player.to_string(),
                    reason: reason.to_string(),
                    bypass_permission: Some(permission.to_string()),
                },
                _ => return Err(field_count("2 or 3", &fields)),
            },
            ChannelKind::SendMessage => {
                let (players, text, permission) = match fields.as_slice() {
                    [players, text] => (players, text, None),
                    [players, text, permission] => (players, text, Some(permission.to_string())),
                    _ => return Err(field_count("2 or 3", &fields)),
                };
                RemoteAction::SendMessage {
                    players: players
                        .split(LIST_SEPARATOR)
                        .map(str::to_string)
                        .collect(),
                    text: text.to_string(),
                    required_permission: permission,
                }
            }
            ChannelKind::PlaySound => {
                let [player, sound, volume, pitch] = exact::<4>(&fields, "4")?;
                RemoteAction::PlaySound {
                    player: player.to_string(),
                    sound: sound.to_string(),
                    volume: number("volume", volume)?,
                    pitch: number("pitch", pitch)?,
                }
            }
            ChannelKind::TeleportToPlayer => {
                let [player, target, play_sound] = exact::<3>(&fields, "3")?;
                RemoteAction::TeleportToPlayer {
                    player: player.to_string(),
                    target: target.to_string(),
                    play_sound: boolean("play_sound", play_sound)?,
                }
            }
            ChannelKind::TeleportToLocation => {
                let [player, world, x, y, z, play_sound] = exact::<6>(&fields, "6")?;
                RemoteAction::TeleportToLocation {
                    player: player.to_string(),
                    location: Location {
                        world: world.to_string(),
                        x: number("x", x)?,
                        y: number("y", y)?,
                        z: number("z", z)?,
                    },
                    play_sound: boolean("play_sound", play_sound)?,
                }
            }
            ChannelKind::SendChat => {
                let [player, text] = exact::<2>(&fields, "2")?;
                RemoteAction::SendChat {
                    player: player.to_string(),
                    text: text.to_string(),
                }
            }
            ChannelKind::ServerPowerAction => {
                let [server, state] = exact::<2>(&fields, "2")?;
                let state = match state.to_ascii_lowercase().as_str() {
                    "on" => PowerState::On,
                    "off" => PowerState::Off,
                    _ => return Err(DecodeError::InvalidPowerState(state.to_string())),
                };
                RemoteAction::ServerPowerAction {
                    server: server.to_string(),
                    state,
                }
            }
        };

        action.validate()?;
        Ok(action)
    }
}

fn validate_optional(field: &'static str, value: Option<&str>) -> Result<(), ValidationError> {
    match value {
        Some(value) => validate_required_field(field, value),
        None => Ok(()),
    }
}

fn field_count(expected: &'static str, fields: &[&str]) -> DecodeError {
    DecodeError::FieldCount {
        expected,
        actual: fields.len(),
    }
}

fn exact<'a, const N: usize>(
    fields: &[&'a str],
    expected: &'static str,
) -> Result<[&'a str; N], DecodeError> {
    <[&str; N]>::try_from(fields).map_err(|_| field_count(expected, fields))
}

fn number<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, DecodeError> {
    value.trim().parse().map_err(|_| DecodeError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

fn boolean(field: &'static str, value: &str) -> Result<bool, DecodeError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(DecodeError::InvalidBool {
            field,
            value: value.to_string(),
        }),
    }
}
