use std::fmt;
use std::str::FromStr;

use arrayvec::ArrayString;
use serde::{Deserialize, Serialize};

use crate::validation::{ValidationError, validate_player_name};

/// Minecraft player name - max 16 characters, stored inline (no heap allocation).
pub type PlayerName = ArrayString<16>;

/// Validate and convert a player name.
pub fn player_name(name: &str) -> Result<PlayerName, ValidationError> {
    validate_player_name(name)?;
    PlayerName::from(name).map_err(|_| ValidationError::PlayerNameTooLong(name.len()))
}

/// Which side of the network this process runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostRole {
    /// A game server (Spigot/Paper). Owns its own presence entry.
    GameServer,
    /// A proxy (BungeeCord). Moves and kicks players between game servers.
    Proxy,
}

impl FromStr for HostRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "server" | "game_server" | "spigot" | "bukkit" => Ok(HostRole::GameServer),
            "proxy" | "bungee" | "bungeecord" => Ok(HostRole::Proxy),
            other => Err(format!("unknown host role '{other}'")),
        }
    }
}

impl fmt::Display for HostRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostRole::GameServer => f.write_str("server"),
            HostRole::Proxy => f.write_str("proxy"),
        }
    }
}

/// A position in a named world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub world: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}
