use serde::{Deserialize, Serialize};

use crate::models::HostRole;

/// The kinds of message carried by the relay, one pub/sub channel each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChannelKind {
    ConnectPlayer,
    KickPlayer,
    SendMessage,
    PlaySound,
    TeleportToPlayer,
    TeleportToLocation,
    SendChat,
    ServerPowerAction,
    PresenceClaim,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 9] = [
        ChannelKind::ConnectPlayer,
        ChannelKind::KickPlayer,
        ChannelKind::SendMessage,
        ChannelKind::PlaySound,
        ChannelKind::TeleportToPlayer,
        ChannelKind::TeleportToLocation,
        ChannelKind::SendChat,
        ChannelKind::ServerPowerAction,
        ChannelKind::PresenceClaim,
    ];

    /// Last segment of the channel name. Deployed plugins know the message kind as `SendMsgToPlayer`.
    pub fn suffix(self) -> &'static str {
        match self {
            ChannelKind::ConnectPlayer => "ConnectPlayer",
            ChannelKind::KickPlayer => "KickPlayer",
            ChannelKind::SendMessage => "SendMsgToPlayer",
            ChannelKind::PlaySound => "PlaySound",
            ChannelKind::TeleportToPlayer => "TeleportToPlayer",
            ChannelKind::TeleportToLocation => "TeleportToLocation",
            ChannelKind::SendChat => "SendChat",
            ChannelKind::ServerPowerAction => "ServerPowerAction",
            ChannelKind::PresenceClaim => "PresenceClaim",
        }
    }

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.suffix() == suffix)
    }

    /// Which side of the network acts on this kind of message.
    pub fn handled_by(self) -> HostRole {
        match self {
            ChannelKind::ConnectPlayer
            | ChannelKind::KickPlayer
            | ChannelKind::SendMessage
            | ChannelKind::ServerPowerAction => HostRole::Proxy,
            ChannelKind::PlaySound
            | ChannelKind::TeleportToPlayer
            | ChannelKind::TeleportToLocation
            | ChannelKind::SendChat
            | ChannelKind::PresenceClaim => HostRole::GameServer,
        }
    }

    pub fn for_role(role: HostRole) -> impl Iterator<Item = ChannelKind> {
        Self::ALL
            .into_iter()
            .filter(move |kind| kind.handled_by() == role)
    }
}
