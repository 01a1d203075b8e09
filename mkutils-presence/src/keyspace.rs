use crate::relay::ChannelKind;

pub const DEFAULT_NAMESPACE: &str = "mkUtils";

/// Store key and channel names under one namespace.
///
/// The layout matches deployed plugins: `<ns>:BungeeAPI:Servers` for the presence
/// hash and `<ns>:BungeeAPI:Event:<Kind>` for relay channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    namespace: String,
}

impl KeySpace {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Hash of server name to `;`-joined player names.
    pub fn servers_key(&self) -> String {
        format!("{}:BungeeAPI:Servers", self.namespace)
    }

    pub fn channel(&self, kind: ChannelKind) -> String {
        format!("{}:BungeeAPI:Event:{}", self.namespace, kind.suffix())
    }

    /// Reverse of `channel`. `None` for channels outside this namespace or of unknown kind.
    pub fn channel_kind(&self, channel: &str) -> Option<ChannelKind> {
        let suffix = channel
            .strip_prefix(self.namespace.as_str())?
            .strip_prefix(":BungeeAPI:Event:")?;
        ChannelKind::from_suffix(suffix)
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}
