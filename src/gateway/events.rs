use crate::common::types::{ChannelId, GuildId, UserId};

/// Lifecycle notifications from a [`super::ConnectionSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    /// Terminal. Emitted once, whatever caused the teardown.
    Destroyed,
}

/// A user joined, left or moved between voice channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceStateUpdate {
    pub guild_id: GuildId,
    pub user_id: UserId,
    /// `None` when the user left voice entirely.
    pub channel_id: Option<ChannelId>,
    pub previous_channel_id: Option<ChannelId>,
}

impl VoiceStateUpdate {
    pub fn left(&self, channel: ChannelId) -> bool {
        self.previous_channel_id == Some(channel) && self.channel_id != Some(channel)
    }

    pub fn joined(&self, channel: ChannelId) -> bool {
        self.channel_id == Some(channel) && self.previous_channel_id != Some(channel)
    }
}

/// The voice server for a guild moved; the transport must be re-pointed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceServerUpdate {
    pub guild_id: GuildId,
    pub endpoint: String,
    pub token: String,
}
