//! Boundary to the voice transport library.
//!
//! The wire protocol (websocket gateway, UDP, encryption) lives behind
//! [`VoiceLink`]; the session only drives it.

use std::sync::Arc;

use async_trait::async_trait;

use crate::common::{
    VoiceResult,
    types::{ChannelId, GuildId, UserId},
};

/// A voice channel we may try to join, with the bot's capabilities in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceChannel {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub bot_user_id: UserId,
    pub can_join: bool,
    pub can_speak: bool,
}

/// An established voice connection.
#[async_trait]
pub trait VoiceLink: Send + Sync {
    /// Send one Opus packet.
    fn send_audio(&self, packet: &[u8]);

    fn send_silence_frame(&self);

    fn set_speaking(&self, speaking: bool);

    fn set_bitrate(&self, bps: i32);

    fn set_endpoint(&self, endpoint: &str);

    fn set_token(&self, token: &str);

    /// Stop the library from reconnecting on its own after a socket close.
    fn disable_auto_reconnect(&self);

    /// Resolves once the (re)negotiated transport can carry audio.
    async fn transport_ready(&self);

    fn connect_transport(&self);

    /// Users currently in the connected channel, the bot included.
    fn member_count(&self) -> usize;

    fn kill(&self);

    fn is_killed(&self) -> bool;
}

#[async_trait]
pub trait VoiceConnector: Send + Sync {
    /// `Ok(None)` when the library gave up without an error.
    async fn join(&self, channel: &VoiceChannel) -> VoiceResult<Option<Arc<dyn VoiceLink>>>;
}
