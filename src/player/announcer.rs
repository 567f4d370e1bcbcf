//! Where the queue reports what it is doing. Rendering for a chat channel
//! lives outside this crate; [`LogAnnouncer`] writes to the log.

use tracing::{info, warn};

use crate::{
    common::{GuildId, VoiceError},
    queue::{MediaInfo, QueueEntry},
};

/// Called with the queue lock held: implementations must not call back
/// into the queue.
pub trait Announcer: Send + Sync {
    /// Head of the queue is still resolving.
    fn loading(&self, entry: &QueueEntry);

    fn now_playing(&self, info: &MediaInfo);

    fn error(&self, info: Option<&MediaInfo>, error: &VoiceError);

    /// Nothing left to play.
    fn finished(&self) {}
}

pub struct LogAnnouncer {
    guild_id: GuildId,
}

impl LogAnnouncer {
    pub fn new(guild_id: GuildId) -> Self {
        Self { guild_id }
    }
}

impl Announcer for LogAnnouncer {
    fn loading(&self, entry: &QueueEntry) {
        info!("[{}] loading {}...", self.guild_id, entry.locator);
    }

    fn now_playing(&self, info: &MediaInfo) {
        info!(
            "[{}] now playing: {} - {}",
            self.guild_id, info.author, info.title
        );
    }

    fn error(&self, info: Option<&MediaInfo>, error: &VoiceError) {
        match info {
            Some(info) => warn!("[{}] {} failed: {}", self.guild_id, info.title, error),
            None => warn!("[{}] {}", self.guild_id, error),
        }
    }

    fn finished(&self) {
        info!("[{}] queue finished", self.guild_id);
    }
}
