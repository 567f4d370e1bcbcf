//! Registry of live voice sessions, one per guild.

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use tracing::{debug, info};

use crate::{
    audio::codec::{FrameEncoder, OpusFrameEncoder},
    common::{GuildId, VoiceResult},
    configs::{Config, PipelineConfig},
    gateway::{VoiceChannel, VoiceConnector, VoiceServerUpdate, VoiceStateUpdate},
    player::{Announcer, LogAnnouncer, VoiceSession},
    queue::MediaResolver,
};

pub type EncoderFactory =
    Arc<dyn Fn(&PipelineConfig) -> VoiceResult<Box<dyn FrameEncoder>> + Send + Sync>;

pub type AnnouncerFactory = Arc<dyn Fn(GuildId) -> Arc<dyn Announcer> + Send + Sync>;

/// Alias for the session registry.
pub type SessionMap = DashMap<GuildId, Arc<VoiceSession>>;

pub struct SessionManager {
    config: Arc<Config>,
    connector: Arc<dyn VoiceConnector>,
    resolver: Arc<dyn MediaResolver>,
    encoder: EncoderFactory,
    announcer: AnnouncerFactory,
    sessions: Arc<SessionMap>,
}

impl SessionManager {
    pub fn new(
        config: Arc<Config>,
        connector: Arc<dyn VoiceConnector>,
        resolver: Arc<dyn MediaResolver>,
    ) -> Self {
        Self {
            config,
            connector,
            resolver,
            encoder: Arc::new(|pipeline: &PipelineConfig| -> VoiceResult<Box<dyn FrameEncoder>> {
                let encoder = OpusFrameEncoder::new(pipeline.sample_rate, pipeline.channels)?;
                Ok(Box::new(encoder))
            }),
            announcer: Arc::new(|guild_id: GuildId| -> Arc<dyn Announcer> {
                Arc::new(LogAnnouncer::new(guild_id))
            }),
            sessions: Arc::new(DashMap::new()),
        }
    }

    pub fn with_encoder(mut self, encoder: EncoderFactory) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn with_announcer(mut self, announcer: AnnouncerFactory) -> Self {
        self.announcer = announcer;
        self
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<VoiceSession>> {
        self.sessions
            .get(&guild_id)
            .map(|s| s.value().clone())
            .filter(|s| !s.is_destroyed())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Returns the guild's live session, joining `channel` if there is none.
    /// A failed join leaves nothing behind.
    pub async fn join(&self, channel: &VoiceChannel) -> VoiceResult<Arc<VoiceSession>> {
        if let Some(existing) = self.get(channel.guild_id) {
            return Ok(existing);
        }

        let guild_id = channel.guild_id;
        let encoder = (self.encoder)(&self.config.pipeline)?;
        let session = VoiceSession::new(
            guild_id,
            self.config.clone(),
            encoder,
            self.resolver.clone(),
            (self.announcer)(guild_id),
        );

        if let Err(e) = session.connect(channel, self.connector.as_ref()).await {
            session.destroy();
            return Err(e);
        }

        match self.sessions.entry(guild_id) {
            Entry::Occupied(entry) if !entry.get().is_destroyed() => {
                let existing = entry.get().clone();
                drop(entry);
                debug!("[{}] concurrent join won, dropping duplicate session", guild_id);
                session.destroy();
                return Ok(existing);
            }
            Entry::Occupied(mut entry) => {
                entry.insert(session.clone());
            }
            Entry::Vacant(entry) => {
                entry.insert(session.clone());
            }
        }
        self.spawn_reaper(&session);
        info!("[{}] voice session created", guild_id);
        Ok(session)
    }

    /// Drops the registry entry once the session tears itself down.
    fn spawn_reaper(&self, session: &Arc<VoiceSession>) {
        let sessions = self.sessions.clone();
        let guild_id = session.guild_id();
        let closed = session.closed_token();
        let weak = Arc::downgrade(session);
        tokio::spawn(async move {
            closed.cancelled().await;
            let removed = sessions.remove_if(&guild_id, |_, current| {
                weak.upgrade()
                    .is_none_or(|session| Arc::ptr_eq(&session, current))
            });
            if removed.is_some() {
                debug!("[{}] reaped destroyed session", guild_id);
            }
        });
    }

    /// Destroys the guild's session. Returns whether one existed.
    pub fn leave(&self, guild_id: GuildId) -> bool {
        match self.sessions.remove(&guild_id) {
            Some((_, session)) => {
                session.destroy();
                true
            }
            None => false,
        }
    }

    pub fn on_voice_state_update(&self, update: &VoiceStateUpdate) {
        if let Some(session) = self.get(update.guild_id) {
            session.on_voice_state_update(update);
        }
    }

    pub fn on_voice_server_update(&self, update: &VoiceServerUpdate) {
        if let Some(session) = self.get(update.guild_id) {
            session.on_voice_server_update(update);
        }
    }

    pub fn shutdown(&self) {
        info!("shutting down {} voice sessions", self.sessions.len());
        let sessions: Vec<_> = self.sessions.iter().map(|s| s.value().clone()).collect();
        self.sessions.clear();
        for session in sessions {
            session.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        common::{ChannelId, UserId, VoiceError},
        gateway::{LoopbackConnector, VoiceLink},
        testing::{RawEncoder, ScriptedResolver},
    };

    fn manager(connector: Arc<LoopbackConnector>) -> SessionManager {
        SessionManager::new(
            Arc::new(Config::default()),
            connector,
            Arc::new(ScriptedResolver::default()),
        )
        .with_encoder(Arc::new(|_: &PipelineConfig| Ok::<_, VoiceError>(RawEncoder::boxed())))
    }

    fn channel(guild: u64) -> VoiceChannel {
        VoiceChannel {
            guild_id: GuildId(guild),
            channel_id: ChannelId(guild * 10),
            bot_user_id: UserId(1),
            can_join: true,
            can_speak: true,
        }
    }

    #[tokio::test]
    async fn join_reuses_the_live_session() {
        let connector = Arc::new(LoopbackConnector::default());
        let manager = manager(connector.clone());

        let first = manager.join(&channel(1)).await.unwrap();
        let again = manager.join(&channel(1)).await.unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(connector.link_count(), 1);

        manager.join(&channel(2)).await.unwrap();
        assert_eq!(manager.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_joins_share_one_session() {
        let connector = Arc::new(LoopbackConnector::default());
        let manager = Arc::new(manager(connector.clone()));

        let joins: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.join(&channel(6)).await })
            })
            .collect();
        let sessions: Vec<Arc<VoiceSession>> = futures::future::join_all(joins)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect();

        let kept = manager.get(GuildId(6)).unwrap();
        assert!(sessions.iter().all(|s| Arc::ptr_eq(s, &kept)));
        assert!(!kept.is_destroyed());
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test]
    async fn permission_errors_leave_nothing_behind() {
        let connector = Arc::new(LoopbackConnector::default());
        let manager = manager(connector.clone());
        let mut denied = channel(3);
        denied.can_join = false;

        let result = manager.join(&denied).await;
        assert!(matches!(result, Err(VoiceError::Permission(_))));
        assert!(manager.is_empty());
        assert_eq!(connector.link_count(), 0);
    }

    #[tokio::test]
    async fn destroyed_sessions_are_reaped() {
        let connector = Arc::new(LoopbackConnector::default());
        let manager = manager(connector.clone());
        let session = manager.join(&channel(4)).await.unwrap();

        manager.on_voice_state_update(&VoiceStateUpdate {
            guild_id: GuildId(4),
            user_id: UserId(1),
            channel_id: None,
            previous_channel_id: Some(ChannelId(40)),
        });

        tokio::time::timeout(Duration::from_secs(5), async {
            while !manager.is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert!(session.is_destroyed());
    }

    #[tokio::test]
    async fn leave_destroys_and_forgets() {
        let connector = Arc::new(LoopbackConnector::default());
        let manager = manager(connector.clone());
        let session = manager.join(&channel(5)).await.unwrap();

        assert!(manager.leave(GuildId(5)));
        assert!(!manager.leave(GuildId(5)));
        assert!(session.is_destroyed());
        assert!(connector.last_link().unwrap().is_killed());
    }
}
