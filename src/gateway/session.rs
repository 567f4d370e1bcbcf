//! One voice connection per guild, kept alive across voice-server moves and
//! torn down when left alone for too long.
//!
//! The transport library's own reconnect logic is switched off; endpoint
//! changes are handled here by re-pointing the existing link and waiting for
//! its transport to come back.

use std::{
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

use super::{
    events::{ConnectionEvent, VoiceServerUpdate, VoiceStateUpdate},
    link::{VoiceChannel, VoiceConnector, VoiceLink},
};
use crate::{
    audio::pipeline::FrameSink,
    common::{GuildId, VoiceError, VoiceResult},
    configs::ConnectionConfig,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    AwaitingTransport,
    IdleCountdown,
    Destroyed,
}

#[derive(Default)]
struct LinkState {
    link: Option<Arc<dyn VoiceLink>>,
    channel: Option<VoiceChannel>,
    awaiting_transport: bool,
    renegotiation: Option<JoinHandle<()>>,
    renegotiation_seq: u64,
    idle_countdown: Option<JoinHandle<()>>,
    idle_seq: u64,
}

struct Inner {
    guild_id: GuildId,
    idle_timeout: Duration,
    state: Mutex<LinkState>,
    destroyed: AtomicBool,
    events: mpsc::UnboundedSender<ConnectionEvent>,
}

#[derive(Clone)]
pub struct ConnectionSession {
    inner: Arc<Inner>,
}

impl ConnectionSession {
    pub fn new(
        guild_id: GuildId,
        config: &ConnectionConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let session = Self {
            inner: Arc::new(Inner {
                guild_id,
                idle_timeout: config.idle_timeout(),
                state: Mutex::new(LinkState::default()),
                destroyed: AtomicBool::new(false),
                events,
            }),
        };
        (session, events_rx)
    }

    pub fn guild_id(&self) -> GuildId {
        self.inner.guild_id
    }

    pub fn channel(&self) -> Option<VoiceChannel> {
        self.inner.state.lock().channel.clone()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    pub fn state(&self) -> ConnectionState {
        if self.is_destroyed() {
            return ConnectionState::Destroyed;
        }
        let state = self.inner.state.lock();
        if state.link.is_none() {
            ConnectionState::Connecting
        } else if state.awaiting_transport {
            ConnectionState::AwaitingTransport
        } else if state.idle_countdown.is_some() {
            ConnectionState::IdleCountdown
        } else {
            ConnectionState::Connected
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        let _ = self.inner.events.send(event);
    }

    /// Join `channel` and start speaking.
    ///
    /// A missing capability is rejected before anything is attempted. Any
    /// other failure destroys the session.
    pub async fn connect(
        &self,
        channel: &VoiceChannel,
        connector: &dyn VoiceConnector,
    ) -> VoiceResult<()> {
        if !channel.can_join || !channel.can_speak {
            return Err(VoiceError::Permission(format!(
                "cannot join or speak in channel {}",
                channel.channel_id
            )));
        }
        if self.is_destroyed() {
            return Err(VoiceError::Transport("connection already destroyed".into()));
        }

        let link = match connector.join(channel).await {
            Ok(Some(link)) => link,
            Ok(None) => {
                debug!("[{}] failed to connect, destroying", self.inner.guild_id);
                self.destroy();
                return Err(VoiceError::Transport(
                    "voice connection could not be established".into(),
                ));
            }
            Err(e) => {
                warn!("[{}] voice join failed: {}", self.inner.guild_id, e);
                self.destroy();
                return Err(match e {
                    VoiceError::Transport(_) => e,
                    other => VoiceError::transport(other),
                });
            }
        };

        link.set_speaking(true);
        link.send_silence_frame();
        link.disable_auto_reconnect();

        {
            let mut state = self.inner.state.lock();
            if self.is_destroyed() {
                link.kill();
                return Err(VoiceError::Transport(
                    "connection destroyed while joining".into(),
                ));
            }
            state.link = Some(link);
            state.channel = Some(channel.clone());
        }

        info!(
            "[{}] connected to voice channel {}",
            self.inner.guild_id, channel.channel_id
        );
        self.emit(ConnectionEvent::Connected);
        Ok(())
    }

    /// The voice server moved. Re-point the link and resume speaking once
    /// its transport is ready; a newer update replaces a pending one.
    pub fn on_transport_renegotiate(&self, update: &VoiceServerUpdate) {
        if update.guild_id != self.inner.guild_id || self.is_destroyed() {
            return;
        }

        let mut state = self.inner.state.lock();
        let Some(link) = state.link.clone() else {
            debug!(
                "[{}] voice server update before connect, ignoring",
                self.inner.guild_id
            );
            return;
        };

        link.set_endpoint(&update.endpoint);
        link.set_token(&update.token);
        link.disable_auto_reconnect();

        if let Some(pending) = state.renegotiation.take() {
            debug!("[{}] superseding pending renegotiation", self.inner.guild_id);
            pending.abort();
        }
        state.renegotiation_seq += 1;
        state.awaiting_transport = true;
        debug!(
            "[{}] renegotiating transport with {}",
            self.inner.guild_id, update.endpoint
        );

        let seq = state.renegotiation_seq;
        let inner = Arc::downgrade(&self.inner);
        state.renegotiation = Some(tokio::spawn(async move {
            link.transport_ready().await;
            let Some(inner) = inner.upgrade() else {
                return;
            };
            let mut state = inner.state.lock();
            if inner.destroyed.load(Ordering::Acquire) || state.renegotiation_seq != seq {
                return;
            }
            debug!("[{}] transport ready, resuming", inner.guild_id);
            link.set_speaking(true);
            link.connect_transport();
            state.awaiting_transport = false;
            state.renegotiation = None;
        }));
    }

    /// Handles joins and leaves in the guild: our own user leaving destroys
    /// the session, being left alone starts the idle countdown and someone
    /// joining cancels it.
    pub fn on_membership_change(&self, update: &VoiceStateUpdate) {
        if update.guild_id != self.inner.guild_id || self.is_destroyed() {
            return;
        }

        let mut state = self.inner.state.lock();
        let (Some(link), Some(channel)) = (state.link.clone(), state.channel.clone()) else {
            return;
        };

        if update.user_id == channel.bot_user_id {
            match update.channel_id {
                None => {
                    drop(state);
                    info!("[{}] force disconnect", self.inner.guild_id);
                    self.destroy();
                }
                Some(moved) if moved != channel.channel_id => {
                    debug!("[{}] moved to channel {}", self.inner.guild_id, moved);
                    if let Some(current) = state.channel.as_mut() {
                        current.channel_id = moved;
                    }
                }
                Some(_) => {}
            }
            return;
        }

        if update.left(channel.channel_id) {
            if link.member_count() <= 1 && state.idle_countdown.is_none() {
                info!(
                    "[{}] alone in channel, leaving in {:?}",
                    self.inner.guild_id, self.inner.idle_timeout
                );
                state.idle_seq += 1;
                state.idle_countdown = Some(spawn_idle_countdown(
                    Arc::downgrade(&self.inner),
                    self.inner.idle_timeout,
                    state.idle_seq,
                ));
            }
        } else if update.joined(channel.channel_id) {
            if let Some(countdown) = state.idle_countdown.take() {
                countdown.abort();
                info!("[{}] somebody joined, idle countdown stopped", self.inner.guild_id);
            }
        }
    }

    fn live_link(&self) -> Option<Arc<dyn VoiceLink>> {
        if self.is_destroyed() {
            return None;
        }
        self.inner
            .state
            .lock()
            .link
            .clone()
            .filter(|link| !link.is_killed())
    }

    pub fn send_frame(&self, packet: &[u8]) {
        if let Some(link) = self.live_link() {
            link.send_audio(packet);
        }
    }

    pub fn send_silence(&self) {
        if let Some(link) = self.live_link() {
            link.send_silence_frame();
        }
    }

    pub fn set_bitrate(&self, bps: i32) {
        if let Some(link) = self.live_link() {
            link.set_bitrate(bps);
        }
    }

    /// Kill the link and emit [`ConnectionEvent::Destroyed`]. Only the first
    /// call does anything.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }

        let (link, renegotiation, countdown) = {
            let mut state = self.inner.state.lock();
            state.awaiting_transport = false;
            (
                state.link.take(),
                state.renegotiation.take(),
                state.idle_countdown.take(),
            )
        };
        if let Some(task) = renegotiation {
            task.abort();
        }
        if let Some(task) = countdown {
            task.abort();
        }
        if let Some(link) = link {
            link.kill();
        }

        info!("[{}] voice connection destroyed", self.inner.guild_id);
        self.emit(ConnectionEvent::Destroyed);
    }
}

fn spawn_idle_countdown(inner: Weak<Inner>, timeout: Duration, seq: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        let Some(inner) = inner.upgrade() else {
            return;
        };
        {
            let mut state = inner.state.lock();
            if state.idle_seq != seq || state.idle_countdown.is_none() {
                return;
            }
            state.idle_countdown = None;
        }
        info!("[{}] idle timeout reached", inner.guild_id);
        ConnectionSession { inner }.destroy();
    })
}

impl FrameSink for ConnectionSession {
    fn send_frame(&self, packet: &[u8]) {
        ConnectionSession::send_frame(self, packet);
    }

    fn send_silence(&self) {
        ConnectionSession::send_silence(self);
    }

    fn close(&self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::{
        common::{ChannelId, UserId},
        gateway::{LoopbackConnector, LoopbackLink},
    };

    const GUILD: GuildId = GuildId(10);
    const CHANNEL: ChannelId = ChannelId(20);
    const BOT: UserId = UserId(1);
    const LISTENER: UserId = UserId(2);

    fn channel() -> VoiceChannel {
        VoiceChannel {
            guild_id: GUILD,
            channel_id: CHANNEL,
            bot_user_id: BOT,
            can_join: true,
            can_speak: true,
        }
    }

    fn leave(user: UserId) -> VoiceStateUpdate {
        VoiceStateUpdate {
            guild_id: GUILD,
            user_id: user,
            channel_id: None,
            previous_channel_id: Some(CHANNEL),
        }
    }

    fn join(user: UserId) -> VoiceStateUpdate {
        VoiceStateUpdate {
            guild_id: GUILD,
            user_id: user,
            channel_id: Some(CHANNEL),
            previous_channel_id: None,
        }
    }

    fn server_update(endpoint: &str) -> VoiceServerUpdate {
        VoiceServerUpdate {
            guild_id: GUILD,
            endpoint: endpoint.into(),
            token: format!("token-{endpoint}"),
        }
    }

    async fn connected() -> (
        ConnectionSession,
        mpsc::UnboundedReceiver<ConnectionEvent>,
        Arc<LoopbackLink>,
    ) {
        let connector = LoopbackConnector::default();
        let (session, mut events) = ConnectionSession::new(GUILD, &ConnectionConfig::default());
        session.connect(&channel(), &connector).await.unwrap();
        assert_eq!(events.try_recv().unwrap(), ConnectionEvent::Connected);
        (session, events, connector.last_link().unwrap())
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn connect_starts_speaking_and_takes_over_reconnects() {
        let (session, _events, link) = connected().await;
        assert_eq!(session.state(), ConnectionState::Connected);
        assert!(link.speaking.load(Ordering::Acquire));
        assert_eq!(link.silences.load(Ordering::Relaxed), 1);
        assert_eq!(link.auto_reconnect_disabled.load(Ordering::Relaxed), 1);

        session.send_frame(&[1, 2, 3]);
        assert_eq!(*link.packets.lock(), vec![vec![1, 2, 3]]);
    }

    #[tokio::test]
    async fn missing_capability_is_rejected_before_joining() {
        let connector = LoopbackConnector::default();
        let (session, mut events) = ConnectionSession::new(GUILD, &ConnectionConfig::default());
        let mut mute = channel();
        mute.can_speak = false;

        let result = session.connect(&mute, &connector).await;
        assert!(matches!(result, Err(VoiceError::Permission(_))));
        assert_eq!(connector.link_count(), 0);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_join_destroys_the_session() {
        let connector = LoopbackConnector::default();
        connector.refuse_joins(true);
        let (session, mut events) = ConnectionSession::new(GUILD, &ConnectionConfig::default());

        let result = session.connect(&channel(), &connector).await;
        assert!(matches!(result, Err(VoiceError::Transport(_))));
        assert_eq!(events.try_recv().unwrap(), ConnectionEvent::Destroyed);
        assert_eq!(session.state(), ConnectionState::Destroyed);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_countdown_is_cancelled_by_a_join() {
        let (session, mut events, link) = connected().await;
        link.set_member_count(1);

        session.on_membership_change(&leave(LISTENER));
        assert_eq!(session.state(), ConnectionState::IdleCountdown);

        tokio::time::sleep(Duration::from_secs(10)).await;
        link.set_member_count(2);
        session.on_membership_change(&join(LISTENER));
        assert_eq!(session.state(), ConnectionState::Connected);

        tokio::time::sleep(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(session.state(), ConnectionState::Connected);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_countdown_destroys_after_timeout() {
        let (session, mut events, link) = connected().await;
        link.set_member_count(1);
        session.on_membership_change(&leave(LISTENER));

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(session.state(), ConnectionState::IdleCountdown);

        tokio::time::sleep(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(session.state(), ConnectionState::Destroyed);
        assert!(link.is_killed());
        assert_eq!(events.try_recv().unwrap(), ConnectionEvent::Destroyed);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn others_remaining_do_not_start_countdown() {
        let (session, _events, link) = connected().await;
        link.set_member_count(3);
        session.on_membership_change(&leave(LISTENER));
        assert_eq!(session.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn own_leave_destroys_immediately() {
        let (session, mut events, link) = connected().await;
        session.on_membership_change(&leave(BOT));
        assert_eq!(session.state(), ConnectionState::Destroyed);
        assert!(link.is_killed());
        assert_eq!(events.try_recv().unwrap(), ConnectionEvent::Destroyed);

        session.send_frame(&[9]);
        session.send_silence();
        assert!(link.packets.lock().is_empty());
        assert_eq!(link.silences.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn renegotiation_waits_for_transport_and_latest_wins() {
        let (session, _events, link) = connected().await;

        session.on_transport_renegotiate(&server_update("a.example"));
        settle().await;
        session.on_transport_renegotiate(&server_update("b.example"));
        settle().await;
        assert_eq!(session.state(), ConnectionState::AwaitingTransport);
        assert_eq!(*link.endpoint.lock(), "b.example");
        assert_eq!(*link.token.lock(), "token-b.example");
        assert_eq!(link.transport_connects.load(Ordering::Relaxed), 0);

        link.mark_transport_ready();
        settle().await;
        assert_eq!(session.state(), ConnectionState::Connected);
        assert_eq!(link.transport_connects.load(Ordering::Relaxed), 1);
        assert_eq!(link.auto_reconnect_disabled.load(Ordering::Relaxed), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn renegotiation_leaves_countdown_running() {
        let (session, _events, link) = connected().await;
        link.set_member_count(1);
        session.on_membership_change(&leave(LISTENER));

        session.on_transport_renegotiate(&server_update("c.example"));
        link.mark_transport_ready();
        settle().await;
        assert_eq!(session.state(), ConnectionState::IdleCountdown);

        tokio::time::sleep(Duration::from_secs(31)).await;
        settle().await;
        assert_eq!(session.state(), ConnectionState::Destroyed);
    }

    #[tokio::test]
    async fn updates_for_other_guilds_are_ignored() {
        let (session, _events, link) = connected().await;
        let mut foreign = server_update("x.example");
        foreign.guild_id = GuildId(99);
        session.on_transport_renegotiate(&foreign);
        assert_eq!(session.state(), ConnectionState::Connected);
        assert!(link.endpoint.lock().is_empty());
    }

    #[tokio::test]
    async fn destroy_emits_once() {
        let (session, mut events, _link) = connected().await;
        session.destroy();
        session.destroy();
        FrameSink::close(&session);
        assert_eq!(events.try_recv().unwrap(), ConnectionEvent::Destroyed);
        assert!(events.try_recv().is_err());
    }
}
