//! `VoiceSession` — everything one guild needs to play audio: the
//! connection, the frame pipeline and its pacer, the queue and the track
//! currently being fed.

use std::sync::{
    Arc, Weak,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    announcer::Announcer,
    playback::{TrackCommand, TrackEvent, TrackFeeder, TrackHandle},
    state::PlaybackPhase,
};
use crate::{
    audio::{
        codec::FrameEncoder,
        mix::CorruptMode,
        pipeline::{FramePipeline, PipelineStats, spawn_pacer},
        transcode::{AudioEffect, EffectStack},
    },
    common::{GuildId, VoiceError, VoiceResult},
    configs::Config,
    gateway::{
        ConnectionEvent, ConnectionSession, ConnectionState, VoiceChannel, VoiceConnector,
        VoiceServerUpdate, VoiceStateUpdate,
    },
    queue::{
        MediaInfo, MediaResolver, PlaybackQueue, Playable, QueueEntry, ResolutionHandle,
        TrackPlayer,
    },
};

/// Dispatch target handed to the queue. Weak so the queue does not keep
/// its own session alive.
struct SessionPlayer(Weak<VoiceSession>);

impl TrackPlayer for SessionPlayer {
    fn play(&self, _entry: &QueueEntry, info: &MediaInfo, playable: Playable) -> VoiceResult<()> {
        let session = self
            .0
            .upgrade()
            .ok_or_else(|| VoiceError::Transport("voice session is gone".into()))?;
        session.start_track(info, playable)
    }
}

pub struct VoiceSession {
    guild_id: GuildId,
    config: Arc<Config>,
    connection: ConnectionSession,
    pipeline: Arc<FramePipeline>,
    queue: PlaybackQueue,
    effects: Mutex<EffectStack>,
    current: Mutex<Option<TrackHandle>>,
    next_track: AtomicU64,
    track_events: mpsc::UnboundedSender<TrackEvent>,
    torn_down: AtomicBool,
    cancel_token: CancellationToken,
}

impl VoiceSession {
    /// Builds the session and starts its pacer and event loop. Call
    /// [`VoiceSession::connect`] next.
    pub fn new(
        guild_id: GuildId,
        config: Arc<Config>,
        encoder: Box<dyn FrameEncoder>,
        resolver: Arc<dyn MediaResolver>,
        announcer: Arc<dyn Announcer>,
    ) -> Arc<Self> {
        let (connection, connection_events) = ConnectionSession::new(guild_id, &config.connection);
        let pipeline = Arc::new(FramePipeline::new(
            guild_id,
            config.pipeline.channels,
            encoder,
            Arc::new(connection.clone()),
            config.pipeline.frame_buffer,
            config.session.allow_corrupt,
        ));
        if let Err(e) = pipeline.set_bitrate(config.pipeline.bitrate) {
            warn!("[{}] failed to set initial bitrate: {}", guild_id, e);
        }

        let (track_events, track_events_rx) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();

        let session = Arc::new_cyclic(|weak: &Weak<VoiceSession>| Self {
            guild_id,
            queue: PlaybackQueue::new(
                guild_id,
                &config.queue,
                resolver,
                Arc::new(SessionPlayer(weak.clone())),
                announcer,
            ),
            effects: Mutex::new(EffectStack::new(config.session.effect_stack_limit)),
            config,
            connection,
            pipeline,
            current: Mutex::new(None),
            next_track: AtomicU64::new(1),
            track_events,
            torn_down: AtomicBool::new(false),
            cancel_token,
        });

        spawn_pacer(session.pipeline.clone(), session.cancel_token.child_token());
        tokio::spawn(run_events(
            Arc::downgrade(&session),
            connection_events,
            track_events_rx,
            session.cancel_token.clone(),
        ));
        session
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn queue(&self) -> &PlaybackQueue {
        &self.queue
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.queue.phase()
    }

    pub fn stats(&self) -> PipelineStats {
        self.pipeline.stats()
    }

    pub fn is_destroyed(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    /// Cancelled once the session has been torn down.
    pub fn closed_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub async fn connect(
        &self,
        channel: &VoiceChannel,
        connector: &dyn VoiceConnector,
    ) -> VoiceResult<()> {
        self.connection.connect(channel, connector).await
    }

    pub fn on_voice_state_update(&self, update: &VoiceStateUpdate) {
        self.connection.on_membership_change(update);
    }

    pub fn on_voice_server_update(&self, update: &VoiceServerUpdate) {
        self.connection.on_transport_renegotiate(update);
    }

    pub fn enqueue(&self, locator: impl Into<String>, submitter: Option<String>) -> ResolutionHandle {
        self.queue.push(locator, submitter)
    }

    fn start_track(&self, info: &MediaInfo, playable: Playable) -> VoiceResult<()> {
        if self.is_destroyed() || self.connection.is_destroyed() {
            return Err(VoiceError::Transport("voice session is closed".into()));
        }

        let id = self.next_track.fetch_add(1, Ordering::Relaxed);
        let feeder = TrackFeeder {
            guild_id: self.guild_id,
            id,
            playable,
            pipeline: self.pipeline.clone(),
            transcode: self.config.transcode.clone(),
            pipeline_config: self.config.pipeline.clone(),
            effect_args: self.effects.lock().filter_args(),
            events: self.track_events.clone(),
        };
        // Held across the spawn so the track's own events wait for it.
        let mut current = self.current.lock();
        let handle = feeder.spawn(self.cancel_token.child_token());
        if let Some(previous) = current.replace(handle) {
            previous.stop();
        }
        drop(current);
        debug!("[{}] started track {} ({})", self.guild_id, id, info.title);
        Ok(())
    }

    fn on_track_event(&self, event: TrackEvent) {
        let (id, failure) = match event {
            TrackEvent::Ended(id) => (id, None),
            TrackEvent::Failed(id, e) => (id, Some(e)),
        };
        {
            let mut current = self.current.lock();
            if current.as_ref().map(|t| t.id) != Some(id) {
                return;
            }
            current.take();
        }
        match failure {
            None => self.queue.on_track_end(),
            Some(e) => self.queue.on_track_failed(&e),
        }
        self.keep_buffers_audible();
    }

    /// Overlays outlive the track they were queued over; with nothing left
    /// to play they ride on the silence stream.
    fn keep_buffers_audible(&self) {
        if self.phase() != PlaybackPhase::Playing && self.pipeline.has_buffers() {
            self.pipeline.play_silence();
        }
    }

    /// Ends the current track; the next one starts. Returns whether
    /// anything was playing.
    pub fn skip(&self) -> bool {
        let Some(track) = self.current.lock().take() else {
            return false;
        };
        info!("[{}] skipping track {}", self.guild_id, track.id);
        track.stop();
        self.pipeline.clear_pending();
        self.queue.on_track_end();
        self.keep_buffers_audible();
        true
    }

    /// Clears the queue and ends the current track.
    pub fn stop(&self) {
        info!("[{}] stopping playback", self.guild_id);
        self.queue.clear();
        if let Some(track) = self.current.lock().take() {
            track.stop();
        }
        self.pipeline.clear_pending();
        self.queue.reset_progress();
    }

    /// `author - title` and the progress line of the current track.
    pub fn now_playing(&self) -> Option<String> {
        self.queue.progress().map(|progress| {
            format!(
                "{} - {}\n{}",
                progress.info.author,
                progress.info.title,
                progress.render()
            )
        })
    }

    pub fn effects(&self) -> Vec<AudioEffect> {
        self.effects.lock().list().to_vec()
    }

    pub fn add_effect(&self, effect: AudioEffect) -> VoiceResult<()> {
        self.effects.lock().add(effect)?;
        self.apply_effects();
        Ok(())
    }

    pub fn remove_effect(&self, index: usize) -> VoiceResult<AudioEffect> {
        let removed = self.effects.lock().remove(index)?;
        self.apply_effects();
        Ok(removed)
    }

    /// Restart a locator-backed track with the new filter graph at its
    /// current position. Piped tracks pick the change up from the next one.
    fn apply_effects(&self) {
        let current = self.current.lock();
        let Some(track) = current.as_ref() else {
            return;
        };
        if !matches!(track.playable, Playable::Locator(_)) {
            return;
        }
        let mut args = self.config.transcode.args.clone();
        args.extend(self.effects.lock().filter_args());
        let seek = self
            .queue
            .progress()
            .map(|p| p.elapsed)
            .unwrap_or_default();
        track.send(TrackCommand::Restart { args, seek });
    }

    /// Mix a PCM clip over whatever is playing. Starts silence when idle so
    /// the clip is heard.
    pub fn play_buffer(&self, pcm: &[u8]) -> VoiceResult<()> {
        self.pipeline.play_buffer(pcm)?;
        self.keep_buffers_audible();
        Ok(())
    }

    pub fn clear_buffers(&self) {
        self.pipeline.clear_buffers();
    }

    pub fn set_volume(&self, percent: u32) {
        self.pipeline.set_volume(percent);
    }

    pub fn volume(&self) -> Option<u32> {
        self.pipeline.volume()
    }

    pub fn set_bitrate(&self, bps: i32) -> VoiceResult<()> {
        self.pipeline.set_bitrate(bps)?;
        if let Some(applied) = self.pipeline.bitrate() {
            self.connection.set_bitrate(applied);
        }
        Ok(())
    }

    pub fn bitrate(&self) -> Option<i32> {
        self.pipeline.bitrate()
    }

    pub fn set_corrupt(&self, enabled: bool) -> VoiceResult<()> {
        self.pipeline.set_corrupt(enabled)
    }

    pub fn corrupt(&self) -> bool {
        self.pipeline.corrupt()
    }

    pub fn set_corrupt_every(&self, every: u32) {
        self.pipeline.set_corrupt_every(every);
    }

    pub fn corrupt_every(&self) -> Option<u32> {
        self.pipeline.corrupt_every()
    }

    pub fn set_corrupt_mode(&self, mode: &str) {
        self.pipeline.set_corrupt_mode(mode);
    }

    pub fn corrupt_mode(&self) -> CorruptMode {
        self.pipeline.corrupt_mode()
    }

    pub fn set_corrupt_rand_sample(&self, relative: f64) {
        self.pipeline.set_corrupt_rand_sample(relative);
    }

    pub fn corrupt_rand_sample(&self) -> Option<i32> {
        self.pipeline.corrupt_rand_sample()
    }

    /// Stops the track, empties the queue, closes the pipeline and with it
    /// the connection. Only the first call does anything.
    pub fn destroy(&self) {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("[{}] destroying voice session", self.guild_id);
        if let Some(track) = self.current.lock().take() {
            track.stop();
        }
        self.queue.clear();
        self.queue.reset_progress();
        self.cancel_token.cancel();
        self.pipeline.destroy();
    }
}

async fn run_events(
    session: Weak<VoiceSession>,
    mut connection_events: mpsc::UnboundedReceiver<ConnectionEvent>,
    mut track_events: mpsc::UnboundedReceiver<TrackEvent>,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            Some(event) = connection_events.recv() => {
                let Some(session) = session.upgrade() else { break };
                match event {
                    ConnectionEvent::Connected => {
                        debug!("[{}] connection ready", session.guild_id);
                    }
                    ConnectionEvent::Destroyed => {
                        session.destroy();
                        break;
                    }
                }
            }
            Some(event) = track_events.recv() => {
                let Some(session) = session.upgrade() else { break };
                session.on_track_event(event);
            }
            else => break,
        }
    }
}
