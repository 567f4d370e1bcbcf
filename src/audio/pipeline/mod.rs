//! `FramePipeline` — PCM in, paced Opus frames out.
//!
//! ```text
//! write(chunk) ─► FrameAccumulator ─► Mixer ─► FrameEncoder ─► [bounded frame queue]
//!                                                                      │
//!                                   pacer (20 ms tick) ─► tick() ◄─────┘ ─► FrameSink
//! ```
//!
//! `write` waits while the frame queue is full, which is what slows the
//! transcoder down to real time. `tick` never waits.

pub mod accumulator;
pub mod meter;
pub mod pacer;

pub use accumulator::FrameAccumulator;
pub use meter::ThroughputMeter;
pub use pacer::spawn_pacer;

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
};

use byteorder::{ByteOrder, LittleEndian};
use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::{
    audio::{
        codec::FrameEncoder,
        constants::{FRAME_SIZE, MAX_BITRATE, MIN_BITRATE, frame_bytes},
        mix::{CorruptMode, CorruptSettings, Mixer},
    },
    common::{GuildId, VoiceError, VoiceResult},
};

/// Silence frames sent after audio runs dry, so the receiving decoder does
/// not interpolate the last packet.
const TRAILING_SILENCE_FRAMES: u32 = 5;

/// Where encoded frames go. Implemented by the connection session.
pub trait FrameSink: Send + Sync {
    fn send_frame(&self, packet: &[u8]);

    fn send_silence(&self);

    /// Tear the relay down. Called once, from [`FramePipeline::destroy`].
    fn close(&self);
}

struct PipelineState {
    mixer: Mixer,
    encoder: Box<dyn FrameEncoder>,
    leftover: FrameAccumulator,
    pcm_frame: Vec<i16>,
}

impl PipelineState {
    /// Accumulate `chunk`, then mix and encode every complete frame.
    fn encode_chunk(&mut self, chunk: &[u8]) -> VoiceResult<Vec<Bytes>> {
        let Self {
            mixer,
            encoder,
            leftover,
            pcm_frame,
        } = self;

        let mut packets = Vec::new();
        leftover.push(chunk, |frame| {
            LittleEndian::read_i16_into(frame, pcm_frame);
            mixer.mix(pcm_frame);
            packets.push(Bytes::from(encoder.encode(pcm_frame)?));
            Ok::<_, VoiceError>(())
        })?;
        Ok(packets)
    }
}

/// Counters exposed for stats and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PipelineStats {
    pub frames_sent: u64,
    pub silence_injected: u64,
    pub queued: usize,
    pub leftover_bytes: usize,
}

pub struct FramePipeline {
    guild_id: GuildId,
    channels: usize,
    frame_len: usize,
    allow_corrupt: bool,
    state: Mutex<Option<PipelineState>>,
    frames_tx: flume::Sender<Bytes>,
    frames_rx: flume::Receiver<Bytes>,
    sink: Arc<dyn FrameSink>,
    silent: AtomicBool,
    destroyed: AtomicBool,
    meter: Mutex<ThroughputMeter>,
    frames_sent: AtomicU64,
    silence_injected: AtomicU64,
    trailing_silence: AtomicU32,
}

impl FramePipeline {
    pub fn new(
        guild_id: GuildId,
        channels: usize,
        encoder: Box<dyn FrameEncoder>,
        sink: Arc<dyn FrameSink>,
        frame_buffer: usize,
        allow_corrupt: bool,
    ) -> Self {
        let frame_len = frame_bytes(channels);
        let (frames_tx, frames_rx) = flume::bounded(frame_buffer.max(1));
        Self {
            guild_id,
            channels,
            frame_len,
            allow_corrupt,
            state: Mutex::new(Some(PipelineState {
                mixer: Mixer::new(channels),
                encoder,
                leftover: FrameAccumulator::new(frame_len),
                pcm_frame: vec![0i16; FRAME_SIZE * channels],
            })),
            frames_tx,
            frames_rx,
            sink,
            silent: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            meter: Mutex::new(ThroughputMeter::new()),
            frames_sent: AtomicU64::new(0),
            silence_injected: AtomicU64::new(0),
            trailing_silence: AtomicU32::new(TRAILING_SILENCE_FRAMES),
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// PCM bytes per frame: `channels × 960 × 2`.
    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Feed raw s16le PCM of any length. Returns the number of frames encoded.
    ///
    /// Waits while the encoded-frame queue is full.
    pub async fn write(&self, chunk: &[u8]) -> VoiceResult<usize> {
        let packets = {
            let mut guard = self.state.lock();
            let Some(state) = guard.as_mut() else {
                return Ok(0);
            };
            state.encode_chunk(chunk)?
        };

        let count = packets.len();
        for packet in packets {
            if self.is_destroyed() || self.frames_tx.send_async(packet).await.is_err() {
                break;
            }
        }
        Ok(count)
    }

    /// Non-waiting variant used by the pacer; frames that do not fit are dropped.
    fn write_now(&self, chunk: &[u8]) -> VoiceResult<usize> {
        let packets = {
            let mut guard = self.state.lock();
            let Some(state) = guard.as_mut() else {
                return Ok(0);
            };
            state.encode_chunk(chunk)?
        };
        let count = packets.len();
        for packet in packets {
            if self.frames_tx.try_send(packet).is_err() {
                break;
            }
        }
        Ok(count)
    }

    /// One pacing step: emit at most one frame to the sink.
    pub fn tick(&self) {
        if self.is_destroyed() {
            return;
        }

        if self.silent.load(Ordering::Acquire) && self.frames_rx.is_empty() {
            let zeros = vec![0u8; self.frame_len];
            match self.write_now(&zeros) {
                Ok(n) if n > 0 => {
                    self.silence_injected.fetch_add(1, Ordering::Relaxed);
                }
                Ok(_) => {}
                Err(e) => warn!("[{}] failed to encode silence: {}", self.guild_id, e),
            }
        }

        match self.frames_rx.try_recv() {
            Ok(packet) => {
                self.sink.send_frame(&packet);
                self.frames_sent.fetch_add(1, Ordering::Relaxed);
                self.trailing_silence.store(0, Ordering::Relaxed);
                self.meter.lock().record();
            }
            Err(_) => {
                let sent = self.trailing_silence.load(Ordering::Relaxed);
                if sent < TRAILING_SILENCE_FRAMES {
                    self.sink.send_silence();
                    self.trailing_silence.store(sent + 1, Ordering::Relaxed);
                }
            }
        }

        if let Some((frames, elapsed)) = self.meter.lock().poll() {
            debug!(
                "[{}] sent {} frames over {} ms",
                self.guild_id,
                frames,
                elapsed.as_millis()
            );
        }
    }

    /// Drop queued frames and the partial leftover, e.g. when skipping.
    pub fn clear_pending(&self) {
        while self.frames_rx.try_recv().is_ok() {}
        if let Some(state) = self.state.lock().as_mut() {
            state.leftover.clear();
        }
    }

    pub fn play_silence(&self) {
        debug!("[{}] play_silence()", self.guild_id);
        self.silent.store(true, Ordering::Release);
    }

    pub fn stop_silence(&self) {
        debug!("[{}] stop_silence()", self.guild_id);
        self.silent.store(false, Ordering::Release);
    }

    pub fn is_silent(&self) -> bool {
        self.silent.load(Ordering::Acquire)
    }

    fn with_mixer<T>(&self, f: impl FnOnce(&mut Mixer) -> T) -> Option<T> {
        self.state.lock().as_mut().map(|s| f(&mut s.mixer))
    }

    /// Overlay an s16le clip on top of the current stream.
    pub fn play_buffer(&self, pcm: &[u8]) -> VoiceResult<()> {
        self.with_mixer(|m| m.add_readable(pcm))
            .unwrap_or(Ok(()))
            .map_err(|e| VoiceError::Limit(e.to_string()))
    }

    pub fn clear_buffers(&self) {
        self.with_mixer(|m| m.clear_readables());
    }

    /// Whether any overlay clip still has samples to mix.
    pub fn has_buffers(&self) -> bool {
        self.with_mixer(|m| m.has_readables()).unwrap_or(false)
    }

    /// Volume as an integer percentage; applied as gain `percent / 100`.
    pub fn set_volume(&self, percent: u32) {
        self.with_mixer(|m| m.set_volume(percent as f32 / 100.0));
    }

    /// Reads the gain back as a percentage, rounding up.
    pub fn volume(&self) -> Option<u32> {
        self.with_mixer(|m| gain_to_percent(m.volume()))
    }

    /// Clamped to `[MIN_BITRATE, MAX_BITRATE]` before reaching the encoder.
    pub fn set_bitrate(&self, bps: i32) -> VoiceResult<()> {
        let bps = bps.clamp(MIN_BITRATE, MAX_BITRATE);
        match self.state.lock().as_mut() {
            Some(state) => state.encoder.set_bitrate(bps),
            None => Ok(()),
        }
    }

    pub fn bitrate(&self) -> Option<i32> {
        self.state.lock().as_ref().and_then(|s| s.encoder.bitrate())
    }

    /// Enabling requires the session's `allow_corrupt` capability.
    pub fn set_corrupt(&self, enabled: bool) -> VoiceResult<()> {
        if enabled && !self.allow_corrupt {
            return Err(VoiceError::Permission("corrupt mode is not allowed".into()));
        }
        self.with_mixer(|m| m.corrupt_mut().enabled = enabled);
        Ok(())
    }

    pub fn corrupt(&self) -> bool {
        self.with_mixer(|m| m.corrupt().enabled).unwrap_or(false)
    }

    pub fn set_corrupt_every(&self, every: u32) {
        self.with_mixer(|m| m.corrupt_mut().every = every.max(1));
    }

    pub fn corrupt_every(&self) -> Option<u32> {
        self.with_mixer(|m| m.corrupt().every)
    }

    pub fn set_corrupt_mode(&self, mode: &str) {
        let mode = CorruptMode::from_name(mode);
        self.with_mixer(|m| m.corrupt_mut().mode = mode);
    }

    pub fn corrupt_mode(&self) -> CorruptMode {
        self.with_mixer(|m| m.corrupt().mode).unwrap_or_default()
    }

    /// Jitter on the `[-10, 10]` scale.
    pub fn set_corrupt_rand_sample(&self, relative: f64) {
        let absolute = CorruptSettings::absolute_rand_sample(relative);
        self.with_mixer(|m| m.corrupt_mut().rand_sample = absolute);
    }

    pub fn corrupt_rand_sample(&self) -> Option<i32> {
        self.with_mixer(|m| CorruptSettings::relative_rand_sample(m.corrupt().rand_sample))
    }

    /// Raw jitter as handed to the mixer.
    pub fn corrupt_rand_sample_absolute(&self) -> Option<i32> {
        self.with_mixer(|m| m.corrupt().rand_sample)
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            silence_injected: self.silence_injected.load(Ordering::Relaxed),
            queued: self.frames_rx.len(),
            leftover_bytes: self.state.lock().as_ref().map_or(0, |s| s.leftover.len()),
        }
    }

    /// Stops silence, releases mixer and encoder, and closes the sink. Only
    /// the first call does anything.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.stop_silence();
        self.state.lock().take();
        while self.frames_rx.try_recv().is_ok() {}
        self.sink.close();
        debug!("[{}] frame pipeline destroyed", self.guild_id);
    }
}

/// `ceil(gain × 100)`, ignoring float noise below 1e-6.
pub fn gain_to_percent(gain: f32) -> u32 {
    let percent = (gain as f64 * 100.0 * 1e6).round() / 1e6;
    percent.ceil().max(0.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RawEncoder, RecordingSink};
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn pipeline(sink: Arc<RecordingSink>, allow_corrupt: bool) -> FramePipeline {
        FramePipeline::new(GuildId(1), 2, RawEncoder::boxed(), sink, 4_096, allow_corrupt)
    }

    #[tokio::test]
    async fn frames_are_exact_and_bytes_are_conserved() {
        let sink = Arc::new(RecordingSink::default());
        let pipeline = pipeline(sink.clone(), false);
        let frame_len = pipeline.frame_len();
        assert_eq!(frame_len, 2 * 960 * 2);

        let mut rng = StdRng::seed_from_u64(7);
        let mut input = Vec::new();
        for _ in 0..200 {
            let len = rng.gen_range(0..9_000);
            let chunk: Vec<u8> = (0..len).map(|_| rng.r#gen()).collect();
            input.extend_from_slice(&chunk);
            pipeline.write(&chunk).await.unwrap();
            assert!(pipeline.stats().leftover_bytes < frame_len);
        }

        while pipeline.stats().queued > 0 {
            pipeline.tick();
        }

        let frames = sink.frames.lock();
        assert!(frames.iter().all(|f| f.len() == frame_len));
        let emitted: Vec<u8> = frames.iter().flatten().copied().collect();
        let remainder = input.len() - emitted.len();
        assert!(remainder < frame_len);
        assert_eq!(remainder, pipeline.stats().leftover_bytes);
        assert_eq!(&input[..emitted.len()], emitted.as_slice());
    }

    #[tokio::test]
    async fn tick_sends_one_frame_at_a_time() {
        let sink = Arc::new(RecordingSink::default());
        let pipeline = pipeline(sink.clone(), false);
        let encoded = pipeline.write(&vec![1u8; pipeline.frame_len() * 3]).await.unwrap();
        assert_eq!(encoded, 3);

        pipeline.tick();
        assert_eq!(sink.frames.lock().len(), 1);
        pipeline.tick();
        pipeline.tick();
        assert_eq!(sink.frames.lock().len(), 3);
        assert_eq!(pipeline.stats().frames_sent, 3);
    }

    #[tokio::test]
    async fn silence_keeps_cadence_when_source_is_dry() {
        let sink = Arc::new(RecordingSink::default());
        let pipeline = pipeline(sink.clone(), false);
        pipeline.play_silence();

        for _ in 0..10 {
            pipeline.tick();
        }

        let frames = sink.frames.lock();
        assert_eq!(frames.len(), 10);
        assert!(frames.iter().all(|f| f.len() == pipeline.frame_len()));
        assert!(frames.iter().flatten().all(|&b| b == 0));
        assert_eq!(pipeline.stats().silence_injected, 10);
    }

    #[tokio::test]
    async fn trailing_silence_is_bounded() {
        let sink = Arc::new(RecordingSink::default());
        let pipeline = pipeline(sink.clone(), false);
        pipeline.write(&vec![0u8; pipeline.frame_len()]).await.unwrap();

        for _ in 0..20 {
            pipeline.tick();
        }
        assert_eq!(sink.frames.lock().len(), 1);
        assert_eq!(
            sink.silences.load(Ordering::Relaxed),
            TRAILING_SILENCE_FRAMES as u64
        );
    }

    #[test]
    fn volume_round_trips_as_percentage() {
        let pipeline = pipeline(Arc::new(RecordingSink::default()), false);
        pipeline.set_volume(50);
        assert_eq!(pipeline.with_mixer(|m| m.volume()), Some(0.5));
        assert_eq!(pipeline.volume(), Some(50));

        for percent in [0, 7, 29, 57, 100, 150] {
            pipeline.set_volume(percent);
            assert_eq!(pipeline.volume(), Some(percent));
        }

        assert_eq!(gain_to_percent(0.503), 51);
    }

    #[test]
    fn bitrate_is_clamped() {
        let pipeline = pipeline(Arc::new(RecordingSink::default()), false);
        pipeline.set_bitrate(500).unwrap();
        assert_eq!(pipeline.bitrate(), Some(MIN_BITRATE));
        pipeline.set_bitrate(512_000).unwrap();
        assert_eq!(pipeline.bitrate(), Some(MAX_BITRATE));
        pipeline.set_bitrate(96_000).unwrap();
        assert_eq!(pipeline.bitrate(), Some(96_000));
    }

    #[test]
    fn corrupt_requires_capability() {
        let denied = pipeline(Arc::new(RecordingSink::default()), false);
        assert!(matches!(denied.set_corrupt(true), Err(VoiceError::Permission(_))));
        assert!(denied.set_corrupt(false).is_ok());
        assert!(!denied.corrupt());

        let allowed = pipeline(Arc::new(RecordingSink::default()), true);
        allowed.set_corrupt(true).unwrap();
        assert!(allowed.corrupt());
    }

    #[test]
    fn corrupt_parameters_are_rescaled() {
        let pipeline = pipeline(Arc::new(RecordingSink::default()), true);
        pipeline.set_corrupt_rand_sample(5.0);
        assert_eq!(pipeline.corrupt_rand_sample_absolute(), Some(16_383));
        assert_eq!(pipeline.corrupt_rand_sample(), Some(5));

        pipeline.set_corrupt_rand_sample(12.0);
        assert_eq!(pipeline.corrupt_rand_sample(), Some(10));

        pipeline.set_corrupt_mode("xor");
        assert_eq!(pipeline.corrupt_mode(), CorruptMode::Xor);
        pipeline.set_corrupt_every(0);
        assert_eq!(pipeline.corrupt_every(), Some(1));
    }

    #[tokio::test]
    async fn destroy_is_idempotent_and_silences_everything() {
        let sink = Arc::new(RecordingSink::default());
        let pipeline = pipeline(sink.clone(), false);
        pipeline.play_silence();
        pipeline.write(&vec![0u8; pipeline.frame_len() * 2]).await.unwrap();

        pipeline.destroy();
        pipeline.destroy();

        assert_eq!(sink.closes.load(Ordering::Relaxed), 1);
        assert!(!pipeline.is_silent());
        assert_eq!(pipeline.volume(), None);
        assert_eq!(pipeline.write(&[0u8; 64]).await.unwrap(), 0);
        pipeline.tick();
        assert!(sink.frames.lock().is_empty());
    }
}
