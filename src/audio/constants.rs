//! Central constants for the audio pipeline.
//!
//! Frame geometry, codec limits and effect scales live here so the mixer,
//! the frame pipeline and the transcoder agree on one PCM layout.

// ── Sample / PCM ─────────────────────────────────────────────────────────────

/// Output sample rate sent to the voice endpoint (Hz).
pub const TARGET_SAMPLE_RATE: u32 = 48_000;

/// Default channel layout (stereo).
pub const DEFAULT_CHANNELS: usize = 2;

/// Duration of one Opus frame.
pub const FRAME_DURATION_MS: u64 = 20;

/// Samples per channel in one 20 ms frame at 48 kHz.
pub const FRAME_SIZE: usize = 960;

/// Signed 16-bit little-endian PCM.
pub const SAMPLE_BYTE_LEN: usize = 2;

/// Bytes of PCM making up one frame for the given channel count.
pub const fn frame_bytes(channels: usize) -> usize {
    channels * FRAME_SIZE * SAMPLE_BYTE_LEN
}

// ── Codec ─────────────────────────────────────────────────────────────────────

pub const MIN_BITRATE: i32 = 2_000;
pub const MAX_BITRATE: i32 = 128_000;
pub const DEFAULT_BITRATE: i32 = 64_000;

/// Upper bound for one encoded packet; Opus never exceeds this for 20 ms.
pub const MAX_OPUS_PACKET_SIZE: usize = 4_000;

// ── Mixer ─────────────────────────────────────────────────────────────────────

/// Maximum concurrent overlay buffers mixed over the main stream.
pub const MAX_LAYERS: usize = 5;

/// Absolute magnitude of the corruption jitter (full i16 range).
pub const CORRUPT_RANDSAMPLE_MINMAX_ABSOLUTE: i32 = 32_767;

/// Magnitude of the user-facing jitter scale.
pub const CORRUPT_RANDSAMPLE_MINMAX_RELATIVE: i32 = 10;

// ── Progress ──────────────────────────────────────────────────────────────────

/// Width of the now-playing progress bar in cells.
pub const PROGRESS_BAR_LENGTH: usize = 16;
