use serde::{Deserialize, Serialize};

use crate::audio::constants::{DEFAULT_BITRATE, DEFAULT_CHANNELS, TARGET_SAMPLE_RATE};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: usize,
    /// Initial encoder bitrate in bits per second.
    #[serde(default = "default_bitrate")]
    pub bitrate: i32,
    /// Encoded frames buffered ahead of the pacing tick (50 ≈ 1 s).
    #[serde(default = "default_frame_buffer")]
    pub frame_buffer: usize,
    /// Bytes pulled from the transcoder per read.
    #[serde(default = "default_read_chunk")]
    pub read_chunk: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            bitrate: default_bitrate(),
            frame_buffer: default_frame_buffer(),
            read_chunk: default_read_chunk(),
        }
    }
}

fn default_sample_rate() -> u32 {
    TARGET_SAMPLE_RATE
}

fn default_channels() -> usize {
    DEFAULT_CHANNELS
}

fn default_bitrate() -> i32 {
    DEFAULT_BITRATE
}

fn default_frame_buffer() -> usize {
    50
}

fn default_read_chunk() -> usize {
    16 * 1_024
}
