pub mod opus_encoder;

pub use opus_encoder::OpusFrameEncoder;

use crate::common::VoiceResult;

/// Turns one PCM frame into one compressed packet.
///
/// The frame pipeline only ever hands complete frames to the encoder.
pub trait FrameEncoder: Send {
    /// Encode one interleaved i16 frame.
    fn encode(&mut self, pcm: &[i16]) -> VoiceResult<Vec<u8>>;

    /// Apply an already clamped bitrate in bits per second.
    fn set_bitrate(&mut self, bps: i32) -> VoiceResult<()>;

    /// Current bitrate, `None` when the codec picks it automatically.
    fn bitrate(&self) -> Option<i32>;
}
