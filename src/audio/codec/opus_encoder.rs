use audiopus::{Application, Bitrate, Channels, SampleRate, coder::Encoder as OpusEncoder};

use super::FrameEncoder;
use crate::{
    audio::constants::MAX_OPUS_PACKET_SIZE,
    common::{VoiceError, VoiceResult},
};

/// PCM i16 → Opus packet encoder with the AUDIO application profile.
pub struct OpusFrameEncoder {
    encoder: OpusEncoder,
    out: Vec<u8>,
}

impl OpusFrameEncoder {
    pub fn new(sample_rate: u32, channels: usize) -> VoiceResult<Self> {
        let sample_rate = match sample_rate {
            8_000 => SampleRate::Hz8000,
            12_000 => SampleRate::Hz12000,
            16_000 => SampleRate::Hz16000,
            24_000 => SampleRate::Hz24000,
            48_000 => SampleRate::Hz48000,
            other => {
                return Err(VoiceError::Transport(format!(
                    "unsupported Opus sample rate {other}"
                )));
            }
        };
        let channels = match channels {
            1 => Channels::Mono,
            2 => Channels::Stereo,
            other => {
                return Err(VoiceError::Transport(format!(
                    "unsupported Opus channel count {other}"
                )));
            }
        };

        let encoder = OpusEncoder::new(sample_rate, channels, Application::Audio)
            .map_err(VoiceError::transport)?;
        Ok(Self {
            encoder,
            out: vec![0u8; MAX_OPUS_PACKET_SIZE],
        })
    }
}

impl FrameEncoder for OpusFrameEncoder {
    fn encode(&mut self, pcm: &[i16]) -> VoiceResult<Vec<u8>> {
        let size = self
            .encoder
            .encode(pcm, &mut self.out)
            .map_err(VoiceError::transport)?;
        Ok(self.out[..size].to_vec())
    }

    fn set_bitrate(&mut self, bps: i32) -> VoiceResult<()> {
        self.encoder
            .set_bitrate(Bitrate::BitsPerSecond(bps))
            .map_err(VoiceError::transport)
    }

    fn bitrate(&self) -> Option<i32> {
        match self.encoder.bitrate() {
            Ok(Bitrate::BitsPerSecond(bps)) => Some(bps),
            _ => None,
        }
    }
}
