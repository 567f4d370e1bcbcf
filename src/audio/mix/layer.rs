//! `MixLayer` — one overlay PCM clip blended over the main stream.

use byteorder::{ByteOrder, LittleEndian};

/// A finite PCM clip (interleaved i16) played once over whatever the main
/// stream carries.
pub struct MixLayer {
    samples: Vec<i16>,
    cursor: usize,
    /// Blend volume in [0.0, 1.0].
    pub volume: f32,
}

impl MixLayer {
    /// Builds a layer from s16le bytes. A trailing odd byte is ignored.
    pub fn from_bytes(pcm: &[u8], volume: f32) -> Self {
        let mut samples = vec![0i16; pcm.len() / 2];
        LittleEndian::read_i16_into(&pcm[..samples.len() * 2], &mut samples);
        Self {
            samples,
            cursor: 0,
            volume: volume.clamp(0.0, 1.0),
        }
    }

    /// Return `true` once every sample has been mixed.
    pub fn is_dead(&self) -> bool {
        self.cursor >= self.samples.len()
    }

    /// Accumulate this layer's next `acc.len()` samples into `acc`.
    pub fn accumulate(&mut self, acc: &mut [i32]) {
        let n = acc.len().min(self.samples.len() - self.cursor);
        for (dst, &s) in acc[..n]
            .iter_mut()
            .zip(&self.samples[self.cursor..self.cursor + n])
        {
            *dst += (s as f32 * self.volume).round() as i32;
        }
        self.cursor += n;
    }
}
