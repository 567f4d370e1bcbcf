//! `audio/mix/mixer.rs` — per-session PCM mixer.
//!
//! The frame pipeline hands every complete frame to [`Mixer::mix`], which
//! applies the session gain, blends overlay clips and finally runs the
//! corruption effect.

use crate::audio::constants::MAX_LAYERS;

use super::{corrupt::CorruptSettings, layer::MixLayer};

pub struct Mixer {
    channels: usize,
    gain: f32,
    layers: Vec<MixLayer>,
    max_layers: usize,
    corrupt: CorruptSettings,
    corrupt_counter: u64,
    acc_buf: Vec<i32>,
}

impl Mixer {
    pub fn new(channels: usize) -> Self {
        Self {
            channels,
            gain: 1.0,
            layers: Vec::new(),
            max_layers: MAX_LAYERS,
            corrupt: CorruptSettings::default(),
            corrupt_counter: 0,
            acc_buf: Vec::new(),
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn set_volume(&mut self, gain: f32) {
        self.gain = gain.max(0.0);
    }

    pub fn volume(&self) -> f32 {
        self.gain
    }

    /// Queue an s16le clip to be mixed over the main stream.
    /// Returns `Err` if the layer cap is reached.
    pub fn add_readable(&mut self, pcm: &[u8]) -> Result<(), &'static str> {
        self.layers.retain(|l| !l.is_dead());
        if self.layers.len() >= self.max_layers {
            return Err("Maximum mix layers reached");
        }
        self.layers.push(MixLayer::from_bytes(pcm, 1.0));
        Ok(())
    }

    pub fn clear_readables(&mut self) {
        self.layers.clear();
    }

    pub fn has_readables(&self) -> bool {
        self.layers.iter().any(|l| !l.is_dead())
    }

    pub fn corrupt(&self) -> &CorruptSettings {
        &self.corrupt
    }

    pub fn corrupt_mut(&mut self) -> &mut CorruptSettings {
        &mut self.corrupt
    }

    /// Mix one interleaved frame in place.
    pub fn mix(&mut self, frame: &mut [i16]) {
        let unity = (self.gain - 1.0).abs() < f32::EPSILON;

        if !unity || !self.layers.is_empty() {
            self.acc_buf.clear();
            self.acc_buf.extend(
                frame
                    .iter()
                    .map(|&s| if unity { s as i32 } else { (s as f32 * self.gain).round() as i32 }),
            );

            for layer in self.layers.iter_mut() {
                layer.accumulate(&mut self.acc_buf);
            }
            self.layers.retain(|l| !l.is_dead());

            for (dst, &sum) in frame.iter_mut().zip(self.acc_buf.iter()) {
                *dst = sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
            }
        }

        if self.corrupt.enabled {
            self.corrupt.apply(
                frame,
                self.channels,
                &mut self.corrupt_counter,
                &mut rand::thread_rng(),
            );
        }
    }
}
