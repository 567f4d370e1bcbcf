//! Novelty "corruption" effect: periodically mangles samples with random
//! jitter. Gated at the session level by `allow_corrupt`.

use rand::Rng;

use crate::audio::constants::{
    CORRUPT_RANDSAMPLE_MINMAX_ABSOLUTE, CORRUPT_RANDSAMPLE_MINMAX_RELATIVE,
};

/// Distortion strategy applied to every selected sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorruptMode {
    #[default]
    Add,
    Sub,
    Mul,
    Xor,
    Replace,
}

impl CorruptMode {
    pub const ALL: [CorruptMode; 5] = [
        CorruptMode::Add,
        CorruptMode::Sub,
        CorruptMode::Mul,
        CorruptMode::Xor,
        CorruptMode::Replace,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Xor => "xor",
            Self::Replace => "replace",
        }
    }

    /// Unknown names fall back to `add`.
    pub fn from_name(name: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(name.trim()))
            .unwrap_or_default()
    }

    fn apply(self, sample: i16, jitter: i32) -> i16 {
        let s = sample as i32;
        let out = match self {
            Self::Add => s + jitter,
            Self::Sub => s - jitter,
            // Scales by (1 + jitter / 2^13), up to roughly ±5x at full jitter.
            Self::Mul => s + ((s * jitter) >> 13),
            Self::Xor => s ^ jitter,
            Self::Replace => jitter,
        };
        out.clamp(i16::MIN as i32, i16::MAX as i32) as i16
    }
}

/// Corruption parameters as held by the mixer.
#[derive(Debug, Clone, PartialEq)]
pub struct CorruptSettings {
    pub enabled: bool,
    /// Mangle every Nth sample frame (one sample per channel). Zero acts as one.
    pub every: u32,
    pub mode: CorruptMode,
    /// Jitter bound on the absolute i16 scale, in
    /// `[-CORRUPT_RANDSAMPLE_MINMAX_ABSOLUTE, CORRUPT_RANDSAMPLE_MINMAX_ABSOLUTE]`.
    pub rand_sample: i32,
}

impl Default for CorruptSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            every: 1,
            mode: CorruptMode::Add,
            rand_sample: CORRUPT_RANDSAMPLE_MINMAX_ABSOLUTE / CORRUPT_RANDSAMPLE_MINMAX_RELATIVE,
        }
    }
}

impl CorruptSettings {
    /// Maps a relative jitter in `[-10, 10]` onto the absolute sample scale.
    ///
    /// The input is floored and clamped first; the scaled value truncates.
    pub fn absolute_rand_sample(relative: f64) -> i32 {
        let max = CORRUPT_RANDSAMPLE_MINMAX_RELATIVE as f64;
        let relative = relative.floor().clamp(-max, max) as i32;
        relative * CORRUPT_RANDSAMPLE_MINMAX_ABSOLUTE / CORRUPT_RANDSAMPLE_MINMAX_RELATIVE
    }

    /// Inverse of [`Self::absolute_rand_sample`], rounded to the nearest step.
    pub fn relative_rand_sample(absolute: i32) -> i32 {
        (absolute as f64 / CORRUPT_RANDSAMPLE_MINMAX_ABSOLUTE as f64
            * CORRUPT_RANDSAMPLE_MINMAX_RELATIVE as f64)
            .round() as i32
    }

    /// Applies the effect to `frame` in place. `counter` carries the sample
    /// frame position across calls so the period does not reset per chunk.
    pub fn apply<R: Rng>(&self, frame: &mut [i16], channels: usize, counter: &mut u64, rng: &mut R) {
        if !self.enabled || channels == 0 {
            return;
        }
        let every = self.every.max(1) as u64;
        let (lo, hi) = if self.rand_sample < 0 {
            (self.rand_sample, 0)
        } else {
            (0, self.rand_sample)
        };

        for group in frame.chunks_mut(channels) {
            *counter = counter.wrapping_add(1);
            if *counter % every != 0 {
                continue;
            }
            for sample in group.iter_mut() {
                let jitter = rng.gen_range(lo..=hi);
                *sample = self.mode.apply(*sample, jitter);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_jitter_scales_to_sample_range() {
        assert_eq!(CorruptSettings::absolute_rand_sample(5.0), 16_383);
        assert_eq!(CorruptSettings::relative_rand_sample(16_383), 5);
        assert_eq!(CorruptSettings::absolute_rand_sample(-5.0), -16_383);
        assert_eq!(CorruptSettings::relative_rand_sample(-16_383), -5);
    }

    #[test]
    fn relative_jitter_is_clamped() {
        assert_eq!(CorruptSettings::absolute_rand_sample(12.0), 32_767);
        assert_eq!(CorruptSettings::relative_rand_sample(32_767), 10);
        assert_eq!(CorruptSettings::absolute_rand_sample(-40.0), -32_767);
        assert_eq!(CorruptSettings::absolute_rand_sample(2.9), 6_553);
    }

    #[test]
    fn unknown_mode_names_fall_back_to_add() {
        assert_eq!(CorruptMode::from_name("xor"), CorruptMode::Xor);
        assert_eq!(CorruptMode::from_name(" Replace "), CorruptMode::Replace);
        assert_eq!(CorruptMode::from_name("shred"), CorruptMode::Add);
    }

    #[test]
    fn only_every_nth_sample_frame_is_touched() {
        let settings = CorruptSettings {
            enabled: true,
            every: 2,
            mode: CorruptMode::Replace,
            rand_sample: 0,
        };
        let mut frame = vec![100i16; 8];
        let mut counter = 0;
        settings.apply(&mut frame, 2, &mut counter, &mut rand::thread_rng());
        assert_eq!(frame, vec![100, 100, 0, 0, 100, 100, 0, 0]);

        // The period continues across calls.
        let mut next = vec![7i16; 2];
        settings.apply(&mut next, 2, &mut counter, &mut rand::thread_rng());
        assert_eq!(next, vec![7, 7]);
    }

    #[test]
    fn jitter_stays_within_bound() {
        let settings = CorruptSettings {
            enabled: true,
            every: 1,
            mode: CorruptMode::Add,
            rand_sample: 50,
        };
        let mut frame = vec![0i16; 1_920];
        let mut counter = 0;
        settings.apply(&mut frame, 2, &mut counter, &mut rand::thread_rng());
        assert!(frame.iter().all(|&s| (0..=50).contains(&s)));
    }
}
