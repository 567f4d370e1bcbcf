//! Named audio effects applied through the transcoder's `-af` filter graph.

use crate::common::{VoiceError, VoiceResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioEffect {
    BassBoost,
    Nightcore,
    Vaporwave,
    Echo,
    Karaoke,
    EightD,
}

impl AudioEffect {
    pub const ALL: [AudioEffect; 6] = [
        AudioEffect::BassBoost,
        AudioEffect::Nightcore,
        AudioEffect::Vaporwave,
        AudioEffect::Echo,
        AudioEffect::Karaoke,
        AudioEffect::EightD,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::BassBoost => "bassboost",
            Self::Nightcore => "nightcore",
            Self::Vaporwave => "vaporwave",
            Self::Echo => "echo",
            Self::Karaoke => "karaoke",
            Self::EightD => "8d",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|e| e.name().eq_ignore_ascii_case(name.trim()))
    }

    /// ffmpeg filter expression for this effect.
    pub fn filter(self) -> &'static str {
        match self {
            Self::BassBoost => "bass=g=10",
            // Resample to a known rate first so the pitch shift is exact.
            Self::Nightcore => "aresample=48000,asetrate=60000,aresample=48000",
            Self::Vaporwave => "aresample=48000,asetrate=38400,aresample=48000",
            Self::Echo => "aecho=0.8:0.88:60:0.4",
            Self::Karaoke => "pan=stereo|c0=c0-c1|c1=c1-c0",
            Self::EightD => "apulsator=hz=0.125",
        }
    }
}

/// Ordered, size-limited list of effects. Later effects run after earlier ones.
#[derive(Debug, Clone)]
pub struct EffectStack {
    effects: Vec<AudioEffect>,
    limit: usize,
}

impl EffectStack {
    pub fn new(limit: usize) -> Self {
        Self {
            effects: Vec::new(),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn list(&self) -> &[AudioEffect] {
        &self.effects
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn add(&mut self, effect: AudioEffect) -> VoiceResult<()> {
        if self.effects.len() >= self.limit {
            return Err(VoiceError::Limit(format!(
                "effect stack is full ({} effects)",
                self.limit
            )));
        }
        self.effects.push(effect);
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> VoiceResult<AudioEffect> {
        if index >= self.effects.len() {
            return Err(VoiceError::NotFound(index));
        }
        Ok(self.effects.remove(index))
    }

    pub fn clear(&mut self) {
        self.effects.clear();
    }

    /// `-af <graph>` arguments, or nothing when the stack is empty.
    pub fn filter_args(&self) -> Vec<String> {
        if self.effects.is_empty() {
            return Vec::new();
        }
        let graph = self
            .effects
            .iter()
            .map(|e| e.filter())
            .collect::<Vec<_>>()
            .join(",");
        vec!["-af".to_string(), graph]
    }
}
