use std::sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PlaybackPhase {
    Idle = 0,
    /// The queue head is being inspected and dispatched.
    Advancing = 1,
    Playing = 2,
}

impl PlaybackPhase {
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Advancing,
            2 => Self::Playing,
            _ => Self::Idle,
        }
    }
}

/// Shared playback phase. Cloning shares the underlying cell.
#[derive(Clone, Debug)]
pub struct PhaseCell(Arc<AtomicU8>);

impl Default for PhaseCell {
    fn default() -> Self {
        Self(Arc::new(AtomicU8::new(PlaybackPhase::Idle as u8)))
    }
}

impl PhaseCell {
    pub fn get(&self) -> PlaybackPhase {
        PlaybackPhase::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, phase: PlaybackPhase) {
        self.0.store(phase as u8, Ordering::Release);
    }

    /// `Idle → Advancing`. Fails when another advance or a track is active.
    pub fn begin_advance(&self) -> bool {
        self.0
            .compare_exchange(
                PlaybackPhase::Idle as u8,
                PlaybackPhase::Advancing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// `Playing → Idle`. Fails when no track was playing.
    pub fn finish_playing(&self) -> bool {
        self.0
            .compare_exchange(
                PlaybackPhase::Playing as u8,
                PlaybackPhase::Idle as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}
