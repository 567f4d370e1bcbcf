pub mod announcer;
pub mod context;
pub mod playback;
pub mod state;

pub use announcer::{Announcer, LogAnnouncer};
pub use context::VoiceSession;
pub use playback::{TrackCommand, TrackEvent, TrackHandle};
pub use state::{PhaseCell, PlaybackPhase};
