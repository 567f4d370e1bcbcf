pub mod events;
pub mod link;
pub mod loopback;
pub mod session;

pub use events::{ConnectionEvent, VoiceServerUpdate, VoiceStateUpdate};
pub use link::{VoiceChannel, VoiceConnector, VoiceLink};
pub use loopback::{LoopbackConnector, LoopbackLink};
pub use session::{ConnectionSession, ConnectionState};
