//! voxline — mixed, Opus-encoded audio streamed into long-lived voice
//! sessions, fed by a queue of concurrently resolved tracks.

pub mod audio;
pub mod common;
pub mod configs;
pub mod gateway;
pub mod player;
pub mod queue;
pub mod server;

#[cfg(test)]
mod testing;
