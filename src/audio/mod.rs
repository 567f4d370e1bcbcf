pub mod codec;
pub mod constants;
pub mod mix;
pub mod pipeline;
pub mod transcode;

pub use codec::{FrameEncoder, OpusFrameEncoder};
pub use mix::{CorruptMode, Mixer};
pub use pipeline::{FramePipeline, FrameSink, PipelineStats};
pub use transcode::{AudioEffect, EffectStack, TranscodeInput, Transcoder};
