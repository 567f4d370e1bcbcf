//! Per-track feeder task: transcoder output into the frame pipeline.

use std::{sync::Arc, time::Duration};

use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    audio::{
        pipeline::FramePipeline,
        transcode::{TranscodeInput, Transcoder},
    },
    common::{GuildId, VoiceError, VoiceResult},
    configs::{PipelineConfig, TranscodeConfig},
    queue::Playable,
};

pub type TrackId = u64;

/// Sent to a running feeder.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackCommand {
    /// Rebuild the transcoder with new output arguments, resuming at `seek`.
    Restart { args: Vec<String>, seek: Duration },
}

/// Reported by a feeder when it stops on its own.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackEvent {
    Ended(TrackId),
    Failed(TrackId, VoiceError),
}

enum FeedOutcome {
    Finished,
    Cancelled,
}

/// Control side of a running track.
pub struct TrackHandle {
    pub id: TrackId,
    pub playable: Playable,
    cancel: CancellationToken,
    commands: flume::Sender<TrackCommand>,
    task: JoinHandle<()>,
}

impl TrackHandle {
    pub fn send(&self, command: TrackCommand) {
        let _ = self.commands.send(command);
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

pub struct TrackFeeder {
    pub guild_id: GuildId,
    pub id: TrackId,
    pub playable: Playable,
    pub pipeline: Arc<FramePipeline>,
    pub transcode: TranscodeConfig,
    pub pipeline_config: PipelineConfig,
    pub effect_args: Vec<String>,
    pub events: mpsc::UnboundedSender<TrackEvent>,
}

impl TrackFeeder {
    pub fn spawn(self, cancel: CancellationToken) -> TrackHandle {
        let (commands, commands_rx) = flume::unbounded();
        let id = self.id;
        let playable = self.playable.clone();
        let task = tokio::spawn(self.run(cancel.clone(), commands_rx));
        TrackHandle {
            id,
            playable,
            cancel,
            commands,
            task,
        }
    }

    async fn run(self, cancel: CancellationToken, commands: flume::Receiver<TrackCommand>) {
        let event = match self.feed(&cancel, &commands).await {
            Ok(FeedOutcome::Finished) => {
                debug!("[{}] track {} finished", self.guild_id, self.id);
                TrackEvent::Ended(self.id)
            }
            Ok(FeedOutcome::Cancelled) => {
                debug!("[{}] track {} stopped", self.guild_id, self.id);
                return;
            }
            Err(e) => {
                warn!("[{}] track {} failed: {}", self.guild_id, self.id, e);
                TrackEvent::Failed(self.id, e)
            }
        };
        let _ = self.events.send(event);
    }

    async fn feed(
        &self,
        cancel: &CancellationToken,
        commands: &flume::Receiver<TrackCommand>,
    ) -> VoiceResult<FeedOutcome> {
        let input = match &self.playable {
            Playable::Locator(locator) => TranscodeInput::Locator(locator.clone()),
            Playable::Fetch(_) => TranscodeInput::Pipe,
        };
        let mut transcoder = Transcoder::new(
            &self.transcode,
            input,
            self.pipeline_config.sample_rate,
            self.pipeline_config.channels,
        )
        .with_args(self.effect_args.clone());
        transcoder.start().await?;

        let pump = match &self.playable {
            Playable::Fetch(factory) => {
                let stream = match factory.open().await {
                    Ok(stream) => stream,
                    Err(e) => {
                        transcoder.destroy().await;
                        return Err(e);
                    }
                };
                transcoder.pipe_from(stream)
            }
            Playable::Locator(_) => None,
        };

        if cancel.is_cancelled() {
            transcoder.destroy().await;
            if let Some(pump) = pump {
                pump.abort();
            }
            return Ok(FeedOutcome::Cancelled);
        }
        self.pipeline.stop_silence();
        info!("[{}] streaming track {}", self.guild_id, self.id);

        let mut buf = vec![0u8; self.pipeline_config.read_chunk.max(1)];
        let outcome = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break FeedOutcome::Cancelled,
                Ok(command) = commands.recv_async() => match command {
                    TrackCommand::Restart { args, seek } => {
                        if !transcoder.input().is_seekable() {
                            debug!(
                                "[{}] piped track cannot be restarted, effects apply from the next track",
                                self.guild_id
                            );
                            continue;
                        }
                        debug!("[{}] restarting transcoder at {:?}", self.guild_id, seek);
                        self.pipeline.clear_pending();
                        transcoder.restart(args, Some(seek)).await?;
                    }
                },
                read = transcoder.read(&mut buf) => {
                    let n = match read {
                        Ok(n) => n,
                        Err(e) => break_err(&mut transcoder, pump.as_ref(), e).await?,
                    };
                    if n == 0 {
                        break FeedOutcome::Finished;
                    }
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break FeedOutcome::Cancelled,
                        written = self.pipeline.write(&buf[..n]) => {
                            if let Err(e) = written {
                                break_err::<()>(&mut transcoder, pump.as_ref(), e).await?;
                            }
                        }
                    }
                    if self.pipeline.is_destroyed() {
                        break FeedOutcome::Cancelled;
                    }
                }
            }
        };

        transcoder.destroy().await;
        if let Some(pump) = pump {
            if matches!(outcome, FeedOutcome::Cancelled) {
                pump.abort();
            } else {
                match pump.await {
                    Ok(Err(e)) => return Err(VoiceError::streaming(e)),
                    Err(e) if !e.is_cancelled() => return Err(VoiceError::streaming(e)),
                    _ => {}
                }
            }
        }
        Ok(outcome)
    }
}

/// Tear the transcoder and input pump down, then fail with `error`.
async fn break_err<T>(
    transcoder: &mut Transcoder,
    pump: Option<&JoinHandle<std::io::Result<u64>>>,
    error: VoiceError,
) -> VoiceResult<T> {
    transcoder.destroy().await;
    if let Some(pump) = pump {
        pump.abort();
    }
    Err(error)
}
