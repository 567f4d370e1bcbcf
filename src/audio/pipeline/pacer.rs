use std::{sync::Arc, time::Duration};

use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::FramePipeline;
use crate::audio::constants::FRAME_DURATION_MS;

/// Drives [`FramePipeline::tick`] every frame duration until cancelled or
/// the pipeline is destroyed. Late ticks are skipped rather than bunched up.
pub fn spawn_pacer(pipeline: Arc<FramePipeline>, cancel_token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(FRAME_DURATION_MS));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                _ = interval.tick() => {
                    if pipeline.is_destroyed() {
                        break;
                    }
                    pipeline.tick();
                }
            }
        }
        debug!("pacer stopped");
    })
}
