use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use tracing::{error, info};
use voxline::{
    audio::AudioEffect,
    common::{AnyResult, ChannelId, GuildId, UserId, logger},
    configs::Config,
    gateway::{LoopbackConnector, VoiceChannel},
    player::PlaybackPhase,
    queue::DirectResolver,
    server::SessionManager,
};

/// Plays files or URLs through the voice pipeline into a loopback transport.
#[derive(Parser, Debug)]
#[command(name = "voxline", version)]
struct Args {
    /// Config file; defaults to config.toml, then config.default.toml.
    #[arg(short, long, env = "VOXLINE_CONFIG")]
    config: Option<PathBuf>,

    /// Volume in percent.
    #[arg(long)]
    volume: Option<u32>,

    /// Encoder bitrate in bits per second.
    #[arg(long)]
    bitrate: Option<i32>,

    /// Effect to apply, repeatable (bassboost, nightcore, vaporwave, echo, karaoke, 8d).
    #[arg(long = "effect", value_parser = parse_effect)]
    effects: Vec<AudioEffect>,

    /// Seconds between progress lines.
    #[arg(long, default_value_t = 5)]
    stats_interval: u64,

    /// Files or URLs, played in order.
    #[arg(required = true)]
    locators: Vec<String>,
}

fn parse_effect(name: &str) -> Result<AudioEffect, String> {
    AudioEffect::from_name(name).ok_or_else(|| format!("unknown effect '{name}'"))
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;
    logger::init(config.logging.as_ref());

    info!(
        "voxline {} ({}@{})",
        env!("CARGO_PKG_VERSION"),
        option_env!("GIT_BRANCH").unwrap_or("unknown"),
        option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown")
    );

    let config = Arc::new(config);
    let connector = Arc::new(LoopbackConnector::new(0));
    let manager = SessionManager::new(config.clone(), connector.clone(), Arc::new(DirectResolver));

    let channel = VoiceChannel {
        guild_id: GuildId(1),
        channel_id: ChannelId(1),
        bot_user_id: UserId(1),
        can_join: true,
        can_speak: true,
    };
    let session = manager.join(&channel).await?;

    if let Some(volume) = args.volume {
        session.set_volume(volume);
    }
    if let Some(bitrate) = args.bitrate {
        session.set_bitrate(bitrate)?;
    }
    for effect in &args.effects {
        session.add_effect(*effect)?;
    }

    let handles = args
        .locators
        .iter()
        .map(|locator| session.enqueue(locator.clone(), Some("cli".into())));
    let resolved = futures::future::join_all(handles).await;
    for (locator, outcome) in args.locators.iter().zip(resolved) {
        match outcome {
            Ok(count) => info!("queued {} ({} tracks)", locator, count),
            Err(e) => error!("could not queue {}: {}", locator, e),
        }
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut progress = tokio::time::interval(Duration::from_secs(args.stats_interval.max(1)));

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("interrupted, shutting down");
                break;
            }
            _ = progress.tick() => {
                if session.is_destroyed() {
                    break;
                }
                if let Some(now_playing) = session.now_playing() {
                    info!("{}", now_playing.replace('\n', " | "));
                }
                let stats = session.stats();
                if session.phase() == PlaybackPhase::Idle
                    && session.queue().is_empty()
                    && stats.queued == 0
                {
                    break;
                }
            }
        }
    }

    let stats = session.stats();
    if let Some(link) = connector.last_link() {
        info!(
            "sent {} frames ({} bytes), {} silence frames injected",
            stats.frames_sent,
            link.bytes_sent.load(std::sync::atomic::Ordering::Relaxed),
            stats.silence_injected
        );
    }
    manager.shutdown();
    Ok(())
}
