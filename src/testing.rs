//! Fakes shared by the unit tests.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    audio::{codec::FrameEncoder, constants::DEFAULT_BITRATE, pipeline::FrameSink},
    common::{VoiceError, VoiceResult},
    player::announcer::Announcer,
    queue::{MediaInfo, MediaResolver, Playable, QueueEntry, ResolvedMedia, TrackPlayer},
};

/// Emits the frame's PCM bytes unchanged, so tests can compare output to input.
pub struct RawEncoder {
    bitrate: i32,
}

impl RawEncoder {
    pub fn boxed() -> Box<dyn FrameEncoder> {
        Box::new(Self {
            bitrate: DEFAULT_BITRATE,
        })
    }
}

impl FrameEncoder for RawEncoder {
    fn encode(&mut self, pcm: &[i16]) -> VoiceResult<Vec<u8>> {
        Ok(pcm.iter().flat_map(|s| s.to_le_bytes()).collect())
    }

    fn set_bitrate(&mut self, bps: i32) -> VoiceResult<()> {
        self.bitrate = bps;
        Ok(())
    }

    fn bitrate(&self) -> Option<i32> {
        Some(self.bitrate)
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub frames: Mutex<Vec<Vec<u8>>>,
    pub silences: AtomicU64,
    pub closes: AtomicU64,
}

impl FrameSink for RecordingSink {
    fn send_frame(&self, packet: &[u8]) {
        self.frames.lock().push(packet.to_vec());
    }

    fn send_silence(&self) {
        self.silences.fetch_add(1, Ordering::Relaxed);
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::Relaxed);
    }
}

enum Script {
    Tracks(Vec<String>),
    Fail(VoiceError),
}

/// Resolves each locator after a fixed delay into titled locator tracks.
#[derive(Default)]
pub struct ScriptedResolver {
    scripts: Mutex<HashMap<String, (Duration, Script)>>,
}

impl ScriptedResolver {
    pub fn track(&self, locator: &str, delay: Duration, titles: &[&str]) {
        let titles = titles.iter().map(|t| t.to_string()).collect();
        self.scripts
            .lock()
            .insert(locator.to_string(), (delay, Script::Tracks(titles)));
    }

    pub fn fail(&self, locator: &str, delay: Duration, error: VoiceError) {
        self.scripts
            .lock()
            .insert(locator.to_string(), (delay, Script::Fail(error)));
    }
}

pub fn media(title: &str, duration: Duration) -> ResolvedMedia {
    ResolvedMedia {
        info: MediaInfo {
            title: title.to_string(),
            author: "tester".into(),
            duration,
            url: format!("test://{title}"),
            cover: None,
            submitter: None,
        },
        playable: Playable::Locator(format!("test://{title}")),
    }
}

#[async_trait]
impl MediaResolver for ScriptedResolver {
    async fn resolve(
        &self,
        locator: &str,
        _submitter: Option<&str>,
    ) -> VoiceResult<Vec<ResolvedMedia>> {
        let script = {
            let scripts = self.scripts.lock();
            scripts.get(locator).map(|(delay, script)| {
                let outcome = match script {
                    Script::Tracks(titles) => Ok(titles
                        .iter()
                        .map(|t| media(t, Duration::from_secs(120)))
                        .collect()),
                    Script::Fail(e) => Err(e.clone()),
                };
                (*delay, outcome)
            })
        };
        let Some((delay, outcome)) = script else {
            return Err(VoiceError::UnsupportedSource(locator.to_string()));
        };
        tokio::time::sleep(delay).await;
        outcome
    }
}

/// Records started titles; refuses the ones marked with `reject`.
#[derive(Default)]
pub struct RecordingPlayer {
    played: Mutex<Vec<String>>,
    rejected: Mutex<Vec<String>>,
}

impl RecordingPlayer {
    pub fn reject(&self, title: &str) {
        self.rejected.lock().push(title.to_string());
    }

    pub fn played(&self) -> Vec<String> {
        self.played.lock().clone()
    }
}

impl TrackPlayer for RecordingPlayer {
    fn play(&self, _entry: &QueueEntry, info: &MediaInfo, _playable: Playable) -> VoiceResult<()> {
        if self.rejected.lock().contains(&info.title) {
            return Err(VoiceError::Streaming(format!("cannot open {}", info.title)));
        }
        self.played.lock().push(info.title.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingAnnouncer {
    events: Mutex<Vec<String>>,
}

impl RecordingAnnouncer {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

impl Announcer for RecordingAnnouncer {
    fn loading(&self, entry: &QueueEntry) {
        self.events.lock().push(format!("loading {}", entry.locator));
    }

    fn now_playing(&self, info: &MediaInfo) {
        self.events.lock().push(format!("playing {}", info.title));
    }

    fn error(&self, info: Option<&MediaInfo>, error: &VoiceError) {
        let title = info.map(|i| i.title.as_str()).unwrap_or("-");
        self.events.lock().push(format!("error {} {}", title, error));
    }

    fn finished(&self) {
        self.events.lock().push("finished".to_string());
    }
}
