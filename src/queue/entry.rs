use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::{audio::transcode::MediaStream, common::VoiceResult};

pub type EntryId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    Pending,
    Ready,
    Failed,
}

/// What the announcer and the queue listing show for a track.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MediaInfo {
    pub title: String,
    pub author: String,
    /// Zero when the length is unknown (live streams).
    pub duration: Duration,
    pub url: String,
    pub cover: Option<String>,
    pub submitter: Option<String>,
}

/// Opens the byte stream of a track. Invoked only when the track starts.
#[async_trait]
pub trait StreamFactory: Send + Sync {
    async fn open(&self) -> VoiceResult<MediaStream>;
}

#[derive(Clone)]
pub enum Playable {
    /// File path or URL the transcoder can open by itself.
    Locator(String),
    /// Bytes fetched by us and piped into the transcoder.
    Fetch(Arc<dyn StreamFactory>),
}

impl fmt::Debug for Playable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Locator(locator) => f.debug_tuple("Locator").field(locator).finish(),
            Self::Fetch(_) => f.write_str("Fetch(..)"),
        }
    }
}

/// One playable item produced by a resolver.
#[derive(Debug, Clone)]
pub struct ResolvedMedia {
    pub info: MediaInfo,
    pub playable: Playable,
}

#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub id: EntryId,
    pub locator: String,
    pub submitter: Option<String>,
    pub state: ResolutionState,
    pub info: Option<MediaInfo>,
    pub playable: Option<Playable>,
}

impl QueueEntry {
    pub(super) fn pending(id: EntryId, locator: String, submitter: Option<String>) -> Self {
        Self {
            id,
            locator,
            submitter,
            state: ResolutionState::Pending,
            info: None,
            playable: None,
        }
    }

    pub(super) fn resolved(id: EntryId, parent: &QueueEntry, media: ResolvedMedia) -> Self {
        let mut info = media.info;
        if info.submitter.is_none() {
            info.submitter = parent.submitter.clone();
        }
        Self {
            id,
            locator: parent.locator.clone(),
            submitter: info.submitter.clone(),
            state: ResolutionState::Ready,
            info: Some(info),
            playable: Some(media.playable),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == ResolutionState::Ready
    }

    /// Title for display, falling back to the locator while resolving.
    pub fn title(&self) -> &str {
        self.info
            .as_ref()
            .map(|i| i.title.as_str())
            .unwrap_or(&self.locator)
    }
}
