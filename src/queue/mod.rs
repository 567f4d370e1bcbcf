//! `PlaybackQueue` — FIFO of tracks that resolve concurrently but play in
//! the order they were queued.
//!
//! Each `push` resolves on its own task and replaces its placeholder in
//! place, so a slow entry never lets a later one jump ahead. Advancing is
//! guarded by the shared [`PhaseCell`]: the head is inspected and the phase
//! changed under the queue lock, so at most one track is ever dispatched.

pub mod entry;
pub mod listing;
pub mod progress;
pub mod resolver;

pub use entry::{
    EntryId, MediaInfo, Playable, QueueEntry, ResolutionState, ResolvedMedia, StreamFactory,
};
pub use progress::{Progress, ProgressTracker, format_duration, progress_bar};
pub use resolver::{DirectResolver, MediaResolver};

use std::{
    collections::VecDeque,
    future::Future,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    task::{Context, Poll},
    time::Duration,
};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{
    common::{GuildId, VoiceError, VoiceResult},
    configs::QueueConfig,
    player::{
        announcer::Announcer,
        state::{PhaseCell, PlaybackPhase},
    },
};

/// Starts playback of a dequeued entry.
///
/// Called with the queue lock held; implementations hand the work off to a
/// task and return without touching the queue.
pub trait TrackPlayer: Send + Sync {
    fn play(&self, entry: &QueueEntry, info: &MediaInfo, playable: Playable) -> VoiceResult<()>;
}

/// Completes with the number of entries a `push` added once its resolution
/// settles. Dropping it does not cancel the resolution.
pub struct ResolutionHandle {
    task: JoinHandle<VoiceResult<usize>>,
}

impl Future for ResolutionHandle {
    type Output = VoiceResult<usize>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.task)
            .poll(cx)
            .map(|joined| joined.unwrap_or_else(|e| Err(VoiceError::transport(e))))
    }
}

struct Inner {
    guild_id: GuildId,
    entries: Mutex<VecDeque<QueueEntry>>,
    next_id: AtomicU64,
    phase: PhaseCell,
    progress: Mutex<ProgressTracker>,
    resolution_timeout: Duration,
    resolver: Arc<dyn MediaResolver>,
    player: Arc<dyn TrackPlayer>,
    announcer: Arc<dyn Announcer>,
}

#[derive(Clone)]
pub struct PlaybackQueue {
    inner: Arc<Inner>,
}

impl PlaybackQueue {
    pub fn new(
        guild_id: GuildId,
        config: &QueueConfig,
        resolver: Arc<dyn MediaResolver>,
        player: Arc<dyn TrackPlayer>,
        announcer: Arc<dyn Announcer>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                guild_id,
                entries: Mutex::new(VecDeque::new()),
                next_id: AtomicU64::new(1),
                phase: PhaseCell::default(),
                progress: Mutex::new(ProgressTracker::default()),
                resolution_timeout: config.resolution_timeout(),
                resolver,
                player,
                announcer,
            }),
        }
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.inner.phase.get()
    }

    fn next_id(&self) -> EntryId {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Queue `locator` and start resolving it right away.
    pub fn push(&self, locator: impl Into<String>, submitter: Option<String>) -> ResolutionHandle {
        let locator = locator.into();
        let id = self.next_id();
        self.inner
            .entries
            .lock()
            .push_back(QueueEntry::pending(id, locator.clone(), submitter.clone()));
        debug!("[{}] queued {} as entry {}", self.inner.guild_id, locator, id);

        let queue = self.clone();
        let task = tokio::spawn(async move {
            let outcome = queue.resolve(id, &locator, submitter.as_deref()).await;
            queue.advance();
            outcome
        });
        ResolutionHandle { task }
    }

    async fn resolve(
        &self,
        id: EntryId,
        locator: &str,
        submitter: Option<&str>,
    ) -> VoiceResult<usize> {
        let timeout = self.inner.resolution_timeout;
        let resolved = match tokio::time::timeout(
            timeout,
            self.inner.resolver.resolve(locator, submitter),
        )
        .await
        {
            Ok(Ok(media)) if media.is_empty() => {
                Err(VoiceError::UnsupportedSource(locator.to_string()))
            }
            Ok(result) => result,
            Err(_) => Err(VoiceError::ResolutionTimeout {
                locator: locator.to_string(),
                timeout,
            }),
        };

        let mut entries = self.inner.entries.lock();
        let Some(position) = entries.iter().position(|e| e.id == id) else {
            debug!(
                "[{}] entry {} was removed while resolving",
                self.inner.guild_id, id
            );
            return resolved.map(|_| 0);
        };

        match resolved {
            Ok(media) => {
                let Some(parent) = entries.remove(position) else {
                    return Ok(0);
                };
                let count = media.len();
                for (offset, item) in media.into_iter().enumerate() {
                    let sibling = QueueEntry::resolved(self.next_id(), &parent, item);
                    entries.insert(position + offset, sibling);
                }
                debug!(
                    "[{}] {} resolved into {} entries",
                    self.inner.guild_id, locator, count
                );
                Ok(count)
            }
            Err(e) => {
                if let Some(mut failed) = entries.remove(position) {
                    failed.state = ResolutionState::Failed;
                    warn!(
                        "[{}] dropping entry {} ({}): {}",
                        self.inner.guild_id, failed.id, failed.locator, e
                    );
                }
                Err(e)
            }
        }
    }

    /// Start the head of the queue if nothing is playing.
    ///
    /// Empty queue resets progress. A head that is still resolving is
    /// announced as loading and left in place; its resolution advances
    /// again when it completes.
    pub fn advance(&self) {
        let mut entries = self.inner.entries.lock();
        self.advance_locked(&mut entries, false);
    }

    /// `finished` is announced only when the queue runs dry right after a
    /// track, not when an advance finds nothing to do.
    fn advance_locked(&self, entries: &mut VecDeque<QueueEntry>, after_track: bool) {
        if !self.inner.phase.begin_advance() {
            return;
        }

        loop {
            let head_ready = match entries.front() {
                None => {
                    self.inner.progress.lock().reset();
                    self.inner.phase.set(PlaybackPhase::Idle);
                    if after_track {
                        self.inner.announcer.finished();
                    }
                    return;
                }
                Some(head) => head.is_ready(),
            };

            if !head_ready {
                if let Some(head) = entries.front() {
                    self.inner.announcer.loading(head);
                }
                self.inner.phase.set(PlaybackPhase::Idle);
                return;
            }

            let Some(entry) = entries.pop_front() else {
                continue;
            };
            let (Some(info), Some(playable)) = (entry.info.clone(), entry.playable.clone()) else {
                continue;
            };

            // Playing before dispatch: an end reported while `play` runs
            // must find the track it refers to.
            self.inner.phase.set(PlaybackPhase::Playing);
            self.inner.progress.lock().start(info.clone());
            match self.inner.player.play(&entry, &info, playable) {
                Ok(()) => {
                    self.inner.announcer.now_playing(&info);
                    return;
                }
                Err(e) => {
                    self.inner.phase.set(PlaybackPhase::Advancing);
                    warn!(
                        "[{}] failed to start {}: {}",
                        self.inner.guild_id, info.title, e
                    );
                    self.inner.announcer.error(Some(&info), &e);
                }
            }
        }
    }

    /// The current track ended on its own or was skipped.
    pub fn on_track_end(&self) {
        let mut entries = self.inner.entries.lock();
        let after_track = self.inner.phase.finish_playing();
        self.advance_locked(&mut entries, after_track);
    }

    /// The current track failed after it started.
    pub fn on_track_failed(&self, error: &VoiceError) {
        let info = self.inner.progress.lock().snapshot().map(|p| p.info);
        warn!("[{}] streaming failed: {}", self.inner.guild_id, error);
        self.inner.announcer.error(info.as_ref(), error);
        self.on_track_end();
    }

    /// Remove and return the entry at `index`.
    pub fn delete(&self, index: usize) -> VoiceResult<QueueEntry> {
        self.inner
            .entries
            .lock()
            .remove(index)
            .ok_or(VoiceError::NotFound(index))
    }

    /// Empties the queue. The current track keeps playing.
    pub fn clear(&self) {
        self.inner.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.lock().is_empty()
    }

    pub fn list(&self) -> Vec<QueueEntry> {
        self.inner.entries.lock().iter().cloned().collect()
    }

    pub fn page(&self, page: usize) -> Vec<String> {
        let entries = self.list();
        listing::render_page(&entries, page)
    }

    pub fn page_count(&self) -> usize {
        listing::page_count(self.len())
    }

    pub fn progress(&self) -> Option<Progress> {
        self.inner.progress.lock().snapshot()
    }

    /// Forget the current track without advancing.
    pub fn reset_progress(&self) {
        let _entries = self.inner.entries.lock();
        self.inner.progress.lock().reset();
        self.inner.phase.set(PlaybackPhase::Idle);
    }
}
