//! Elapsed-time tracking and rendering for the current track.

use std::time::Duration;

use tokio::time::Instant;

use super::entry::MediaInfo;
use crate::audio::constants::PROGRESS_BAR_LENGTH;

const PROGRESS_MARKER: char = '●';

/// `m:ss`, or `h:mm:ss` from one hour up.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// Dashes with a marker after `floor(elapsed / duration × 16)` of them.
pub fn progress_bar(elapsed: Duration, duration: Duration) -> String {
    let factor = if duration.is_zero() {
        0.0
    } else {
        (elapsed.as_secs() as f64 / duration.as_secs_f64()).min(1.0)
    };
    let filled = (factor * PROGRESS_BAR_LENGTH as f64).floor() as usize;

    let mut bar = String::with_capacity(PROGRESS_BAR_LENGTH + 4);
    bar.extend(std::iter::repeat_n('-', filled));
    bar.push(PROGRESS_MARKER);
    bar.extend(std::iter::repeat_n('-', PROGRESS_BAR_LENGTH - filled));
    bar
}

#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub info: MediaInfo,
    pub elapsed: Duration,
}

impl Progress {
    /// `1:05 ----●------------ 3:00`
    pub fn render(&self) -> String {
        let elapsed = Duration::from_secs(self.elapsed.as_secs());
        format!(
            "{} {} {}",
            format_duration(elapsed),
            progress_bar(elapsed, self.info.duration),
            format_duration(self.info.duration)
        )
    }
}

#[derive(Debug, Default)]
pub struct ProgressTracker {
    current: Option<(MediaInfo, Instant)>,
}

impl ProgressTracker {
    pub fn start(&mut self, info: MediaInfo) {
        self.current = Some((info, Instant::now()));
    }

    pub fn reset(&mut self) {
        self.current = None;
    }

    pub fn snapshot(&self) -> Option<Progress> {
        self.current.as_ref().map(|(info, started)| Progress {
            info: info.clone(),
            elapsed: started.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_switch_to_hours() {
        assert_eq!(format_duration(Duration::from_secs(0)), "0:00");
        assert_eq!(format_duration(Duration::from_secs(65)), "1:05");
        assert_eq!(format_duration(Duration::from_secs(3_600)), "1:00:00");
        assert_eq!(format_duration(Duration::from_secs(3_725)), "1:02:05");
    }

    #[test]
    fn marker_position_is_floored() {
        let bar = progress_bar(Duration::from_secs(59), Duration::from_secs(240));
        assert_eq!(bar.chars().position(|c| c == PROGRESS_MARKER), Some(3));
        assert_eq!(bar.chars().count(), PROGRESS_BAR_LENGTH + 1);

        let done = progress_bar(Duration::from_secs(500), Duration::from_secs(240));
        assert_eq!(done.chars().last(), Some(PROGRESS_MARKER));

        let live = progress_bar(Duration::from_secs(30), Duration::ZERO);
        assert!(live.starts_with(PROGRESS_MARKER));
    }

    #[tokio::test(start_paused = true)]
    async fn tracker_follows_the_clock() {
        let mut tracker = ProgressTracker::default();
        assert!(tracker.snapshot().is_none());

        tracker.start(MediaInfo {
            title: "Song".into(),
            duration: Duration::from_secs(180),
            ..Default::default()
        });
        tokio::time::sleep(Duration::from_secs(65)).await;

        let progress = tracker.snapshot().unwrap();
        assert_eq!(progress.render(), "1:05 -----●----------- 3:00");

        tracker.reset();
        assert!(tracker.snapshot().is_none());
    }
}
