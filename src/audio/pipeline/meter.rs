//! Rolling frames-per-window counter for observability.

use std::time::Duration;

use tokio::time::Instant;

pub const METER_WINDOW: Duration = Duration::from_secs(1);

pub struct ThroughputMeter {
    window_start: Instant,
    frames: u64,
    last: Option<(u64, Duration)>,
}

impl ThroughputMeter {
    pub fn new() -> Self {
        Self {
            window_start: Instant::now(),
            frames: 0,
            last: None,
        }
    }

    pub fn record(&mut self) {
        self.frames += 1;
    }

    /// Closes the window once it is at least [`METER_WINDOW`] old and returns
    /// `(frames, elapsed)` for it.
    pub fn poll(&mut self) -> Option<(u64, Duration)> {
        let elapsed = self.window_start.elapsed();
        if elapsed < METER_WINDOW {
            return None;
        }
        let window = (self.frames, elapsed);
        self.frames = 0;
        self.window_start = Instant::now();
        self.last = Some(window);
        Some(window)
    }

    /// The most recently closed window.
    pub fn last_window(&self) -> Option<(u64, Duration)> {
        self.last
    }
}

impl Default for ThroughputMeter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn reports_once_per_window() {
        let mut meter = ThroughputMeter::new();
        for _ in 0..10 {
            meter.record();
        }
        assert_eq!(meter.poll(), None);

        tokio::time::advance(Duration::from_millis(1_000)).await;
        let (frames, elapsed) = meter.poll().unwrap();
        assert_eq!(frames, 10);
        assert!(elapsed >= METER_WINDOW);
        assert_eq!(meter.poll(), None);
        assert_eq!(meter.last_window().map(|w| w.0), Some(10));
    }
}
