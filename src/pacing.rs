//! Frame pacing.
//!
//! [`FpsController`] schedules frames on a fixed grid anchored at the first
//! frame: frame `k` is due at `start + k / target_fps`. A frame that is
//! already late gets a zero wait and the schedule re-anchors on the grid
//! slot that "now" falls in. Lost time is never made up with a burst of
//! zero waits, and never paid back with a longer sleep.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct FpsController {
    target_fps: f64,
    interval: Duration,
    start: Option<Instant>,
    /// Grid slot of the most recently scheduled frame
    slot: u64,
    window: VecDeque<Instant>,
    window_size: usize,
    average_fps: f64,
    fps: f64,
}

impl FpsController {
    pub fn new(target_fps: f64) -> Self {
        let target_fps = if target_fps.is_finite() && target_fps > 0.0 {
            target_fps
        } else {
            25.0
        };
        // two seconds of history
        let window_size = ((target_fps * 2.0).ceil() as usize).max(2);
        Self::with_window(target_fps, window_size)
    }

    pub fn with_window(target_fps: f64, window_size: usize) -> Self {
        Self {
            target_fps,
            interval: Duration::from_secs_f64(1.0 / target_fps),
            start: None,
            slot: 0,
            window: VecDeque::with_capacity(window_size.max(2)),
            window_size: window_size.max(2),
            average_fps: 0.0,
            fps: 0.0,
        }
    }

    pub fn target_fps(&self) -> f64 {
        self.target_fps
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Average rate over the rolling window
    pub fn average_fps(&self) -> f64 {
        self.average_fps
    }

    /// Rate implied by the last two updates
    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Time to wait before emitting the next frame. Does not sleep.
    pub fn wait_next_frame(&mut self) -> Duration {
        self.wait_next_frame_at(Instant::now())
    }

    /// Sleep the current thread until the next frame is due
    pub fn wait_next_frame_blocking(&mut self) -> Duration {
        let sleep = self.wait_next_frame();
        if !sleep.is_zero() {
            std::thread::sleep(sleep);
        }
        sleep
    }

    pub fn wait_next_frame_at(&mut self, now: Instant) -> Duration {
        let start = match self.start {
            Some(start) => start,
            None => {
                self.start = Some(now);
                self.slot = 0;
                return Duration::ZERO;
            }
        };

        let interval_ns = self.interval.as_nanos().max(1);
        self.slot += 1;
        let deadline = start + Duration::from_nanos((self.slot as u128 * interval_ns) as u64);

        if now >= deadline {
            let elapsed_ns = now.saturating_duration_since(start).as_nanos();
            self.slot = self.slot.max((elapsed_ns / interval_ns) as u64);
            return Duration::ZERO;
        }

        deadline - now
    }

    /// Record that a frame was emitted now
    pub fn update(&mut self) {
        self.update_at(Instant::now());
    }

    pub fn update_at(&mut self, now: Instant) {
        if let Some(&last) = self.window.back() {
            let delta = now.saturating_duration_since(last).as_secs_f64();
            if delta > 0.0 {
                self.fps = 1.0 / delta;
            }
        }

        self.window.push_back(now);
        while self.window.len() > self.window_size {
            self.window.pop_front();
        }

        if let (Some(&first), Some(&last)) = (self.window.front(), self.window.back()) {
            let span = last.saturating_duration_since(first).as_secs_f64();
            if span > 0.0 {
                self.average_fps = (self.window.len() - 1) as f64 / span;
            }
        }
    }

    /// Forget the session anchor and history
    pub fn reset(&mut self) {
        self.start = None;
        self.slot = 0;
        self.window.clear();
        self.average_fps = 0.0;
        self.fps = 0.0;
    }
}
