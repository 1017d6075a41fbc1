//! Playback FPS tracker.
//!
//! A small per-window counter reset at each session start, read-only
//! outside the tick that updates it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

/// Tracks how many playback-clock ticks have been emitted since the current
/// session started, for diagnostic FPS reporting.
pub struct FpsTracker {
    window_start: Mutex<Option<Instant>>,
    ticks: AtomicU64,
}

impl FpsTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            window_start: Mutex::new(None),
            ticks: AtomicU64::new(0),
        }
    }

    /// Marks the start of a new session, resetting the window even if a
    /// prior session already called this — a reconnect mid-`PersonaShared`
    /// lifetime must not keep the stale window start from before it.
    pub fn start(&self) {
        *self.window_start.lock() = Some(Instant::now());
        self.ticks.store(0, Ordering::Release);
    }

    /// Records one playback-clock tick.
    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::AcqRel);
    }

    /// Current observed frames-per-second since the last `start()`, or
    /// `None` before the session has started or before any time has passed.
    #[must_use]
    pub fn current_fps(&self) -> Option<f64> {
        let start = (*self.window_start.lock())?;
        let elapsed = start.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            return None;
        }
        Some(self.ticks.load(Ordering::Acquire) as f64 / elapsed)
    }
}

impl Default for FpsTracker {
    fn default() -> Self {
        Self::new()
    }
}
