//! Frame clock with a smoothing window.
//!
//! [`FrameClock::tick`] reads the current time, records the raw delta since the
//! previous tick into a fixed-size ring buffer (milliseconds) and recomputes
//! the smoothed delta as the buffer's mean. The buffer starts filled with the
//! target frame time, so the first frames after start or [`reset`] behave as
//! if the game had been running at target speed.
//!
//! Time comes from a [`TimeSource`]; tests drive the clock with
//! [`ManualTime`].
//!
//! [`reset`]: FrameClock::reset

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

use crate::config::ClockConfig;

// ---------------------------------------------------------------------------
// TimeSource
// ---------------------------------------------------------------------------

/// A monotonic millisecond clock.
pub trait TimeSource {
    /// Milliseconds since an arbitrary fixed origin.
    fn now_ms(&self) -> f64;
}

/// Wall-clock time from [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicTime {
    origin: Instant,
}

impl MonotonicTime {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicTime {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicTime {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualTime {
    now: Rc<Cell<f64>>,
}

impl ManualTime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward by `ms`.
    pub fn advance(&self, ms: f64) {
        self.now.set(self.now.get() + ms);
    }

    /// Jump to an absolute time.
    pub fn set(&self, ms: f64) {
        self.now.set(ms);
    }
}

impl TimeSource for ManualTime {
    fn now_ms(&self) -> f64 {
        self.now.get()
    }
}

// ---------------------------------------------------------------------------
// FrameClock
// ---------------------------------------------------------------------------

/// Variable-step timer producing a smoothed delta.
pub struct FrameClock {
    time: Box<dyn TimeSource>,
    target_fps: f64,
    /// Milliseconds.
    target_frame_time: f64,
    slow_factor: f64,
    last: f64,
    frame_count: u64,
    /// Milliseconds.
    raw_delta: f64,
    /// Milliseconds.
    smoothed_delta: f64,
    buffer: Vec<f64>,
    cursor: usize,
}

impl FrameClock {
    /// A clock on wall-clock time.
    pub fn new(config: &ClockConfig) -> Self {
        Self::with_time_source(config, Box::new(MonotonicTime::new()))
    }

    /// A clock reading from `time`.
    pub fn with_time_source(config: &ClockConfig, time: Box<dyn TimeSource>) -> Self {
        let target_frame_time = 1000.0 / config.target_fps;
        let window = config.smoothing_window.max(1);
        let last = time.now_ms();
        Self {
            time,
            target_fps: config.target_fps,
            target_frame_time,
            slow_factor: config.slow_factor,
            last,
            frame_count: 0,
            raw_delta: 0.0,
            smoothed_delta: target_frame_time,
            buffer: vec![target_frame_time; window],
            cursor: 0,
        }
    }

    /// Advance one frame.
    pub fn tick(&mut self) {
        let now = self.time.now_ms();
        self.raw_delta = (now - self.last).max(0.0);
        self.last = now;
        self.frame_count += 1;

        self.buffer[self.cursor] = self.raw_delta;
        self.cursor = (self.cursor + 1) % self.buffer.len();
        self.smoothed_delta = self.buffer.iter().sum::<f64>() / self.buffer.len() as f64;
    }

    /// Restart timing from now, as if the game had been running at target
    /// speed.
    pub fn reset(&mut self) {
        self.last = self.time.now_ms();
        self.frame_count = 0;
        self.raw_delta = 0.0;
        self.buffer.fill(self.target_frame_time);
        self.cursor = 0;
        self.smoothed_delta = self.target_frame_time;
    }

    /// Last raw delta in seconds.
    pub fn raw_delta(&self) -> f64 {
        self.raw_delta / 1000.0
    }

    /// Smoothed delta in seconds.
    pub fn smoothed_delta(&self) -> f64 {
        self.smoothed_delta / 1000.0
    }

    /// Instantaneous frames per second; 0 before the first tick.
    pub fn fps(&self) -> f64 {
        if self.raw_delta > 0.0 {
            1000.0 / self.raw_delta
        } else {
            0.0
        }
    }

    pub fn smoothed_fps(&self) -> f64 {
        if self.smoothed_delta > 0.0 {
            1000.0 / self.smoothed_delta
        } else {
            0.0
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn target_fps(&self) -> f64 {
        self.target_fps
    }

    /// Change the target. Buffered samples are kept.
    pub fn set_target_fps(&mut self, fps: f64) {
        if fps > 0.0 && fps.is_finite() {
            self.target_fps = fps;
            self.target_frame_time = 1000.0 / fps;
        } else {
            tracing::warn!(fps, "ignoring non-positive target fps");
        }
    }

    /// Target frame time in seconds.
    pub fn target_frame_time(&self) -> f64 {
        self.target_frame_time / 1000.0
    }

    /// Whether the smoothed delta exceeds the slow threshold. A degradation
    /// signal only.
    pub fn is_running_slowly(&self) -> bool {
        self.smoothed_delta > self.target_frame_time * self.slow_factor
    }

    /// Target over smoothed frame time; above 1 means faster than target.
    pub fn performance_ratio(&self) -> f64 {
        if self.smoothed_delta > 0.0 {
            self.target_frame_time / self.smoothed_delta
        } else {
            0.0
        }
    }

    /// Current time of the underlying source, in milliseconds.
    pub fn now_ms(&self) -> f64 {
        self.time.now_ms()
    }
}

impl std::fmt::Debug for FrameClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameClock")
            .field("target_fps", &self.target_fps)
            .field("frame_count", &self.frame_count)
            .field("smoothed_delta_ms", &self.smoothed_delta)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual_clock() -> (FrameClock, ManualTime) {
        let time = ManualTime::new();
        let clock = FrameClock::with_time_source(&ClockConfig::default(), Box::new(time.clone()));
        (clock, time)
    }

    #[test]
    fn starts_at_target() {
        let (clock, _) = manual_clock();
        assert!((clock.smoothed_delta() - 1.0 / 60.0).abs() < 1e-12);
        assert_eq!(clock.fps(), 0.0);
        assert!(!clock.is_running_slowly());
    }

    #[test]
    fn raw_delta_and_fps() {
        let (mut clock, time) = manual_clock();
        time.advance(20.0);
        clock.tick();
        assert!((clock.raw_delta() - 0.02).abs() < 1e-12);
        assert!((clock.fps() - 50.0).abs() < 1e-9);
        assert_eq!(clock.frame_count(), 1);
    }

    #[test]
    fn slow_frames_are_flagged() {
        let (mut clock, time) = manual_clock();
        for _ in 0..10 {
            time.advance(40.0);
            clock.tick();
        }
        assert!(clock.is_running_slowly());
        assert!(clock.performance_ratio() < 1.0);
    }

    #[test]
    fn set_target_fps_ignores_nonsense() {
        let (mut clock, _) = manual_clock();
        clock.set_target_fps(0.0);
        assert_eq!(clock.target_fps(), 60.0);
        clock.set_target_fps(30.0);
        assert!((clock.target_frame_time() - 1.0 / 30.0).abs() < 1e-12);
    }
}
