//! Clock and timing utilities for the render loop.
//!
//! Picture and sound are anchored to a single epoch recorded when a
//! composition run starts. This module provides:
//! - The [`RenderClock`] that reports elapsed seconds since that epoch
//! - The [`FrameClock`] abstraction so the render loop can run against a
//!   real wall clock or a manually stepped test clock
//! - Frame pacing against the clock rather than the callback cadence

use std::time::{Duration, Instant};

/// A render clock that provides monotonic timestamps relative to
/// a fixed epoch (the moment the run started).
#[derive(Debug, Clone)]
pub struct RenderClock {
    /// The instant the run started.
    epoch: Instant,

    /// Wall-clock time at epoch (RFC 3339 string).
    epoch_wall: String,
}

impl RenderClock {
    /// Create a new render clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Get nanoseconds elapsed since the run started.
    pub fn elapsed_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    /// Get seconds elapsed since the run started.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Wall-clock time at run start.
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }

    /// Convert an elapsed nanosecond value to seconds.
    pub fn ns_to_secs(ns: u64) -> f64 {
        ns as f64 / 1_000_000_000.0
    }

    /// Convert seconds to nanoseconds, rounding to the nearest nanosecond.
    pub fn secs_to_ns(secs: f64) -> u64 {
        (secs * 1_000_000_000.0).round().max(0.0) as u64
    }
}

/// Source of "now" for the render loop.
///
/// `start` is called once per run, in the same synchronous block that
/// schedules the audio envelope, so both share one origin.
pub trait FrameClock {
    /// Re-anchor the clock. Subsequent `now_secs` calls are relative to this.
    fn start(&mut self);

    /// Seconds elapsed since `start`.
    fn now_secs(&self) -> f64;

    /// Yield until roughly the next display refresh. Implementations must
    /// make progress: `now_secs` after this call is never smaller.
    fn wait_next_tick(&mut self, interval: Duration);
}

/// Wall-clock frame clock backed by [`RenderClock`].
#[derive(Debug, Default)]
pub struct SystemFrameClock {
    clock: Option<RenderClock>,
    last_tick: Option<Instant>,
}

impl SystemFrameClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameClock for SystemFrameClock {
    fn start(&mut self) {
        let clock = RenderClock::start();
        tracing::debug!(epoch_wall = %clock.epoch_wall(), "Render clock started");
        self.clock = Some(clock);
        self.last_tick = Some(Instant::now());
    }

    fn now_secs(&self) -> f64 {
        self.clock.as_ref().map_or(0.0, RenderClock::elapsed_secs)
    }

    fn wait_next_tick(&mut self, interval: Duration) {
        let now = Instant::now();
        if let Some(last) = self.last_tick {
            let due = last + interval;
            if due > now {
                std::thread::sleep(due - now);
            }
        }
        self.last_tick = Some(Instant::now());
    }
}

/// Deterministic clock for tests: every tick advances by a fixed step.
#[derive(Debug, Clone)]
pub struct ManualFrameClock {
    now: f64,
    step: f64,
    ticks: u64,
}

impl ManualFrameClock {
    /// Create a clock that advances `step_secs` on every tick.
    pub fn new(step_secs: f64) -> Self {
        Self {
            now: 0.0,
            step: step_secs,
            ticks: 0,
        }
    }

    /// Number of ticks observed since the last `start`.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

impl FrameClock for ManualFrameClock {
    fn start(&mut self) {
        self.now = 0.0;
        self.ticks = 0;
    }

    fn now_secs(&self) -> f64 {
        self.now
    }

    fn wait_next_tick(&mut self, _interval: Duration) {
        self.ticks += 1;
        self.now += self.step;
    }
}

/// Maps clock time onto a fixed output frame grid.
///
/// The render loop may be called back late or irregularly; the pacer tells
/// it how many output frame slots elapsed since the previous tick so the
/// encoded stream stays aligned with the clock.
#[derive(Debug)]
pub struct FramePacer {
    fps: u32,
    emitted: u64,
}

impl FramePacer {
    /// Create a pacer targeting the given frame rate.
    pub fn new(fps: u32) -> Self {
        Self {
            fps: fps.max(1),
            emitted: 0,
        }
    }

    /// Interval between frame slots.
    pub fn interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.fps as u64)
    }

    /// Frames emitted so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Number of frame slots due at `now_secs`, capped at `total_frames`.
    /// Marks them as emitted.
    pub fn take_due(&mut self, now_secs: f64, total_frames: u64) -> u64 {
        let due = ((now_secs.max(0.0) * self.fps as f64).floor() as u64 + 1).min(total_frames);
        let count = due.saturating_sub(self.emitted);
        self.emitted += count;
        count
    }

    /// Number of frames covering `duration_secs`.
    pub fn total_frames(&self, duration_secs: f64) -> u64 {
        (duration_secs * self.fps as f64).round().max(1.0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_elapsed() {
        let clock = RenderClock::start();
        assert!(clock.elapsed_ns() < 1_000_000_000);
    }

    #[test]
    fn test_ns_to_secs_conversion() {
        assert!((RenderClock::ns_to_secs(1_500_000_000) - 1.5).abs() < 1e-9);
        assert_eq!(RenderClock::secs_to_ns(2.0), 2_000_000_000);
        assert_eq!(RenderClock::secs_to_ns(-1.0), 0);
    }

    #[test]
    fn test_manual_clock_advances_per_tick() {
        let mut clock = ManualFrameClock::new(0.5);
        clock.start();
        assert_eq!(clock.now_secs(), 0.0);
        clock.wait_next_tick(Duration::from_millis(33));
        clock.wait_next_tick(Duration::from_millis(33));
        assert!((clock.now_secs() - 1.0).abs() < 1e-12);
        assert_eq!(clock.ticks(), 2);
        clock.start();
        assert_eq!(clock.now_secs(), 0.0);
    }

    #[test]
    fn test_pacer_fills_dropped_slots() {
        let mut pacer = FramePacer::new(30);
        let total = pacer.total_frames(2.0);
        assert_eq!(total, 60);
        assert_eq!(pacer.take_due(0.0, total), 1);
        assert_eq!(pacer.take_due(0.01, total), 0);
        // A late callback covers every slot that elapsed meanwhile.
        assert_eq!(pacer.take_due(0.2, total), 6);
        assert_eq!(pacer.take_due(10.0, total), 53);
        assert_eq!(pacer.emitted(), total);
    }
}
