//! Frame scheduling.
//!
//! Rendering runs at its own cadence, independent of how often the feed
//! reports. A `FrameLoop` ticks at roughly the display refresh rate and hands
//! each `FrameTask` a monotonic timestamp in milliseconds.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use tokio::time::{self, Interval, MissedTickBehavior};

/// Monotonic millisecond clock.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> f64;
}

/// Wall-independent clock backed by `Instant`.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Hand-advanced clock for deterministic tests and replays.
///
/// Clones share the same reading.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_ms: f64) -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(start_ms.to_bits())),
        }
    }

    pub fn set(&self, ms: f64) {
        self.bits.store(ms.to_bits(), Ordering::SeqCst);
    }

    pub fn advance(&self, ms: f64) {
        self.set(self.now_ms() + ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}

/// Whether a task wants another frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Continue,
    Done,
}

/// Something advanced once per rendered frame.
pub trait FrameTask {
    fn on_frame(&mut self, now_ms: f64) -> FrameStatus;
}

/// Periodic frame source.
pub struct FrameLoop {
    clock: Arc<dyn Clock>,
    interval: Interval,
}

impl FrameLoop {
    pub fn new(clock: Arc<dyn Clock>, frame_rate_hz: u32) -> Self {
        let mut interval = time::interval(frame_period(frame_rate_hz));
        // A stalled renderer should resume at the current time, not replay frames.
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { clock, interval }
    }

    /// Waits for the next frame boundary and returns the clock reading.
    pub async fn next_frame(&mut self) -> f64 {
        self.interval.tick().await;
        self.clock.now_ms()
    }

    /// Drives `task` until it reports `Done`.
    pub async fn run<T: FrameTask + ?Sized>(&mut self, task: &mut T) {
        loop {
            let now = self.next_frame().await;
            if task.on_frame(now) == FrameStatus::Done {
                break;
            }
        }
    }
}

/// Period of one frame; zero rates fall back to 60 Hz.
pub fn frame_period(frame_rate_hz: u32) -> Duration {
    let hz = if frame_rate_hz == 0 { 60 } else { frame_rate_hz };
    Duration::from_secs_f64(1.0 / hz as f64)
}
