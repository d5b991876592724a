//! Interpolation.
//!
//! The feed sends discrete driver locations every few seconds.
//! The client renders at its own rate and eases between confirmed locations.
//!
//! Everything here is stateless except `PositionAnimation`, which only tracks
//! its own start time and cancellation flag.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use ride_shared::location::Position;
use ride_shared::math::shortest_angle_delta;
pub use ride_shared::math::{
    cubic_bezier, ease_in_out_cubic, ease_out_cubic, lerp, normalize_heading, Easing, Vec2,
};

use crate::frame::{Clock, FrameStatus, FrameTask};

/// Interpolated rendering state for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationFrame {
    pub lat: f64,
    pub lng: f64,
    pub heading: f64,
}

impl From<Position> for AnimationFrame {
    fn from(p: Position) -> Self {
        Self {
            lat: p.lat,
            lng: p.lng,
            heading: p.heading.unwrap_or(0.0),
        }
    }
}

/// Eases `t`, then interpolates lat and lng independently.
///
/// The timestamp is interpolated linearly; heading is left to
/// [`interpolate_heading`] and is `None` on the result.
pub fn interpolate_position(from: &Position, to: &Position, t: f64, easing: Easing) -> Position {
    let e = easing.apply(t);
    Position {
        lat: lerp(from.lat, to.lat, e),
        lng: lerp(from.lng, to.lng, e),
        heading: None,
        timestamp: lerp(from.timestamp as f64, to.timestamp as f64, t).round() as i64,
    }
}

/// Rotates from `from` toward `to` along the shorter arc, eased out.
pub fn interpolate_heading(from: f64, to: f64, t: f64) -> f64 {
    let from = normalize_heading(from);
    let diff = shortest_angle_delta(from, to);
    normalize_heading(from + diff * ease_out_cubic(t))
}

/// One timed transition between two locations.
#[derive(Debug, Clone, Copy)]
pub struct Transition {
    pub from: Position,
    pub to: Position,
    pub from_heading: f64,
    pub to_heading: f64,
    pub start_ms: f64,
    pub duration_ms: f64,
    pub easing: Easing,
}

impl Transition {
    pub fn new(from: Position, to: Position, start_ms: f64, duration_ms: f64) -> Self {
        Self {
            from,
            to,
            from_heading: from.heading.unwrap_or(0.0),
            to_heading: to.heading.unwrap_or(0.0),
            start_ms,
            duration_ms,
            easing: Easing::EaseOut,
        }
    }

    pub fn with_headings(mut self, from_heading: f64, to_heading: f64) -> Self {
        self.from_heading = from_heading;
        self.to_heading = to_heading;
        self
    }

    pub fn with_easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }

    /// Progress in $[0,1]$ at `now_ms`. Non-positive durations are already complete.
    pub fn progress(&self, now_ms: f64) -> f64 {
        if self.duration_ms <= 0.0 {
            return 1.0;
        }
        ((now_ms - self.start_ms) / self.duration_ms).clamp(0.0, 1.0)
    }

    /// Samples the transition; returns the in-between position and its progress.
    pub fn sample(&self, now_ms: f64) -> (Position, f64) {
        let progress = self.progress(now_ms);
        let mut position = interpolate_position(&self.from, &self.to, progress, self.easing);
        position.heading = Some(interpolate_heading(
            self.from_heading,
            self.to_heading,
            progress,
        ));
        (position, progress)
    }
}

/// Cancellation handle for a running animation.
///
/// Once cancelled, the animation invokes no further callbacks, including a
/// frame that was already due.
#[derive(Debug, Clone, Default)]
pub struct AnimationHandle {
    cancelled: Arc<AtomicBool>,
}

impl AnimationHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Frame-driven animation between two positions with update/complete callbacks.
pub struct PositionAnimation<U, C>
where
    U: FnMut(AnimationFrame),
    C: FnOnce(),
{
    transition: Transition,
    on_update: U,
    on_complete: Option<C>,
    handle: AnimationHandle,
}

impl<U, C> PositionAnimation<U, C>
where
    U: FnMut(AnimationFrame),
    C: FnOnce(),
{
    pub fn handle(&self) -> AnimationHandle {
        self.handle.clone()
    }
}

impl<U, C> FrameTask for PositionAnimation<U, C>
where
    U: FnMut(AnimationFrame),
    C: FnOnce(),
{
    fn on_frame(&mut self, now_ms: f64) -> FrameStatus {
        if self.handle.is_cancelled() || self.on_complete.is_none() {
            return FrameStatus::Done;
        }
        let (position, progress) = self.transition.sample(now_ms);
        (self.on_update)(AnimationFrame::from(position));
        if progress < 1.0 {
            return FrameStatus::Continue;
        }
        if let Some(done) = self.on_complete.take() {
            done();
        }
        FrameStatus::Done
    }
}

/// Builds an ease-out animation from `from` to `to` starting now on `clock`.
///
/// Drive it with a `FrameLoop`; stop it early through [`PositionAnimation::handle`].
pub fn animate_position<U, C>(
    from: Position,
    to: Position,
    duration_ms: f64,
    clock: &dyn Clock,
    on_update: U,
    on_complete: C,
) -> PositionAnimation<U, C>
where
    U: FnMut(AnimationFrame),
    C: FnOnce(),
{
    PositionAnimation {
        transition: Transition::new(from, to, clock.now_ms(), duration_ms),
        on_update,
        on_complete: Some(on_complete),
        handle: AnimationHandle::default(),
    }
}
