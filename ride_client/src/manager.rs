//! Tracking state machine.
//!
//! `TrackingManager` owns everything the renderer needs for one ride: the
//! displayed position and heading, the confirmed target, ETA metadata, and a
//! `Predictor` fed with every confirmed sample.
//!
//! All mutation happens in one of three places, never concurrently:
//! - `update_location` (a new confirmed sample),
//! - the animation step of `on_frame`,
//! - the prediction step of `on_frame`.
//!
//! Lifecycle is `Idle -> Running -> Stopped`, with `Destroyed` terminal. Once
//! destroyed every call is a no-op and no callback fires again.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use ride_shared::{
    config::TrackingConfig,
    error::TrackingError,
    event::{EtaUpdate, PositionUpdate, UpdateKind},
    location::{wall_clock_ms, LocationUpdate, Position},
    math::{lerp, normalize_heading, shortest_angle_delta},
};

use crate::{
    frame::{Clock, FrameStatus, FrameTask, SystemClock},
    interp::Transition,
    predict::Predictor,
};

/// Prediction starts once this fraction of the animation duration has passed
/// without a new confirmed sample.
pub const PREDICTION_THRESHOLD: f64 = 0.8;

/// Upper bound for the per-frame blend toward the predicted point.
pub const MAX_PREDICTION_BLEND: f64 = 0.3;

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Idle,
    Running,
    Stopped,
    Destroyed,
}

/// Where the current update cycle is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No target to sit on: nothing received, only the initial sample, or
    /// the last target was abandoned.
    AwaitingTarget,
    /// Interpolating toward the latest target.
    Animating,
    /// Sitting on the latest target.
    Settled,
    /// Drifting toward an extrapolated point between updates.
    Predicting,
}

/// Snapshot of the tracking state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackingState {
    pub current_position: Option<Position>,
    pub target_position: Option<Position>,
    pub current_heading: f64,
    pub is_animating: bool,
    /// Clock reading of the last accepted update.
    pub last_update_time: Option<f64>,
    pub eta: Option<f64>,
    pub distance: Option<f64>,
    pub speed: Option<f64>,
    pub lifecycle: Lifecycle,
    pub phase: Phase,
}

type PositionCallback = Box<dyn FnMut(PositionUpdate) + Send>;
type EtaCallback = Box<dyn FnMut(EtaUpdate) + Send>;
type ErrorCallback = Box<dyn FnMut(TrackingError) + Send>;

/// Turns sparse location reports into a per-frame position stream.
pub struct TrackingManager {
    config: TrackingConfig,
    clock: Arc<dyn Clock>,
    predictor: Predictor,
    lifecycle: Lifecycle,

    current_position: Option<Position>,
    target_position: Option<Position>,
    current_heading: f64,
    animation: Option<Transition>,
    predicting: bool,
    last_update_time: Option<f64>,
    eta: Option<f64>,
    distance: Option<f64>,
    speed: Option<f64>,

    on_position_update: Option<PositionCallback>,
    on_eta_update: Option<EtaCallback>,
    on_error: Option<ErrorCallback>,
}

impl TrackingManager {
    pub fn new(config: TrackingConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            predictor: Predictor::new(config.history_size),
            config,
            clock,
            lifecycle: Lifecycle::Idle,
            current_position: None,
            target_position: None,
            current_heading: 0.0,
            animation: None,
            predicting: false,
            last_update_time: None,
            eta: None,
            distance: None,
            speed: None,
            on_position_update: None,
            on_eta_update: None,
            on_error: None,
        }
    }

    /// Manager on the process-wide monotonic clock.
    pub fn with_system_clock(config: TrackingConfig) -> Self {
        Self::new(config, Arc::new(SystemClock::new()))
    }

    pub fn on_position_update(mut self, f: impl FnMut(PositionUpdate) + Send + 'static) -> Self {
        self.on_position_update = Some(Box::new(f));
        self
    }

    pub fn on_eta_update(mut self, f: impl FnMut(EtaUpdate) + Send + 'static) -> Self {
        self.on_eta_update = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnMut(TrackingError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_destroyed(&self) -> bool {
        self.lifecycle == Lifecycle::Destroyed
    }

    /// Enters `Running`; the prediction loop is active from the next frame.
    pub fn start(&mut self) {
        match self.lifecycle {
            Lifecycle::Running => {}
            Lifecycle::Destroyed => debug!("start() after destroy ignored"),
            Lifecycle::Idle | Lifecycle::Stopped => {
                self.lifecycle = Lifecycle::Running;
                info!(
                    prediction = self.config.prediction_enabled,
                    animation_ms = self.config.animation_duration_ms,
                    "Tracking started"
                );
            }
        }
    }

    /// Halts prediction and cancels any in-flight animation. Idempotent.
    ///
    /// A cancelled animation's target is dropped; the marker stays where it
    /// was last drawn.
    pub fn stop(&mut self) {
        if self.is_destroyed() {
            return;
        }
        if self.animation.take().is_some() {
            self.target_position = None;
            debug!("Animation cancelled by stop");
        }
        self.predicting = false;
        if self.lifecycle != Lifecycle::Stopped {
            self.lifecycle = Lifecycle::Stopped;
            info!("Tracking stopped");
        }
    }

    /// Accepts one confirmed location.
    ///
    /// Invalid coordinates go to the error callback and change nothing. The
    /// first valid sample is shown immediately; later samples animate from
    /// the displayed position, replacing any animation still in flight.
    pub fn update_location(&mut self, update: LocationUpdate) {
        if self.is_destroyed() {
            debug!("update_location() after destroy ignored");
            return;
        }
        if let Err(e) = update.validate() {
            warn!(error = %e, "Rejected location update");
            self.report_error(e);
            return;
        }

        let now = self.clock.now_ms();
        let sample = update.to_position(wall_clock_ms());
        self.predictor.add_position(sample);
        self.last_update_time = Some(now);
        self.predicting = false;

        if update.speed.is_some() {
            self.speed = update.speed;
        }
        if update.distance.is_some() {
            self.distance = update.distance;
        }
        if let Some(eta) = update.eta {
            self.eta = Some(eta);
            let meta = EtaUpdate {
                eta: self.eta,
                distance: self.distance,
                speed: self.speed,
            };
            if let Some(cb) = self.on_eta_update.as_mut() {
                cb(meta);
            }
        }

        let Some(current) = self.current_position else {
            let heading = normalize_heading(update.heading.unwrap_or(0.0));
            self.current_position = Some(Position {
                heading: Some(heading),
                ..sample
            });
            self.current_heading = heading;
            debug!(lat = sample.lat, lng = sample.lng, heading, "Initial position");
            self.emit(sample.lat, sample.lng, heading, UpdateKind::Initial);
            return;
        };

        let to_heading = match update.heading {
            Some(h) => normalize_heading(h),
            None => {
                let velocity = self.predictor.velocity();
                if velocity.is_zero() {
                    self.current_heading
                } else {
                    velocity.heading
                }
            }
        };
        let target = Position {
            heading: Some(to_heading),
            ..sample
        };

        if self.animation.take().is_some() {
            debug!("Superseding in-flight animation");
        }
        let from = Position {
            heading: Some(self.current_heading),
            ..current
        };
        self.animation = Some(
            Transition::new(from, target, now, self.config.animation_duration_ms as f64)
                .with_headings(self.current_heading, to_heading)
                .with_easing(self.config.easing),
        );
        self.target_position = Some(target);
        debug!(lat = target.lat, lng = target.lng, heading = to_heading, "New target");
    }

    /// Snapshot of every tracking field.
    pub fn state(&self) -> TrackingState {
        TrackingState {
            current_position: self.current_position,
            target_position: self.target_position,
            current_heading: self.current_heading,
            is_animating: self.animation.is_some(),
            last_update_time: self.last_update_time,
            eta: self.eta,
            distance: self.distance,
            speed: self.speed,
            lifecycle: self.lifecycle,
            phase: self.phase(),
        }
    }

    pub fn phase(&self) -> Phase {
        if self.animation.is_some() {
            Phase::Animating
        } else if self.predicting {
            Phase::Predicting
        } else if self.target_position.is_some() && self.target_position == self.current_position {
            Phase::Settled
        } else {
            Phase::AwaitingTarget
        }
    }

    /// Clears positions, metadata and history. Lifecycle is untouched.
    pub fn reset(&mut self) {
        if self.is_destroyed() {
            return;
        }
        self.animation = None;
        self.predicting = false;
        self.current_position = None;
        self.target_position = None;
        self.current_heading = 0.0;
        self.last_update_time = None;
        self.eta = None;
        self.distance = None;
        self.speed = None;
        self.predictor.clear();
        debug!("Tracking state reset");
    }

    /// `stop()` + `reset()`, then drops the callbacks. Idempotent.
    pub fn destroy(&mut self) {
        if self.is_destroyed() {
            return;
        }
        self.stop();
        self.reset();
        self.on_position_update = None;
        self.on_eta_update = None;
        self.on_error = None;
        self.lifecycle = Lifecycle::Destroyed;
        info!("Tracking destroyed");
    }

    fn step_animation(&mut self, now_ms: f64) {
        let Some(transition) = self.animation else {
            return;
        };
        let (sample, progress) = transition.sample(now_ms);
        let heading = sample.heading.unwrap_or(self.current_heading);
        self.current_position = Some(sample);
        self.current_heading = heading;
        self.emit(sample.lat, sample.lng, heading, UpdateKind::Animating);

        if progress >= 1.0 {
            self.animation = None;
            self.current_position = Some(transition.to);
            self.current_heading = transition.to_heading;
            debug!("Animation settled on target");
        }
    }

    fn step_prediction(&mut self, now_ms: f64) {
        if self.lifecycle != Lifecycle::Running
            || !self.config.prediction_enabled
            || self.animation.is_some()
            || self.predictor.len() < 2
        {
            return;
        }
        let (Some(current), Some(last_update)) = (self.current_position, self.last_update_time)
        else {
            return;
        };

        let duration = self.config.animation_duration_ms as f64;
        let elapsed = now_ms - last_update;
        if elapsed <= duration * PREDICTION_THRESHOLD {
            return;
        }
        let Some(predicted) = self
            .predictor
            .predict(self.config.prediction_horizon_ms as f64)
        else {
            return;
        };

        let blend = prediction_blend(elapsed, duration);
        let lat = lerp(current.lat, predicted.lat, blend);
        let lng = lerp(current.lng, predicted.lng, blend);
        let heading = match predicted.heading {
            Some(h) => normalize_heading(
                self.current_heading + shortest_angle_delta(self.current_heading, h) * blend,
            ),
            None => self.current_heading,
        };

        if !self.predicting {
            debug!(elapsed_ms = elapsed, "No fresh update, predicting");
        }
        self.predicting = true;
        self.current_position = Some(Position {
            lat,
            lng,
            heading: Some(heading),
            timestamp: current.timestamp,
        });
        self.current_heading = heading;
        self.emit(lat, lng, heading, UpdateKind::Predicted);
    }

    fn emit(&mut self, lat: f64, lng: f64, heading: f64, kind: UpdateKind) {
        if let Some(cb) = self.on_position_update.as_mut() {
            cb(PositionUpdate {
                lat,
                lng,
                heading,
                kind,
            });
        }
    }

    fn report_error(&mut self, e: TrackingError) {
        if let Some(cb) = self.on_error.as_mut() {
            cb(e);
        }
    }
}

impl FrameTask for TrackingManager {
    /// Advances the animation, then the prediction loop.
    fn on_frame(&mut self, now_ms: f64) -> FrameStatus {
        if self.is_destroyed() {
            return FrameStatus::Done;
        }
        self.step_animation(now_ms);
        self.step_prediction(now_ms);
        FrameStatus::Continue
    }
}

/// Fraction of the gap to the predicted point closed per frame.
///
/// Grows linearly with the time since the last update, reaching the cap at
/// twice the animation duration.
pub fn prediction_blend(elapsed_ms: f64, duration_ms: f64) -> f64 {
    if duration_ms <= 0.0 {
        return MAX_PREDICTION_BLEND;
    }
    (elapsed_ms / (duration_ms * 2.0)).min(MAX_PREDICTION_BLEND)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::frame::ManualClock;

    type Log<T> = Arc<Mutex<Vec<T>>>;

    struct Harness {
        clock: ManualClock,
        manager: TrackingManager,
        positions: Log<PositionUpdate>,
        etas: Log<EtaUpdate>,
        errors: Log<TrackingError>,
    }

    fn harness(config: TrackingConfig) -> Harness {
        let clock = ManualClock::new(0.0);
        let positions: Log<PositionUpdate> = Arc::default();
        let etas: Log<EtaUpdate> = Arc::default();
        let errors: Log<TrackingError> = Arc::default();
        let (p, e, r) = (positions.clone(), etas.clone(), errors.clone());
        let manager = TrackingManager::new(config, Arc::new(clock.clone()))
            .on_position_update(move |u| p.lock().unwrap().push(u))
            .on_eta_update(move |u| e.lock().unwrap().push(u))
            .on_error(move |err| r.lock().unwrap().push(err));
        Harness {
            clock,
            manager,
            positions,
            etas,
            errors,
        }
    }

    fn fast() -> TrackingConfig {
        TrackingConfig::default().with_animation_duration_ms(1000)
    }

    impl Harness {
        fn frame(&mut self, advance_ms: f64) -> FrameStatus {
            self.clock.advance(advance_ms);
            self.manager.on_frame(self.clock.now_ms())
        }

        fn positions(&self) -> Vec<PositionUpdate> {
            self.positions.lock().unwrap().clone()
        }
    }

    #[test]
    fn first_update_is_initial_and_synchronous() {
        let mut h = harness(fast());
        h.manager
            .update_location(LocationUpdate::new(7.0, -72.0).heading(-90.0).timestamp(0));

        let ps = h.positions();
        assert_eq!(ps.len(), 1);
        assert!(ps[0].is_initial());
        assert_eq!((ps[0].lat, ps[0].lng, ps[0].heading), (7.0, -72.0, 270.0));

        let state = h.manager.state();
        assert_eq!(state.current_position.map(|p| p.lat), Some(7.0));
        assert_eq!(state.target_position, None);
        assert!(!state.is_animating);
        assert_eq!(state.phase, Phase::AwaitingTarget);
    }

    #[test]
    fn invalid_update_reports_and_changes_nothing() {
        let mut h = harness(fast());
        h.manager.update_location(LocationUpdate::new(f64::NAN, 1.0).eta(5.0));

        assert_eq!(h.errors.lock().unwrap().len(), 1);
        assert!(h.positions().is_empty());
        assert!(h.etas.lock().unwrap().is_empty());
        let state = h.manager.state();
        assert_eq!(state.current_position, None);
        assert_eq!(state.eta, None);
        assert_eq!(state.last_update_time, None);
    }

    #[test]
    fn eta_callback_fires_only_with_eta() {
        let mut h = harness(fast());
        h.manager
            .update_location(LocationUpdate::new(1.0, 1.0).speed(30.0).distance(2.5));
        assert!(h.etas.lock().unwrap().is_empty());

        h.manager.update_location(LocationUpdate::new(1.0, 1.0).eta(240.0));
        let etas = h.etas.lock().unwrap().clone();
        assert_eq!(
            etas,
            vec![EtaUpdate {
                eta: Some(240.0),
                distance: Some(2.5),
                speed: Some(30.0),
            }]
        );
    }

    #[test]
    fn animation_converges_then_settles() {
        let mut h = harness(fast());
        h.manager.update_location(LocationUpdate::new(0.0, 0.0).timestamp(0));
        h.manager
            .update_location(LocationUpdate::new(1.0, 1.0).heading(90.0).timestamp(1000));
        assert!(h.manager.state().is_animating);

        h.frame(500.0);
        let mid = *h.positions().last().unwrap();
        assert!(mid.is_animating());
        assert!((mid.lat - 0.875).abs() < 1e-12);

        h.frame(600.0);
        let last = *h.positions().last().unwrap();
        assert!((last.lat - 1.0).abs() < 1e-12);
        assert!((last.heading - 90.0).abs() < 1e-9);

        let state = h.manager.state();
        assert!(!state.is_animating);
        assert_eq!(state.phase, Phase::Settled);
        assert_eq!(state.current_position, state.target_position);
        assert_eq!(state.current_heading, 90.0);
    }

    #[test]
    fn newer_update_supersedes_animation() {
        let mut h = harness(fast());
        h.manager.update_location(LocationUpdate::new(0.0, 0.0));
        h.manager.update_location(LocationUpdate::new(1.0, 0.0));
        h.frame(500.0);
        let displayed = h.manager.state().current_position.unwrap();

        h.manager.update_location(LocationUpdate::new(2.0, 0.0));
        assert_eq!(h.manager.state().target_position.unwrap().lat, 2.0);

        // New animation starts from where the marker was, not the old target.
        h.frame(1.0);
        let next = *h.positions().last().unwrap();
        assert!(next.lat >= displayed.lat && next.lat < 1.0);

        h.frame(2000.0);
        assert_eq!(h.manager.state().current_position.unwrap().lat, 2.0);
    }

    #[test]
    fn missing_heading_faces_direction_of_travel() {
        let mut h = harness(fast());
        h.manager.update_location(LocationUpdate::new(0.0, 0.0).timestamp(0));
        h.manager.update_location(LocationUpdate::new(0.0, 0.001).timestamp(1000));
        let target = h.manager.state().target_position.unwrap();
        assert!((target.heading.unwrap() - 90.0).abs() < 1e-6);
    }

    #[test]
    fn prediction_follows_completed_animation() {
        let mut h = harness(fast());
        h.manager.start();
        h.manager.update_location(LocationUpdate::new(0.0, 0.0).timestamp(0));
        h.manager.update_location(LocationUpdate::new(0.001, 0.0).timestamp(1000));
        h.frame(1000.0);

        let ps = h.positions();
        let n = ps.len();
        assert!(ps[n - 2].is_animating());
        let p = ps[n - 1];
        assert!(p.is_predicted());
        // 100 ms ahead of the last sample is lat 0.0011; blend 1000/2000 capped at 0.3.
        assert!((p.lat - (0.001 + 0.0001 * 0.3)).abs() < 1e-12, "got {}", p.lat);
        assert_eq!(h.manager.state().phase, Phase::Predicting);
    }

    #[test]
    fn prediction_waits_for_threshold() {
        let mut h = harness(fast());
        h.manager.start();
        h.manager.update_location(LocationUpdate::new(0.0, 0.0).timestamp(0));
        h.manager.update_location(LocationUpdate::new(0.001, 0.0).timestamp(1000));
        h.frame(100.0);
        // Restarting drops the animation but keeps the update time.
        h.manager.stop();
        h.manager.start();
        let shown = h.manager.state().current_position.unwrap();
        let n = h.positions().len();

        h.clock.set(1000.0 * PREDICTION_THRESHOLD - 1.0);
        h.manager.on_frame(h.clock.now_ms());
        assert_eq!(h.positions().len(), n, "too early to predict");

        h.clock.set(2000.0);
        h.manager.on_frame(h.clock.now_ms());
        let p = *h.positions().last().unwrap();
        assert!(p.is_predicted());
        let expected = shown.lat + (0.0011 - shown.lat) * MAX_PREDICTION_BLEND;
        assert!((p.lat - expected).abs() < 1e-12, "got {}", p.lat);
    }

    #[test]
    fn stop_mid_animation_drops_target() {
        let mut h = harness(fast().with_prediction(false));
        h.manager.start();
        h.manager.update_location(LocationUpdate::new(0.0, 0.0));
        h.manager.update_location(LocationUpdate::new(1.0, 1.0));
        h.frame(300.0);
        h.manager.stop();

        let state = h.manager.state();
        let shown = state.current_position.unwrap();
        assert!(shown.lat > 0.0 && shown.lat < 1.0);
        assert_eq!(state.target_position, None);
        assert!(!state.is_animating);
        assert_ne!(state.phase, Phase::Settled);
        assert_eq!(state.phase, Phase::AwaitingTarget);

        // Next update animates from the abandoned spot.
        h.manager.start();
        h.manager.update_location(LocationUpdate::new(2.0, 2.0));
        assert_eq!(h.manager.phase(), Phase::Animating);
        h.frame(2000.0);
        assert_eq!(h.manager.phase(), Phase::Settled);
    }

    #[test]
    fn prediction_requires_running_and_enabled() {
        for (start, enabled) in [(false, true), (true, false)] {
            let mut h = harness(fast().with_prediction(enabled));
            if start {
                h.manager.start();
            }
            h.manager.update_location(LocationUpdate::new(0.0, 0.0).timestamp(0));
            h.manager.update_location(LocationUpdate::new(0.001, 0.0).timestamp(1000));
            h.frame(1000.0);
            let n = h.positions().len();
            h.frame(5000.0);
            assert_eq!(h.positions().len(), n);
        }
    }

    #[test]
    fn blend_formula() {
        assert_eq!(prediction_blend(0.0, 1000.0), 0.0);
        assert_eq!(prediction_blend(400.0, 1000.0), 0.2);
        assert_eq!(prediction_blend(1000.0, 1000.0), 0.3);
        assert_eq!(prediction_blend(10_000.0, 1000.0), 0.3);
        assert_eq!(prediction_blend(1.0, 0.0), 0.3);
    }

    #[test]
    fn stop_is_idempotent_and_cancels_animation() {
        let mut h = harness(fast());
        h.manager.start();
        h.manager.update_location(LocationUpdate::new(0.0, 0.0));
        h.manager.update_location(LocationUpdate::new(1.0, 1.0));
        h.manager.stop();
        h.manager.stop();
        assert_eq!(h.manager.lifecycle(), Lifecycle::Stopped);
        assert!(!h.manager.state().is_animating);

        let n = h.positions().len();
        h.frame(5000.0);
        assert_eq!(h.positions().len(), n);

        h.manager.start();
        assert_eq!(h.manager.lifecycle(), Lifecycle::Running);
    }

    #[test]
    fn reset_keeps_lifecycle() {
        let mut h = harness(fast());
        h.manager.start();
        h.manager.update_location(LocationUpdate::new(0.0, 0.0).eta(10.0));
        h.manager.update_location(LocationUpdate::new(1.0, 1.0));
        h.manager.reset();

        let state = h.manager.state();
        assert_eq!(state.lifecycle, Lifecycle::Running);
        assert_eq!(state.current_position, None);
        assert_eq!(state.eta, None);
        assert!(!state.is_animating);

        h.manager.update_location(LocationUpdate::new(3.0, 3.0));
        assert!(h.positions().last().unwrap().is_initial());
    }

    #[test]
    fn destroy_silences_everything() {
        let mut h = harness(fast());
        h.manager.destroy();
        h.manager.destroy();
        h.manager.start();
        h.manager.update_location(LocationUpdate::new(1.0, 1.0));
        h.manager.update_location(LocationUpdate::new(f64::NAN, 1.0));
        assert_eq!(h.frame(16.0), FrameStatus::Done);

        assert!(h.positions().is_empty());
        assert!(h.errors.lock().unwrap().is_empty());
        assert_eq!(h.manager.lifecycle(), Lifecycle::Destroyed);
    }
}
