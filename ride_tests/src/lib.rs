//! Shared helpers for the integration tests.

use std::sync::{Arc, Mutex};

use ride_client::{frame::ManualClock, TrackingManager};
use ride_shared::{
    config::TrackingConfig,
    error::TrackingError,
    event::{EtaUpdate, PositionUpdate},
};

type Log<T> = Arc<Mutex<Vec<T>>>;

/// Installs a test-friendly subscriber once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// Records every callback a manager fires.
#[derive(Clone, Default)]
pub struct Recorder {
    positions: Log<PositionUpdate>,
    etas: Log<EtaUpdate>,
    errors: Log<TrackingError>,
}

impl Recorder {
    /// Wires all three callbacks of `manager` into a new recorder.
    pub fn attach(manager: TrackingManager) -> (TrackingManager, Recorder) {
        let rec = Recorder::default();
        let (p, e, r) = (rec.positions.clone(), rec.etas.clone(), rec.errors.clone());
        let manager = manager
            .on_position_update(move |u| push(&p, u))
            .on_eta_update(move |u| push(&e, u))
            .on_error(move |err| push(&r, err));
        (manager, rec)
    }

    pub fn positions(&self) -> Vec<PositionUpdate> {
        snapshot(&self.positions)
    }

    pub fn etas(&self) -> Vec<EtaUpdate> {
        snapshot(&self.etas)
    }

    pub fn errors(&self) -> Vec<TrackingError> {
        snapshot(&self.errors)
    }

    /// Callbacks of any kind seen so far.
    pub fn total(&self) -> usize {
        self.positions().len() + self.etas().len() + self.errors().len()
    }
}

fn push<T>(log: &Log<T>, item: T) {
    if let Ok(mut v) = log.lock() {
        v.push(item);
    }
}

fn snapshot<T: Clone>(log: &Log<T>) -> Vec<T> {
    log.lock().map(|v| v.clone()).unwrap_or_default()
}

/// Manager on a manual clock starting at zero, with a recorder attached.
pub fn manual_manager(config: TrackingConfig) -> (TrackingManager, ManualClock, Recorder) {
    let clock = ManualClock::new(0.0);
    let manager = TrackingManager::new(config, Arc::new(clock.clone()));
    let (manager, rec) = Recorder::attach(manager);
    (manager, clock, rec)
}
