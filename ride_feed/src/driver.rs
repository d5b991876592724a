//! Simulated driver.
//!
//! Drives in a straight line from pickup to drop-off at constant speed. Each
//! report carries the true heading, speed, remaining distance and ETA; the
//! reported coordinates get uniform noise so the tracker sees GPS-like jitter.

use rand::{rngs::StdRng, Rng, SeedableRng};
use ride_shared::{
    config::DriverConfig,
    geo::{bearing_deg, haversine_km, step_toward},
    location::{LocationUpdate, TimestampMs},
};

const MS_PER_HOUR: f64 = 3_600_000.0;

pub struct SimulatedDriver {
    cfg: DriverConfig,
    position: (f64, f64),
    heading: f64,
    clock_ms: TimestampMs,
    rng: StdRng,
    arrived: bool,
}

impl SimulatedDriver {
    /// Driver parked at `cfg.start`, with its clock at `started_at`.
    pub fn new(cfg: DriverConfig, started_at: TimestampMs) -> Self {
        let rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            position: cfg.start,
            heading: bearing_deg(cfg.start, cfg.dropoff),
            clock_ms: started_at,
            rng,
            arrived: cfg.start == cfg.dropoff,
            cfg,
        }
    }

    /// Moves `dt_ms` worth of driving and returns the report for the new position.
    pub fn advance(&mut self, dt_ms: u64) -> LocationUpdate {
        self.clock_ms += dt_ms as TimestampMs;

        if !self.arrived {
            let km = self.cfg.speed_kmh.max(0.0) * dt_ms as f64 / MS_PER_HOUR;
            let next = step_toward(self.position, self.cfg.dropoff, km);
            if next != self.position {
                self.heading = bearing_deg(self.position, next);
            }
            self.position = next;
            self.arrived = self.position == self.cfg.dropoff;
        }

        let remaining_km = self.remaining_km();
        let speed = if self.arrived { 0.0 } else { self.cfg.speed_kmh };

        let mut update = LocationUpdate::new(
            self.position.0 + self.jitter(),
            self.position.1 + self.jitter(),
        )
        .heading(self.heading)
        .speed(speed)
        .distance(remaining_km)
        .timestamp(self.clock_ms);

        if self.arrived {
            update = update.eta(0.0);
        } else if speed > 0.0 {
            update = update.eta(remaining_km / speed * 3600.0);
        }
        update
    }

    fn jitter(&mut self) -> f64 {
        let j = self.cfg.jitter_deg.abs();
        if j == 0.0 {
            return 0.0;
        }
        self.rng.gen_range(-j..=j)
    }

    pub fn remaining_km(&self) -> f64 {
        haversine_km(self.position, self.cfg.dropoff)
    }

    pub fn position(&self) -> (f64, f64) {
        self.position
    }

    pub fn arrived(&self) -> bool {
        self.arrived
    }
}
