//! Prediction.
//!
//! Between feed reports the vehicle keeps moving. The predictor keeps a short
//! window of confirmed positions and extrapolates from it. Sparse or
//! degenerate input (one sample, repeated timestamps, a parked car) never
//! errors; it resolves to a zero velocity or the last known position.

use std::collections::VecDeque;

use ride_shared::geo::{bearing_deg, haversine_km};
use ride_shared::location::{Position, Velocity};

/// Upper bound on plausible road speed.
pub const MAX_SPEED_KMH: f64 = 200.0;

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Probe distance used to turn a lat/lng rate into a bearing.
const HEADING_PROBE_MS: f64 = 1000.0;

/// Velocity from the two most recent samples.
pub fn calculate_velocity(positions: &[Position]) -> Velocity {
    let Some(last) = positions.last() else {
        return Velocity::default();
    };
    let fallback_heading = last.heading.unwrap_or(0.0);
    if positions.len() < 2 {
        return Velocity::stationary(fallback_heading);
    }
    let prev = &positions[positions.len() - 2];

    let time_diff = (last.timestamp - prev.timestamp) as f64;
    if time_diff <= 0.0 {
        return Velocity::stationary(fallback_heading);
    }

    let d_lat = last.lat - prev.lat;
    let d_lng = last.lng - prev.lng;
    let distance_km = haversine_km(prev.coords(), last.coords());
    let speed_kmh = (distance_km / (time_diff / MS_PER_HOUR)).clamp(0.0, MAX_SPEED_KMH);
    let heading = if d_lat == 0.0 && d_lng == 0.0 {
        fallback_heading
    } else {
        bearing_deg(prev.coords(), last.coords())
    };

    Velocity {
        lat_per_ms: d_lat / time_diff,
        lng_per_ms: d_lng / time_diff,
        speed_kmh,
        heading,
    }
}

/// Linear extrapolation `current + velocity * predict_ms`.
pub fn predict_position(current: &Position, velocity: &Velocity, predict_ms: f64) -> Position {
    if velocity.is_zero() {
        return Position {
            heading: Some(current.heading.unwrap_or(velocity.heading)),
            ..*current
        };
    }
    Position {
        lat: current.lat + velocity.lat_per_ms * predict_ms,
        lng: current.lng + velocity.lng_per_ms * predict_ms,
        heading: Some(velocity.heading),
        timestamp: current.timestamp + predict_ms.round() as i64,
    }
}

/// Extrapolates with a recency-weighted velocity over the whole window.
///
/// Segment `i` (ending at sample `i`) gets weight `i`, so newer motion
/// dominates. Returns `None` only for an empty window.
pub fn weighted_prediction(positions: &[Position], predict_ms: f64) -> Option<Position> {
    let last = *positions.last()?;
    if positions.len() < 2 {
        return Some(last);
    }

    let mut lat_rate = 0.0;
    let mut lng_rate = 0.0;
    let mut total_weight = 0.0;
    for (i, pair) in positions.windows(2).enumerate() {
        let dt = (pair[1].timestamp - pair[0].timestamp) as f64;
        if dt <= 0.0 {
            continue;
        }
        let weight = (i + 1) as f64;
        lat_rate += (pair[1].lat - pair[0].lat) / dt * weight;
        lng_rate += (pair[1].lng - pair[0].lng) / dt * weight;
        total_weight += weight;
    }

    if total_weight == 0.0 {
        return Some(last);
    }
    lat_rate /= total_weight;
    lng_rate /= total_weight;

    let heading = if lat_rate == 0.0 && lng_rate == 0.0 {
        last.heading.unwrap_or(0.0)
    } else {
        let probe = (
            last.lat + lat_rate * HEADING_PROBE_MS,
            last.lng + lng_rate * HEADING_PROBE_MS,
        );
        bearing_deg(last.coords(), probe)
    };

    Some(Position {
        lat: last.lat + lat_rate * predict_ms,
        lng: last.lng + lng_rate * predict_ms,
        heading: Some(heading),
        timestamp: last.timestamp + predict_ms.round() as i64,
    })
}

/// Bounded position history with velocity and extrapolation on top.
#[derive(Debug, Clone)]
pub struct Predictor {
    history: VecDeque<Position>,
    max: usize,
}

impl Default for Predictor {
    fn default() -> Self {
        Self::new(5)
    }
}

impl Predictor {
    /// A zero-sized window would make every prediction empty; it is raised to one.
    pub fn new(history_size: usize) -> Self {
        let max = history_size.max(1);
        Self {
            history: VecDeque::with_capacity(max + 1),
            max,
        }
    }

    pub fn add_position(&mut self, position: Position) {
        self.history.push_back(position);
        while self.history.len() > self.max {
            self.history.pop_front();
        }
    }

    /// Weighted extrapolation `predict_ms` past the newest sample.
    pub fn predict(&self, predict_ms: f64) -> Option<Position> {
        weighted_prediction(&self.history(), predict_ms)
    }

    pub fn velocity(&self) -> Velocity {
        calculate_velocity(&self.history())
    }

    /// Copy of the window, oldest first.
    pub fn history(&self) -> Vec<Position> {
        self.history.iter().copied().collect()
    }

    pub fn last(&self) -> Option<&Position> {
        self.history.back()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}
