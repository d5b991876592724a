//! Location data model.
//!
//! - `Position`: one geodetic sample, immutable once recorded.
//! - `Velocity`: derived estimate, recomputed from history on demand.
//! - `LocationUpdate`: the inbound event shape delivered by the feed.

use serde::{Deserialize, Serialize};

use crate::error::TrackingError;

/// Milliseconds since the Unix epoch, as stamped by the feed.
pub type TimestampMs = i64;

/// A single geodetic sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
    /// Degrees clockwise from north, in $[0,360)$.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    pub timestamp: TimestampMs,
}

impl Position {
    pub const fn new(lat: f64, lng: f64, timestamp: TimestampMs) -> Self {
        Self {
            lat,
            lng,
            heading: None,
            timestamp,
        }
    }

    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = Some(heading);
        self
    }

    /// `(lat, lng)` pair for the geodesy helpers.
    pub fn coords(&self) -> (f64, f64) {
        (self.lat, self.lng)
    }
}

/// Velocity estimate derived from position history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Velocity {
    pub lat_per_ms: f64,
    pub lng_per_ms: f64,
    /// Clamped to $[0,200]$.
    pub speed_kmh: f64,
    pub heading: f64,
}

impl Velocity {
    /// Zero velocity that keeps a known heading.
    pub fn stationary(heading: f64) -> Self {
        Self {
            heading,
            ..Self::default()
        }
    }

    pub fn is_zero(&self) -> bool {
        self.lat_per_ms == 0.0 && self.lng_per_ms == 0.0
    }
}

/// Inbound location event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationUpdate {
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    /// km/h.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Seconds until arrival.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta: Option<f64>,
    /// Remaining distance in km.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<TimestampMs>,
}

impl LocationUpdate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng,
            heading: None,
            speed: None,
            eta: None,
            distance: None,
            timestamp: None,
        }
    }

    pub fn heading(mut self, heading: f64) -> Self {
        self.heading = Some(heading);
        self
    }

    pub fn speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn eta(mut self, eta: f64) -> Self {
        self.eta = Some(eta);
        self
    }

    pub fn distance(mut self, distance: f64) -> Self {
        self.distance = Some(distance);
        self
    }

    pub fn timestamp(mut self, timestamp: TimestampMs) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Checks that both coordinates are usable numbers.
    pub fn validate(&self) -> Result<(), TrackingError> {
        if self.lat.is_finite() && self.lng.is_finite() {
            Ok(())
        } else {
            Err(TrackingError::InvalidCoordinates {
                lat: self.lat,
                lng: self.lng,
            })
        }
    }

    /// Converts into a history sample, stamping `now_ms` when the event had no timestamp.
    pub fn to_position(&self, now_ms: TimestampMs) -> Position {
        Position {
            lat: self.lat,
            lng: self.lng,
            heading: self.heading,
            timestamp: self.timestamp.unwrap_or(now_ms),
        }
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn wall_clock_ms() -> TimestampMs {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_non_finite() {
        assert!(LocationUpdate::new(7.0, -72.0).validate().is_ok());
        assert!(LocationUpdate::new(f64::NAN, -72.0).validate().is_err());
        assert!(LocationUpdate::new(7.0, f64::INFINITY).validate().is_err());
    }

    #[test]
    fn missing_optional_fields_deserialize() {
        let u: LocationUpdate = serde_json::from_str(r#"{"lat":7.0,"lng":-72.0}"#).unwrap();
        assert_eq!(u, LocationUpdate::new(7.0, -72.0));
    }

    #[test]
    fn non_numeric_lat_fails_to_decode() {
        let r = serde_json::from_str::<LocationUpdate>(r#"{"lat":"north","lng":-72.0}"#);
        assert!(r.is_err());
    }

    #[test]
    fn to_position_defaults_timestamp() {
        let p = LocationUpdate::new(1.0, 2.0).heading(90.0).to_position(1234);
        assert_eq!(p.timestamp, 1234);
        assert_eq!(p.heading, Some(90.0));

        let p = LocationUpdate::new(1.0, 2.0).timestamp(5).to_position(1234);
        assert_eq!(p.timestamp, 5);
    }
}
