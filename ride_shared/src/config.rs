//! Configuration system.
//!
//! Loads tracker/feed configuration from JSON strings/files (file IO left to app).

use serde::{Deserialize, Serialize};

use crate::math::Easing;

/// Options for one tracking session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Duration of the interpolation between two confirmed locations.
    #[serde(default = "default_animation_duration_ms")]
    pub animation_duration_ms: u64,
    /// Run the prediction loop while started.
    #[serde(default = "default_true")]
    pub prediction_enabled: bool,
    /// Predictor history window.
    #[serde(default = "default_history_size")]
    pub history_size: usize,
    /// How far ahead the prediction loop extrapolates.
    #[serde(default = "default_prediction_horizon_ms")]
    pub prediction_horizon_ms: u64,
    /// Frame cadence for the session's frame loop.
    #[serde(default = "default_frame_rate_hz")]
    pub frame_rate_hz: u32,
    /// Easing for lat/lng during update animations.
    #[serde(default)]
    pub easing: Easing,
}

fn default_animation_duration_ms() -> u64 {
    3000
}

fn default_true() -> bool {
    true
}

fn default_history_size() -> usize {
    5
}

fn default_prediction_horizon_ms() -> u64 {
    100
}

fn default_frame_rate_hz() -> u32 {
    60
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            animation_duration_ms: default_animation_duration_ms(),
            prediction_enabled: true,
            history_size: default_history_size(),
            prediction_horizon_ms: default_prediction_horizon_ms(),
            frame_rate_hz: default_frame_rate_hz(),
            easing: Easing::default(),
        }
    }
}

impl TrackingConfig {
    pub fn with_animation_duration_ms(mut self, ms: u64) -> Self {
        self.animation_duration_ms = ms;
        self
    }

    pub fn with_prediction(mut self, enabled: bool) -> Self {
        self.prediction_enabled = enabled;
        self
    }

    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

/// Route and motion of the simulated driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Pickup point as `(lat, lng)`.
    #[serde(default = "default_start")]
    pub start: (f64, f64),
    /// Drop-off point as `(lat, lng)`.
    #[serde(default = "default_dropoff")]
    pub dropoff: (f64, f64),
    #[serde(default = "default_speed_kmh")]
    pub speed_kmh: f64,
    /// Max absolute noise added to each reported coordinate, in degrees.
    #[serde(default = "default_jitter_deg")]
    pub jitter_deg: f64,
    /// Fixed RNG seed for reproducible runs.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_start() -> (f64, f64) {
    (4.6097, -74.0817)
}

fn default_dropoff() -> (f64, f64) {
    (4.6282, -74.0649)
}

fn default_speed_kmh() -> f64 {
    30.0
}

fn default_jitter_deg() -> f64 {
    0.00005
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            start: default_start(),
            dropoff: default_dropoff(),
            speed_kmh: default_speed_kmh(),
            jitter_deg: default_jitter_deg(),
            seed: None,
        }
    }
}

/// Root configuration shared by the tracker and feed binaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideConfig {
    /// Feed address, e.g. `127.0.0.1:41000`.
    #[serde(default = "default_feed_addr")]
    pub feed_addr: String,
    /// Ride to subscribe to / simulate.
    #[serde(default = "default_ride_id")]
    pub ride_id: String,
    /// Interval between simulated driver reports.
    #[serde(default = "default_report_interval_ms")]
    pub report_interval_ms: u64,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub driver: DriverConfig,
}

fn default_feed_addr() -> String {
    "127.0.0.1:41000".to_string()
}

fn default_ride_id() -> String {
    "ride-1".to_string()
}

fn default_report_interval_ms() -> u64 {
    3000
}

impl Default for RideConfig {
    fn default() -> Self {
        Self {
            feed_addr: default_feed_addr(),
            ride_id: default_ride_id(),
            report_interval_ms: default_report_interval_ms(),
            tracking: TrackingConfig::default(),
            driver: DriverConfig::default(),
        }
    }
}

impl RideConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}
