//! Tracking errors.
//!
//! These are reported to the caller's error callback rather than returned
//! from the hot path; nothing here is fatal.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackingError {
    /// Latitude or longitude is not a usable number.
    #[error("invalid coordinates: lat={lat}, lng={lng} (both must be finite numbers)")]
    InvalidCoordinates { lat: f64, lng: f64 },

    /// The session task is gone (destroyed or dropped).
    #[error("tracking session is closed")]
    SessionClosed,

    /// The feed answered out of protocol.
    #[error("feed protocol violation: {0}")]
    Protocol(String),
}
