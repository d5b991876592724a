//! Outbound tracking events.
//!
//! - `PositionUpdate`: one rendered frame for the map/marker layer.
//! - `EtaUpdate`: new arrival metadata from the feed.
//! - `TrackingEvent`: the union, for channel-based consumers.

use serde::{Deserialize, Serialize};

use crate::error::TrackingError;

/// Why a position frame was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    /// First confirmed location; no animation.
    Initial,
    /// Interpolating toward a confirmed target.
    Animating,
    /// Blending toward an extrapolated point between updates.
    Predicted,
}

/// A rendered position frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub lat: f64,
    pub lng: f64,
    pub heading: f64,
    pub kind: UpdateKind,
}

impl PositionUpdate {
    pub fn is_initial(&self) -> bool {
        self.kind == UpdateKind::Initial
    }

    pub fn is_animating(&self) -> bool {
        self.kind == UpdateKind::Animating
    }

    pub fn is_predicted(&self) -> bool {
        self.kind == UpdateKind::Predicted
    }
}

/// Arrival metadata.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct EtaUpdate {
    pub eta: Option<f64>,
    pub distance: Option<f64>,
    pub speed: Option<f64>,
}

/// Everything a tracking session reports.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackingEvent {
    Position(PositionUpdate),
    Eta(EtaUpdate),
    Error(TrackingError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_flags() {
        let u = PositionUpdate {
            lat: 0.0,
            lng: 0.0,
            heading: 0.0,
            kind: UpdateKind::Predicted,
        };
        assert!(u.is_predicted());
        assert!(!u.is_initial());
        assert!(!u.is_animating());
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&UpdateKind::Animating).unwrap();
        assert_eq!(json, "\"animating\"");
    }
}
