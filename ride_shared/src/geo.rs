//! Spherical geodesy on lat/lng degrees.
//!
//! No reprojection: inputs and outputs are WGS84 degrees treated as a sphere.

use crate::math::normalize_heading;

/// Mean Earth radius used for great-circle distances.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two points, in kilometres (Haversine).
pub fn haversine_km(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lng1) = from;
    let (lat2, lng2) = to;

    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lng = (lng2 - lng1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Initial bearing from `from` to `to`, degrees clockwise from north in $[0,360)$.
pub fn bearing_deg(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lng1) = from;
    let (lat2, lng2) = to;

    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lng = (lng2 - lng1).to_radians();

    let y = delta_lng.sin() * lat2_rad.cos();
    let x = lat1_rad.cos() * lat2_rad.sin() - lat1_rad.sin() * lat2_rad.cos() * delta_lng.cos();

    normalize_heading(y.atan2(x).to_degrees())
}

/// Moves `km` kilometres from `start` along a straight lat/lng line toward `end`.
///
/// Used by the simulated feed; short hops only, so the planar step is fine.
pub fn step_toward(start: (f64, f64), end: (f64, f64), km: f64) -> (f64, f64) {
    let total = haversine_km(start, end);
    if total <= km || total == 0.0 {
        return end;
    }
    let f = km / total;
    (
        start.0 + (end.0 - start.0) * f,
        start.1 + (end.1 - start.1) * f,
    )
}
