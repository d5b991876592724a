//! Math types and easing curves.
//!
//! This module intentionally stays small and deterministic.
//! Everything here is a pure function of its inputs.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// 2D point used for curved-path evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn scale(self, k: f64) -> Self {
        Self::new(self.x * k, self.y * k)
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

/// Linear interpolation. `t` is not clamped; callers keep it in $[0,1]$.
pub fn lerp(start: f64, end: f64, t: f64) -> f64 {
    start + (end - start) * t
}

/// Decelerating cubic: fast start, gentle stop.
pub fn ease_out_cubic(t: f64) -> f64 {
    1.0 - (1.0 - t).powi(3)
}

/// Accelerating then decelerating cubic, symmetric around `t = 0.5`.
pub fn ease_in_out_cubic(t: f64) -> f64 {
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

/// Standard cubic Bézier evaluation.
pub fn cubic_bezier(p0: Vec2, p1: Vec2, p2: Vec2, p3: Vec2, t: f64) -> Vec2 {
    let u = 1.0 - t;
    p0.scale(u * u * u)
        .add(p1.scale(3.0 * u * u * t))
        .add(p2.scale(3.0 * u * t * t))
        .add(p3.scale(t * t * t))
}

/// Normalizes an angle in degrees to $[0,360)$.
pub fn normalize_heading(heading: f64) -> f64 {
    let h = heading.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs.
    if h >= 360.0 {
        0.0
    } else {
        h
    }
}

/// Signed shortest rotation from `from` to `to`, in $[-180,180]$.
pub fn shortest_angle_delta(from: f64, to: f64) -> f64 {
    let mut diff = normalize_heading(to) - normalize_heading(from);
    if diff > 180.0 {
        diff -= 360.0;
    } else if diff < -180.0 {
        diff += 360.0;
    }
    diff
}

/// Easing curve applied to animation progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Easing {
    Linear,
    #[default]
    EaseOut,
    EaseInOut,
}

impl Easing {
    pub fn apply(self, t: f64) -> f64 {
        match self {
            Easing::Linear => t,
            Easing::EaseOut => ease_out_cubic(t),
            Easing::EaseInOut => ease_in_out_cubic(t),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Easing::Linear => "linear",
            Easing::EaseOut => "easeOut",
            Easing::EaseInOut => "easeInOut",
        }
    }

    /// Parses an easing name. Unknown names are treated as linear.
    pub fn from_name(name: &str) -> Self {
        match name {
            "linear" => Easing::Linear,
            "easeOut" | "ease_out" | "ease-out" => Easing::EaseOut,
            "easeInOut" | "ease_in_out" | "ease-in-out" => Easing::EaseInOut,
            other => {
                warn!(easing = %other, "Unknown easing, treated as linear");
                Easing::Linear
            }
        }
    }
}

impl fmt::Display for Easing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Easing {
    fn from(s: String) -> Self {
        Easing::from_name(&s)
    }
}

impl From<Easing> for String {
    fn from(e: Easing) -> Self {
        e.as_str().to_string()
    }
}
