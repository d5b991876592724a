//! `ride_shared`
//!
//! Shared libraries used by the tracker client and the driver feed.
//!
//! Design goals:
//! - Deterministic, pure math where practical.
//! - Clear separation of concerns (location model, math, geo, net, events, config).
//! - No `unsafe`.

pub mod config;
pub mod error;
pub mod event;
pub mod geo;
pub mod location;
pub mod math;
pub mod net;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::error::*;
    pub use crate::event::*;
    pub use crate::location::*;
    pub use crate::math::*;
}
