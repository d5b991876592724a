//! `ride_client`
//!
//! Client-side tracking systems:
//! - Interpolation between confirmed driver locations
//! - Velocity estimation and short-horizon prediction
//! - The tracking state machine that drives rendering
//! - Frame scheduling and the async session wrapper
//! - Feed subscription

pub mod client;
pub mod frame;
pub mod interp;
pub mod manager;
pub mod predict;
pub mod session;

pub use client::FeedClient;
pub use manager::TrackingManager;
pub use session::{TrackingHandle, TrackingSession};
