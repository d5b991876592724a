//! `ride_feed`
//!
//! Simulated driver feed:
//! - Moves a driver along a straight route at constant speed
//! - Accepts subscribers over the framed TCP feed protocol
//! - Broadcasts `Location` reports, then `RideEnded` on arrival

pub mod driver;
pub mod server;

pub use driver::SimulatedDriver;
pub use server::FeedServer;
