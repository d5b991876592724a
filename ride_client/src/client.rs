//! Feed client.
//!
//! The client maintains:
//! - A reliable stream to the driver feed (handshake + subscription)
//! - The subscription state for one ride
//!
//! Location messages for other rides are ignored; `RideEnded` for ours closes
//! the stream from the tracker's point of view.

use std::net::SocketAddr;

use anyhow::Context;
use async_trait::async_trait;
use ride_shared::{
    config::RideConfig,
    error::TrackingError,
    location::LocationUpdate,
    net::{FeedConn, FeedMsg, SubscriberId, PROTOCOL_VERSION},
};
use tracing::{debug, info, warn};

use crate::session::LocationSource;

/// Feed connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    /// Not connected to any feed.
    Disconnected,
    /// Handshake done, receiving locations for `ride_id`.
    Subscribed,
    /// The feed reported the ride as finished.
    Ended { reason: String },
}

/// Subscriber to one ride on a driver feed.
pub struct FeedClient {
    pub subscriber_id: SubscriberId,
    pub ride_id: String,
    pub state: ClientState,
    conn: FeedConn,
    received: u64,
}

impl FeedClient {
    /// Connects to the feed, performs the handshake and subscribes.
    pub async fn connect(cfg: &RideConfig) -> anyhow::Result<Self> {
        let feed_addr: SocketAddr = cfg.feed_addr.parse().context("parse feed_addr")?;

        info!(feed = %feed_addr, ride = %cfg.ride_id, "Connecting to feed");

        let mut conn = FeedConn::connect(feed_addr).await?;
        conn.send(&FeedMsg::Hello {
            protocol: PROTOCOL_VERSION,
        })
        .await?;

        let subscriber_id = match conn.recv().await? {
            FeedMsg::Welcome { subscriber_id } => subscriber_id,
            other => {
                return Err(TrackingError::Protocol(format!("expected Welcome, got {other:?}")).into())
            }
        };

        conn.send(&FeedMsg::Subscribe {
            ride_id: cfg.ride_id.clone(),
        })
        .await?;

        info!(subscriber_id = ?subscriber_id, "Subscribed to feed");

        Ok(Self {
            subscriber_id,
            ride_id: cfg.ride_id.clone(),
            state: ClientState::Subscribed,
            conn,
            received: 0,
        })
    }

    /// Number of location reports accepted so far.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Returns the feed's address.
    pub fn feed_peer(&self) -> anyhow::Result<SocketAddr> {
        self.conn.peer_addr()
    }
}

#[async_trait]
impl LocationSource for FeedClient {
    async fn next_update(&mut self) -> anyhow::Result<Option<LocationUpdate>> {
        if self.state != ClientState::Subscribed {
            return Ok(None);
        }
        loop {
            let msg = match self.conn.recv().await {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(error = %e, "Feed connection error");
                    self.state = ClientState::Disconnected;
                    return Err(e);
                }
            };
            match msg {
                FeedMsg::Location { ride_id, update } if ride_id == self.ride_id => {
                    self.received += 1;
                    debug!(lat = update.lat, lng = update.lng, "Location received");
                    return Ok(Some(update));
                }
                FeedMsg::RideEnded { ride_id, reason } if ride_id == self.ride_id => {
                    info!(reason = %reason, "Ride ended");
                    self.state = ClientState::Ended { reason };
                    return Ok(None);
                }
                other => {
                    debug!(?other, "Unhandled feed message");
                }
            }
        }
    }
}
