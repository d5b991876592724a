//! Feed server implementation.
//!
//! Publishes one simulated ride on a fixed report cadence. It supports:
//! - Subscriber handshake (`Hello` -> `Welcome` -> `Subscribe`)
//! - Location broadcast to subscribers of the simulated ride
//! - `RideEnded` once the driver reaches the drop-off
//!
//! Subscribers are visited in id order so broadcast order is stable.

use anyhow::Context;
use ride_shared::{
    config::RideConfig,
    location::{wall_clock_ms, LocationUpdate},
    net::{FeedConn, FeedListener, FeedMsg, SubscriberId, PROTOCOL_VERSION},
};
use std::{
    collections::BTreeMap,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::driver::SimulatedDriver;

/// Longest a connected peer may take to send `Hello` and `Subscribe`.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connected subscriber.
struct Subscriber {
    conn: FeedConn,
    ride_id: String,
}

/// Driver feed server.
pub struct FeedServer {
    pub cfg: RideConfig,
    listener: FeedListener,
    subscribers: BTreeMap<SubscriberId, Subscriber>,
    driver: SimulatedDriver,
    reports: u64,
    ended: bool,
}

impl FeedServer {
    /// Binds `cfg.feed_addr` and parks a driver at the route start.
    pub async fn bind(cfg: RideConfig) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.feed_addr.parse().context("parse feed_addr")?;
        let listener = FeedListener::bind(addr).await?;
        Ok(Self::with_listener(cfg, listener))
    }

    fn with_listener(cfg: RideConfig, listener: FeedListener) -> Self {
        let driver = SimulatedDriver::new(cfg.driver.clone(), wall_clock_ms());
        Self {
            cfg,
            listener,
            subscribers: BTreeMap::new(),
            driver,
            reports: 0,
            ended: false,
        }
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Reports broadcast so far.
    pub fn reports(&self) -> u64 {
        self.reports
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Accepts exactly one subscriber (handshake + subscription).
    ///
    /// The wait for a connection is unbounded; the handshake is limited to
    /// [`HANDSHAKE_TIMEOUT`].
    pub async fn accept_one(&mut self) -> anyhow::Result<SubscriberId> {
        let (conn, peer) = self.listener.accept().await?;
        let deadline = Instant::now() + HANDSHAKE_TIMEOUT;
        self.handshake_until(deadline, conn, peer).await
    }

    /// Accepts a subscriber with timeout (non-blocking).
    ///
    /// `timeout` bounds the accept and the handshake together. A peer that
    /// connects but does not finish the handshake in time is dropped with an
    /// error.
    pub async fn try_accept(&mut self, timeout: Duration) -> anyhow::Result<Option<SubscriberId>> {
        let deadline = Instant::now() + timeout;
        let (conn, peer) = match tokio::time::timeout_at(deadline, self.listener.accept()).await {
            Ok(accepted) => accepted?,
            Err(_) => return Ok(None),
        };
        self.handshake_until(deadline, conn, peer).await.map(Some)
    }

    async fn handshake_until(
        &mut self,
        deadline: Instant,
        conn: FeedConn,
        peer: SocketAddr,
    ) -> anyhow::Result<SubscriberId> {
        match tokio::time::timeout_at(deadline, self.handle_new_connection(conn, peer)).await {
            Ok(result) => result,
            Err(_) => anyhow::bail!("handshake with {peer} timed out"),
        }
    }

    async fn handle_new_connection(
        &mut self,
        mut conn: FeedConn,
        peer: SocketAddr,
    ) -> anyhow::Result<SubscriberId> {
        match conn.recv().await? {
            FeedMsg::Hello { protocol } if protocol == PROTOCOL_VERSION => {}
            other => anyhow::bail!("unexpected handshake msg: {other:?}"),
        }

        let id = SubscriberId::new_unique();
        conn.send(&FeedMsg::Welcome { subscriber_id: id }).await?;

        let ride_id = match conn.recv().await? {
            FeedMsg::Subscribe { ride_id } => ride_id,
            other => anyhow::bail!("expected Subscribe, got {other:?}"),
        };

        if ride_id != self.cfg.ride_id {
            debug!(subscriber_id = ?id, %ride_id, "Subscription to a ride this feed does not serve");
        }
        info!(subscriber_id = ?id, %peer, %ride_id, "Subscriber connected");
        self.subscribers.insert(id, Subscriber { conn, ride_id });
        Ok(id)
    }

    /// Runs the server for a number of reports, paced by `report_interval_ms`.
    ///
    /// Stops early once the ride has ended.
    pub async fn run_for_steps(&mut self, steps: u32) -> anyhow::Result<()> {
        let dt = Duration::from_millis(self.cfg.report_interval_ms);
        let mut next = Instant::now();

        for _ in 0..steps {
            next += dt;
            if self.step().await? {
                break;
            }
            tokio::time::sleep_until(next).await;
        }
        Ok(())
    }

    /// Advances the driver by one report interval and broadcasts the result.
    ///
    /// Returns `true` once the ride has ended.
    pub async fn step(&mut self) -> anyhow::Result<bool> {
        if self.ended {
            return Ok(true);
        }

        let update = self.driver.advance(self.cfg.report_interval_ms);
        self.publish(update).await;

        if self.driver.arrived() {
            self.broadcast(FeedMsg::RideEnded {
                ride_id: self.cfg.ride_id.clone(),
                reason: "arrived".to_string(),
            })
            .await;
            self.ended = true;
            info!(reports = self.reports, "Driver arrived, ride ended");
        }
        Ok(self.ended)
    }

    async fn publish(&mut self, update: LocationUpdate) {
        debug!(
            lat = update.lat,
            lng = update.lng,
            eta = ?update.eta,
            distance = ?update.distance,
            "Broadcasting location"
        );
        self.reports += 1;
        self.broadcast(FeedMsg::Location {
            ride_id: self.cfg.ride_id.clone(),
            update,
        })
        .await;
    }

    /// Sends `msg` to every subscriber of the simulated ride, dropping any
    /// whose socket fails.
    async fn broadcast(&mut self, msg: FeedMsg) {
        let mut failed = Vec::new();
        for (id, sub) in self.subscribers.iter_mut() {
            if sub.ride_id != self.cfg.ride_id {
                continue;
            }
            if let Err(e) = sub.conn.send(&msg).await {
                warn!(subscriber_id = ?id, error = %e, "Dropping subscriber");
                failed.push(*id);
            }
        }
        for id in failed {
            self.subscribers.remove(&id);
        }
    }
}

/// Helper for tests: bind to an ephemeral port.
///
/// The returned config carries the real bound address.
pub async fn bind_ephemeral(mut cfg: RideConfig) -> anyhow::Result<(FeedServer, RideConfig)> {
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
    let listener = FeedListener::bind(addr).await?;
    cfg.feed_addr = listener.local_addr()?.to_string();
    Ok((FeedServer::with_listener(cfg.clone(), listener), cfg))
}
