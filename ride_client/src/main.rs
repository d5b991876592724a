//! Standalone tracker binary.
//!
//! Usage:
//!   cargo run -p ride_client --bin tracker -- [--addr 127.0.0.1:41000] [--ride ride-1]
//!                                             [--config ride.json] [--duration-ms 3000]
//!
//! The tracker subscribes to a driver feed, runs a tracking session over the
//! received locations and logs every rendered frame and ETA change until the
//! ride ends.

use std::env;

use anyhow::Context;
use ride_client::{session::pump, FeedClient, TrackingSession};
use ride_shared::{config::RideConfig, event::TrackingEvent};
use tracing::{debug, info, warn};

fn parse_args() -> anyhow::Result<RideConfig> {
    let args: Vec<String> = env::args().collect();

    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => {
            let raw = std::fs::read_to_string(&args[i + 1])
                .with_context(|| format!("read config {}", args[i + 1]))?;
            RideConfig::from_json_str(&raw)?
        }
        _ => RideConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.feed_addr = args[i + 1].clone();
                i += 2;
            }
            "--ride" if i + 1 < args.len() => {
                cfg.ride_id = args[i + 1].clone();
                i += 2;
            }
            "--duration-ms" if i + 1 < args.len() => {
                cfg.tracking.animation_duration_ms =
                    args[i + 1].parse().context("parse --duration-ms")?;
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(feed = %cfg.feed_addr, ride = %cfg.ride_id, "Starting tracker");

    let mut client = FeedClient::connect(&cfg).await.context("connect")?;

    let (handle, mut events) = TrackingSession::with_events(cfg.tracking.clone());
    handle.start().await?;

    let logger = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                TrackingEvent::Position(u) if u.is_predicted() => {
                    debug!(lat = u.lat, lng = u.lng, heading = u.heading, "Predicted");
                }
                TrackingEvent::Position(u) => {
                    info!(lat = u.lat, lng = u.lng, heading = u.heading, kind = ?u.kind, "Position");
                }
                TrackingEvent::Eta(u) => {
                    info!(eta = ?u.eta, distance = ?u.distance, speed = ?u.speed, "ETA");
                }
                TrackingEvent::Error(e) => warn!(error = %e, "Tracking error"),
            }
        }
    });

    let result = pump(&mut client, &handle).await;
    info!(received = client.received(), state = ?client.state, "Feed finished");

    handle.destroy().await;
    let _ = logger.await;

    result.map(|_| ())
}
