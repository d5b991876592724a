//! Standalone feed binary.
//!
//! Usage:
//!   cargo run -p ride_feed --bin feed -- [--addr 127.0.0.1:41000] [--ride ride-1]
//!                                        [--config ride.json] [--interval-ms 3000] [--seed 7]
//!
//! The feed waits for a first subscriber, then drives the simulated ride to
//! its drop-off, broadcasting one report per interval. New subscribers are
//! accepted between reports. The process exits once the ride has ended.

use std::env;
use std::time::Duration;

use anyhow::Context;
use ride_feed::server::FeedServer;
use ride_shared::config::RideConfig;
use tracing::{info, warn};

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
            "--interval-ms" if i + 1 < args.len() => {
                cfg.report_interval_ms = args[i + 1].parse().context("parse --interval-ms")?;
                i += 2;
            }
            "--seed" if i + 1 < args.len() => {
                cfg.driver.seed = Some(args[i + 1].parse().context("parse --seed")?);
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
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(
        addr = %cfg.feed_addr,
        ride = %cfg.ride_id,
        interval_ms = cfg.report_interval_ms,
        "Starting feed"
    );

    let mut server = FeedServer::bind(cfg.clone()).await.context("create feed")?;
    let local = server.local_addr()?;
    info!(%local, "Feed listening");

    let id = server.accept_one().await?;
    info!(subscriber_id = ?id, "First subscriber, starting ride");

    let interval = Duration::from_millis(cfg.report_interval_ms);
    let mut next_report = tokio::time::Instant::now();

    loop {
        if server.step().await? {
            break;
        }

        next_report += interval;
        // Accept late subscribers until the next report is due.
        while let Some(remaining) = next_report.checked_duration_since(tokio::time::Instant::now()) {
            match server.try_accept(remaining).await {
                Ok(Some(id)) => info!(subscriber_id = ?id, "New subscriber accepted"),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Rejected connection"),
            }
        }
    }

    info!(reports = server.reports(), "Feed finished");
    Ok(())
}
