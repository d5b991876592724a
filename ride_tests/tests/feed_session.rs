//! Full socket-based integration: simulated feed -> feed client -> tracking session.

use ride_client::{session::pump, FeedClient, TrackingSession};
use ride_feed::server::bind_ephemeral;
use ride_shared::{
    config::{DriverConfig, RideConfig, TrackingConfig},
    event::TrackingEvent,
    net::{FeedConn, FeedMsg, PROTOCOL_VERSION},
};
use ride_tests::init_tracing;

fn quick_ride() -> RideConfig {
    RideConfig {
        report_interval_ms: 20,
        driver: DriverConfig {
            start: (0.0, 0.0),
            dropoff: (0.001, 0.0),
            // 20 m per report.
            speed_kmh: 3600.0,
            jitter_deg: 0.0,
            seed: Some(3),
        },
        tracking: TrackingConfig {
            animation_duration_ms: 10,
            frame_rate_hz: 200,
            ..TrackingConfig::default()
        },
        ..RideConfig::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tracker_follows_simulated_ride_to_dropoff() -> anyhow::Result<()> {
    init_tracing();

    let (mut server, cfg) = bind_ephemeral(quick_ride()).await?;
    let server_handle = tokio::spawn(async move {
        server.accept_one().await?;
        server.run_for_steps(100).await?;
        anyhow::ensure!(server.is_ended(), "ride did not end");
        Ok::<_, anyhow::Error>(server.reports())
    });

    let mut client = FeedClient::connect(&cfg).await?;
    let (handle, mut events) = TrackingSession::with_events(cfg.tracking.clone());
    handle.start().await?;

    let forwarded = pump(&mut client, &handle).await?;
    let reports = server_handle.await??;
    assert_eq!(forwarded as u64, reports);
    assert_eq!(client.received(), reports);
    assert!(reports >= 5);

    let state = handle.state().await?;
    let target = state.target_position.unwrap();
    assert_eq!((target.lat, target.lng), (0.001, 0.0));
    assert_eq!(state.eta, Some(0.0));
    assert_eq!(state.distance, Some(0.0));

    handle.destroy().await;

    let mut initial = 0;
    let mut etas = Vec::new();
    while let Some(event) = events.recv().await {
        match event {
            TrackingEvent::Position(u) if u.is_initial() => initial += 1,
            TrackingEvent::Position(_) => {}
            TrackingEvent::Eta(u) => etas.push(u),
            TrackingEvent::Error(e) => panic!("unexpected error event: {e}"),
        }
    }
    assert_eq!(initial, 1);
    assert_eq!(etas.len() as u64, reports);
    assert!(etas.windows(2).all(|w| w[1].eta <= w[0].eta));
    Ok(())
}

#[tokio::test]
async fn feed_ignores_other_rides() -> anyhow::Result<()> {
    let (mut server, cfg) = bind_ephemeral(quick_ride()).await?;

    let other = tokio::spawn({
        let addr = cfg.feed_addr.clone();
        async move {
            let mut conn = FeedConn::connect(addr.parse()?).await?;
            conn.send(&FeedMsg::Hello {
                protocol: PROTOCOL_VERSION,
            })
            .await?;
            conn.recv().await?;
            conn.send(&FeedMsg::Subscribe {
                ride_id: "someone-else".to_string(),
            })
            .await?;
            anyhow::Ok(conn)
        }
    });
    server.accept_one().await?;
    let mut conn = other.await??;
    assert_eq!(server.subscriber_count(), 1);

    while !server.step().await? {}

    let nothing =
        tokio::time::timeout(std::time::Duration::from_millis(50), conn.recv()).await;
    assert!(nothing.is_err(), "subscriber of another ride got {nothing:?}");
    Ok(())
}

/// Smoke test: the feed can run a few reports with nobody listening.
#[tokio::test]
async fn feed_runs_without_subscribers() -> anyhow::Result<()> {
    let (mut server, _cfg) = bind_ephemeral(quick_ride()).await?;
    server.run_for_steps(3).await?;
    assert_eq!(server.reports(), 3);
    Ok(())
}
