//! Tracking session.
//!
//! A session owns one `TrackingManager` inside a tokio task. Commands from
//! `TrackingHandle` and frame ticks from a `FrameLoop` are handled by the same
//! task, so update processing, animation frames and prediction frames never
//! overlap. Dropping every handle, or calling `destroy`, ends the task and
//! releases its frame interval.

use async_trait::async_trait;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info};

use ride_shared::{
    config::TrackingConfig, error::TrackingError, event::TrackingEvent,
    location::LocationUpdate,
};

use crate::{
    frame::{FrameLoop, FrameTask},
    manager::{TrackingManager, TrackingState},
};

/// Inbound location channel.
#[async_trait]
pub trait LocationSource: Send {
    /// Next confirmed location, or `None` once the ride is over.
    async fn next_update(&mut self) -> anyhow::Result<Option<LocationUpdate>>;
}

#[async_trait]
impl LocationSource for mpsc::Receiver<LocationUpdate> {
    async fn next_update(&mut self) -> anyhow::Result<Option<LocationUpdate>> {
        Ok(self.recv().await)
    }
}

enum Command {
    Start,
    Stop,
    Update(LocationUpdate),
    Reset,
    State(oneshot::Sender<TrackingState>),
    Destroy,
}

/// Caller side of a running session.
pub struct TrackingHandle {
    tx: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

/// Spawns tracking sessions.
pub struct TrackingSession;

impl TrackingSession {
    /// Moves `manager` into a new task driven at its configured frame rate.
    pub fn spawn(manager: TrackingManager) -> TrackingHandle {
        let (tx, rx) = mpsc::channel(64);
        let frames = FrameLoop::new(manager.clock(), manager.config().frame_rate_hz);
        let task = tokio::spawn(run(manager, rx, frames));
        TrackingHandle { tx, task }
    }

    /// Session whose callbacks feed a `TrackingEvent` channel.
    pub fn with_events(
        config: TrackingConfig,
    ) -> (TrackingHandle, mpsc::UnboundedReceiver<TrackingEvent>) {
        let manager = TrackingManager::with_system_clock(config);
        Self::with_events_for(manager)
    }

    /// Like [`TrackingSession::with_events`], for a manager built by the caller.
    ///
    /// Any callbacks already set on `manager` are replaced.
    pub fn with_events_for(
        manager: TrackingManager,
    ) -> (TrackingHandle, mpsc::UnboundedReceiver<TrackingEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (pos_tx, eta_tx, err_tx) = (events_tx.clone(), events_tx.clone(), events_tx);
        let manager = manager
            .on_position_update(move |u| {
                let _ = pos_tx.send(TrackingEvent::Position(u));
            })
            .on_eta_update(move |u| {
                let _ = eta_tx.send(TrackingEvent::Eta(u));
            })
            .on_error(move |e| {
                let _ = err_tx.send(TrackingEvent::Error(e));
            });
        (Self::spawn(manager), events_rx)
    }
}

impl TrackingHandle {
    async fn send(&self, cmd: Command) -> Result<(), TrackingError> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| TrackingError::SessionClosed)
    }

    pub async fn start(&self) -> Result<(), TrackingError> {
        self.send(Command::Start).await
    }

    pub async fn stop(&self) -> Result<(), TrackingError> {
        self.send(Command::Stop).await
    }

    pub async fn update_location(&self, update: LocationUpdate) -> Result<(), TrackingError> {
        self.send(Command::Update(update)).await
    }

    pub async fn reset(&self) -> Result<(), TrackingError> {
        self.send(Command::Reset).await
    }

    /// Snapshot of the manager's state after every earlier command.
    pub async fn state(&self) -> Result<TrackingState, TrackingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::State(reply_tx)).await?;
        reply_rx.await.map_err(|_| TrackingError::SessionClosed)
    }

    /// Destroys the manager and waits for the task to exit. Safe on a closed session.
    pub async fn destroy(self) {
        let _ = self.tx.send(Command::Destroy).await;
        drop(self.tx);
        let _ = self.task.await;
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

async fn run(mut manager: TrackingManager, mut rx: mpsc::Receiver<Command>, mut frames: FrameLoop) {
    debug!("Tracking session task started");
    loop {
        tokio::select! {
            biased;

            cmd = rx.recv() => match cmd {
                Some(Command::Start) => manager.start(),
                Some(Command::Stop) => manager.stop(),
                Some(Command::Update(update)) => manager.update_location(update),
                Some(Command::Reset) => manager.reset(),
                Some(Command::State(reply)) => {
                    let _ = reply.send(manager.state());
                }
                Some(Command::Destroy) | None => {
                    manager.destroy();
                    break;
                }
            },

            now = frames.next_frame() => {
                manager.on_frame(now);
            }
        }
    }
    info!("Tracking session closed");
}

/// Forwards every update from `source` into `handle` until the source ends.
///
/// Returns how many updates were forwarded.
pub async fn pump<S: LocationSource + ?Sized>(
    source: &mut S,
    handle: &TrackingHandle,
) -> anyhow::Result<usize> {
    let mut forwarded = 0;
    while let Some(update) = source.next_update().await? {
        handle.update_location(update).await?;
        forwarded += 1;
    }
    debug!(forwarded, "Location source finished");
    Ok(forwarded)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use ride_shared::event::UpdateKind;

    fn quick() -> TrackingConfig {
        TrackingConfig {
            animation_duration_ms: 50,
            frame_rate_hz: 200,
            ..TrackingConfig::default()
        }
    }

    #[tokio::test]
    async fn session_animates_to_target() -> anyhow::Result<()> {
        let (handle, mut events) = TrackingSession::with_events(quick());
        handle.start().await?;
        handle
            .update_location(LocationUpdate::new(7.0, -72.0).timestamp(0))
            .await?;
        handle
            .update_location(LocationUpdate::new(7.001, -72.001).heading(45.0).timestamp(500))
            .await?;

        match events.recv().await {
            Some(TrackingEvent::Position(u)) => assert_eq!(u.kind, UpdateKind::Initial),
            other => panic!("expected initial position, got {other:?}"),
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        let state = handle.state().await?;
        assert!(!state.is_animating);
        let target = state.target_position.unwrap();
        assert_eq!((target.lat, target.lng), (7.001, -72.001));

        handle.destroy().await;
        Ok(())
    }

    #[tokio::test]
    async fn invalid_update_becomes_error_event() -> anyhow::Result<()> {
        let (handle, mut events) = TrackingSession::with_events(quick());
        handle
            .update_location(LocationUpdate::new(f64::NAN, 0.0))
            .await?;
        match events.recv().await {
            Some(TrackingEvent::Error(TrackingError::InvalidCoordinates { .. })) => {}
            other => panic!("expected error event, got {other:?}"),
        }
        handle.destroy().await;
        Ok(())
    }

    #[tokio::test]
    async fn destroy_closes_event_stream() {
        let (handle, mut events) = TrackingSession::with_events(quick());
        handle.destroy().await;
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn pump_forwards_until_source_ends() -> anyhow::Result<()> {
        let (handle, _events) = TrackingSession::with_events(quick());
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(LocationUpdate::new(1.0, 1.0)).await?;
        tx.send(LocationUpdate::new(1.0001, 1.0)).await?;
        drop(tx);

        let forwarded = pump(&mut rx, &handle).await?;
        assert_eq!(forwarded, 2);
        assert_eq!(handle.state().await?.target_position.map(|p| p.lat), Some(1.0001));
        handle.destroy().await;
        Ok(())
    }
}
