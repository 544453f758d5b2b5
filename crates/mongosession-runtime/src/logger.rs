//! Connection event logging task
//!
//! Consumes the broadcaster's channel subscription and logs every event.
//! This is the telemetry-facing consumer of the event stream.

use mongosession_core::{ConnectionEvent, EventBroadcaster};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Spawn a task logging every connection event until `shutdown` fires
pub fn spawn_event_logger(
    broadcaster: &EventBroadcaster,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let mut events = broadcaster.subscribe_channel();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Connection event logger shutting down");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => log_event(&event),
                    None => break,
                },
            }
        }
    })
}

fn log_event(event: &ConnectionEvent) {
    match event {
        ConnectionEvent::Requested(state) => {
            debug!(event = %event.kind(), state = %state.tag(), "Connection requested");
        }
        ConnectionEvent::Succeeded(connected) => {
            info!(
                event = %event.kind(),
                auth_type = %connected.auth_type,
                cluster = connected.atlas.as_ref().map(|atlas| atlas.cluster_name.as_str()).unwrap_or(""),
                "Connected to MongoDB"
            );
        }
        ConnectionEvent::TimedOut(errored) => {
            warn!(event = %event.kind(), reason = %errored.reason, "MongoDB connection timed out");
        }
        ConnectionEvent::Errored(errored) => {
            warn!(event = %event.kind(), reason = %errored.reason, "MongoDB connection failed");
        }
        ConnectionEvent::Closed => {
            info!(event = %event.kind(), "MongoDB connection closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_logger_stops_on_shutdown() {
        let broadcaster = EventBroadcaster::new();
        let shutdown = CancellationToken::new();
        let task = spawn_event_logger(&broadcaster, shutdown.clone());

        broadcaster.emit(ConnectionEvent::Closed);
        shutdown.cancel();

        tokio::time::timeout(std::time::Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
