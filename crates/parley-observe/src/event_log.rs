//! Logging consumer for the conversation lifecycle event bus.
//!
//! Events are fire-and-forget; this consumer turns them into structured
//! log lines. Dropping behind (`Lagged`) loses events but never stalls
//! the engine.

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use parley_core::event::EventBus;
use parley_types::event::SessionEvent;

/// Subscribe to the bus and log every event until cancelled.
pub fn spawn_event_logger(bus: &EventBus, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = rx.recv() => match event {
                    Ok(event) => log_event(&event),
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "event logger lagged, dropped events");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
    })
}

fn log_event(event: &SessionEvent) {
    match event {
        SessionEvent::SessionStarted {
            session_id,
            participants,
            topic,
        } => info!(%session_id, ?participants, topic, "session started"),
        SessionEvent::SessionEnded {
            session_id,
            reason,
            turn_count,
        } => info!(%session_id, %reason, turn_count, "session ended"),
        SessionEvent::TurnAdvanced {
            session_id,
            speaker,
            turn_number,
            source,
        } => info!(%session_id, %speaker, turn_number, %source, "turn advanced"),
        SessionEvent::StreamChunk {
            session_id,
            request_id,
            text,
        } => info!(%session_id, %request_id, chars = text.len(), "stream chunk"),
        SessionEvent::RequestFailed {
            session_id,
            strategy,
            error,
        } => warn!(%session_id, %strategy, error, "inference request failed"),
        SessionEvent::HealthChanged { healthy } => {
            info!(healthy, "local backend health changed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn logger_drains_until_cancelled() {
        let bus = EventBus::new(16);
        let cancel = CancellationToken::new();
        let handle = spawn_event_logger(&bus, cancel.clone());

        bus.publish(SessionEvent::HealthChanged { healthy: false });
        tokio::task::yield_now().await;

        cancel.cancel();
        handle.await.unwrap();
    }
}
