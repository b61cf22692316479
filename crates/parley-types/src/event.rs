//! Lifecycle events for the observability sink.
//!
//! `SessionEvent` is broadcast fire-and-forget over the event bus. All
//! variants are Clone + Send + Sync for use with tokio broadcast channels.

use serde::{Deserialize, Serialize};

use crate::agent::AgentId;
use crate::llm::Strategy;
use crate::session::{EndReason, RequestId, SessionId, UtteranceSource};

/// Events emitted by the conversation engine.
///
/// Consumers (logging, debugging UIs) subscribe via the event bus; events
/// with no subscribers are dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A session has been created and its participants bound.
    SessionStarted {
        session_id: SessionId,
        participants: Vec<AgentId>,
        topic: String,
    },

    /// A session has ended and its participants released.
    SessionEnded {
        session_id: SessionId,
        reason: EndReason,
        turn_count: u32,
    },

    /// A turn resolved (from a model or the fallback generator).
    TurnAdvanced {
        session_id: SessionId,
        speaker: AgentId,
        turn_number: u32,
        source: UtteranceSource,
    },

    /// Buffered partial text from a streaming request.
    StreamChunk {
        session_id: SessionId,
        request_id: RequestId,
        text: String,
    },

    /// An inference request exhausted its retries and degraded to fallback.
    RequestFailed {
        session_id: SessionId,
        strategy: Strategy,
        error: String,
    },

    /// The local backend's health flag flipped.
    HealthChanged { healthy: bool },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tagged_serde() {
        let event = SessionEvent::HealthChanged { healthy: false };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"health_changed\""));
        let back: SessionEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, SessionEvent::HealthChanged { healthy: false }));
    }

    #[test]
    fn test_turn_advanced_carries_source() {
        let event = SessionEvent::TurnAdvanced {
            session_id: uuid::Uuid::now_v7(),
            speaker: AgentId::new("a"),
            turn_number: 3,
            source: UtteranceSource::Fallback,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"source\":\"fallback\""));
    }
}
