//! Inference request/response types shared by the client and providers:
//! completion requests, streaming events, the parsed turn shape, and the
//! inference error taxonomy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::session::RequestId;

/// Which model backend services a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Local,
    Cloud,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Local => write!(f, "local"),
            Strategy::Cloud => write!(f, "cloud"),
        }
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Strategy::Local),
            "cloud" => Ok(Strategy::Cloud),
            other => Err(format!("invalid strategy: '{other}'")),
        }
    }
}

/// Role of a message in a provider conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single message in a provider conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

/// Request to a model provider for a completion.
///
/// Local and cloud endpoints accept the same shape; they differ only in
/// URL, auth header, and token-budget ceiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub stream: bool,
}

/// Response from a model provider for a non-streaming completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub id: String,
    pub content: String,
    pub model: String,
    pub finish_reason: Option<String>,
}

/// Events emitted during a streaming model response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Connection established with the provider.
    Connected,
    /// A delta of generated text.
    TextDelta { text: String },
    /// The provider signalled a finish reason; the accumulated text is
    /// complete and may be parsed.
    Finished { reason: String },
    /// The stream has ended.
    Done,
}

/// Accumulation state for one streaming request.
///
/// Exists only while the request streams; dropped on completion or timeout.
#[derive(Debug, Clone)]
pub struct StreamingState {
    pub request_id: RequestId,
    pub accumulated_text: String,
    pub last_chunk_at: Option<DateTime<Utc>>,
    pub is_complete: bool,
}

impl StreamingState {
    pub fn new(request_id: RequestId) -> Self {
        Self {
            request_id,
            accumulated_text: String::new(),
            last_chunk_at: None,
            is_complete: false,
        }
    }

    pub fn push(&mut self, text: &str) {
        self.accumulated_text.push_str(text);
        self.last_chunk_at = Some(Utc::now());
    }
}

/// A relationship adjustment requested by a parsed model response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipEffect {
    pub target: String,
    pub delta: f32,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Mood adjustment requested by a parsed model response.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MoodShift {
    #[serde(default)]
    pub valence: f32,
    #[serde(default)]
    pub arousal: f32,
}

/// The structured object a model response must parse into.
///
/// All five fields are required on the wire; a response missing any of
/// them is treated as malformed and retried.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedTurn {
    pub utterance: String,
    pub intent: String,
    pub summary_note: String,
    pub relationship_effects: Vec<RelationshipEffect>,
    pub mood_shift: MoodShift,
}

impl ParsedTurn {
    /// Wrap a bare utterance with neutral bookkeeping fields.
    ///
    /// Used for fallback-generated lines and for streamed plain prose.
    pub fn from_utterance(utterance: impl Into<String>, intent: impl Into<String>) -> Self {
        Self {
            utterance: utterance.into(),
            intent: intent.into(),
            summary_note: String::new(),
            relationship_effects: Vec::new(),
            mood_shift: MoodShift::default(),
        }
    }
}

/// Per-strategy outcome tallies plus a rolling success rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPerformanceRecord {
    pub strategy: Strategy,
    pub success_count: u64,
    pub error_count: u64,
    /// Over a bounded window of recent outcomes, in `[0, 1]`.
    pub success_rate: f64,
}

/// Errors from the inference pipeline.
///
/// All three variants are retryable; after `max_retries` the turn degrades
/// to the fallback generator and never surfaces the error to the session.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("request timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_roundtrip() {
        for strategy in [Strategy::Local, Strategy::Cloud] {
            let s = strategy.to_string();
            let parsed: Strategy = s.parse().unwrap();
            assert_eq!(strategy, parsed);
        }
    }

    #[test]
    fn test_stream_event_tagged_serde() {
        let event = StreamEvent::TextDelta {
            text: "hello".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"text_delta\""));
    }

    #[test]
    fn test_streaming_state_push_accumulates() {
        let mut state = StreamingState::new(uuid::Uuid::now_v7());
        state.push("Hel");
        state.push("lo");
        assert_eq!(state.accumulated_text, "Hello");
        assert!(state.last_chunk_at.is_some());
        assert!(!state.is_complete);
    }

    #[test]
    fn test_parsed_turn_from_utterance_has_neutral_fields() {
        let turn = ParsedTurn::from_utterance("Nice weather.", "fallback");
        assert_eq!(turn.utterance, "Nice weather.");
        assert!(turn.relationship_effects.is_empty());
        assert!(turn.mood_shift.valence.abs() < f32::EPSILON);
    }

    #[test]
    fn test_parsed_turn_requires_all_fields() {
        // Missing mood_shift
        let json = r#"{"utterance":"hi","intent":"greet","summary_note":"","relationship_effects":[]}"#;
        assert!(serde_json::from_str::<ParsedTurn>(json).is_err());
    }

    #[test]
    fn test_inference_error_display() {
        let err = InferenceError::Timeout { elapsed_ms: 8000 };
        assert!(err.to_string().contains("8000"));
    }
}
