//! Wire types for the OpenAI-compatible chat completions contract.
//!
//! Both backends speak the same shape; they differ only in base URL and
//! auth header. The system message travels as the first entry of
//! `messages`, which is how chat-completions endpoints expect it.

use serde::{Deserialize, Serialize};

use parley_types::llm::{
    CompletionRequest, CompletionResponse, InferenceError, StreamEvent,
};

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    pub stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub id: String,
    pub model: String,
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: WireMessage,
    pub finish_reason: Option<String>,
}

/// One SSE chunk of a streaming response.
#[derive(Debug, Deserialize)]
pub struct ChatChunk {
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChunkChoice {
    pub delta: ChunkDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
}

/// Shape a [`CompletionRequest`] for the wire.
pub fn to_wire(request: &CompletionRequest, stream: bool) -> ChatRequest {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if let Some(system) = &request.system {
        messages.push(WireMessage {
            role: "system".to_string(),
            content: system.clone(),
        });
    }
    messages.extend(request.messages.iter().map(|m| WireMessage {
        role: m.role.to_string(),
        content: m.content.clone(),
    }));

    ChatRequest {
        model: request.model.clone(),
        messages,
        max_tokens: request.max_tokens,
        temperature: request.temperature,
        stream,
    }
}

/// Map a non-streaming wire response back to the engine shape.
pub fn from_wire(response: ChatResponse) -> Result<CompletionResponse, InferenceError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| InferenceError::MalformedResponse("response has no choices".to_string()))?;

    Ok(CompletionResponse {
        id: response.id,
        content: choice.message.content,
        model: response.model,
        finish_reason: choice.finish_reason,
    })
}

/// Map one streaming chunk to zero or more engine stream events.
pub fn chunk_events(chunk: ChatChunk) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    for choice in chunk.choices {
        if let Some(text) = choice.delta.content {
            if !text.is_empty() {
                events.push(StreamEvent::TextDelta { text });
            }
        }
        if let Some(reason) = choice.finish_reason {
            events.push(StreamEvent::Finished { reason });
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_types::llm::{ChatMessage, MessageRole};

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "llama3.1:8b".to_string(),
            messages: vec![ChatMessage {
                role: MessageRole::User,
                content: "Say your line.".to_string(),
            }],
            system: Some("You are Elena.".to_string()),
            max_tokens: 256,
            temperature: Some(0.8),
            stream: false,
        }
    }

    #[test]
    fn test_system_travels_as_first_message() {
        let wire = to_wire(&request(), false);
        assert_eq!(wire.messages.len(), 2);
        assert_eq!(wire.messages[0].role, "system");
        assert_eq!(wire.messages[0].content, "You are Elena.");
        assert_eq!(wire.messages[1].role, "user");
    }

    #[test]
    fn test_request_serializes_without_null_temperature() {
        let mut req = request();
        req.temperature = None;
        let json = serde_json::to_string(&to_wire(&req, true)).unwrap();
        assert!(!json.contains("temperature"));
        assert!(json.contains("\"stream\":true"));
    }

    #[test]
    fn test_response_maps_first_choice() {
        let json = r#"{
            "id": "chatcmpl-1",
            "model": "llama3.1:8b",
            "choices": [{
                "message": {"role": "assistant", "content": "Hello."},
                "finish_reason": "stop"
            }]
        }"#;
        let response: ChatResponse = serde_json::from_str(json).unwrap();
        let mapped = from_wire(response).unwrap();
        assert_eq!(mapped.content, "Hello.");
        assert_eq!(mapped.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_empty_choices_is_malformed() {
        let json = r#"{"id": "x", "model": "m", "choices": []}"#;
        let response: ChatResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(
            from_wire(response),
            Err(InferenceError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_chunk_maps_delta_and_finish() {
        let json = r#"{"choices": [{"delta": {"content": "Hel"}, "finish_reason": null}]}"#;
        let chunk: ChatChunk = serde_json::from_str(json).unwrap();
        let events = chunk_events(chunk);
        assert!(matches!(&events[..], [StreamEvent::TextDelta { text }] if text == "Hel"));

        let json = r#"{"choices": [{"delta": {}, "finish_reason": "stop"}]}"#;
        let chunk: ChatChunk = serde_json::from_str(json).unwrap();
        let events = chunk_events(chunk);
        assert!(matches!(&events[..], [StreamEvent::Finished { reason }] if reason == "stop"));
    }
}
