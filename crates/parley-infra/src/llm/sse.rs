//! Minimal server-sent-events decoding for chat-completion streams.
//!
//! The chat-completions streaming contract is a sequence of `data: {json}`
//! lines terminated by `data: [DONE]`. The incremental line buffer is kept
//! separate from the HTTP plumbing so it can be tested against raw bytes.

use std::pin::Pin;

use async_stream::stream;
use futures_util::{Stream, StreamExt};
use secrecy::{ExposeSecret, SecretString};

use parley_types::llm::{InferenceError, StreamEvent};

use super::wire::{chunk_events, ChatChunk, ChatRequest};

/// Incremental splitter for `data:` payload lines.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buffer: String,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns the `data:` payloads of every line that
    /// completed, in order. Non-data lines (comments, blank keepalives)
    /// are dropped.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));

        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(payload) = line.strip_prefix("data:") {
                payloads.push(payload.trim_start().to_string());
            }
        }
        payloads
    }
}

/// Open a streaming chat-completions request and decode it into engine
/// stream events.
///
/// Emits `Connected` once the HTTP response arrives, then one event per
/// decoded delta, then `Done` when the provider signals `[DONE]` or the
/// connection closes.
pub fn open_chat_stream(
    client: reqwest::Client,
    url: String,
    bearer: Option<SecretString>,
    body: ChatRequest,
) -> Pin<Box<dyn Stream<Item = Result<StreamEvent, InferenceError>> + Send + 'static>> {
    Box::pin(stream! {
        let mut request = client.post(&url).json(&body);
        if let Some(key) = &bearer {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                yield Err(InferenceError::Transport(format!("connect failed: {err}")));
                return;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            yield Err(InferenceError::Transport(format!("HTTP {status}: {body}")));
            return;
        }

        yield Ok(StreamEvent::Connected);

        let mut lines = SseLineBuffer::new();
        let mut bytes = response.bytes_stream();
        while let Some(next) = bytes.next().await {
            let bytes = match next {
                Ok(bytes) => bytes,
                Err(err) => {
                    yield Err(InferenceError::Transport(format!("stream read: {err}")));
                    return;
                }
            };

            for payload in lines.push(&bytes) {
                if payload == "[DONE]" {
                    yield Ok(StreamEvent::Done);
                    return;
                }
                match serde_json::from_str::<ChatChunk>(&payload) {
                    Ok(chunk) => {
                        for event in chunk_events(chunk) {
                            yield Ok(event);
                        }
                    }
                    Err(err) => {
                        yield Err(InferenceError::MalformedResponse(format!(
                            "bad stream chunk: {err}"
                        )));
                        return;
                    }
                }
            }
        }

        yield Ok(StreamEvent::Done);
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_split_across_reads() {
        let mut buffer = SseLineBuffer::new();
        assert!(buffer.push(b"data: {\"a\":").is_empty());
        let payloads = buffer.push(b" 1}\n\ndata: [DONE]\n");
        assert_eq!(payloads, vec!["{\"a\": 1}".to_string(), "[DONE]".to_string()]);
    }

    #[test]
    fn test_crlf_and_comment_lines() {
        let mut buffer = SseLineBuffer::new();
        let payloads = buffer.push(b": keepalive\r\ndata: {}\r\n");
        assert_eq!(payloads, vec!["{}".to_string()]);
    }

    #[test]
    fn test_multiple_events_in_one_read() {
        let mut buffer = SseLineBuffer::new();
        let payloads = buffer.push(b"data: one\ndata: two\ndata: three\n");
        assert_eq!(payloads.len(), 3);
        assert_eq!(payloads[2], "three");
    }
}
