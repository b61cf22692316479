//! Local model backend (Ollama-style, no authentication).

use std::pin::Pin;
use std::time::Duration;

use futures_util::Stream;

use parley_core::llm::provider::ModelProvider;
use parley_types::config::ProviderEndpoints;
use parley_types::llm::{CompletionRequest, CompletionResponse, InferenceError, StreamEvent};

use super::sse::open_chat_stream;
use super::wire::{from_wire, to_wire, ChatResponse};

/// Reachability probes use a short deadline of their own; the per-request
/// timeout is enforced upstream by the inference client.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Provider for a locally hosted OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct LocalModelProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl LocalModelProvider {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    pub fn from_endpoints(endpoints: &ProviderEndpoints) -> Self {
        Self::new(&endpoints.local_base_url, &endpoints.local_model)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

impl ModelProvider for LocalModelProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, InferenceError> {
        let body = to_wire(request, false);
        let response = self
            .client
            .post(self.url("/v1/chat/completions"))
            .json(&body)
            .send()
            .await
            .map_err(|e| InferenceError::Transport(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Transport(format!("HTTP {status}: {body}")));
        }

        let wire: ChatResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::MalformedResponse(format!("bad response body: {e}")))?;
        from_wire(wire)
    }

    fn stream(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Stream<Item = Result<StreamEvent, InferenceError>> + Send + 'static>> {
        let body = to_wire(&request, true);
        open_chat_stream(
            self.client.clone(),
            self.url("/v1/chat/completions"),
            None,
            body,
        )
    }

    async fn probe(&self) -> bool {
        self.client
            .get(self.url("/v1/models"))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_without_double_slash() {
        let provider = LocalModelProvider::new("http://127.0.0.1:11434/", "llama3.1:8b");
        assert_eq!(
            provider.url("/v1/chat/completions"),
            "http://127.0.0.1:11434/v1/chat/completions"
        );
    }

    #[tokio::test]
    async fn test_probe_unreachable_host_is_unhealthy() {
        // Nothing listens on this port.
        let provider = LocalModelProvider::new("http://127.0.0.1:1", "llama3.1:8b");
        assert!(!provider.probe().await);
    }
}
