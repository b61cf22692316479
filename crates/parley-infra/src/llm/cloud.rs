//! Cloud model backend (OpenAI-compatible, Bearer auth).

use std::pin::Pin;
use std::time::Duration;

use futures_util::Stream;
use secrecy::{ExposeSecret, SecretString};

use parley_core::llm::provider::ModelProvider;
use parley_types::config::ProviderEndpoints;
use parley_types::llm::{CompletionRequest, CompletionResponse, InferenceError, StreamEvent};

use super::sse::open_chat_stream;
use super::wire::{from_wire, to_wire, ChatResponse};
use super::ProviderSetupError;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Provider for a hosted OpenAI-compatible endpoint.
///
/// Does not derive Debug; the API key must never reach logs.
pub struct CloudModelProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: SecretString,
}

impl CloudModelProvider {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: SecretString,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            api_key,
        }
    }

    /// Construct from endpoint config, resolving the API key from the
    /// environment variable the config names.
    pub fn from_endpoints(endpoints: &ProviderEndpoints) -> Result<Self, ProviderSetupError> {
        let key = std::env::var(&endpoints.cloud_api_key_env)
            .map_err(|_| ProviderSetupError::MissingApiKey(endpoints.cloud_api_key_env.clone()))?;
        Ok(Self::new(
            &endpoints.cloud_base_url,
            &endpoints.cloud_model,
            SecretString::from(key),
        ))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

impl ModelProvider for CloudModelProvider {
    fn name(&self) -> &str {
        "cloud"
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
            .bearer_auth(self.api_key.expose_secret())
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
            Some(SecretString::from(self.api_key.expose_secret())),
            body,
        )
    }

    async fn probe(&self) -> bool {
        self.client
            .get(self.url("/v1/models"))
            .bearer_auth(self.api_key.expose_secret())
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}
