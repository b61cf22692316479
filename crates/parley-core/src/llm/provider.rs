//! ModelProvider trait definition.
//!
//! The abstraction both model backends implement. Uses RPITIT for
//! `complete` and `probe`, and `Pin<Box<dyn Stream>>` for `stream`
//! (streams need to be object-safe for the BoxModelProvider wrapper).

use std::pin::Pin;

use futures_util::Stream;

use parley_types::llm::{CompletionRequest, CompletionResponse, InferenceError, StreamEvent};

/// Trait for model backends (local runtime, cloud API).
///
/// Local and cloud endpoints differ in URL, auth header, and token-budget
/// ceiling; the contract is otherwise identical. Implementations live in
/// `parley-infra`.
pub trait ModelProvider: Send + Sync {
    /// Human-readable backend name (e.g., "local", "cloud").
    fn name(&self) -> &str;

    /// Model identifier requests against this backend should carry.
    fn model(&self) -> &str;

    /// Send a completion request and receive the full response.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, InferenceError>> + Send;

    /// Send a streaming completion request. Returns a stream of events.
    ///
    /// Returns a boxed stream (not RPITIT) because streams need to be
    /// object-safe for the `BoxModelProvider` wrapper.
    fn stream(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Stream<Item = Result<StreamEvent, InferenceError>> + Send + 'static>>;

    /// Lightweight reachability probe. Returns `true` when the backend
    /// looks able to serve requests.
    fn probe(&self) -> impl std::future::Future<Output = bool> + Send;
}
