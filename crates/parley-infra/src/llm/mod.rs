//! Concrete [`ModelProvider`] implementations over HTTP.
//!
//! Both backends speak the OpenAI-compatible chat completions contract;
//! they differ in base URL, auth, and token ceiling (sized upstream).
//!
//! [`ModelProvider`]: parley_core::llm::provider::ModelProvider

pub mod cloud;
pub mod local;
pub mod sse;
pub mod wire;

use parley_core::llm::box_provider::BoxModelProvider;
use parley_types::config::ProviderEndpoints;

use self::cloud::CloudModelProvider;
use self::local::LocalModelProvider;

/// Errors constructing providers from configuration.
#[derive(Debug, thiserror::Error)]
pub enum ProviderSetupError {
    /// The named environment variable holding the cloud API key is unset.
    #[error("cloud API key environment variable '{0}' is not set")]
    MissingApiKey(String),
}

/// Build the (local, cloud) provider pair from endpoint configuration.
pub fn build_providers(
    endpoints: &ProviderEndpoints,
) -> Result<(BoxModelProvider, BoxModelProvider), ProviderSetupError> {
    let local = LocalModelProvider::from_endpoints(endpoints);
    let cloud = CloudModelProvider::from_endpoints(endpoints)?;
    Ok((BoxModelProvider::new(local), BoxModelProvider::new(cloud)))
}
