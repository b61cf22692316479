//! Inference client and model-provider abstractions.
//!
//! - `ModelProvider`: RPITIT trait for concrete backend implementations
//! - `BoxModelProvider`: object-safe wrapper for dynamic dispatch
//! - `InferenceClient`: strategy selection, retries, streaming, fallback
//! - `StrategyPerformance` / `PersonaCache`: shared bounded state

pub mod box_provider;
pub mod client;
pub mod parse;
pub mod perf;
pub mod persona_cache;
pub mod provider;
