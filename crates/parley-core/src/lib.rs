//! Parley core: multi-party conversation orchestration for LLM-backed
//! agents.
//!
//! The engine decides who may speak, assembles per-turn prompt context,
//! drives the inference request lifecycle (strategy selection, retries,
//! streaming, deterministic fallback), and advances session state turn by
//! turn. World data (personas, memories, relationships, environment) is
//! consumed through the read-only collaborator traits in [`world`];
//! concrete model backends implement [`llm::provider::ModelProvider`] in
//! `parley-infra`.

pub mod context;
pub mod event;
pub mod fallback;
pub mod llm;
pub mod session;
pub mod world;
