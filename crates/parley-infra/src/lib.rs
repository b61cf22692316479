//! Infrastructure for the parley engine: concrete model backends over
//! HTTP, configuration loading, and in-memory implementations of the
//! world collaborator traits.

pub mod config;
pub mod llm;
pub mod world;
