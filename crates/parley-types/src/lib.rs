//! Shared domain types for Parley.
//!
//! Plain data shapes only: the session/turn data model, inference
//! request/response types, the lifecycle event enum, error taxonomies,
//! and configuration structs. Business logic lives in `parley-core`.

pub mod agent;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod llm;
pub mod memory;
pub mod session;
