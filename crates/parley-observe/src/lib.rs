//! Observability for the parley engine: tracing subscriber setup and a
//! logging consumer for the conversation lifecycle event bus.

pub mod event_log;
pub mod tracing_setup;
