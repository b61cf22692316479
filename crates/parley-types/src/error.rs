use thiserror::Error;

use crate::agent::AgentId;

/// Errors from session-management operations.
///
/// These are caller misuse or resource exhaustion; they are surfaced
/// synchronously and never retried internally.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("invalid participants: {0}")]
    InvalidParticipants(String),

    #[error("session not found")]
    SessionNotFound,

    #[error("session is not active")]
    SessionInactive,

    #[error("session is full")]
    SessionFull,

    #[error("agent '{0}' is already participating in an active session")]
    AlreadyParticipating(AgentId),

    #[error("session capacity exhausted ({0} active sessions)")]
    CapacityExhausted(usize),
}

/// Errors from context assembly.
///
/// A failed build is a hard stop for that turn: the turn is skipped and
/// retried on the next cycle; state is never fabricated.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("no resolvable persona for agent '{0}'")]
    MissingAgentState(AgentId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_display() {
        let err = SessionError::AlreadyParticipating(AgentId::new("mira"));
        assert_eq!(
            err.to_string(),
            "agent 'mira' is already participating in an active session"
        );
    }

    #[test]
    fn test_context_error_display() {
        let err = ContextError::MissingAgentState(AgentId::new("ghost"));
        assert!(err.to_string().contains("ghost"));
    }
}
