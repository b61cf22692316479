//! Conversation-session data model: ids, turn records, topic history,
//! mood state, and end reasons.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::agent::AgentId;
use crate::llm::MoodShift;

/// Unique identifier for a conversation session (UUID v7, time-sortable).
pub type SessionId = uuid::Uuid;

/// Unique identifier for an inference request.
pub type RequestId = uuid::Uuid;

/// Where a resolved utterance came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UtteranceSource {
    /// A model backend produced it.
    Model,
    /// The deterministic template generator produced it.
    Fallback,
}

impl fmt::Display for UtteranceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UtteranceSource::Model => write!(f, "model"),
            UtteranceSource::Fallback => write!(f, "fallback"),
        }
    }
}

/// One resolved turn as kept in the session's bounded memory log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    pub speaker: AgentId,
    pub utterance: String,
    /// Mood adjustment the turn applied to the session mood, both axes.
    pub mood_shift: MoodShift,
    /// Importance in `[0, 1]`.
    pub significance: f32,
    pub source: UtteranceSource,
    pub at: DateTime<Utc>,
}

/// Snapshot of an outgoing topic, appended to `topic_history` on change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicChange {
    pub topic: String,
    pub duration_secs: u64,
    pub participants: Vec<AgentId>,
    pub reason: String,
}

/// Shared emotional tone of a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MoodState {
    /// In `[-1, 1]`.
    pub valence: f32,
    /// In `[0, 1]`.
    pub arousal: f32,
}

impl Default for MoodState {
    fn default() -> Self {
        Self {
            valence: 0.0,
            arousal: 0.5,
        }
    }
}

impl MoodState {
    /// Apply a shift, clamping both axes to their invariant ranges.
    pub fn shift(&mut self, valence_delta: f32, arousal_delta: f32) {
        self.valence = (self.valence + valence_delta).clamp(-1.0, 1.0);
        self.arousal = (self.arousal + arousal_delta).clamp(0.0, 1.0);
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Fewer than two participants remain.
    InsufficientParticipants,
    /// The turn cap was reached.
    TurnLimitReached,
    /// The wall-clock cap was exceeded.
    TimeLimitReached,
    /// Every participant's social fatigue crossed the threshold.
    ParticipantsFatigued,
    /// Two-participant session stuck on a stale topic in a negative mood.
    DuoExhaustion,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::InsufficientParticipants => write!(f, "insufficient_participants"),
            EndReason::TurnLimitReached => write!(f, "turn_limit_reached"),
            EndReason::TimeLimitReached => write!(f, "time_limit_reached"),
            EndReason::ParticipantsFatigued => write!(f, "participants_fatigued"),
            EndReason::DuoExhaustion => write!(f, "duo_exhaustion"),
        }
    }
}
