//! Context snapshot types: everything the inference pipeline needs to
//! know about one speaker's turn, assembled by the context builder.
//!
//! A `ContextSnapshot` is a pure value; building one performs only reads
//! against the external collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::{AgentId, AgentVitals, TraitSet};
use crate::memory::MemoryRecord;
use crate::session::SessionId;

/// Coarse signal for how the speaker is likely to relate to the previous
/// utterance, derived from relationship strength and session mood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgreementSignal {
    Agree,
    Disagree,
    Probe,
    Neutral,
}

/// Per-turn instructions handed to the inference client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnDirectives {
    pub topic: String,
    pub temperature: f64,
    /// High-importance turn; biases model selection toward the cloud backend.
    pub spotlight: bool,
    /// The session is within two turns of its cap; the speaker should wind
    /// the conversation down.
    pub closing: bool,
    /// The topic changed on the current turn.
    pub topic_just_changed: bool,
    pub agreement: AgreementSignal,
}

/// Relationship slice toward one other participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantRelationship {
    pub target: AgentId,
    /// Relationship kind as the relationship provider labels it
    /// ("friend", "rival", "stranger", ...).
    pub kind: String,
    /// In `[0, 1]`.
    pub strength: f32,
    pub last_interaction: Option<DateTime<Utc>>,
}

/// Memory entries selected for one turn: recent, topically relevant, and
/// relevant to the other participants. Each bucket is capped by the builder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemorySlice {
    pub recent: Vec<MemoryRecord>,
    pub topical: Vec<MemoryRecord>,
    pub social: Vec<MemoryRecord>,
}

impl MemorySlice {
    pub fn total(&self) -> usize {
        self.recent.len() + self.topical.len() + self.social.len()
    }
}

/// One prior turn as included in the conversation frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameTurn {
    pub speaker: AgentId,
    pub utterance: String,
}

/// The conversational state visible to the speaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationFrame {
    pub session_id: SessionId,
    pub turn_number: u32,
    pub turn_cap: u32,
    pub participants: Vec<AgentId>,
    pub current_topic: String,
    pub recent_turns: Vec<FrameTurn>,
}

/// World conditions around the speaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentSlice {
    pub weather: String,
    pub time_of_day: String,
    pub season: String,
}

/// The complete structured prompt context for one speaker's turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub speaker: AgentId,
    /// Rendered system-prompt fragment for the speaker's voice/style,
    /// served from the inference client's persona cache.
    pub persona_block: String,
    pub traits: TraitSet,
    pub vitals: AgentVitals,
    pub location: Option<String>,
    pub directives: TurnDirectives,
    pub relationships: Vec<ParticipantRelationship>,
    pub memories: MemorySlice,
    pub frame: ConversationFrame,
    pub environment: EnvironmentSlice,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_slice_total() {
        let slice = MemorySlice {
            recent: vec![MemoryRecord::new("a", vec![], 0.5)],
            topical: vec![
                MemoryRecord::new("b", vec![], 0.5),
                MemoryRecord::new("c", vec![], 0.5),
            ],
            social: vec![],
        };
        assert_eq!(slice.total(), 3);
    }

    #[test]
    fn test_agreement_signal_serde() {
        let json = serde_json::to_string(&AgreementSignal::Disagree).unwrap();
        assert_eq!(json, "\"disagree\"");
    }
}
