//! Collaborator traits for external world data.
//!
//! The conversation core treats agent state, memories, relationships, and
//! the environment as external systems reached through these narrow
//! interfaces. Reads are synchronous over in-memory world state; the two
//! write calls (`record_memory`, `apply_delta`) are fire-and-forget from
//! the core's perspective.
//!
//! Implementations live in `parley-infra` (and in test support code).

use chrono::{DateTime, Utc};

use parley_types::agent::{AgentId, AgentVitals, PersonaProfile, TraitSet};
use parley_types::memory::MemoryRecord;

/// Read access to per-agent persona, traits, mood, and fatigue.
pub trait AgentStateProvider: Send + Sync {
    /// The agent's persona, or `None` if the agent is unknown.
    fn persona(&self, agent: &AgentId) -> Option<PersonaProfile>;

    /// Personality sliders; `None` for unknown agents.
    fn traits_of(&self, agent: &AgentId) -> Option<TraitSet>;

    /// Current mood and energy; `None` for unknown agents.
    fn mood_and_energy(&self, agent: &AgentId) -> Option<AgentVitals>;

    /// Social fatigue in `[0, 1]`. Unknown agents read as fully rested.
    fn social_fatigue(&self, agent: &AgentId) -> f32;
}

/// Read/write access to agent memories.
pub trait MemoryProvider: Send + Sync {
    /// The agent's `n` most recent memories, newest first.
    fn recent_memories(&self, agent: &AgentId, n: usize) -> Vec<MemoryRecord>;

    /// Up to `n` memories carrying any of the given tags, newest first.
    fn memories_by_tags(&self, agent: &AgentId, tags: &[String], n: usize) -> Vec<MemoryRecord>;

    /// Record a new memory. Called after each resolved turn and at
    /// session end.
    fn record_memory(&self, agent: &AgentId, record: MemoryRecord);
}

/// A relationship reading toward one other agent.
#[derive(Debug, Clone)]
pub struct RelationshipReading {
    pub kind: String,
    /// In `[0, 1]`.
    pub strength: f32,
    pub last_interaction: Option<DateTime<Utc>>,
}

/// Read/write access to pairwise relationships.
pub trait RelationshipProvider: Send + Sync {
    /// The relationship from `agent` toward `target`, if any is tracked.
    fn relationship(&self, agent: &AgentId, target: &AgentId) -> Option<RelationshipReading>;

    /// Apply a strength delta. Called after parsing a model response's
    /// relationship effects.
    fn apply_delta(&self, agent: &AgentId, target: &AgentId, delta: f32, reason: &str);
}

/// Read access to world conditions around an agent.
pub trait EnvironmentProvider: Send + Sync {
    fn location_of(&self, agent: &AgentId) -> Option<String>;
    fn weather(&self) -> String;
    fn time_of_day(&self) -> String;
    fn season(&self) -> String;
}
