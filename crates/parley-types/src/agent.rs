//! Agent identity, persona, and state-slice types.
//!
//! Agents themselves live outside this engine; these are the read-only
//! shapes the conversation core pulls from the agent-state collaborator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier for an agent in the simulated world.
///
/// The engine never interprets the contents; ids come from the host
/// simulation (names, UUIDs, whatever it uses).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An agent's persona as served by the agent-state collaborator.
///
/// `system_prompt` and `style_rules` are rendered into the cached persona
/// block; `interests` feed topic affinity scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaProfile {
    pub name: String,
    pub system_prompt: String,
    #[serde(default)]
    pub style_rules: Vec<String>,
    #[serde(default)]
    pub interests: Vec<String>,
}

/// Big-five-style personality sliders, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TraitSet {
    pub extraversion: f32,
    pub agreeableness: f32,
    pub openness: f32,
    pub conscientiousness: f32,
    pub neuroticism: f32,
}

impl Default for TraitSet {
    fn default() -> Self {
        Self {
            extraversion: 0.5,
            agreeableness: 0.5,
            openness: 0.5,
            conscientiousness: 0.5,
            neuroticism: 0.5,
        }
    }
}

/// Current mood and energy reading for one agent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AgentVitals {
    /// Mood valence in `[-1, 1]`.
    pub valence: f32,
    /// Mood arousal in `[0, 1]`.
    pub arousal: f32,
    /// Physical energy in `[0, 1]`.
    pub energy: f32,
}

impl Default for AgentVitals {
    fn default() -> Self {
        Self {
            valence: 0.0,
            arousal: 0.5,
            energy: 0.8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_id_display_and_transparent_serde() {
        let id = AgentId::new("elena");
        assert_eq!(id.to_string(), "elena");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"elena\"");
        let back: AgentId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_trait_set_defaults_are_midpoint() {
        let t = TraitSet::default();
        assert!((t.extraversion - 0.5).abs() < f32::EPSILON);
        assert!((t.agreeableness - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_persona_profile_optional_fields_default_empty() {
        let json = r#"{"name":"Elena","system_prompt":"You are Elena."}"#;
        let profile: PersonaProfile = serde_json::from_str(json).unwrap();
        assert!(profile.style_rules.is_empty());
        assert!(profile.interests.is_empty());
    }
}
