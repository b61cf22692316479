//! In-memory implementations of the world collaborator traits.
//!
//! Suitable for simulations that keep their whole world state in process,
//! and as the reference backing store for integration tests. All state is
//! behind std mutexes; reads clone out.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;

use parley_core::world::{
    AgentStateProvider, EnvironmentProvider, MemoryProvider, RelationshipProvider,
    RelationshipReading,
};
use parley_types::agent::{AgentId, AgentVitals, PersonaProfile, TraitSet};
use parley_types::memory::MemoryRecord;

#[derive(Debug, Clone)]
struct AgentEntry {
    persona: PersonaProfile,
    traits: TraitSet,
    vitals: AgentVitals,
    fatigue: f32,
    location: Option<String>,
}

/// World conditions shared by every agent.
#[derive(Debug, Clone)]
pub struct WorldConditions {
    pub weather: String,
    pub time_of_day: String,
    pub season: String,
}

impl Default for WorldConditions {
    fn default() -> Self {
        Self {
            weather: "clear".to_string(),
            time_of_day: "midday".to_string(),
            season: "spring".to_string(),
        }
    }
}

/// In-process world state implementing all four collaborator traits.
#[derive(Debug, Default)]
pub struct InMemoryWorld {
    agents: Mutex<HashMap<AgentId, AgentEntry>>,
    /// Newest memories at the front.
    memories: Mutex<HashMap<AgentId, Vec<MemoryRecord>>>,
    relationships: Mutex<HashMap<(AgentId, AgentId), RelationshipReading>>,
    conditions: Mutex<WorldConditions>,
}

impl InMemoryWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent with default traits and vitals.
    pub fn add_agent(&self, id: AgentId, persona: PersonaProfile) {
        self.agents.lock().expect("agents lock poisoned").insert(
            id,
            AgentEntry {
                persona,
                traits: TraitSet::default(),
                vitals: AgentVitals::default(),
                fatigue: 0.0,
                location: None,
            },
        );
    }

    pub fn set_traits(&self, id: &AgentId, traits: TraitSet) {
        if let Some(entry) = self.agents.lock().expect("agents lock poisoned").get_mut(id) {
            entry.traits = traits;
        }
    }

    pub fn set_vitals(&self, id: &AgentId, vitals: AgentVitals) {
        if let Some(entry) = self.agents.lock().expect("agents lock poisoned").get_mut(id) {
            entry.vitals = vitals;
        }
    }

    pub fn set_fatigue(&self, id: &AgentId, fatigue: f32) {
        if let Some(entry) = self.agents.lock().expect("agents lock poisoned").get_mut(id) {
            entry.fatigue = fatigue.clamp(0.0, 1.0);
        }
    }

    pub fn set_location(&self, id: &AgentId, location: impl Into<String>) {
        if let Some(entry) = self.agents.lock().expect("agents lock poisoned").get_mut(id) {
            entry.location = Some(location.into());
        }
    }

    pub fn set_relationship(&self, from: &AgentId, to: &AgentId, kind: &str, strength: f32) {
        self.relationships
            .lock()
            .expect("relationships lock poisoned")
            .insert(
                (from.clone(), to.clone()),
                RelationshipReading {
                    kind: kind.to_string(),
                    strength: strength.clamp(0.0, 1.0),
                    last_interaction: Some(Utc::now()),
                },
            );
    }

    pub fn set_conditions(&self, conditions: WorldConditions) {
        *self.conditions.lock().expect("conditions lock poisoned") = conditions;
    }

    /// All memories recorded for an agent, newest first.
    pub fn memories_of(&self, id: &AgentId) -> Vec<MemoryRecord> {
        self.memories
            .lock()
            .expect("memories lock poisoned")
            .get(id)
            .cloned()
            .unwrap_or_default()
    }
}

impl AgentStateProvider for InMemoryWorld {
    fn persona(&self, agent: &AgentId) -> Option<PersonaProfile> {
        self.agents
            .lock()
            .expect("agents lock poisoned")
            .get(agent)
            .map(|e| e.persona.clone())
    }

    fn traits_of(&self, agent: &AgentId) -> Option<TraitSet> {
        self.agents
            .lock()
            .expect("agents lock poisoned")
            .get(agent)
            .map(|e| e.traits)
    }

    fn mood_and_energy(&self, agent: &AgentId) -> Option<AgentVitals> {
        self.agents
            .lock()
            .expect("agents lock poisoned")
            .get(agent)
            .map(|e| e.vitals)
    }

    fn social_fatigue(&self, agent: &AgentId) -> f32 {
        self.agents
            .lock()
            .expect("agents lock poisoned")
            .get(agent)
            .map(|e| e.fatigue)
            .unwrap_or(0.0)
    }
}

impl MemoryProvider for InMemoryWorld {
    fn recent_memories(&self, agent: &AgentId, n: usize) -> Vec<MemoryRecord> {
        self.memories
            .lock()
            .expect("memories lock poisoned")
            .get(agent)
            .map(|records| records.iter().take(n).cloned().collect())
            .unwrap_or_default()
    }

    fn memories_by_tags(&self, agent: &AgentId, tags: &[String], n: usize) -> Vec<MemoryRecord> {
        self.memories
            .lock()
            .expect("memories lock poisoned")
            .get(agent)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.tags.iter().any(|t| tags.contains(t)))
                    .take(n)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn record_memory(&self, agent: &AgentId, record: MemoryRecord) {
        self.memories
            .lock()
            .expect("memories lock poisoned")
            .entry(agent.clone())
            .or_default()
            .insert(0, record);
    }
}

impl RelationshipProvider for InMemoryWorld {
    fn relationship(&self, agent: &AgentId, target: &AgentId) -> Option<RelationshipReading> {
        self.relationships
            .lock()
            .expect("relationships lock poisoned")
            .get(&(agent.clone(), target.clone()))
            .cloned()
    }

    fn apply_delta(&self, agent: &AgentId, target: &AgentId, delta: f32, _reason: &str) {
        let mut relationships = self
            .relationships
            .lock()
            .expect("relationships lock poisoned");
        let entry = relationships
            .entry((agent.clone(), target.clone()))
            .or_insert_with(|| RelationshipReading {
                kind: "acquaintance".to_string(),
                strength: 0.1,
                last_interaction: None,
            });
        entry.strength = (entry.strength + delta).clamp(0.0, 1.0);
        entry.last_interaction = Some(Utc::now());
    }
}

impl EnvironmentProvider for InMemoryWorld {
    fn location_of(&self, agent: &AgentId) -> Option<String> {
        self.agents
            .lock()
            .expect("agents lock poisoned")
            .get(agent)
            .and_then(|e| e.location.clone())
    }

    fn weather(&self) -> String {
        self.conditions
            .lock()
            .expect("conditions lock poisoned")
            .weather
            .clone()
    }

    fn time_of_day(&self) -> String {
        self.conditions
            .lock()
            .expect("conditions lock poisoned")
            .time_of_day
            .clone()
    }

    fn season(&self) -> String {
        self.conditions
            .lock()
            .expect("conditions lock poisoned")
            .season
            .clone()
    }
}
