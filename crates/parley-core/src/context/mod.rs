//! Per-turn context assembly.
//!
//! `ContextBuilder` pulls read-only slices from the world collaborators
//! and shapes them into a [`ContextSnapshot`] for the inference client.
//! The only failure mode is a speaker with no resolvable persona, which
//! is a hard stop for that turn; every other gap degrades to defaults.

use std::sync::Arc;

use tracing::debug;

use parley_types::agent::AgentId;
use parley_types::context::{
    AgreementSignal, ContextSnapshot, ConversationFrame, EnvironmentSlice, MemorySlice,
    ParticipantRelationship, TurnDirectives,
};
use parley_types::error::ContextError;

use crate::llm::client::InferenceClient;
use crate::session::state::ConversationSession;
use crate::world::{AgentStateProvider, EnvironmentProvider, MemoryProvider, RelationshipProvider};

/// Memory slice caps: recent, topical, social.
const RECENT_MEMORIES: usize = 5;
const TOPICAL_MEMORIES: usize = 3;
const SOCIAL_MEMORIES: usize = 3;

/// Turns of history included in the conversation frame.
const FRAME_TURNS: usize = 8;

/// Relationship strength bounds for the agreement signal.
const AGREE_STRENGTH: f32 = 0.6;
const DISAGREE_STRENGTH: f32 = 0.3;

/// Assembles prompt context from the world collaborators.
pub struct ContextBuilder {
    agents: Arc<dyn AgentStateProvider>,
    memories: Arc<dyn MemoryProvider>,
    relationships: Arc<dyn RelationshipProvider>,
    environment: Arc<dyn EnvironmentProvider>,
    inference: Arc<InferenceClient>,
    temperature: f64,
}

impl ContextBuilder {
    pub fn new(
        agents: Arc<dyn AgentStateProvider>,
        memories: Arc<dyn MemoryProvider>,
        relationships: Arc<dyn RelationshipProvider>,
        environment: Arc<dyn EnvironmentProvider>,
        inference: Arc<InferenceClient>,
        temperature: f64,
    ) -> Self {
        Self {
            agents,
            memories,
            relationships,
            environment,
            inference,
            temperature,
        }
    }

    /// Build the full context for `speaker`'s next turn.
    ///
    /// Performs only reads. Fails with [`ContextError::MissingAgentState`]
    /// when the speaker has no persona; the caller must skip the turn
    /// rather than fabricate one.
    pub fn build_context(
        &self,
        speaker: &AgentId,
        session: &ConversationSession,
    ) -> Result<ContextSnapshot, ContextError> {
        let persona = self
            .agents
            .persona(speaker)
            .ok_or_else(|| ContextError::MissingAgentState(speaker.clone()))?;

        let persona_block = self.inference.persona_block(speaker, &persona);
        let traits = self.agents.traits_of(speaker).unwrap_or_default();
        let vitals = self.agents.mood_and_energy(speaker).unwrap_or_default();

        let relationships = self.relationship_slice(speaker, session);
        let agreement = agreement_signal(&relationships, session);

        let topic_just_changed = session.topic_just_changed();
        let closing = session.turn_count + 2 >= session.turn_cap;
        let directives = TurnDirectives {
            topic: session.current_topic.clone(),
            temperature: self.temperature,
            spotlight: topic_just_changed || session.turn_count == 0,
            closing,
            topic_just_changed,
            agreement,
        };

        let memories = self.memory_slice(speaker, session);
        debug!(
            speaker = %speaker,
            session_id = %session.id,
            memories = memories.total(),
            closing,
            "context assembled"
        );

        Ok(ContextSnapshot {
            speaker: speaker.clone(),
            persona_block,
            traits,
            vitals,
            location: self.environment.location_of(speaker),
            directives,
            relationships,
            memories,
            frame: ConversationFrame {
                session_id: session.id,
                turn_number: session.turn_count,
                turn_cap: session.turn_cap,
                participants: session.participants.clone(),
                current_topic: session.current_topic.clone(),
                recent_turns: session.recent_turns(FRAME_TURNS),
            },
            environment: EnvironmentSlice {
                weather: self.environment.weather(),
                time_of_day: self.environment.time_of_day(),
                season: self.environment.season(),
            },
        })
    }

    fn relationship_slice(
        &self,
        speaker: &AgentId,
        session: &ConversationSession,
    ) -> Vec<ParticipantRelationship> {
        session
            .participants
            .iter()
            .filter(|p| *p != speaker)
            .map(|other| match self.relationships.relationship(speaker, other) {
                Some(reading) => ParticipantRelationship {
                    target: other.clone(),
                    kind: reading.kind,
                    strength: reading.strength,
                    last_interaction: reading.last_interaction,
                },
                None => ParticipantRelationship {
                    target: other.clone(),
                    kind: "stranger".to_string(),
                    strength: 0.0,
                    last_interaction: None,
                },
            })
            .collect()
    }

    fn memory_slice(&self, speaker: &AgentId, session: &ConversationSession) -> MemorySlice {
        let topic_tags = vec![session.current_topic.clone()];
        let social_tags: Vec<String> = session
            .participants
            .iter()
            .filter(|p| *p != speaker)
            .map(|p| p.0.clone())
            .collect();

        MemorySlice {
            recent: self.memories.recent_memories(speaker, RECENT_MEMORIES),
            topical: self
                .memories
                .memories_by_tags(speaker, &topic_tags, TOPICAL_MEMORIES),
            social: self
                .memories
                .memories_by_tags(speaker, &social_tags, SOCIAL_MEMORIES),
        }
    }
}

/// Derive the coarse agreement stance toward the previous speaker from
/// relationship strength, tempered by the session mood.
fn agreement_signal(
    relationships: &[ParticipantRelationship],
    session: &ConversationSession,
) -> AgreementSignal {
    let Some(previous) = session.last_speaker.as_ref() else {
        return AgreementSignal::Neutral;
    };
    let Some(toward) = relationships.iter().find(|r| &r.target == previous) else {
        return AgreementSignal::Neutral;
    };

    if toward.kind == "stranger" {
        return AgreementSignal::Probe;
    }
    if toward.strength >= AGREE_STRENGTH && session.mood.valence >= 0.0 {
        return AgreementSignal::Agree;
    }
    if toward.strength < DISAGREE_STRENGTH || session.mood.valence < -0.3 {
        return AgreementSignal::Disagree;
    }
    AgreementSignal::Neutral
}

/// Render the system message: persona voice plus the response contract.
pub fn render_system(ctx: &ContextSnapshot) -> String {
    let mut out = String::new();
    out.push_str(&ctx.persona_block);
    out.push_str("\n\n<state>\n");
    out.push_str(&format!(
        "Mood valence: {:.2}, arousal: {:.2}, energy: {:.2}\n",
        ctx.vitals.valence, ctx.vitals.arousal, ctx.vitals.energy
    ));
    if let Some(location) = &ctx.location {
        out.push_str(&format!("Location: {location}\n"));
    }
    out.push_str("</state>\n\n<format>\n");
    out.push_str(
        "Respond with a single JSON object with exactly these fields:\n\
         utterance (string), intent (string), summary_note (string),\n\
         relationship_effects (array of {target, delta, reason}),\n\
         mood_shift ({valence, arousal}).\n",
    );
    out.push_str("</format>");
    out
}

/// Render the user message: the conversational situation.
pub fn render_user(ctx: &ContextSnapshot) -> String {
    let mut out = String::new();

    out.push_str("<conversation>\n");
    out.push_str(&format!(
        "Topic: {} (turn {} of {})\n",
        ctx.frame.current_topic, ctx.frame.turn_number, ctx.frame.turn_cap
    ));
    let names: Vec<&str> = ctx.frame.participants.iter().map(|p| p.0.as_str()).collect();
    out.push_str(&format!("Participants: {}\n", names.join(", ")));
    for turn in &ctx.frame.recent_turns {
        out.push_str(&format!("{}: {}\n", turn.speaker, turn.utterance));
    }
    out.push_str("</conversation>\n");

    out.push_str(&format!(
        "\n<environment>\n{}, {}, {}\n</environment>\n",
        ctx.environment.weather, ctx.environment.time_of_day, ctx.environment.season
    ));

    if !ctx.relationships.is_empty() {
        out.push_str("\n<relationships>\n");
        for rel in &ctx.relationships {
            out.push_str(&format!(
                "{}: {} (strength {:.2})\n",
                rel.target, rel.kind, rel.strength
            ));
        }
        out.push_str("</relationships>\n");
    }

    if ctx.memories.total() > 0 {
        out.push_str("\n<memories>\n");
        for record in ctx
            .memories
            .recent
            .iter()
            .chain(&ctx.memories.topical)
            .chain(&ctx.memories.social)
        {
            out.push_str(&format!("- {}\n", record.content));
        }
        out.push_str("</memories>\n");
    }

    out.push_str("\n<instructions>\n");
    out.push_str(&format!(
        "You are {}. Speak your next line on the topic \"{}\".\n",
        ctx.speaker, ctx.directives.topic
    ));
    if ctx.directives.topic_just_changed {
        out.push_str("The topic has just changed; acknowledge the shift.\n");
    }
    if ctx.directives.closing {
        out.push_str("The conversation is ending; wind it down naturally.\n");
    }
    out.push_str("</instructions>");
    out
}
