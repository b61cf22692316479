//! Top-level session coordination.
//!
//! The manager owns every live session and the participant index used to
//! enforce the one-conversation-per-agent invariant. Each session sits
//! behind its own async mutex; the `turn_in_flight` flag inside the
//! session makes `advance_turn` a structural no-op while an inference
//! request is outstanding, so at most one request exists per session.
//!
//! Lock discipline: the participant index is a std mutex, never held
//! across an await; a session's mutex is released for the duration of
//! the inference round trip.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use parley_types::agent::AgentId;
use parley_types::config::SessionConfig;
use parley_types::error::SessionError;
use parley_types::event::SessionEvent;
use parley_types::memory::MemoryRecord;
use parley_types::session::{EndReason, SessionId, TurnRecord, UtteranceSource};

use crate::context::ContextBuilder;
use crate::event::EventBus;
use crate::llm::client::InferenceClient;
use crate::session::state::ConversationSession;
use crate::session::topic::TopicSelector;
use crate::world::{AgentStateProvider, MemoryProvider, RelationshipProvider};

/// Minimum composite score for an automatic topic drift to fire.
const DRIFT_SCORE_FLOOR: f32 = 0.25;

/// Per-turn relationship deltas are clamped to this magnitude.
const MAX_RELATIONSHIP_DELTA: f32 = 0.2;

/// Result of one `advance_turn` call.
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    /// A turn resolved and was appended.
    Advanced {
        speaker: AgentId,
        utterance: String,
        source: UtteranceSource,
        turn_number: u32,
    },
    /// A request is already outstanding for this session.
    InFlight,
    /// The scheduled speaker had no resolvable persona; nothing happened.
    SpeakerSkipped(AgentId),
    /// The turn (or a pre-check) ended the session.
    Ended(EndReason),
}

/// Coordinator for all live conversation sessions.
pub struct SessionManager {
    sessions: DashMap<SessionId, Arc<Mutex<ConversationSession>>>,
    /// participant -> session binding, the one-conversation invariant.
    index: std::sync::Mutex<HashMap<AgentId, SessionId>>,
    config: SessionConfig,
    builder: ContextBuilder,
    inference: Arc<InferenceClient>,
    topics: TopicSelector,
    agents: Arc<dyn AgentStateProvider>,
    memories: Arc<dyn MemoryProvider>,
    relationships: Arc<dyn RelationshipProvider>,
    bus: EventBus,
}

impl SessionManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SessionConfig,
        builder: ContextBuilder,
        inference: Arc<InferenceClient>,
        topics: TopicSelector,
        agents: Arc<dyn AgentStateProvider>,
        memories: Arc<dyn MemoryProvider>,
        relationships: Arc<dyn RelationshipProvider>,
        bus: EventBus,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            index: std::sync::Mutex::new(HashMap::new()),
            config,
            builder,
            inference,
            topics,
            agents,
            memories,
            relationships,
            bus,
        }
    }

    /// Start a session. Fails when the participant count is out of
    /// bounds, any participant is already in a session, or the session
    /// ceiling is reached.
    pub fn start_session(
        &self,
        participants: Vec<AgentId>,
        initial_topic: impl Into<String>,
    ) -> Result<SessionId, SessionError> {
        if participants.len() < 2 || participants.len() > self.config.max_participants {
            return Err(SessionError::InvalidParticipants(format!(
                "participant count {} outside [2, {}]",
                participants.len(),
                self.config.max_participants
            )));
        }
        let unique: HashSet<&AgentId> = participants.iter().collect();
        if unique.len() != participants.len() {
            return Err(SessionError::InvalidParticipants(
                "duplicate participant ids".to_string(),
            ));
        }
        if self.sessions.len() >= self.config.max_sessions {
            return Err(SessionError::CapacityExhausted(self.config.max_sessions));
        }

        let topic = initial_topic.into();
        let id = Uuid::now_v7();

        // Check and bind atomically so concurrent starts cannot both
        // claim the same participant.
        {
            let mut index = self.index.lock().expect("index lock poisoned");
            if let Some(bound) = participants.iter().find(|p| index.contains_key(*p)) {
                return Err(SessionError::InvalidParticipants(format!(
                    "{bound} is already in a session"
                )));
            }
            for participant in &participants {
                index.insert(participant.clone(), id);
            }
        }

        let session = ConversationSession::new(id, participants.clone(), &*topic, &self.config);
        self.sessions.insert(id, Arc::new(Mutex::new(session)));

        info!(session_id = %id, ?participants, topic, "session started");
        self.bus.publish(SessionEvent::SessionStarted {
            session_id: id,
            participants,
            topic,
        });
        Ok(id)
    }

    /// Add a participant to a running session.
    pub async fn join_session(
        &self,
        session_id: SessionId,
        participant: AgentId,
    ) -> Result<(), SessionError> {
        let session = self.session_arc(session_id)?;
        let mut session = session.lock().await;
        if !session.is_active {
            return Err(SessionError::SessionInactive);
        }
        if session.participants.len() >= self.config.max_participants {
            return Err(SessionError::SessionFull);
        }

        {
            let mut index = self.index.lock().expect("index lock poisoned");
            if index.contains_key(&participant) {
                return Err(SessionError::AlreadyParticipating(participant));
            }
            index.insert(participant.clone(), session_id);
        }

        debug!(session_id = %session_id, %participant, "participant joined");
        session.add_participant(participant);
        Ok(())
    }

    /// Remove a participant; ends the session if fewer than two remain.
    pub async fn leave_session(
        &self,
        session_id: SessionId,
        participant: &AgentId,
        reason: &str,
    ) -> Result<(), SessionError> {
        let session = self.session_arc(session_id)?;
        let mut session = session.lock().await;
        if !session.participants.contains(participant) {
            return Err(SessionError::InvalidParticipants(format!(
                "{participant} is not in this session"
            )));
        }

        session.remove_participant(participant);
        self.index
            .lock()
            .expect("index lock poisoned")
            .remove(participant);
        debug!(session_id = %session_id, %participant, reason, "participant left");

        if session.participants.len() < 2 {
            self.end_locked(&mut session, EndReason::InsufficientParticipants);
        }
        Ok(())
    }

    /// Change a session's topic on behalf of an external caller.
    pub async fn inject_topic(
        &self,
        session_id: SessionId,
        topic: &str,
        reason: &str,
    ) -> Result<(), SessionError> {
        let session = self.session_arc(session_id)?;
        let mut session = session.lock().await;
        if !session.is_active {
            return Err(SessionError::SessionInactive);
        }
        session.change_topic(topic, reason);
        Ok(())
    }

    /// Drive one turn: schedule a speaker, build context, resolve
    /// inference, append the utterance, and check end conditions.
    ///
    /// Idempotent while a request is outstanding: concurrent calls for
    /// the same session return [`TurnOutcome::InFlight`] without issuing
    /// a second request.
    pub async fn advance_turn(&self, session_id: SessionId) -> Result<TurnOutcome, SessionError> {
        let session_arc = self.session_arc(session_id)?;

        // Phase one, under the session lock: pick the speaker and build
        // the context snapshot.
        let ctx = {
            let mut session = session_arc.lock().await;
            if !session.is_active {
                return Err(SessionError::SessionInactive);
            }
            if session.turn_in_flight {
                return Ok(TurnOutcome::InFlight);
            }
            if let Some(reason) = self.check_end(&session) {
                self.end_locked(&mut session, reason);
                return Ok(TurnOutcome::Ended(reason));
            }

            let participants = session.participants.clone();
            let Some(speaker) = session.scheduler.next_speaker(&participants) else {
                return Err(SessionError::InvalidParticipants(
                    "no schedulable speaker".to_string(),
                ));
            };

            match self.builder.build_context(&speaker, &session) {
                Ok(ctx) => {
                    session.turn_in_flight = true;
                    ctx
                }
                Err(error) => {
                    warn!(session_id = %session_id, %speaker, %error, "skipping turn");
                    return Ok(TurnOutcome::SpeakerSkipped(speaker));
                }
            }
        };

        // The lock is released for the inference round trip; the
        // in-flight flag keeps this session single-file.
        let resolved = self.inference.resolve(session_id, &ctx).await;

        // Phase two: append the turn and run post-turn bookkeeping.
        let mut session = session_arc.lock().await;
        session.turn_in_flight = false;

        let speaker = ctx.speaker.clone();
        let turn = &resolved.turn;
        let significance = if turn.summary_note.is_empty() { 0.3 } else { 0.5 };
        session.append_turn(TurnRecord {
            speaker: speaker.clone(),
            utterance: turn.utterance.clone(),
            mood_shift: turn.mood_shift,
            significance,
            source: resolved.source,
            at: Utc::now(),
        });
        session.cohesion =
            (session.cohesion + turn.mood_shift.valence * 0.1).clamp(0.0, 1.0);
        let turn_number = session.turn_count;

        self.bus.publish(SessionEvent::TurnAdvanced {
            session_id,
            speaker: speaker.clone(),
            turn_number,
            source: resolved.source,
        });

        self.apply_turn_effects(&speaker, &session, turn);
        self.maybe_drift_topic(&mut session);

        if let Some(reason) = self.check_end(&session) {
            self.end_locked(&mut session, reason);
            return Ok(TurnOutcome::Ended(reason));
        }

        Ok(TurnOutcome::Advanced {
            speaker,
            utterance: turn.utterance.clone(),
            source: resolved.source,
            turn_number,
        })
    }

    /// Honor an interruption request if nothing is outstanding and the
    /// priority clears the configured threshold.
    pub async fn request_interruption(
        &self,
        session_id: SessionId,
        candidate: &AgentId,
        priority: f32,
    ) -> Result<bool, SessionError> {
        let session = self.session_arc(session_id)?;
        let mut session = session.lock().await;
        if !session.is_active {
            return Err(SessionError::SessionInactive);
        }
        if session.turn_in_flight
            || priority <= self.config.interrupt_priority_threshold
            || !session.participants.contains(candidate)
        {
            return Ok(false);
        }
        session.scheduler.promote(candidate);
        debug!(session_id = %session_id, %candidate, priority, "interruption honored");
        Ok(true)
    }

    /// End a session explicitly.
    pub async fn end_session(
        &self,
        session_id: SessionId,
        reason: EndReason,
    ) -> Result<(), SessionError> {
        let session = self.session_arc(session_id)?;
        let mut session = session.lock().await;
        if !session.is_active {
            return Err(SessionError::SessionInactive);
        }
        self.end_locked(&mut session, reason);
        Ok(())
    }

    /// The session an agent is currently bound to, if any.
    pub fn session_of(&self, agent: &AgentId) -> Option<SessionId> {
        self.index
            .lock()
            .expect("index lock poisoned")
            .get(agent)
            .copied()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Snapshot a session's state (for observers and tests).
    pub async fn snapshot(&self, session_id: SessionId) -> Result<ConversationSession, SessionError> {
        let session = self.session_arc(session_id)?;
        let session = session.lock().await;
        Ok(session.clone())
    }

    /// Periodically force-end sessions that outlived the wall-clock cap,
    /// even when no turn is in flight.
    pub fn spawn_staleness_sweep(self: &Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(
                manager.config.sweep_interval_secs.max(1),
            ));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => manager.sweep_stale_sessions().await,
                }
            }
        })
    }

    async fn sweep_stale_sessions(&self) {
        let ids: Vec<SessionId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            let Some(session) = self.sessions.get(&id).map(|e| Arc::clone(e.value())) else {
                continue;
            };
            let mut session = session.lock().await;
            if session.is_active && session.elapsed_secs() >= self.config.max_duration_secs {
                info!(session_id = %id, "staleness sweep ending overdue session");
                self.end_locked(&mut session, EndReason::TimeLimitReached);
            }
        }
    }

    fn session_arc(
        &self,
        session_id: SessionId,
    ) -> Result<Arc<Mutex<ConversationSession>>, SessionError> {
        self.sessions
            .get(&session_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(SessionError::SessionNotFound)
    }

    fn check_end(&self, session: &ConversationSession) -> Option<EndReason> {
        let fatigues: Vec<f32> = session
            .participants
            .iter()
            .map(|p| self.agents.social_fatigue(p))
            .collect();
        session.end_reason(&self.config, &fatigues)
    }

    /// Mark ended, release participants, record per-agent summaries, and
    /// publish the lifecycle event. Caller holds the session lock.
    fn end_locked(&self, session: &mut ConversationSession, reason: EndReason) {
        if !session.is_active {
            return;
        }
        session.is_active = false;

        {
            let mut index = self.index.lock().expect("index lock poisoned");
            for participant in &session.participants {
                index.remove(participant);
            }
        }
        self.sessions.remove(&session.id);

        for participant in &session.participants {
            let others: Vec<String> = session
                .participants
                .iter()
                .filter(|p| *p != participant)
                .map(|p| p.0.clone())
                .collect();
            let mut tags = others.clone();
            tags.push(session.current_topic.clone());
            self.memories.record_memory(
                participant,
                MemoryRecord::new(
                    format!(
                        "Talked with {} about {} ({} turns)",
                        others.join(", "),
                        session.current_topic,
                        session.turn_count
                    ),
                    tags,
                    0.4,
                ),
            );
        }

        info!(
            session_id = %session.id,
            %reason,
            turn_count = session.turn_count,
            "session ended"
        );
        self.bus.publish(SessionEvent::SessionEnded {
            session_id: session.id,
            reason,
            turn_count: session.turn_count,
        });
    }

    /// Write the turn's memory and relationship effects to the world.
    fn apply_turn_effects(
        &self,
        speaker: &AgentId,
        session: &ConversationSession,
        turn: &parley_types::llm::ParsedTurn,
    ) {
        let content = if turn.summary_note.is_empty() {
            turn.utterance.clone()
        } else {
            turn.summary_note.clone()
        };
        let mut tags = vec![session.current_topic.clone()];
        tags.extend(
            session
                .participants
                .iter()
                .filter(|p| *p != speaker)
                .map(|p| p.0.clone()),
        );
        self.memories
            .record_memory(speaker, MemoryRecord::new(content, tags, 0.3));

        for effect in &turn.relationship_effects {
            let target = AgentId::new(&effect.target);
            if target == *speaker || !session.participants.contains(&target) {
                continue;
            }
            let delta = effect
                .delta
                .clamp(-MAX_RELATIONSHIP_DELTA, MAX_RELATIONSHIP_DELTA);
            let reason = effect.reason.as_deref().unwrap_or("conversation");
            self.relationships.apply_delta(speaker, &target, delta, reason);
        }
    }

    /// Every `topic_drift_interval` turns, consider switching to the
    /// best-scoring candidate topic.
    fn maybe_drift_topic(&self, session: &mut ConversationSession) {
        if session.turn_count == 0
            || self.config.topic_drift_interval == 0
            || session.turn_count % self.config.topic_drift_interval != 0
        {
            return;
        }

        let profiles: Vec<_> = session
            .participants
            .iter()
            .filter_map(|p| self.agents.persona(p))
            .collect();
        let suggestions =
            self.topics
                .suggest_topics(&session.current_topic, &profiles, &session.topic_history);
        if let Some(top) = suggestions.first() {
            if top.score >= DRIFT_SCORE_FLOOR {
                debug!(
                    session_id = %session.id,
                    from = session.current_topic,
                    to = top.topic,
                    score = top.score,
                    "topic drift"
                );
                session.change_topic(&top.topic, "drift");
            }
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("sessions", &self.sessions.len())
            .finish()
    }
}
