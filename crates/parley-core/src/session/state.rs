//! Per-session conversation state.
//!
//! A `ConversationSession` is a plain mutable value; all mutation goes
//! through the session manager, which holds each session behind an async
//! mutex. Nothing here performs I/O.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use parley_types::agent::AgentId;
use parley_types::config::SessionConfig;
use parley_types::context::FrameTurn;
use parley_types::session::{EndReason, MoodState, SessionId, TopicChange, TurnRecord};

use super::scheduler::TurnScheduler;

/// One ongoing multi-party conversation.
#[derive(Debug, Clone)]
pub struct ConversationSession {
    pub id: SessionId,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    /// Ordered set; invariant `2 <= len <= max_participants` while active.
    pub participants: Vec<AgentId>,
    pub current_topic: String,
    pub topic_history: Vec<TopicChange>,
    pub topic_since: DateTime<Utc>,
    /// Turn number at which the current topic was set, `None` for the
    /// session's initial topic.
    pub topic_changed_at_turn: Option<u32>,
    pub turn_count: u32,
    pub turn_cap: u32,
    pub last_speaker: Option<AgentId>,
    pub scheduler: TurnScheduler,
    pub mood: MoodState,
    pub cohesion: f32,
    /// Bounded ring of recent turn records.
    pub memory_log: VecDeque<TurnRecord>,
    memory_log_capacity: usize,
    /// Set while an inference request is outstanding for this session.
    pub turn_in_flight: bool,
}

impl ConversationSession {
    pub fn new(
        id: SessionId,
        participants: Vec<AgentId>,
        initial_topic: impl Into<String>,
        config: &SessionConfig,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            is_active: true,
            created_at: now,
            last_activity_at: now,
            scheduler: TurnScheduler::new(&participants),
            participants,
            current_topic: initial_topic.into(),
            topic_history: Vec::new(),
            topic_since: now,
            topic_changed_at_turn: None,
            turn_count: 0,
            turn_cap: config.turn_cap,
            last_speaker: None,
            mood: MoodState::default(),
            cohesion: 0.5,
            memory_log: VecDeque::with_capacity(config.memory_log_capacity),
            memory_log_capacity: config.memory_log_capacity.max(1),
            turn_in_flight: false,
        }
    }

    pub fn add_participant(&mut self, agent: AgentId) {
        self.scheduler.add_participant(&agent);
        self.participants.push(agent);
        self.last_activity_at = Utc::now();
    }

    pub fn remove_participant(&mut self, agent: &AgentId) {
        self.participants.retain(|p| p != agent);
        self.scheduler.remove_participant(agent);
        if self.last_speaker.as_ref() == Some(agent) {
            self.last_speaker = None;
        }
        self.last_activity_at = Utc::now();
    }

    /// Switch topics, snapshotting the outgoing topic into the history.
    /// No-op when the new topic equals the current one.
    pub fn change_topic(&mut self, topic: &str, reason: &str) {
        if topic == self.current_topic {
            return;
        }
        let now = Utc::now();
        let duration_secs = (now - self.topic_since).num_seconds().max(0) as u64;
        self.topic_history.push(TopicChange {
            topic: self.current_topic.clone(),
            duration_secs,
            participants: self.participants.clone(),
            reason: reason.to_string(),
        });
        self.current_topic = topic.to_string();
        self.topic_since = now;
        self.topic_changed_at_turn = Some(self.turn_count);
        self.last_activity_at = now;
    }

    /// Append a resolved turn: bumps the turn counter, applies the mood
    /// shift, and evicts the oldest record when the log is full.
    pub fn append_turn(&mut self, record: TurnRecord) {
        self.mood
            .shift(record.mood_shift.valence, record.mood_shift.arousal);
        self.last_speaker = Some(record.speaker.clone());
        if self.memory_log.len() == self.memory_log_capacity {
            self.memory_log.pop_front();
        }
        self.memory_log.push_back(record);
        self.turn_count += 1;
        self.last_activity_at = Utc::now();
    }

    /// The last `n` turns, oldest first, shaped for the prompt frame.
    pub fn recent_turns(&self, n: usize) -> Vec<FrameTurn> {
        self.memory_log
            .iter()
            .rev()
            .take(n)
            .map(|r| FrameTurn {
                speaker: r.speaker.clone(),
                utterance: r.utterance.clone(),
            })
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect()
    }

    pub fn is_duo(&self) -> bool {
        self.participants.len() == 2
    }

    /// The current topic changed on the turn about to be spoken.
    pub fn topic_just_changed(&self) -> bool {
        self.topic_changed_at_turn == Some(self.turn_count)
    }

    pub fn elapsed_secs(&self) -> u64 {
        (Utc::now() - self.created_at).num_seconds().max(0) as u64
    }

    pub fn topic_elapsed_secs(&self) -> u64 {
        (Utc::now() - self.topic_since).num_seconds().max(0) as u64
    }

    /// Evaluate end conditions, given each participant's social fatigue
    /// in participant order. Checked by the manager after every turn.
    pub fn end_reason(&self, config: &SessionConfig, fatigues: &[f32]) -> Option<EndReason> {
        if self.participants.len() < 2 {
            return Some(EndReason::InsufficientParticipants);
        }
        if self.turn_count >= self.turn_cap {
            return Some(EndReason::TurnLimitReached);
        }
        if self.elapsed_secs() >= config.max_duration_secs {
            return Some(EndReason::TimeLimitReached);
        }
        if !fatigues.is_empty() && fatigues.iter().all(|f| *f > config.fatigue_threshold) {
            return Some(EndReason::ParticipantsFatigued);
        }
        if self.is_duo()
            && self.topic_elapsed_secs() >= config.duo_topic_exhaustion_secs
            && self.mood.valence < config.duo_exhaustion_valence
        {
            return Some(EndReason::DuoExhaustion);
        }
        None
    }
}
