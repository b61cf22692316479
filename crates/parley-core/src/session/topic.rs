//! Topic scoring and drift suggestions.
//!
//! `TopicSelector` is a pure scorer: given the current topic, the
//! participants' interests, and the topic history, it ranks candidate
//! topics without side effects, so the manager can call it speculatively.

use std::cmp::Ordering;
use std::collections::HashMap;

use parley_types::agent::PersonaProfile;
use parley_types::session::TopicChange;

/// A candidate topic with its composite score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredTopic {
    pub topic: String,
    pub score: f32,
}

/// Static candidate list plus a relatedness map between topics.
#[derive(Debug, Clone)]
pub struct TopicSelector {
    candidates: Vec<String>,
    related: HashMap<String, Vec<String>>,
}

impl TopicSelector {
    pub fn new() -> Self {
        Self::with_topics(default_candidates(), default_relatedness())
    }

    pub fn with_topics(candidates: Vec<String>, related: HashMap<String, Vec<String>>) -> Self {
        Self { candidates, related }
    }

    /// Rank candidate topics for a possible change away from
    /// `current_topic`. Ties keep candidate-list order.
    ///
    /// Scoring: relatedness to the current topic, aggregate participant
    /// affinity (interest match), and a recency penalty for topics the
    /// session has already been through.
    pub fn suggest_topics(
        &self,
        current_topic: &str,
        participant_profiles: &[PersonaProfile],
        history: &[TopicChange],
    ) -> Vec<ScoredTopic> {
        let mut scored: Vec<ScoredTopic> = self
            .candidates
            .iter()
            .filter(|candidate| candidate.as_str() != current_topic)
            .map(|candidate| ScoredTopic {
                topic: candidate.clone(),
                score: self.score(candidate, current_topic, participant_profiles, history),
            })
            .collect();

        // Stable sort keeps insertion order for equal scores.
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scored
    }

    fn score(
        &self,
        candidate: &str,
        current_topic: &str,
        profiles: &[PersonaProfile],
        history: &[TopicChange],
    ) -> f32 {
        let relatedness = if self
            .related
            .get(current_topic)
            .is_some_and(|adjacent| adjacent.iter().any(|t| t == candidate))
        {
            1.0
        } else {
            0.0
        };

        let affinity = if profiles.is_empty() {
            0.0
        } else {
            let interested = profiles
                .iter()
                .filter(|p| p.interests.iter().any(|i| i == candidate))
                .count();
            interested as f32 / profiles.len() as f32
        };

        // Most recent visits weigh heaviest.
        let recency_penalty = history
            .iter()
            .rev()
            .enumerate()
            .filter(|(_, change)| change.topic == candidate)
            .map(|(back, _)| 1.0 / (1.0 + back as f32))
            .fold(0.0f32, f32::max);

        0.5 * relatedness + 0.3 * affinity - 0.4 * recency_penalty
    }
}

impl Default for TopicSelector {
    fn default() -> Self {
        Self::new()
    }
}

fn default_candidates() -> Vec<String> {
    [
        "weather", "harvest", "market", "festival", "family", "travel", "gossip", "food",
    ]
    .iter()
    .map(|t| t.to_string())
    .collect()
}

fn default_relatedness() -> HashMap<String, Vec<String>> {
    let pairs: [(&str, &[&str]); 8] = [
        ("weather", &["harvest", "travel"]),
        ("harvest", &["weather", "market", "food"]),
        ("market", &["harvest", "food", "gossip"]),
        ("festival", &["food", "family", "gossip"]),
        ("family", &["festival", "gossip"]),
        ("travel", &["weather", "market"]),
        ("gossip", &["market", "family", "festival"]),
        ("food", &["harvest", "market", "festival"]),
    ];
    pairs
        .iter()
        .map(|(topic, adjacent)| {
            (
                topic.to_string(),
                adjacent.iter().map(|t| t.to_string()).collect(),
            )
        })
        .collect()
}
