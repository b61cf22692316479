//! Turn order scheduling.
//!
//! The scheduler keeps a working queue of participants. Each refill takes
//! every current participant in randomized order, which gives the
//! fairness property: over any window of `|participants|` consecutive
//! turns without interruption, every participant speaks exactly once.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use parley_types::agent::AgentId;

/// Per-session speaking queue.
#[derive(Debug, Clone)]
pub struct TurnScheduler {
    queue: VecDeque<AgentId>,
    last_speaker: Option<AgentId>,
    rng: StdRng,
}

impl TurnScheduler {
    pub fn new(participants: &[AgentId]) -> Self {
        Self::seeded(participants, rand::random())
    }

    /// Deterministic construction for tests.
    pub fn seeded(participants: &[AgentId], seed: u64) -> Self {
        let mut scheduler = Self {
            queue: VecDeque::new(),
            last_speaker: None,
            rng: StdRng::seed_from_u64(seed),
        };
        scheduler.refill(participants);
        scheduler
    }

    /// Pop the next speaker, refilling the queue from the current
    /// participant list when it runs dry.
    pub fn next_speaker(&mut self, participants: &[AgentId]) -> Option<AgentId> {
        if self.queue.is_empty() {
            self.refill(participants);
        }
        let speaker = self.queue.pop_front();
        if speaker.is_some() {
            self.last_speaker = speaker.clone();
        }
        speaker
    }

    /// Force `agent` to speak next, preserving the rest of the order.
    pub fn promote(&mut self, agent: &AgentId) {
        self.queue.retain(|a| a != agent);
        self.queue.push_front(agent.clone());
    }

    /// A joiner is queued immediately so they speak within the cycle.
    pub fn add_participant(&mut self, agent: &AgentId) {
        if !self.queue.contains(agent) {
            self.queue.push_back(agent.clone());
        }
    }

    pub fn remove_participant(&mut self, agent: &AgentId) {
        self.queue.retain(|a| a != agent);
    }

    fn refill(&mut self, participants: &[AgentId]) {
        let mut order: Vec<AgentId> = participants.to_vec();
        order.shuffle(&mut self.rng);

        // Avoid the same voice twice in a row across a refill boundary.
        if order.len() > 1 && order.first() == self.last_speaker.as_ref() {
            order.rotate_left(1);
        }
        self.queue = order.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn ids(names: &[&str]) -> Vec<AgentId> {
        names.iter().map(|n| AgentId::new(*n)).collect()
    }

    #[test]
    fn test_every_participant_speaks_once_per_cycle() {
        let participants = ids(&["a", "b", "c", "d"]);
        let mut scheduler = TurnScheduler::seeded(&participants, 42);

        for _ in 0..5 {
            let cycle: HashSet<AgentId> = (0..participants.len())
                .map(|_| scheduler.next_speaker(&participants).unwrap())
                .collect();
            assert_eq!(cycle.len(), participants.len());
        }
    }

    #[test]
    fn test_no_back_to_back_speaker_across_refills() {
        let participants = ids(&["a", "b", "c"]);
        let mut scheduler = TurnScheduler::seeded(&participants, 7);

        let mut previous: Option<AgentId> = None;
        for _ in 0..30 {
            let speaker = scheduler.next_speaker(&participants).unwrap();
            assert_ne!(previous.as_ref(), Some(&speaker));
            previous = Some(speaker);
        }
    }

    #[test]
    fn test_promote_places_candidate_next() {
        let participants = ids(&["a", "b", "c"]);
        let mut scheduler = TurnScheduler::seeded(&participants, 1);

        scheduler.promote(&AgentId::new("c"));
        assert_eq!(
            scheduler.next_speaker(&participants),
            Some(AgentId::new("c"))
        );
    }

    #[test]
    fn test_removed_participant_never_speaks() {
        let participants = ids(&["a", "b", "c"]);
        let mut scheduler = TurnScheduler::seeded(&participants, 3);
        scheduler.remove_participant(&AgentId::new("b"));

        let remaining = ids(&["a", "c"]);
        for _ in 0..10 {
            let speaker = scheduler.next_speaker(&remaining).unwrap();
            assert_ne!(speaker, AgentId::new("b"));
        }
    }

    #[test]
    fn test_joiner_is_queued_for_current_cycle() {
        let participants = ids(&["a", "b"]);
        let mut scheduler = TurnScheduler::seeded(&participants, 9);

        scheduler.add_participant(&AgentId::new("c"));
        let mut spoke = HashSet::new();
        let all = ids(&["a", "b", "c"]);
        for _ in 0..3 {
            spoke.insert(scheduler.next_speaker(&all).unwrap());
        }
        assert!(spoke.contains(&AgentId::new("c")));
    }

    #[test]
    fn test_empty_participants_yield_no_speaker() {
        let mut scheduler = TurnScheduler::seeded(&[], 1);
        assert_eq!(scheduler.next_speaker(&[]), None);
    }
}
