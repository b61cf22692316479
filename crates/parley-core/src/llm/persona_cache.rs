//! Bounded cache of rendered persona blocks.
//!
//! Keyed by `(agent id, persona content hash)` so a persona edit in the
//! world invalidates the cached block naturally: the new content hashes
//! to a new key and the stale entry ages out. Least-recently-used entries
//! are evicted on overflow.

use std::collections::{HashMap, VecDeque};

use sha2::{Digest, Sha256};

use parley_types::agent::{AgentId, PersonaProfile};

type CacheKey = (AgentId, String);

/// LRU cache of rendered persona system-prompt blocks.
#[derive(Debug)]
pub struct PersonaCache {
    capacity: usize,
    entries: HashMap<CacheKey, String>,
    /// Access order, least recent at the front.
    order: VecDeque<CacheKey>,
}

impl PersonaCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Hex digest of the persona's prompt-relevant content.
    pub fn content_hash(profile: &PersonaProfile) -> String {
        let mut hasher = Sha256::new();
        hasher.update(profile.system_prompt.as_bytes());
        for rule in &profile.style_rules {
            hasher.update(rule.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    /// Fetch the cached block for this agent/persona, rendering and
    /// inserting it on a miss.
    pub fn get_or_render(&mut self, agent: &AgentId, profile: &PersonaProfile) -> String {
        let key = (agent.clone(), Self::content_hash(profile));

        if let Some(block) = self.entries.get(&key) {
            let block = block.clone();
            self.touch(&key);
            return block;
        }

        let block = render_persona_block(profile);
        self.insert(key, block.clone());
        block
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn touch(&mut self, key: &CacheKey) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
            self.order.push_back(key.clone());
        }
    }

    fn insert(&mut self, key: CacheKey, block: String) {
        if self.entries.len() == self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.entries.remove(&evicted);
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, block);
    }
}

/// Render the system-prompt fragment describing an agent's voice/style.
fn render_persona_block(profile: &PersonaProfile) -> String {
    let mut block = format!(
        "<persona>\nYou are {}.\n{}\n</persona>",
        profile.name,
        profile.system_prompt.trim()
    );

    if !profile.style_rules.is_empty() {
        let rules: Vec<String> = profile
            .style_rules
            .iter()
            .map(|r| format!("- {r}"))
            .collect();
        block.push_str(&format!("\n\n<style>\n{}\n</style>", rules.join("\n")));
    }

    block
}
