//! Deterministic template-based utterance synthesis.
//!
//! The generator is the terminal degradation path for the inference
//! pipeline: it always produces some utterance, with no dependencies and
//! no I/O. Category selection is contextual, template choice is random
//! within the bucket, and the text is then adjusted by personality
//! sliders and situation before a rough quality score is retained for
//! diagnostics.

use std::collections::HashMap;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use parley_types::agent::{AgentId, TraitSet};
use parley_types::context::{AgreementSignal, ContextSnapshot};

/// Utterance category, selected from the turn context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateCategory {
    Greeting,
    Agreement,
    Disagreement,
    Question,
    Statement,
    Reaction,
    Transition,
    Farewell,
}

/// Voice register, derived from the speaker's agreeableness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateStyle {
    Plain,
    Warm,
    Blunt,
}

/// Used when the template table has no candidates for a bucket. The
/// table is static, so this is the only "parse error" the generator can
/// have, and it cannot fail.
const GENERIC_UTTERANCE: &str = "Hm. That's something to think about.";

/// Softening phrases stripped for low-agreeableness speakers.
const SOFTENERS: [&str; 4] = ["perhaps ", "maybe ", "I think ", "I suppose "];

type TemplateTable = HashMap<(TemplateCategory, TemplateStyle), Vec<&'static str>>;

/// Template-based utterance generator.
pub struct FallbackGenerator {
    templates: TemplateTable,
    rng: Mutex<StdRng>,
    /// Last quality score per agent, for diagnostics only.
    quality: Mutex<HashMap<AgentId, f32>>,
}

impl FallbackGenerator {
    pub fn new() -> Self {
        Self::with_templates(default_templates(), None)
    }

    /// Construct with an explicit table and optional RNG seed (tests).
    pub fn with_templates(templates: TemplateTable, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            templates,
            rng: Mutex::new(rng),
            quality: Mutex::new(HashMap::new()),
        }
    }

    /// Generate an utterance for the given turn context.
    ///
    /// Never fails; an empty template bucket falls back to a hardcoded
    /// generic line. The quality score is retained per agent and never
    /// blocks the response.
    pub fn generate(&self, ctx: &ContextSnapshot) -> String {
        let category = pick_category(ctx);
        let style = style_for(&ctx.traits);

        let base = self.pick_template(category, style);
        let adjusted = adjust_for_personality(base, &ctx.traits);
        let text = adjust_for_situation(adjusted, ctx, category);

        let score = score_quality(&text, ctx);
        self.quality
            .lock()
            .expect("quality lock poisoned")
            .insert(ctx.speaker.clone(), score);

        text
    }

    /// The last quality score retained for an agent, if any.
    pub fn last_quality(&self, agent: &AgentId) -> Option<f32> {
        self.quality
            .lock()
            .expect("quality lock poisoned")
            .get(agent)
            .copied()
    }

    fn pick_template(&self, category: TemplateCategory, style: TemplateStyle) -> String {
        // Fall back to the plain register before giving up entirely.
        let bucket = self
            .templates
            .get(&(category, style))
            .filter(|b| !b.is_empty())
            .or_else(|| {
                self.templates
                    .get(&(category, TemplateStyle::Plain))
                    .filter(|b| !b.is_empty())
            });

        match bucket {
            Some(candidates) => {
                let mut rng = self.rng.lock().expect("rng lock poisoned");
                let idx = rng.gen_range(0..candidates.len());
                candidates[idx].to_string()
            }
            None => GENERIC_UTTERANCE.to_string(),
        }
    }
}

impl Default for FallbackGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn pick_category(ctx: &ContextSnapshot) -> TemplateCategory {
    if ctx.frame.turn_number == 0 {
        return TemplateCategory::Greeting;
    }
    if ctx.directives.closing {
        return TemplateCategory::Farewell;
    }
    if ctx.directives.topic_just_changed {
        return TemplateCategory::Transition;
    }
    match ctx.directives.agreement {
        AgreementSignal::Agree => TemplateCategory::Agreement,
        AgreementSignal::Disagree => TemplateCategory::Disagreement,
        AgreementSignal::Probe => TemplateCategory::Question,
        AgreementSignal::Neutral => {
            if ctx.vitals.arousal > 0.75 {
                TemplateCategory::Reaction
            } else {
                TemplateCategory::Statement
            }
        }
    }
}

fn style_for(traits: &TraitSet) -> TemplateStyle {
    if traits.agreeableness >= 0.65 {
        TemplateStyle::Warm
    } else if traits.agreeableness <= 0.35 {
        TemplateStyle::Blunt
    } else {
        TemplateStyle::Plain
    }
}

fn adjust_for_personality(mut text: String, traits: &TraitSet) -> String {
    // High extraversion speaks with emphasis.
    if traits.extraversion > 0.7 && text.ends_with('.') {
        text.pop();
        text.push('!');
    }

    // Low agreeableness drops softening.
    if traits.agreeableness < 0.35 {
        for softener in SOFTENERS {
            if let Some(stripped) = text.strip_prefix(softener) {
                let mut chars = stripped.chars();
                text = match chars.next() {
                    Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                    None => stripped.to_string(),
                };
            }
        }
    }

    // High openness trails into speculation.
    if traits.openness > 0.8 {
        text.push_str(" Makes you wonder.");
    }

    text
}

fn adjust_for_situation(
    mut text: String,
    ctx: &ContextSnapshot,
    category: TemplateCategory,
) -> String {
    text = text.replace("{topic}", &ctx.directives.topic);

    // Larger groups get drawn in explicitly.
    let group = ctx.frame.participants.len();
    if group > 2
        && matches!(
            category,
            TemplateCategory::Statement | TemplateCategory::Question
        )
        && !text.ends_with('?')
    {
        text.push_str(" What do the rest of you think?");
    }

    text
}

/// Rough quality heuristic: length band, topic mention, personality
/// marker presence. Diagnostic only.
fn score_quality(text: &str, ctx: &ContextSnapshot) -> f32 {
    let mut score = 0.0;

    let words = text.split_whitespace().count();
    if (4..=30).contains(&words) {
        score += 0.4;
    }

    if text
        .to_lowercase()
        .contains(&ctx.directives.topic.to_lowercase())
    {
        score += 0.3;
    }

    let marker_present = (ctx.traits.extraversion > 0.7 && text.contains('!'))
        || (ctx.traits.agreeableness < 0.35
            && !SOFTENERS.iter().any(|s| text.to_lowercase().contains(s.trim())))
        || (ctx.traits.openness > 0.8 && text.contains("wonder"));
    if marker_present {
        score += 0.3;
    }

    score
}

fn default_templates() -> TemplateTable {
    use TemplateCategory::*;
    use TemplateStyle::*;

    let mut table: TemplateTable = HashMap::new();

    table.insert(
        (Greeting, Plain),
        vec![
            "Oh, hello. I was just thinking about {topic}.",
            "Good to see you. Been a while.",
            "Hello there. How have you been?",
        ],
    );
    table.insert(
        (Greeting, Warm),
        vec![
            "It's so good to see you! I was hoping we'd talk.",
            "Hello, friend! Lovely timing.",
        ],
    );
    table.insert(
        (Greeting, Blunt),
        vec!["You again.", "Hm. Didn't expect company."],
    );

    table.insert(
        (Agreement, Plain),
        vec![
            "That's a fair point about {topic}.",
            "I think you're right about that.",
            "Yes, exactly.",
        ],
    );
    table.insert(
        (Agreement, Warm),
        vec![
            "You put that beautifully. I feel the same about {topic}.",
            "Couldn't agree more.",
        ],
    );
    table.insert(
        (Agreement, Blunt),
        vec!["Fine, you're right.", "Obviously."],
    );

    table.insert(
        (Disagreement, Plain),
        vec![
            "I'm not sure that's true about {topic}.",
            "I see it differently, honestly.",
        ],
    );
    table.insert(
        (Disagreement, Warm),
        vec!["Perhaps we see {topic} a little differently, and that's alright."],
    );
    table.insert(
        (Disagreement, Blunt),
        vec!["No. That's not how {topic} works.", "You're wrong about that."],
    );

    table.insert(
        (Question, Plain),
        vec![
            "What do you make of {topic}, then?",
            "Have you thought much about {topic}?",
        ],
    );
    table.insert(
        (Question, Warm),
        vec!["I'd love to hear what you think about {topic}."],
    );
    table.insert(
        (Question, Blunt),
        vec!["And what would you know about {topic}?"],
    );

    table.insert(
        (Statement, Plain),
        vec![
            "I think {topic} has been on everyone's mind lately.",
            "There's more to {topic} than people let on.",
            "Things have been steady enough around here.",
        ],
    );
    table.insert(
        (Statement, Warm),
        vec!["I find {topic} rather comforting to talk about, honestly."],
    );
    table.insert(
        (Statement, Blunt),
        vec!["{topic} is what it is. No sense dressing it up."],
    );

    table.insert(
        (Reaction, Plain),
        vec!["Really! I hadn't heard that.", "Well, that's something."],
    );
    table.insert(
        (Reaction, Warm),
        vec!["Oh my, that's wonderful to hear!"],
    );
    table.insert((Reaction, Blunt), vec!["Huh. If you say so."]);

    table.insert(
        (Transition, Plain),
        vec![
            "Speaking of which, about {topic}...",
            "That reminds me of {topic}, actually.",
        ],
    );
    table.insert(
        (Transition, Warm),
        vec!["You know, that makes me think of {topic}."],
    );
    table.insert(
        (Transition, Blunt),
        vec!["Enough of that. Let's talk about {topic}."],
    );

    table.insert(
        (Farewell, Plain),
        vec![
            "I should be getting on. Good talking with you.",
            "Well, I'd best be off.",
        ],
    );
    table.insert(
        (Farewell, Warm),
        vec!["This was lovely. Let's talk again soon!"],
    );
    table.insert((Farewell, Blunt), vec!["I'm done here.", "That's enough for today."]);

    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_types::agent::AgentVitals;
    use parley_types::context::{
        ConversationFrame, EnvironmentSlice, MemorySlice, TurnDirectives,
    };

    fn ctx(turn_number: u32, traits: TraitSet) -> ContextSnapshot {
        ContextSnapshot {
            speaker: AgentId::new("elena"),
            persona_block: String::new(),
            traits,
            vitals: AgentVitals::default(),
            location: None,
            directives: TurnDirectives {
                topic: "weather".to_string(),
                temperature: 0.8,
                spotlight: false,
                closing: false,
                topic_just_changed: false,
                agreement: AgreementSignal::Neutral,
            },
            relationships: vec![],
            memories: MemorySlice::default(),
            frame: ConversationFrame {
                session_id: uuid::Uuid::now_v7(),
                turn_number,
                turn_cap: 20,
                participants: vec![AgentId::new("elena"), AgentId::new("mira")],
                current_topic: "weather".to_string(),
                recent_turns: vec![],
            },
            environment: EnvironmentSlice {
                weather: "rain".to_string(),
                time_of_day: "morning".to_string(),
                season: "autumn".to_string(),
            },
        }
    }

    #[test]
    fn test_turn_zero_greets() {
        let generator = FallbackGenerator::with_templates(default_templates(), Some(7));
        let ctx = ctx(0, TraitSet::default());
        let text = generator.generate(&ctx);
        assert!(!text.is_empty());
        // Greeting templates never carry the invite suffix.
        assert!(!text.contains("rest of you"));
    }

    #[test]
    fn test_closing_directive_says_farewell() {
        let generator = FallbackGenerator::with_templates(default_templates(), Some(7));
        let mut ctx = ctx(18, TraitSet::default());
        ctx.directives.closing = true;
        let text = generator.generate(&ctx);
        let farewells = [
            "I should be getting on. Good talking with you.",
            "Well, I'd best be off.",
        ];
        assert!(farewells.iter().any(|f| text.starts_with(&f[..8])));
    }

    #[test]
    fn test_topic_placeholder_is_filled() {
        let generator = FallbackGenerator::with_templates(default_templates(), Some(7));
        let mut ctx = ctx(3, TraitSet::default());
        ctx.directives.topic_just_changed = true;
        let text = generator.generate(&ctx);
        assert!(!text.contains("{topic}"));
        assert!(text.contains("weather"));
    }

    #[test]
    fn test_high_extraversion_adds_emphasis() {
        let traits = TraitSet {
            extraversion: 0.9,
            ..TraitSet::default()
        };
        let adjusted = adjust_for_personality("Yes, exactly.".to_string(), &traits);
        assert!(adjusted.ends_with('!'));
    }

    #[test]
    fn test_low_agreeableness_strips_softening() {
        let traits = TraitSet {
            agreeableness: 0.2,
            ..TraitSet::default()
        };
        let adjusted = adjust_for_personality("Perhaps that is so.".to_string(), &traits);
        // Capitalized softeners survive only as prefix-stripped text.
        assert!(!adjusted.starts_with("perhaps"));
        let adjusted = adjust_for_personality("perhaps that is so.".to_string(), &traits);
        assert_eq!(adjusted, "That is so.");
    }

    #[test]
    fn test_group_statement_invites_others() {
        let generator = FallbackGenerator::with_templates(default_templates(), Some(7));
        let mut ctx = ctx(5, TraitSet::default());
        ctx.frame.participants.push(AgentId::new("tomas"));
        let text = generator.generate(&ctx);
        assert!(text.ends_with('?'));
    }

    #[test]
    fn test_quality_score_retained_per_agent() {
        let generator = FallbackGenerator::with_templates(default_templates(), Some(7));
        let ctx = ctx(5, TraitSet::default());
        assert!(generator.last_quality(&ctx.speaker).is_none());
        generator.generate(&ctx);
        let score = generator.last_quality(&ctx.speaker).unwrap();
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn test_empty_table_uses_generic_utterance() {
        let generator = FallbackGenerator::with_templates(HashMap::new(), Some(7));
        let text = generator.generate(&ctx(5, TraitSet::default()));
        assert!(text.starts_with(GENERIC_UTTERANCE));
    }

    #[test]
    fn test_agreement_signal_selects_category() {
        let mut c = ctx(5, TraitSet::default());
        c.directives.agreement = AgreementSignal::Probe;
        assert_eq!(pick_category(&c), TemplateCategory::Question);
        c.directives.agreement = AgreementSignal::Disagree;
        assert_eq!(pick_category(&c), TemplateCategory::Disagreement);
    }

    #[test]
    fn test_high_arousal_reacts() {
        let mut c = ctx(5, TraitSet::default());
        c.vitals.arousal = 0.9;
        assert_eq!(pick_category(&c), TemplateCategory::Reaction);
    }
}
