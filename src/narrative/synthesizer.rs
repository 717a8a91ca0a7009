use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::chunker::Chunk;
use super::detector::{Confidence, DecisionPoint};
use super::patterns::Category;
use super::style::{self, AgeBand, PersonaProfile};
use crate::config::SynthesisConfig;

/// Preceding sentences used as scene context.
const CONTEXT_SENTENCES: usize = 3;

/// Every choice tag the templates can produce. Consequence mapping is keyed
/// on this type, so adding a variant forces a consequence entry for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChoiceType {
    MoralHigh,
    MoralPragmatic,
    MoralSelfless,
    MoralSeekCounsel,
    TrustBelieve,
    TrustDoubt,
    TrustTest,
    TrustAlone,
    TimeActNow,
    TimeWait,
    TimeShortcut,
    TimeCallHelp,
    TacticalBold,
    TacticalCautious,
    TacticalClever,
    TacticalRetreat,
    InfoReveal,
    InfoConceal,
    InfoInvestigate,
    InfoPartial,
    Forward,
    Back,
    Alternative,
    Observe,
}

impl ChoiceType {
    pub const ALL: [ChoiceType; 24] = [
        ChoiceType::MoralHigh,
        ChoiceType::MoralPragmatic,
        ChoiceType::MoralSelfless,
        ChoiceType::MoralSeekCounsel,
        ChoiceType::TrustBelieve,
        ChoiceType::TrustDoubt,
        ChoiceType::TrustTest,
        ChoiceType::TrustAlone,
        ChoiceType::TimeActNow,
        ChoiceType::TimeWait,
        ChoiceType::TimeShortcut,
        ChoiceType::TimeCallHelp,
        ChoiceType::TacticalBold,
        ChoiceType::TacticalCautious,
        ChoiceType::TacticalClever,
        ChoiceType::TacticalRetreat,
        ChoiceType::InfoReveal,
        ChoiceType::InfoConceal,
        ChoiceType::InfoInvestigate,
        ChoiceType::InfoPartial,
        ChoiceType::Forward,
        ChoiceType::Back,
        ChoiceType::Alternative,
        ChoiceType::Observe,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChoiceType::MoralHigh => "moral_high",
            ChoiceType::MoralPragmatic => "moral_pragmatic",
            ChoiceType::MoralSelfless => "moral_selfless",
            ChoiceType::MoralSeekCounsel => "moral_seek_counsel",
            ChoiceType::TrustBelieve => "trust_believe",
            ChoiceType::TrustDoubt => "trust_doubt",
            ChoiceType::TrustTest => "trust_test",
            ChoiceType::TrustAlone => "trust_alone",
            ChoiceType::TimeActNow => "time_act_now",
            ChoiceType::TimeWait => "time_wait",
            ChoiceType::TimeShortcut => "time_shortcut",
            ChoiceType::TimeCallHelp => "time_call_help",
            ChoiceType::TacticalBold => "tactical_bold",
            ChoiceType::TacticalCautious => "tactical_cautious",
            ChoiceType::TacticalClever => "tactical_clever",
            ChoiceType::TacticalRetreat => "tactical_retreat",
            ChoiceType::InfoReveal => "info_reveal",
            ChoiceType::InfoConceal => "info_conceal",
            ChoiceType::InfoInvestigate => "info_investigate",
            ChoiceType::InfoPartial => "info_partial",
            ChoiceType::Forward => "forward",
            ChoiceType::Back => "back",
            ChoiceType::Alternative => "alternative",
            ChoiceType::Observe => "observe",
        }
    }
}

impl FromStr for ChoiceType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChoiceType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or(())
    }
}

pub struct ChoiceTemplate {
    pub choice_type: ChoiceType,
    /// Imperative phrasing, no trailing punctuation.
    pub text: &'static str,
    pub weight: f64,
}

const fn template(choice_type: ChoiceType, text: &'static str, weight: f64) -> ChoiceTemplate {
    ChoiceTemplate {
        choice_type,
        text,
        weight,
    }
}

const MORAL_TEMPLATES: &[ChoiceTemplate] = &[
    template(ChoiceType::MoralHigh, "Do what is right, even though it is hard", 1.0),
    template(ChoiceType::MoralPragmatic, "Choose the practical path that keeps everyone safe", 0.9),
    template(ChoiceType::MoralSelfless, "Put the needs of others first", 0.8),
    template(ChoiceType::MoralSeekCounsel, "Ask a trusted friend for advice", 0.7),
];

const TRUST_TEMPLATES: &[ChoiceTemplate] = &[
    template(ChoiceType::TrustBelieve, "Trust them and work together", 1.0),
    template(ChoiceType::TrustDoubt, "Stay alert and keep your guard up", 0.9),
    template(ChoiceType::TrustTest, "Test their honesty before deciding", 0.8),
    template(ChoiceType::TrustAlone, "Go on alone", 0.7),
];

const TIME_TEMPLATES: &[ChoiceTemplate] = &[
    template(ChoiceType::TimeActNow, "Act immediately before it is too late", 1.0),
    template(ChoiceType::TimeWait, "Wait for exactly the right moment", 0.9),
    template(ChoiceType::TimeShortcut, "Take the risky shortcut", 0.8),
    template(ChoiceType::TimeCallHelp, "Call out for help", 0.7),
];

const TACTICAL_TEMPLATES: &[ChoiceTemplate] = &[
    template(ChoiceType::TacticalBold, "Charge ahead boldly", 1.0),
    template(ChoiceType::TacticalCautious, "Move carefully and watch for danger", 0.9),
    template(ChoiceType::TacticalClever, "Search for a clever way around", 0.8),
    template(ChoiceType::TacticalRetreat, "Fall back and make a new plan", 0.7),
];

const INFORMATION_TEMPLATES: &[ChoiceTemplate] = &[
    template(ChoiceType::InfoReveal, "Tell the truth about what you know", 1.0),
    template(ChoiceType::InfoConceal, "Keep the secret to yourself", 0.9),
    template(ChoiceType::InfoInvestigate, "Investigate a little further", 0.8),
    template(ChoiceType::InfoPartial, "Share only part of the story", 0.7),
];

const GENERIC_TEMPLATES: &[ChoiceTemplate] = &[
    template(ChoiceType::Forward, "Keep going forward", 1.0),
    template(ChoiceType::Back, "Turn back the way you came", 0.9),
    template(ChoiceType::Alternative, "Try a different approach", 0.8),
    template(ChoiceType::Observe, "Stop and observe your surroundings", 0.7),
];

/// Templates for a category; anything without its own table gets the generic one.
pub fn templates_for(category: Category) -> &'static [ChoiceTemplate] {
    match category {
        Category::MoralDilemma => MORAL_TEMPLATES,
        Category::TrustConflict => TRUST_TEMPLATES,
        Category::TimePressure => TIME_TEMPLATES,
        Category::TacticalChoice => TACTICAL_TEMPLATES,
        Category::InformationRisk => INFORMATION_TEMPLATES,
        Category::General => GENERIC_TEMPLATES,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Choice {
    pub id: String,
    pub scene_id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub choice_type: ChoiceType,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneMetadata {
    pub index: usize,
    pub chunk_index: usize,
    pub section_index: usize,
    pub section_title: Option<String>,
    pub category: Category,
    pub confidence: Confidence,
    /// The sentence the decision hangs on, verbatim.
    pub decision_text: String,
    /// Whether the summary came from the text-generation service.
    pub generated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: String,
    pub decision_point_id: String,
    pub chunk_id: String,
    pub summary_text: String,
    pub metadata: SceneMetadata,
}

/// Where a scene sits: its id, position and source chunk.
#[derive(Debug, Clone, Copy)]
pub struct SceneContext<'a> {
    pub scene_index: usize,
    pub chunk: &'a Chunk,
}

impl SceneContext<'_> {
    pub fn scene_id(&self) -> String {
        format!("scene_{}", self.scene_index)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    pub scene: Scene,
    pub choices: Vec<Choice>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SynthesisError {
    #[error("decision point {point} refers to {chunk} but scene context is {context}")]
    ChunkMismatch {
        point: String,
        chunk: String,
        context: String,
    },

    #[error("sentence {index} is out of range for {chunk} ({len} sentences)")]
    SentenceOutOfRange {
        chunk: String,
        index: usize,
        len: usize,
    },
}

/// Builds each scene's summary and its categorized choices.
pub struct ChoiceSynthesizer {
    max_choices: usize,
}

impl ChoiceSynthesizer {
    pub fn new(config: &SynthesisConfig) -> Self {
        Self {
            max_choices: config.max_choices_per_point.clamp(2, 4),
        }
    }

    /// Up to three sentences right before the decision sentence, or the
    /// decision sentence itself when it opens the chunk.
    pub fn context_sentences<'a>(
        &self,
        ctx: &SceneContext<'a>,
        point: &DecisionPoint,
    ) -> Result<&'a [String], SynthesisError> {
        let sentences = &ctx.chunk.sentences;
        if ctx.chunk.id != point.chunk_id {
            return Err(SynthesisError::ChunkMismatch {
                point: point.id.clone(),
                chunk: point.chunk_id.clone(),
                context: ctx.chunk.id.clone(),
            });
        }
        if point.sentence_index >= sentences.len() {
            return Err(SynthesisError::SentenceOutOfRange {
                chunk: ctx.chunk.id.clone(),
                index: point.sentence_index,
                len: sentences.len(),
            });
        }

        let end = point.sentence_index;
        let start = end.saturating_sub(CONTEXT_SENTENCES);
        if start == end {
            Ok(&sentences[end..=end])
        } else {
            Ok(&sentences[start..end])
        }
    }

    /// Summary plus choices for one decision point, fully deterministic.
    pub fn synthesize(
        &self,
        ctx: &SceneContext<'_>,
        point: &DecisionPoint,
        age: AgeBand,
        persona: &PersonaProfile,
    ) -> Result<Synthesis, SynthesisError> {
        let context = self.context_sentences(ctx, point)?;
        let summary = self.style_summary(&context.join(" "), age, persona);
        let choices = self.choices(ctx, point.category, age, persona);
        let chunk = ctx.chunk;

        let scene = Scene {
            id: ctx.scene_id(),
            decision_point_id: point.id.clone(),
            chunk_id: chunk.id.clone(),
            summary_text: summary,
            metadata: SceneMetadata {
                index: ctx.scene_index,
                chunk_index: chunk.index,
                section_index: chunk.section_index,
                section_title: chunk.section_title.clone(),
                category: point.category,
                confidence: point.confidence,
                decision_text: chunk.sentences[point.sentence_index].clone(),
                generated: false,
            },
        };

        Ok(Synthesis { scene, choices })
    }

    /// Age-band and persona shaping for summary text, template or generated.
    /// The persona lead goes in first so the youngest band's sentence cap
    /// also counts it.
    pub fn style_summary(&self, text: &str, age: AgeBand, persona: &PersonaProfile) -> String {
        let text = text.trim();
        let led = if persona.scene_lead.is_empty() {
            text.to_string()
        } else {
            format!("{} {}", persona.scene_lead, text)
        };
        let text = style::simplify_for(&led, age, persona);
        if age.is_youngest() {
            style::shape_for_young_readers(&text)
        } else {
            text
        }
    }

    fn choices(
        &self,
        ctx: &SceneContext<'_>,
        category: Category,
        age: AgeBand,
        persona: &PersonaProfile,
    ) -> Vec<Choice> {
        let scene_id = ctx.scene_id();
        templates_for(category)
            .iter()
            .take(self.max_choices)
            .enumerate()
            .map(|(k, t)| Choice {
                id: format!("{scene_id}_choice_{k}"),
                scene_id: scene_id.clone(),
                text: style::simplify_for(&persona.phrase_choice(t.text), age, persona),
                choice_type: t.choice_type,
                weight: t.weight,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narrative::style::{PERSONAS, default_persona, find_persona};

    fn chunk(sentences: &[&str]) -> Chunk {
        let sentences: Vec<String> = sentences.iter().map(|s| s.to_string()).collect();
        Chunk {
            id: "chunk_0".into(),
            index: 0,
            section_index: 0,
            section_title: Some("Chapter 1".into()),
            content: sentences.join(" "),
            start_offset: 0,
            end_offset: 0,
            word_count: 0,
            sentences,
            overlap_count: 0,
            is_chapter_start: true,
            is_chapter_end: true,
            has_dialogue: false,
        }
    }

    fn point(sentence_index: usize, category: Category) -> DecisionPoint {
        DecisionPoint {
            id: format!("dp_0_{sentence_index}"),
            chunk_id: "chunk_0".into(),
            chunk_index: 0,
            sentence_index,
            category,
            category_weight: 0.8,
            confidence: Confidence::High,
            matched_pattern: String::new(),
            position: 0.5,
        }
    }

    fn synth(max: usize) -> ChoiceSynthesizer {
        ChoiceSynthesizer::new(&SynthesisConfig {
            max_choices_per_point: max,
        })
    }

    const STORY: &[&str] = &[
        "The wind rose.",
        "Mara climbed the ridge.",
        "Below her the camp slept.",
        "A light blinked in the valley.",
        "She could either wake the others or go alone.",
    ];

    #[test]
    fn test_summary_uses_preceding_sentences() {
        let ch = chunk(STORY);
        let ctx = SceneContext {
            scene_index: 0,
            chunk: &ch,
        };
        let out = synth(2)
            .synthesize(&ctx, &point(4, Category::TacticalChoice), AgeBand::TwelveToFourteen, default_persona())
            .unwrap();
        assert_eq!(
            out.scene.summary_text,
            "Mara climbed the ridge. Below her the camp slept. A light blinked in the valley."
        );
        assert_eq!(out.scene.metadata.decision_text, STORY[4]);
        assert_eq!(out.scene.id, "scene_0");
        assert_eq!(out.scene.metadata.section_title.as_deref(), Some("Chapter 1"));
    }

    #[test]
    fn test_first_sentence_decision_uses_itself() {
        let ch = chunk(STORY);
        let ctx = SceneContext {
            scene_index: 2,
            chunk: &ch,
        };
        let sentences = synth(2).context_sentences(&ctx, &point(0, Category::General)).unwrap();
        assert_eq!(sentences, ["The wind rose."]);
    }

    #[test]
    fn test_choice_cardinality_and_types() {
        let ch = chunk(STORY);
        let ctx = SceneContext {
            scene_index: 1,
            chunk: &ch,
        };
        for max in 2..=4 {
            let out = synth(max)
                .synthesize(&ctx, &point(4, Category::TacticalChoice), AgeBand::TenToTwelve, default_persona())
                .unwrap();
            assert_eq!(out.choices.len(), max);
            assert_eq!(out.choices[0].choice_type, ChoiceType::TacticalBold);
            assert_eq!(out.choices[0].id, "scene_1_choice_0");
            assert!(out.choices.iter().all(|c| c.scene_id == "scene_1"));
        }
    }

    #[test]
    fn test_general_category_uses_generic_table() {
        let ch = chunk(STORY);
        let ctx = SceneContext {
            scene_index: 0,
            chunk: &ch,
        };
        let out = synth(3)
            .synthesize(&ctx, &point(4, Category::General), AgeBand::TenToTwelve, default_persona())
            .unwrap();
        let types: Vec<ChoiceType> = out.choices.iter().map(|c| c.choice_type).collect();
        assert_eq!(
            types,
            vec![ChoiceType::Forward, ChoiceType::Back, ChoiceType::Alternative]
        );
    }

    #[test]
    fn test_persona_then_age_styling() {
        let ch = chunk(STORY);
        let ctx = SceneContext {
            scene_index: 0,
            chunk: &ch,
        };
        let adventurer = find_persona("adventurer").unwrap();
        let out = synth(2)
            .synthesize(&ctx, &point(4, Category::TimePressure), AgeBand::SixToEight, adventurer)
            .unwrap();
        assert_eq!(out.choices[0].text, "You act right away before it is too late!");
        assert_eq!(out.choices[1].text, "You wait for just the right moment!");
        assert!(out.scene.summary_text.starts_with("Get ready! "));
    }

    #[test]
    fn test_youngest_summary_caps_sentences_for_every_persona() {
        let synthesizer = synth(2);
        for persona in PERSONAS {
            let summary = synthesizer.style_summary(
                "The wind rose. Mara climbed. The camp slept.",
                AgeBand::SixToEight,
                persona,
            );
            let sentences = style::split_simple_sentences(&summary);
            assert!(sentences.len() <= 3, "{}: {summary}", persona.key);
            if !persona.scene_lead.is_empty() {
                assert!(summary.starts_with(persona.scene_lead), "{summary}");
            }
        }
        let plain = synthesizer.style_summary(
            "The wind rose. Mara climbed. The camp slept.",
            AgeBand::SixToEight,
            default_persona(),
        );
        assert_eq!(plain, "The wind rose. Mara climbed. The camp slept.");
    }

    #[test]
    fn test_out_of_range_sentence_is_error() {
        let ch = chunk(STORY);
        let ctx = SceneContext {
            scene_index: 0,
            chunk: &ch,
        };
        let err = synth(2)
            .synthesize(&ctx, &point(9, Category::General), AgeBand::TenToTwelve, default_persona())
            .unwrap_err();
        assert_eq!(
            err,
            SynthesisError::SentenceOutOfRange {
                chunk: "chunk_0".into(),
                index: 9,
                len: 5
            }
        );
    }

    #[test]
    fn test_choice_type_tags_roundtrip_through_str() {
        for t in ChoiceType::ALL {
            assert_eq!(t.as_str().parse::<ChoiceType>(), Ok(t));
            assert_eq!(serde_json::to_value(t).unwrap(), t.as_str());
        }
        assert!("teleport".parse::<ChoiceType>().is_err());
    }

    #[test]
    fn test_every_template_table_has_four_entries() {
        for category in [
            Category::MoralDilemma,
            Category::TrustConflict,
            Category::TimePressure,
            Category::TacticalChoice,
            Category::InformationRisk,
            Category::General,
        ] {
            assert_eq!(templates_for(category).len(), 4, "{category:?}");
        }
    }
}
