//! Consequence mapping.
//!
//! A consequence is decided by the choice's type tag alone. It colors the
//! next scene's tone and never changes which scene is reached.

use serde::{Deserialize, Serialize};

use super::style::PersonaProfile;
use super::synthesizer::{Choice, ChoiceType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionalTone {
    Uplifting,
    Tense,
    Relieved,
    Secretive,
    Neutral,
    Hopeful,
    Curious,
    Determined,
    Cautious,
    Bittersweet,
}

impl EmotionalTone {
    pub const ALL: [EmotionalTone; 10] = [
        EmotionalTone::Uplifting,
        EmotionalTone::Tense,
        EmotionalTone::Relieved,
        EmotionalTone::Secretive,
        EmotionalTone::Neutral,
        EmotionalTone::Hopeful,
        EmotionalTone::Curious,
        EmotionalTone::Determined,
        EmotionalTone::Cautious,
        EmotionalTone::Bittersweet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionalTone::Uplifting => "uplifting",
            EmotionalTone::Tense => "tense",
            EmotionalTone::Relieved => "relieved",
            EmotionalTone::Secretive => "secretive",
            EmotionalTone::Neutral => "neutral",
            EmotionalTone::Hopeful => "hopeful",
            EmotionalTone::Curious => "curious",
            EmotionalTone::Determined => "determined",
            EmotionalTone::Cautious => "cautious",
            EmotionalTone::Bittersweet => "bittersweet",
        }
    }
}

/// Soft multipliers a presentation layer may use for flavor. Holds numbers
/// only, so a consequence has no way to redirect the story.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NextSceneModifier {
    pub mood: f32,
    pub pace: f32,
    pub trust: f32,
    pub awareness: f32,
}

impl NextSceneModifier {
    pub const NEUTRAL: NextSceneModifier = NextSceneModifier::new(1.0, 1.0, 1.0, 1.0);

    pub const fn new(mood: f32, pace: f32, trust: f32, awareness: f32) -> Self {
        Self {
            mood,
            pace,
            trust,
            awareness,
        }
    }
}

impl Default for NextSceneModifier {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Consequence {
    pub id: String,
    pub choice_id: String,
    pub text: String,
    pub consequence_type: &'static str,
    pub emotional_tone: EmotionalTone,
    pub next_scene_modifier: NextSceneModifier,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsequenceTemplate {
    pub consequence_type: &'static str,
    pub tone: EmotionalTone,
    pub text: &'static str,
    pub modifier: NextSceneModifier,
}

const fn entry(
    consequence_type: &'static str,
    tone: EmotionalTone,
    text: &'static str,
    modifier: NextSceneModifier,
) -> ConsequenceTemplate {
    ConsequenceTemplate {
        consequence_type,
        tone,
        text,
        modifier,
    }
}

/// Shorthand for table rows: mood, pace, trust, awareness.
const fn m(mood: f32, pace: f32, trust: f32, awareness: f32) -> NextSceneModifier {
    NextSceneModifier::new(mood, pace, trust, awareness)
}

pub const NEUTRAL_CONSEQUENCE: ConsequenceTemplate = entry(
    "neutral_outcome",
    EmotionalTone::Neutral,
    "The story moves on.",
    NextSceneModifier::NEUTRAL,
);

/// The consequence table. The match is exhaustive, so every choice type
/// has exactly one entry.
pub fn template_for(choice_type: ChoiceType) -> ConsequenceTemplate {
    use EmotionalTone::*;

    match choice_type {
        ChoiceType::MoralHigh => entry(
            "positive_growth",
            Uplifting,
            "Doing the right thing is not easy, but your courage shines through.",
            m(1.2, 1.0, 1.1, 1.0),
        ),
        ChoiceType::MoralPragmatic => entry(
            "practical_outcome",
            Relieved,
            "Everyone stays safe for now, though a small doubt lingers.",
            m(1.0, 1.0, 1.0, 1.1),
        ),
        ChoiceType::MoralSelfless => entry(
            "selfless_sacrifice",
            Bittersweet,
            "Your kindness costs something, and it is worth it.",
            m(1.1, 0.9, 1.2, 1.0),
        ),
        ChoiceType::MoralSeekCounsel => entry(
            "shared_wisdom",
            Hopeful,
            "A few wise words make the way forward clearer.",
            m(1.1, 0.9, 1.1, 1.1),
        ),
        ChoiceType::TrustBelieve => entry(
            "alliance_formed",
            Hopeful,
            "Working together, your team feels stronger.",
            m(1.1, 1.0, 1.3, 0.9),
        ),
        ChoiceType::TrustDoubt => entry(
            "guarded_distance",
            Cautious,
            "With your guard up, small details stand out.",
            m(0.9, 1.0, 0.8, 1.2),
        ),
        ChoiceType::TrustTest => entry(
            "trust_tested",
            Curious,
            "The test reveals more than words ever could.",
            m(1.0, 0.9, 1.0, 1.2),
        ),
        ChoiceType::TrustAlone => entry(
            "independence",
            Determined,
            "Alone, every step depends on your own courage.",
            m(0.9, 1.1, 0.8, 1.1),
        ),
        ChoiceType::TimeActNow => entry(
            "swift_action",
            Tense,
            "Your quick action beats the clock, just barely.",
            m(1.0, 1.3, 1.0, 1.0),
        ),
        ChoiceType::TimeWait => entry(
            "patient_timing",
            Cautious,
            "Waiting is hard, but the right moment arrives.",
            m(1.0, 0.8, 1.0, 1.1),
        ),
        ChoiceType::TimeShortcut => entry(
            "risky_gamble",
            Tense,
            "The shortcut saves time, though not without a scare.",
            m(0.9, 1.3, 1.0, 0.9),
        ),
        ChoiceType::TimeCallHelp => entry(
            "help_arrives",
            Relieved,
            "Help comes running just when it is needed.",
            m(1.1, 1.0, 1.2, 1.0),
        ),
        ChoiceType::TacticalBold => entry(
            "bold_advance",
            Determined,
            "Your bold move surprises everyone.",
            m(1.1, 1.2, 1.0, 0.9),
        ),
        ChoiceType::TacticalCautious => entry(
            "careful_progress",
            Cautious,
            "Moving carefully keeps danger at bay.",
            m(1.0, 0.8, 1.0, 1.2),
        ),
        ChoiceType::TacticalClever => entry(
            "clever_solution",
            Curious,
            "A clever idea opens a path nobody expected.",
            m(1.1, 1.0, 1.0, 1.1),
        ),
        ChoiceType::TacticalRetreat => entry(
            "regroup",
            Relieved,
            "Stepping back gives time to plan again.",
            m(1.0, 0.8, 1.0, 1.1),
        ),
        ChoiceType::InfoReveal => entry(
            "truth_revealed",
            Uplifting,
            "The truth is out, and the air feels lighter.",
            m(1.2, 1.0, 1.2, 1.0),
        ),
        ChoiceType::InfoConceal => entry(
            "secret_kept",
            Secretive,
            "The secret stays hidden, for now.",
            m(0.9, 1.0, 0.9, 1.0),
        ),
        ChoiceType::InfoInvestigate => entry(
            "discovery",
            Curious,
            "A closer look uncovers an important clue.",
            m(1.0, 0.9, 1.0, 1.3),
        ),
        ChoiceType::InfoPartial => entry(
            "half_truth",
            Secretive,
            "Some things are shared, and some stay hidden.",
            m(1.0, 1.0, 0.9, 1.1),
        ),
        ChoiceType::Forward => entry(
            "steady_progress",
            Determined,
            "The journey continues onward.",
            m(1.0, 1.1, 1.0, 1.0),
        ),
        ChoiceType::Back => entry(
            "second_look",
            Cautious,
            "Going back brings a fresh view of what was missed.",
            m(1.0, 0.9, 1.0, 1.1),
        ),
        ChoiceType::Alternative => entry(
            "new_angle",
            Curious,
            "A different approach changes how things look.",
            m(1.0, 1.0, 1.0, 1.1),
        ),
        ChoiceType::Observe => entry(
            "heightened_awareness",
            Neutral,
            "Watching quietly reveals what was hidden in plain sight.",
            m(1.0, 0.9, 1.0, 1.3),
        ),
    }
}

/// Maps choices to consequences in one persona's voice.
pub struct ConsequenceMapper {
    persona: &'static PersonaProfile,
}

impl ConsequenceMapper {
    pub fn new(persona: &'static PersonaProfile) -> Self {
        Self { persona }
    }

    pub fn map(&self, choice: &Choice) -> Consequence {
        self.build(&choice.id, template_for(choice.choice_type))
    }

    /// Like [`map`](Self::map) for a free-form tag. Unknown tags get the
    /// neutral consequence.
    pub fn map_tag(&self, choice_id: &str, tag: &str) -> Consequence {
        let template = tag
            .parse::<ChoiceType>()
            .map(template_for)
            .unwrap_or(NEUTRAL_CONSEQUENCE);
        self.build(choice_id, template)
    }

    fn build(&self, choice_id: &str, template: ConsequenceTemplate) -> Consequence {
        Consequence {
            id: format!("consequence_{choice_id}"),
            choice_id: choice_id.to_string(),
            text: self.persona.style_consequence(template.text),
            consequence_type: template.consequence_type,
            emotional_tone: template.tone,
            next_scene_modifier: template.modifier,
        }
    }
}
