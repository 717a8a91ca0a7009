//! Decision-point pattern tables.
//!
//! Each category carries a weight and a list of case-insensitive regex
//! rules. Categories are listed in priority order: when a context window
//! matches several, the first one wins.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    MoralDilemma,
    TrustConflict,
    TimePressure,
    TacticalChoice,
    InformationRisk,
    /// Only a generic choice cue matched.
    General,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::MoralDilemma => "moral_dilemma",
            Category::TrustConflict => "trust_conflict",
            Category::TimePressure => "time_pressure",
            Category::TacticalChoice => "tactical_choice",
            Category::InformationRisk => "information_risk",
            Category::General => "general",
        }
    }
}

pub struct CategoryRules {
    pub category: Category,
    pub weight: f64,
    pub patterns: &'static [&'static str],
}

/// Weight of points backed only by a generic cue.
pub const GENERAL_WEIGHT: f64 = 0.5;

pub const CATEGORY_RULES: &[CategoryRules] = &[
    CategoryRules {
        category: Category::MoralDilemma,
        weight: 1.0,
        patterns: &[
            r"\b(?:should|ought to)\b[^.!?]*\b(?:or|instead)\b",
            r"\bthe right thing\b",
            r"\bright or wrong\b",
            r"\b(?:conscience|guilt|guilty|betray\w*|dishonest\w*|lie|lied|lying|steal|stole|stolen|forgive\w*)\b",
            r"\b(?:promise[ds]?|sworn|swore)\b",
        ],
    },
    CategoryRules {
        category: Category::TrustConflict,
        weight: 0.9,
        patterns: &[
            r"\b(?:trust\w*|distrust\w*|mistrust\w*)\b",
            r"\b(?:suspicious|suspect\w*|doubt\w*|loyal\w*|traitor\w*|deceiv\w*|spy|spies)\b",
            r"\bbelieve (?:him|her|them|me|you|us)\b",
        ],
    },
    CategoryRules {
        category: Category::TimePressure,
        weight: 0.85,
        patterns: &[
            r"\b(?:hurry|hurried|rush|rushed|rushing)\b",
            r"\b(?:no time|running out of time|too late)\b",
            r"\b(?:seconds|minutes) (?:left|to spare|remain\w*)\b",
            r"\b(?:deadline|countdown|now or never|at once|before dawn|before dark)\b",
        ],
    },
    CategoryRules {
        category: Category::TacticalChoice,
        weight: 0.8,
        patterns: &[
            r"\beither\b[^.!?]*\bor\b",
            r"\b(?:left|right)\b[^.!?]*\b(?:path|door|tunnel|road|passage|fork|trail)\b",
            r"\b(?:fight|flee|retreat|ambush|sneak|attack|surrender)\b",
            r"\b(?:plan|strategy|route)\b",
        ],
    },
    CategoryRules {
        category: Category::InformationRisk,
        weight: 0.75,
        patterns: &[
            r"\bsecrets?\b",
            r"\b(?:reveal\w*|confess\w*|hidden|warn\w*)\b",
            r"\b(?:clue|clues|diary|coded)\b",
            r"\btell (?:anyone|someone|him|her|them|the truth)\b",
        ],
    },
];

/// Low-weight cues that a character is facing a choice.
pub const CHOICE_CUES: &[&str] = &[
    r"\b(?:decide[ds]?|deciding|decision|choose|chose|choice|choices)\b",
    r"\bwhether\b",
    r"\b(?:either|option|options|alternatively)\b",
    r"\bwhat (?:should|would|could) (?:i|we|he|she|they)\b",
    r"\b(?:wonder\w*|hesitat\w*|torn between)\b",
    r"\bor (?:maybe|perhaps)\b",
];
