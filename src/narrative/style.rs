//! Age-band and persona style tables.
//!
//! Both are pure lookup data; the helpers here only rewrite text, they
//! never decide what a scene or choice is.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Words longer than this are cut down for the youngest readers.
const YOUNG_MAX_WORD_CHARS: usize = 10;

/// Sentence cap for the youngest readers' summaries.
const YOUNG_MAX_SENTENCES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgeBand {
    #[serde(rename = "6-8")]
    SixToEight,
    #[serde(rename = "8-10")]
    EightToTen,
    #[serde(rename = "10-12")]
    TenToTwelve,
    #[serde(rename = "12-14")]
    TwelveToFourteen,
}

impl AgeBand {
    pub const ALL: [AgeBand; 4] = [
        AgeBand::SixToEight,
        AgeBand::EightToTen,
        AgeBand::TenToTwelve,
        AgeBand::TwelveToFourteen,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgeBand::SixToEight => "6-8",
            AgeBand::EightToTen => "8-10",
            AgeBand::TenToTwelve => "10-12",
            AgeBand::TwelveToFourteen => "12-14",
        }
    }

    pub fn is_youngest(&self) -> bool {
        matches!(self, AgeBand::SixToEight)
    }

    /// Whether [`SIMPLE_VOCABULARY`] applies to this band.
    pub fn simplifies_vocabulary(&self) -> bool {
        matches!(self, AgeBand::SixToEight | AgeBand::EightToTen)
    }
}

impl FromStr for AgeBand {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgeBand::ALL
            .into_iter()
            .find(|band| band.as_str() == s.trim())
            .ok_or_else(|| ValidationError::UnknownAgeBand(s.to_string()))
    }
}

impl fmt::Display for AgeBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Harder words and their plainer replacements.
pub const SIMPLE_VOCABULARY: &[(&str, &str)] = &[
    ("immediately", "right away"),
    ("approximately", "about"),
    ("enormous", "huge"),
    ("terrified", "scared"),
    ("consequence", "result"),
    ("investigate", "explore"),
    ("attempt", "try"),
    ("assist", "help"),
    ("difficult", "hard"),
    ("commence", "start"),
    ("observe", "watch"),
    ("practical", "sensible"),
    ("surroundings", "area"),
    ("strategic", "smart"),
    ("exactly", "just"),
    ("uncertain", "unsure"),
    ("courageous", "brave"),
    ("discover", "find"),
];

/// How a persona turns an imperative choice template into a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phrasing {
    /// "Keep the secret."
    Plain,
    /// "You keep the secret!"
    SecondPersonEnergetic,
    /// "The hero decides to keep the secret."
    FormalThirdPerson,
    /// "Let's keep the secret!"
    Simplified,
}

#[derive(Debug, PartialEq)]
pub struct PersonaProfile {
    pub key: &'static str,
    pub display_name: &'static str,
    pub phrasing: Phrasing,
    /// Opens every scene summary (empty for none).
    pub scene_lead: &'static str,
    pub consequence_prefix: &'static str,
    pub consequence_suffix: &'static str,
    /// Whole-word substitutions applied to choice and consequence text.
    pub vocabulary: &'static [(&'static str, &'static str)],
    /// Whether [`SIMPLE_VOCABULARY`] applies regardless of age band.
    pub simple_words: bool,
}

pub const DEFAULT_PERSONA: &str = "storyteller";

pub const PERSONAS: &[PersonaProfile] = &[
    PersonaProfile {
        key: "storyteller",
        display_name: "Storyteller",
        phrasing: Phrasing::Plain,
        scene_lead: "",
        consequence_prefix: "",
        consequence_suffix: "",
        vocabulary: &[],
        simple_words: false,
    },
    PersonaProfile {
        key: "adventurer",
        display_name: "Adventurer",
        phrasing: Phrasing::SecondPersonEnergetic,
        scene_lead: "Get ready!",
        consequence_prefix: "Whoa! ",
        consequence_suffix: "",
        vocabulary: &[("careful", "sharp"), ("carefully", "sharply")],
        simple_words: false,
    },
    PersonaProfile {
        key: "sage",
        display_name: "Sage",
        phrasing: Phrasing::FormalThirdPerson,
        scene_lead: "",
        consequence_prefix: "And so, ",
        consequence_suffix: "",
        vocabulary: &[
            ("yourself", "themselves"),
            ("your", "their"),
            ("you", "they"),
        ],
        simple_words: false,
    },
    PersonaProfile {
        key: "buddy",
        display_name: "Buddy",
        phrasing: Phrasing::Simplified,
        scene_lead: "Here's what's happening.",
        consequence_prefix: "",
        consequence_suffix: " Cool, right?",
        vocabulary: &[
            ("yourself", "ourselves"),
            ("your", "our"),
            ("you", "we"),
            ("carefully", "slowly"),
        ],
        simple_words: true,
    },
];

/// Looks up a persona by key (case-insensitive).
pub fn find_persona(key: &str) -> Option<&'static PersonaProfile> {
    let key = key.trim();
    PERSONAS.iter().find(|p| p.key.eq_ignore_ascii_case(key))
}

pub fn default_persona() -> &'static PersonaProfile {
    &PERSONAS[0]
}

impl PersonaProfile {
    /// Turns an imperative template ("Keep the secret") into this persona's line.
    pub fn phrase_choice(&self, template: &str) -> String {
        let body = substitute_words(template.trim().trim_end_matches('.'), self.vocabulary);
        match self.phrasing {
            Phrasing::Plain => format!("{}.", capitalize_first(&body)),
            Phrasing::SecondPersonEnergetic => format!("You {}!", lowercase_first(&body)),
            Phrasing::FormalThirdPerson => {
                format!("The hero decides to {}.", lowercase_first(&body))
            }
            Phrasing::Simplified => format!("Let's {}!", lowercase_first(&body)),
        }
    }

    /// Wraps consequence text in this persona's voice.
    pub fn style_consequence(&self, text: &str) -> String {
        let body = substitute_words(text, self.vocabulary);
        let body = if self.consequence_prefix.ends_with(", ") {
            lowercase_first(&body)
        } else {
            capitalize_first(&body)
        };
        format!(
            "{}{}{}",
            self.consequence_prefix, body, self.consequence_suffix
        )
    }
}

/// Applies the age band's (and persona's) plain-word table.
pub fn simplify_for(text: &str, age: AgeBand, persona: &PersonaProfile) -> String {
    if age.simplifies_vocabulary() || persona.simple_words {
        substitute_words(text, SIMPLE_VOCABULARY)
    } else {
        text.to_string()
    }
}

/// Shapes summary text for the youngest band: long words truncated, soft
/// punctuation turned into sentence breaks, at most three sentences.
pub fn shape_for_young_readers(text: &str) -> String {
    let truncated = map_words(text, |word| {
        (word.chars().count() > YOUNG_MAX_WORD_CHARS)
            .then(|| word.chars().take(YOUNG_MAX_WORD_CHARS).collect())
    });

    let mut broken = String::with_capacity(truncated.len());
    for c in truncated.replace(" - ", " — ").chars() {
        match c {
            ';' | ':' => broken.push('.'),
            '—' | '–' => {
                broken.truncate(broken.trim_end().len());
                broken.push_str(". ");
            }
            c if c.is_whitespace() && broken.ends_with(". ") => {}
            _ => broken.push(c),
        }
    }

    split_simple_sentences(&broken)
        .into_iter()
        .take(YOUNG_MAX_SENTENCES)
        .map(|s| capitalize_first(&s))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Splits on `.`, `!` or `?` followed by whitespace or end of text.
pub fn split_simple_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            while let Some(&q) = chars.peek() {
                if matches!(q, '"' | '\'' | '”' | '’') {
                    current.push(q);
                    chars.next();
                } else {
                    break;
                }
            }
            if chars.peek().is_none_or(|n| n.is_whitespace()) {
                let sentence = current.trim();
                if sentence.chars().any(char::is_alphanumeric) {
                    sentences.push(sentence.to_string());
                }
                current.clear();
            }
        }
    }
    let rest = current.trim();
    if rest.chars().any(char::is_alphanumeric) {
        sentences.push(rest.to_string());
    }
    sentences
}

/// Replaces whole words found in `table` (matched case-insensitively),
/// keeping a leading capital.
pub fn substitute_words(text: &str, table: &[(&str, &str)]) -> String {
    if table.is_empty() {
        return text.to_string();
    }
    map_words(text, |word| {
        let lower = word.to_lowercase();
        table
            .iter()
            .find(|(from, _)| *from == lower)
            .map(|(_, to)| {
                if word.chars().next().is_some_and(char::is_uppercase) {
                    capitalize_first(to)
                } else {
                    (*to).to_string()
                }
            })
    })
}

/// Rebuilds `text`, passing each alphabetic run through `f`. Runs for which
/// `f` returns `None` are kept as they are.
fn map_words(text: &str, f: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut word = String::new();

    let flush = |word: &mut String, out: &mut String| {
        if !word.is_empty() {
            match f(word) {
                Some(replacement) => out.push_str(&replacement),
                None => out.push_str(word),
            }
            word.clear();
        }
    };

    for c in text.chars() {
        if c.is_alphabetic() {
            word.push(c);
        } else {
            flush(&mut word, &mut out);
            out.push(c);
        }
    }
    flush(&mut word, &mut out);
    out
}

pub fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn lowercase_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
