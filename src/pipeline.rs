//! End-to-end narrative pipeline.
//!
//! Runs chunk → detect → synthesize → map → converge over one validated
//! input. Recoverable problems become [`PipelineWarning`]s; progress goes to
//! an optional channel that nobody has to listen on.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{ConfigError, PipelineError, PipelineWarning, ValidationError};
use crate::generator::{self, RetryPolicy, TextGenerator};
use crate::narrative::chunker::{Chunk, TextChunker};
use crate::narrative::consequence::{Consequence, ConsequenceMapper};
use crate::narrative::convergence::PathConvergenceEngine;
use crate::narrative::detector::{DecisionPoint, DecisionPointDetector};
use crate::narrative::graph::StoryGraph;
use crate::narrative::style::{self, AgeBand, PersonaProfile};
use crate::narrative::synthesizer::{Choice, ChoiceSynthesizer, Scene, SceneContext};

pub const MIN_TEXT_CHARS: usize = 100;
pub const MIN_WORDS: usize = 500;
pub const MAX_WORDS: usize = 90_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryInput {
    pub text: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    pub target_age: String,
    pub persona: String,
}

impl StoryInput {
    /// Checks length and word count and parses the age band.
    pub fn validate(&self) -> Result<AgeBand, ValidationError> {
        let chars = self.text.trim().chars().count();
        if chars < MIN_TEXT_CHARS {
            return Err(ValidationError::TextTooShort {
                chars,
                min: MIN_TEXT_CHARS,
            });
        }
        let words = self.text.split_whitespace().count();
        if !(MIN_WORDS..=MAX_WORDS).contains(&words) {
            return Err(ValidationError::WordCountOutOfRange {
                words,
                min: MIN_WORDS,
                max: MAX_WORDS,
            });
        }
        self.target_age.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Chunking,
    Detection,
    Synthesis,
    Consequences,
    Convergence,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Chunking,
        Stage::Detection,
        Stage::Synthesis,
        Stage::Consequences,
        Stage::Convergence,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Chunking => "chunking",
            Stage::Detection => "detection",
            Stage::Synthesis => "synthesis",
            Stage::Consequences => "consequences",
            Stage::Convergence => "convergence",
        }
    }
}

/// Stage start/finish notices. `count` is what the stage produced: chunks,
/// decision points, scenes, consequences, or graph nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    StageStarted { stage: Stage },
    StageCompleted { stage: Stage, count: usize },
}

/// Everything one run produced, in stage order.
#[derive(Debug, Clone)]
pub struct StoryRun {
    pub input: StoryInput,
    pub age: AgeBand,
    pub persona: &'static PersonaProfile,
    pub chunks: Vec<Chunk>,
    pub decision_points: Vec<DecisionPoint>,
    pub scenes: Vec<Scene>,
    pub choices: Vec<Choice>,
    pub consequences: Vec<Consequence>,
    pub graph: StoryGraph,
    pub warnings: Vec<PipelineWarning>,
    pub content_hash: String,
}

pub struct Pipeline {
    config: Config,
    generator: Option<Arc<dyn TextGenerator>>,
    progress: Option<UnboundedSender<ProgressEvent>>,
}

impl Pipeline {
    /// Validates `config`; a bad config never reaches a stage.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            generator: None,
            progress: None,
        })
    }

    /// Requests scene summaries from `generator`, falling back to templates.
    #[must_use]
    pub fn with_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: UnboundedSender<ProgressEvent>) -> Self {
        self.progress = Some(progress);
        self
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.progress {
            // A dropped receiver just means nobody is watching.
            let _ = tx.send(event);
        }
    }

    fn started(&self, stage: Stage) {
        debug!("Stage {} started", stage.as_str());
        self.emit(ProgressEvent::StageStarted { stage });
    }

    fn completed(&self, stage: Stage, count: usize) {
        info!("Stage {} done ({count})", stage.as_str());
        self.emit(ProgressEvent::StageCompleted { stage, count });
    }

    /// Runs only the chunking and detection stages.
    pub fn detect(&self, text: &str) -> (Vec<Chunk>, Vec<DecisionPoint>, Vec<PipelineWarning>) {
        let chunks = TextChunker::new(&self.config.chunking).chunk(text);
        let detection = DecisionPointDetector::new(&self.config.detection).detect_report(&chunks);
        (chunks, detection.points, detection.warnings)
    }

    pub async fn run(&self, input: &StoryInput) -> Result<StoryRun, PipelineError> {
        let age = input.validate()?;
        let mut warnings = Vec::new();

        let persona = match style::find_persona(&input.persona) {
            Some(p) => p,
            None => {
                let fallback = style::default_persona();
                warnings.push(PipelineWarning::UnknownPersona {
                    requested: input.persona.clone(),
                    using: fallback.key.to_string(),
                });
                fallback
            }
        };
        info!(
            "Building story ({} words, age {age}, persona {})",
            input.text.split_whitespace().count(),
            persona.key
        );

        // ── Chunking ──
        self.started(Stage::Chunking);
        let chunker = TextChunker::new(&self.config.chunking);
        let normalized = chunker.normalize(&input.text);
        let chunks = chunker.chunk_normalized(&normalized);
        self.completed(Stage::Chunking, chunks.len());

        // ── Detection ──
        self.started(Stage::Detection);
        let detection = DecisionPointDetector::new(&self.config.detection).detect_report(&chunks);
        warnings.extend(detection.warnings);
        let decision_points = detection.points;
        self.completed(Stage::Detection, decision_points.len());

        // ── Synthesis ──
        self.started(Stage::Synthesis);
        let (scenes, choices) = self
            .synthesize(&chunks, &decision_points, age, persona, &mut warnings)
            .await;
        self.completed(Stage::Synthesis, scenes.len());

        // ── Consequences ──
        self.started(Stage::Consequences);
        let mapper = ConsequenceMapper::new(persona);
        let consequences: Vec<Consequence> = choices.iter().map(|c| mapper.map(c)).collect();
        self.completed(Stage::Consequences, consequences.len());

        // ── Convergence ──
        self.started(Stage::Convergence);
        let engine = PathConvergenceEngine::new(
            &self.config.convergence,
            self.config.synthesis.max_choices_per_point,
        );
        let graph = engine.converge(&scenes, &choices, &consequences, &chunks, &input.text)?;
        self.completed(Stage::Convergence, graph.nodes().len());

        for warning in &warnings {
            warn!("{warning}");
        }

        Ok(StoryRun {
            content_hash: content_hash(input, age, persona, &self.config),
            input: input.clone(),
            age,
            persona,
            chunks,
            decision_points,
            scenes,
            choices,
            consequences,
            graph,
            warnings,
        })
    }

    /// One scene per decision point, in decision-point order. A point that
    /// cannot be synthesized is skipped with a warning.
    async fn synthesize(
        &self,
        chunks: &[Chunk],
        points: &[DecisionPoint],
        age: AgeBand,
        persona: &'static PersonaProfile,
        warnings: &mut Vec<PipelineWarning>,
    ) -> (Vec<Scene>, Vec<Choice>) {
        let synthesizer = ChoiceSynthesizer::new(&self.config.synthesis);
        let policy = RetryPolicy::from_config(&self.config.generation);
        let mut scenes = Vec::with_capacity(points.len());
        let mut choices = Vec::new();

        for point in points {
            let Some(chunk) = chunks.iter().find(|c| c.id == point.chunk_id) else {
                warnings.push(PipelineWarning::SkippedDecisionPoint {
                    decision_point_id: point.id.clone(),
                    reason: format!("unknown chunk {}", point.chunk_id),
                });
                continue;
            };
            let ctx = SceneContext {
                scene_index: scenes.len(),
                chunk,
            };

            let mut synthesis = match synthesizer.synthesize(&ctx, point, age, persona) {
                Ok(s) => s,
                Err(e) => {
                    warnings.push(PipelineWarning::SkippedDecisionPoint {
                        decision_point_id: point.id.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            if let Some(generator) = &self.generator {
                let context = synthesizer
                    .context_sentences(&ctx, point)
                    .map(|s| s.join(" "))
                    .unwrap_or_default();
                let prompt = generator::summary_prompt(age, persona);
                match generator::generate_with_retry(generator.as_ref(), &prompt, &context, policy)
                    .await
                {
                    Ok(text) => {
                        synthesis.scene.summary_text =
                            synthesizer.style_summary(&text, age, persona);
                        synthesis.scene.metadata.generated = true;
                    }
                    Err(e) => warnings.push(PipelineWarning::GenerationFallback {
                        scene_id: synthesis.scene.id.clone(),
                        reason: e.to_string(),
                    }),
                }
            }

            choices.extend(synthesis.choices);
            scenes.push(synthesis.scene);
        }

        (scenes, choices)
    }
}

/// SHA-256 over text, age band, persona and the canonical config JSON.
pub fn content_hash(
    input: &StoryInput,
    age: AgeBand,
    persona: &PersonaProfile,
    config: &Config,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.text.as_bytes());
    hasher.update([0x1f]);
    hasher.update(age.as_str().as_bytes());
    hasher.update([0x1f]);
    hasher.update(persona.key.as_bytes());
    hasher.update([0x1f]);
    hasher.update(serde_json::to_vec(config).unwrap_or_default());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::scripted::{Reply, ScriptedGenerator};
    use tokio::sync::mpsc;

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    fn input(text: String) -> StoryInput {
        StoryInput {
            text,
            title: Some("Test".into()),
            author: None,
            target_age: "8-10".into(),
            persona: "storyteller".into(),
        }
    }

    /// ~560 words of prose with a handful of clear decisions.
    fn story() -> String {
        let filler = "The road wound on through quiet hills and the travelers walked in silence. \
                      Birds circled high above the trees and the air smelled of rain. ";
        let decisions = [
            "At the crossroads Tam had to decide whether to take the left path or the right one.",
            "The old map was a secret that nobody else could ever see.",
            "They could either climb the cliff or follow the river around it.",
            "There was no time left before dark, so they had to hurry.",
        ];
        let mut text = String::new();
        for decision in decisions {
            for _ in 0..5 {
                text.push_str(filler);
            }
            text.push_str(decision);
            text.push_str("\n\n");
        }
        for _ in 0..3 {
            text.push_str(filler);
        }
        text.push_str("At last they reached home. The fire was warm. Everyone slept soundly.");
        text
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.detection.min_decision_points = 1;
        config.detection.max_decision_points = 5;
        config
    }

    #[test]
    fn test_validation_bounds() {
        assert!(matches!(
            input("short".into()).validate(),
            Err(ValidationError::TextTooShort { .. })
        ));
        assert!(matches!(
            input(words(120)).validate(),
            Err(ValidationError::WordCountOutOfRange { words: 120, .. })
        ));
        assert!(matches!(
            input(words(90_001)).validate(),
            Err(ValidationError::WordCountOutOfRange { .. })
        ));
        assert_eq!(input(words(500)).validate(), Ok(AgeBand::EightToTen));

        let mut bad_age = input(words(600));
        bad_age.target_age = "3-5".into();
        assert_eq!(
            bad_age.validate(),
            Err(ValidationError::UnknownAgeBand("3-5".into()))
        );
    }

    #[test]
    fn test_invalid_config_rejected_up_front() {
        let mut config = Config::default();
        config.detection.min_decision_points = 10;
        config.detection.max_decision_points = 2;
        assert!(matches!(
            Pipeline::new(config),
            Err(ConfigError::DecisionBounds { min: 10, max: 2 })
        ));
    }

    #[tokio::test]
    async fn test_validation_error_stops_before_any_stage() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pipeline = Pipeline::new(config()).unwrap().with_progress(tx);
        let err = pipeline.run(&input(words(10))).await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_run_builds_graph_and_reports_progress() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pipeline = Pipeline::new(config()).unwrap().with_progress(tx);
        let run = pipeline.run(&input(story())).await.unwrap();

        assert!(!run.scenes.is_empty());
        assert_eq!(run.scenes.len(), run.decision_points.len());
        assert_eq!(run.choices.len(), run.consequences.len());
        assert_eq!(run.choices.len(), run.scenes.len() * 2);
        assert_eq!(run.content_hash.len(), 64);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(events.len(), Stage::ALL.len() * 2);
        for (pair, stage) in events.chunks(2).zip(Stage::ALL) {
            assert_eq!(pair[0], ProgressEvent::StageStarted { stage });
            assert!(matches!(pair[1], ProgressEvent::StageCompleted { stage: s, .. } if s == stage));
        }
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_ignored() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let pipeline = Pipeline::new(config()).unwrap().with_progress(tx);
        assert!(pipeline.run(&input(story())).await.is_ok());
    }

    #[tokio::test]
    async fn test_story_without_scenes_ends_on_original_text() {
        let text = format!("  {}.  \n\n\n{}.\n", words(300), words(300));
        let run = Pipeline::new(config()).unwrap().run(&input(text.clone())).await.unwrap();
        assert!(run.scenes.is_empty());
        assert_eq!(run.graph.ending().unwrap().description, text);
    }

    #[tokio::test]
    async fn test_unknown_persona_falls_back_with_warning() {
        let pipeline = Pipeline::new(config()).unwrap();
        let mut story_input = input(story());
        story_input.persona = "pirate".into();
        let run = pipeline.run(&story_input).await.unwrap();
        assert_eq!(run.persona.key, "storyteller");
        assert!(run.warnings.contains(&PipelineWarning::UnknownPersona {
            requested: "pirate".into(),
            using: "storyteller".into(),
        }));
    }

    #[tokio::test]
    async fn test_generated_summaries_and_fallback() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Reply::Text("A calm summary.".into()),
            Reply::Fail("down".into()),
            Reply::Fail("still down".into()),
        ]));
        let pipeline = Pipeline::new(config())
            .unwrap()
            .with_generator(generator.clone());
        let run = pipeline.run(&input(story())).await.unwrap();

        assert!(run.scenes[0].metadata.generated);
        assert_eq!(run.scenes[0].summary_text, "A calm summary.");
        assert!(run.scenes.len() >= 2);
        assert!(!run.scenes[1].metadata.generated);
        assert!(run.warnings.iter().any(|w| matches!(
            w,
            PipelineWarning::GenerationFallback { scene_id, .. } if scene_id == "scene_1"
        )));
    }

    #[test]
    fn test_content_hash_depends_on_every_part() {
        let config = Config::default();
        let storyteller = style::default_persona();
        let sage = style::find_persona("sage").unwrap();
        let base = input(words(600));
        let a = content_hash(&base, AgeBand::EightToTen, storyteller, &config);
        assert_eq!(a, content_hash(&base, AgeBand::EightToTen, storyteller, &config));
        assert_ne!(a, content_hash(&base, AgeBand::SixToEight, storyteller, &config));
        assert_ne!(a, content_hash(&base, AgeBand::EightToTen, sage, &config));

        let mut tweaked = config.clone();
        tweaked.convergence.max_branch_depth = 4;
        assert_ne!(a, content_hash(&base, AgeBand::EightToTen, storyteller, &tweaked));
    }
}
