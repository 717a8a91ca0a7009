/// Error taxonomy for the narrative pipeline.
///
/// Fatal errors (`ValidationError`, `ConfigError`, `GraphError`) stop a run
/// before or during graph assembly. Everything recoverable is a
/// `PipelineWarning`: it is logged, collected, and the run continues.
use std::fmt;

use schemars::JsonSchema;
use serde::Serialize;
use thiserror::Error;

/// Input rejected before any stage runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("text is too short: {chars} characters (minimum {min})")]
    TextTooShort { chars: usize, min: usize },

    #[error("word count {words} is outside the accepted range [{min}, {max}]")]
    WordCountOutOfRange { words: usize, min: usize, max: usize },

    #[error("unknown target age band: {0:?} (expected one of 6-8, 8-10, 10-12, 12-14)")]
    UnknownAgeBand(String),
}

/// Configuration rejected at startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be positive")]
    NotPositive { field: &'static str },

    #[error("detection.max_decision_points ({max}) is below detection.min_decision_points ({min})")]
    DecisionBounds { min: usize, max: usize },

    #[error("synthesis.max_choices_per_point must be between 2 and 4, got {0}")]
    ChoiceBounds(usize),

    #[error("chunking.overlap_size ({overlap}) must be smaller than chunking.max_chunk_size ({max})")]
    OverlapTooLarge { overlap: usize, max: usize },

    #[error("invalid generation endpoint: {0}")]
    Endpoint(String),
}

/// Internal invariant violation while freezing the story graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("node {0} has no outgoing edges")]
    DeadEnd(String),

    #[error("edge from {from} points at missing node {to}")]
    DanglingEdge { from: String, to: String },

    #[error("edge from {from} to {to} does not move forward")]
    BackwardEdge { from: String, to: String },

    #[error("node {node} needs {steps} steps to reach the ending (limit {limit})")]
    PathTooLong { node: String, steps: usize, limit: usize },

    #[error("node {node} has {degree} choices (limit {limit})")]
    FanOut { node: String, degree: usize, limit: usize },
}

/// Fatal pipeline failure.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("story graph invariant violated: {0}")]
    Graph(#[from] GraphError),
}

/// Non-fatal condition recorded during a run.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineWarning {
    TooFewDecisionPoints { found: usize, min: usize },
    NoSentences,
    SkippedChunk { chunk_id: String, reason: String },
    SkippedDecisionPoint { decision_point_id: String, reason: String },
    UnknownPersona { requested: String, using: String },
    GenerationFallback { scene_id: String, reason: String },
}

impl fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooFewDecisionPoints { found, min } => {
                write!(f, "only {found} decision points found (wanted at least {min})")
            }
            Self::NoSentences => f.write_str("input produced no sentences"),
            Self::SkippedChunk { chunk_id, reason } => {
                write!(f, "skipped chunk {chunk_id}: {reason}")
            }
            Self::SkippedDecisionPoint {
                decision_point_id,
                reason,
            } => write!(f, "skipped decision point {decision_point_id}: {reason}"),
            Self::UnknownPersona { requested, using } => {
                write!(f, "unknown persona {requested:?}, using {using:?}")
            }
            Self::GenerationFallback { scene_id, reason } => {
                write!(f, "template fallback for {scene_id}: {reason}")
            }
        }
    }
}
