//! The five narrative stages, leaf-first: chunking, decision-point
//! detection, choice synthesis, consequence mapping and path convergence.
//! Each stage is deterministic given its input and configuration.

pub mod chunker;
pub mod consequence;
pub mod convergence;
pub mod detector;
pub mod graph;
pub mod patterns;
pub mod style;
pub mod synthesizer;

pub use chunker::{Chunk, TextChunker};
pub use consequence::{Consequence, ConsequenceMapper, EmotionalTone, NextSceneModifier};
pub use convergence::PathConvergenceEngine;
pub use detector::{Confidence, DecisionPoint, DecisionPointDetector};
pub use graph::{ConvergencePoint, NodeId, StoryGraph};
pub use patterns::Category;
pub use style::{AgeBand, PersonaProfile};
pub use synthesizer::{Choice, ChoiceSynthesizer, ChoiceType, Scene};
