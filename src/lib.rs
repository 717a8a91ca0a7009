//! # storyfork: Branching Story Builder
//!
//! Turns a linear prose text into a choice-driven story whose every path
//! reconverges on the author's original ending.
//!
//! ## Architecture
//!
//! - **[`config`]**: Configuration loading, validation, and defaults (JSON or TOML)
//! - **[`error`]**: Validation/config/graph errors and non-fatal pipeline warnings
//! - **[`narrative`]**: Chunking, decision-point detection, choice synthesis, consequences, convergence
//! - **[`generator`]**: Optional text-generation service with timeout, retry and template fallback
//! - **[`pipeline`]**: Orchestrates the stages and reports progress on a channel
//! - **[`output`]**: Serializable story structure and its JSON Schema
//! - **[`source`]**: Manuscript loading (plain text or Markdown, YAML front matter)

pub mod config;
pub mod error;
pub mod generator;
pub mod narrative;
pub mod output;
pub mod pipeline;
pub mod source;
