//! Optional text-generation service for scene summaries.
//!
//! The pipeline never depends on a generator: every call is bounded by a
//! timeout, retried a fixed number of times, and any failure falls back to
//! the deterministic template text.

pub mod http;
pub mod scripted;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::GenerationConfig;
use crate::narrative::style::{AgeBand, PersonaProfile};

/// Errors from a single generation attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unreadable response: {0}")]
    Parse(String),

    #[error("service returned empty text")]
    Empty,

    #[error("timed out after {0} ms")]
    Timeout(u64),

    #[error("generator misconfigured: {0}")]
    Configuration(String),
}

/// A black-box `generate_text(prompt, context) -> string`.
///
/// Implementations must be `Send + Sync` so the pipeline can hold them
/// behind `Arc`.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, context: &str) -> Result<String, GenerationError>;

    fn name(&self) -> &str;
}

/// Timeout and retry budget for generation calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub retries: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.timeout_ms),
            retries: config.retries,
        }
    }
}

/// Calls `generator` up to `retries + 1` times, each attempt bounded by the
/// policy timeout. Returns the last error when every attempt fails.
pub async fn generate_with_retry(
    generator: &dyn TextGenerator,
    prompt: &str,
    context: &str,
    policy: RetryPolicy,
) -> Result<String, GenerationError> {
    let attempts = policy.retries + 1;
    let mut last_error = GenerationError::Empty;

    for attempt in 1..=attempts {
        let outcome = tokio::time::timeout(policy.timeout, generator.generate(prompt, context))
            .await
            .unwrap_or_else(|_| Err(GenerationError::Timeout(policy.timeout.as_millis() as u64)));

        match outcome {
            Ok(text) if !text.trim().is_empty() => {
                debug!("{} answered on attempt {attempt}", generator.name());
                return Ok(text.trim().to_string());
            }
            Ok(_) => last_error = GenerationError::Empty,
            Err(e) => last_error = e,
        }
        warn!(
            "{} attempt {attempt}/{attempts} failed: {last_error}",
            generator.name()
        );
    }

    Err(last_error)
}

/// Instruction sent with every summary request.
pub fn summary_prompt(age: AgeBand, persona: &PersonaProfile) -> String {
    format!(
        "Summarize the passage in at most three short sentences for readers aged {age}, \
         in the voice of a {}. Do not reveal what happens next.",
        persona.display_name.to_lowercase()
    )
}

#[cfg(test)]
mod tests {
    use super::scripted::{Reply, ScriptedGenerator};
    use super::*;
    use crate::narrative::style::default_persona;

    fn policy(timeout_ms: u64, retries: u32) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(timeout_ms),
            retries,
        }
    }

    #[tokio::test]
    async fn test_first_success_is_returned() {
        let generator = ScriptedGenerator::new(vec![Reply::Text("  A short summary.  ".into())]);
        let text = generate_with_retry(&generator, "p", "c", policy(1000, 1))
            .await
            .unwrap();
        assert_eq!(text, "A short summary.");
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_retries_once_then_succeeds() {
        let generator = ScriptedGenerator::new(vec![
            Reply::Fail("boom".into()),
            Reply::Text("Second try.".into()),
        ]);
        let text = generate_with_retry(&generator, "p", "c", policy(1000, 1))
            .await
            .unwrap();
        assert_eq!(text, "Second try.");
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_retries() {
        let generator = ScriptedGenerator::new(vec![
            Reply::Fail("one".into()),
            Reply::Fail("two".into()),
            Reply::Text("never reached".into()),
        ]);
        let err = generate_with_retry(&generator, "p", "c", policy(1000, 1))
            .await
            .unwrap_err();
        assert_eq!(err, GenerationError::Request("two".into()));
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test]
    async fn test_stalled_call_times_out() {
        let generator = ScriptedGenerator::new(vec![Reply::Stall(Duration::from_secs(30))]);
        let err = generate_with_retry(&generator, "p", "c", policy(20, 0))
            .await
            .unwrap_err();
        assert_eq!(err, GenerationError::Timeout(20));
    }

    #[tokio::test]
    async fn test_blank_text_counts_as_failure() {
        let generator = ScriptedGenerator::new(vec![Reply::Text("   ".into())]);
        let err = generate_with_retry(&generator, "p", "c", policy(1000, 0))
            .await
            .unwrap_err();
        assert_eq!(err, GenerationError::Empty);
    }

    #[test]
    fn test_prompt_mentions_age_and_persona() {
        let prompt = summary_prompt(AgeBand::SixToEight, default_persona());
        assert!(prompt.contains("aged 6-8"));
        assert!(prompt.contains("storyteller"));
    }
}
