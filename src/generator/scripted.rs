/// Scripted generator for tests and offline runs.
///
/// Plays back a fixed list of replies in order, so fallback and retry
/// behavior can be exercised without a network.
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::{GenerationError, TextGenerator};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    /// Fails with [`GenerationError::Request`].
    Fail(String),
    /// Sleeps this long before answering with an empty string.
    Stall(Duration),
}

pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Reply>>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    #[must_use]
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Answers every call with the same text.
    #[must_use]
    pub fn constant(text: &str, times: usize) -> Self {
        Self::new(vec![Reply::Text(text.to_string()); times])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, _prompt: &str, _context: &str) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .replies
            .lock()
            .map_err(|_| GenerationError::Configuration("reply queue poisoned".to_string()))?
            .pop_front();

        match next {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Fail(reason)) => Err(GenerationError::Request(reason)),
            Some(Reply::Stall(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(String::new())
            }
            None => Err(GenerationError::Request("script exhausted".to_string())),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replies_play_in_order() {
        let generator = ScriptedGenerator::new(vec![
            Reply::Text("one".into()),
            Reply::Fail("two".into()),
        ]);
        assert_eq!(generator.generate("p", "c").await.unwrap(), "one");
        assert_eq!(
            generator.generate("p", "c").await.unwrap_err(),
            GenerationError::Request("two".into())
        );
        assert!(generator.generate("p", "c").await.is_err());
        assert_eq!(generator.calls(), 3);
    }

    #[tokio::test]
    async fn test_constant_repeats() {
        let generator = ScriptedGenerator::constant("same", 2);
        assert_eq!(generator.generate("a", "b").await.unwrap(), "same");
        assert_eq!(generator.generate("c", "d").await.unwrap(), "same");
        assert!(generator.generate("e", "f").await.is_err());
    }
}
