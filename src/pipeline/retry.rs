//! Validation with a bounded corrective step
//!
//! When a generated document fails validation, a fixer gets up to
//! `max_fix_attempts` chances to return a corrected version. The fixer never
//! validates its own output; every attempt is re-checked here.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::events::{Cancelled, EventSink, PipelineEvent};
use crate::llm::TextGenerator;
use crate::prompts;
use crate::skills::{frontmatter, FrontmatterError, SkillFrontmatter};

/// Produces a corrected document for a validation error
#[async_trait]
pub trait SkillFixer: Send + Sync {
    /// Corrected text, or `None` if no correction could be obtained
    async fn fix(&self, skill_md: &str, error: &str) -> Option<String>;
}

/// Fixer backed by one non-streaming LLM call
pub struct LlmFixer {
    generator: Arc<dyn TextGenerator>,
    timeout: Duration,
}

impl LlmFixer {
    pub fn new(generator: Arc<dyn TextGenerator>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }
}

#[async_trait]
impl SkillFixer for LlmFixer {
    async fn fix(&self, skill_md: &str, error: &str) -> Option<String> {
        let messages = prompts::fix_messages(skill_md, error);
        match tokio::time::timeout(self.timeout, self.generator.complete(&messages)).await {
            Ok(Ok(text)) if !text.trim().is_empty() => Some(text),
            Ok(Ok(_)) => {
                warn!("Fix call returned an empty reply");
                None
            }
            Ok(Err(e)) => {
                warn!("Fix call failed: {}", e);
                None
            }
            Err(_) => {
                warn!("Fix call timed out after {}s", self.timeout.as_secs());
                None
            }
        }
    }
}

/// Final text and its validation result
#[derive(Debug)]
pub struct FixOutcome {
    pub text: String,
    pub result: Result<SkillFrontmatter, FrontmatterError>,
    /// Number of fix attempts made
    pub attempts: u32,
}

/// Validate `text`; on failure emit a `retrying` validation event and ask the
/// fixer for a replacement, at most `max_fix_attempts` times.
///
/// The final validation event is left to the caller.
pub async fn validate_with_fix(
    text: String,
    max_fix_attempts: u32,
    fixer: &dyn SkillFixer,
    events: &EventSink,
) -> Result<FixOutcome, Cancelled> {
    let mut text = text;
    let mut attempts = 0;

    loop {
        let error = match frontmatter::parse(&text) {
            Err(e) if attempts < max_fix_attempts => e,
            result => {
                return Ok(FixOutcome {
                    text,
                    result,
                    attempts,
                })
            }
        };

        events.emit(PipelineEvent::retrying(&error)).await?;
        attempts += 1;
        info!("Validation failed ({}), fix attempt {}/{}", error, attempts, max_fix_attempts);

        let error_text = error.to_string();
        let fixed = tokio::select! {
            biased;
            _ = events.closed() => return Err(Cancelled),
            fixed = fixer.fix(&text, &error_text) => fixed,
        };

        if let Some(fixed) = fixed {
            text = fixed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    const VALID: &str = "---\nname: ok\ndescription: fine\n---\nbody";
    const NO_DESCRIPTION: &str = "---\nname: ok\n---\nbody";

    struct CountingFixer {
        calls: AtomicU32,
        reply: Option<&'static str>,
    }

    impl CountingFixer {
        fn new(reply: Option<&'static str>) -> Self {
            Self {
                calls: AtomicU32::new(0),
                reply,
            }
        }
    }

    #[async_trait]
    impl SkillFixer for CountingFixer {
        async fn fix(&self, _skill_md: &str, error: &str) -> Option<String> {
            assert_eq!(error, "Missing required field: description");
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.map(|r| r.to_string())
        }
    }

    async fn drain(mut rx: tokio::sync::mpsc::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_valid_input_skips_fixer() {
        let (sink, rx) = EventSink::channel(8);
        let fixer = CountingFixer::new(None);

        let outcome = validate_with_fix(VALID.to_string(), 1, &fixer, &sink).await.unwrap();
        assert!(outcome.result.is_ok());
        assert_eq!(outcome.attempts, 0);
        assert_eq!(fixer.calls.load(Ordering::SeqCst), 0);
        assert!(drain(rx).await.is_empty());
    }

    #[tokio::test]
    async fn test_single_fix_succeeds() {
        let (sink, rx) = EventSink::channel(8);
        let fixer = CountingFixer::new(Some(VALID));

        let outcome = validate_with_fix(NO_DESCRIPTION.to_string(), 1, &fixer, &sink)
            .await
            .unwrap();
        assert!(outcome.result.is_ok());
        assert_eq!(outcome.text, VALID);
        assert_eq!(outcome.attempts, 1);

        let events = drain(rx).await;
        assert_eq!(events, vec![PipelineEvent::retrying(&FrontmatterError::MissingDescription)]);
    }

    #[tokio::test]
    async fn test_bound_is_respected() {
        let (sink, _rx) = EventSink::channel(8);
        let fixer = CountingFixer::new(Some(NO_DESCRIPTION));

        let outcome = validate_with_fix(NO_DESCRIPTION.to_string(), 1, &fixer, &sink)
            .await
            .unwrap();
        assert_eq!(outcome.result, Err(FrontmatterError::MissingDescription));
        assert_eq!(fixer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_fix_keeps_original() {
        let (sink, _rx) = EventSink::channel(8);
        let fixer = CountingFixer::new(None);

        let outcome = validate_with_fix(NO_DESCRIPTION.to_string(), 1, &fixer, &sink)
            .await
            .unwrap();
        assert_eq!(outcome.text, NO_DESCRIPTION);
        assert!(outcome.result.is_err());
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn test_zero_bound_never_fixes() {
        let (sink, rx) = EventSink::channel(8);
        let fixer = CountingFixer::new(Some(VALID));

        let outcome = validate_with_fix(NO_DESCRIPTION.to_string(), 0, &fixer, &sink)
            .await
            .unwrap();
        assert!(outcome.result.is_err());
        assert_eq!(fixer.calls.load(Ordering::SeqCst), 0);
        assert!(drain(rx).await.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_when_consumer_gone() {
        let (sink, rx) = EventSink::channel(8);
        drop(rx);
        let fixer = CountingFixer::new(Some(VALID));

        let result = validate_with_fix(NO_DESCRIPTION.to_string(), 1, &fixer, &sink).await;
        assert!(matches!(result, Err(Cancelled)));
        assert_eq!(fixer.calls.load(Ordering::SeqCst), 0);
    }
}
