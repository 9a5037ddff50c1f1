//! Transcript formatting via a local LLM
//!
//! Cleans up raw transcripts (filler removal, punctuation) using a model
//! served by a local Ollama instance. Formatting is best-effort: any
//! failure falls back to the raw transcript so dictation never blocks on
//! the LLM.

pub mod ollama;

pub use ollama::OllamaFormatter;

use crate::error::FormatError;
use std::sync::Arc;
use std::time::Duration;

/// Trait for transcript formatters
#[async_trait::async_trait]
pub trait TextFormatter: Send + Sync {
    /// Reformat a raw transcript
    async fn format(&self, text: &str) -> Result<String, FormatError>;

    /// Whether the backing service is currently reachable
    fn available(&self) -> bool;
}

/// Result of the formatting stage for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormattingOutcome {
    /// The formatter produced non-empty output
    Formatted(String),
    /// Formatting was not attempted for this session
    Skipped(String),
    /// The formatter ran and failed; callers fall back to the raw text
    Failed(String),
}

/// Runs a formatter with a bounded wait.
///
/// On expiry the session proceeds with the raw transcript while the worker
/// finishes in the background; its late result is discarded. The HTTP
/// client carries its own timeout so the worker does terminate.
#[derive(Clone)]
pub struct FormattingStage {
    formatter: Arc<dyn TextFormatter>,
    timeout: Duration,
}

impl FormattingStage {
    pub fn new(formatter: Arc<dyn TextFormatter>, timeout: Duration) -> Self {
        Self { formatter, timeout }
    }

    /// Run the formatter on a transcript
    pub async fn run(&self, text: &str) -> FormattingOutcome {
        let formatter = self.formatter.clone();
        let input = text.to_string();
        let start = std::time::Instant::now();

        let worker = tokio::spawn(async move { formatter.format(&input).await });

        match tokio::time::timeout(self.timeout, worker).await {
            Ok(Ok(Ok(output))) => {
                let trimmed = output.trim();
                if trimmed.is_empty() {
                    tracing::warn!("Formatter returned empty text, using raw transcript");
                    FormattingOutcome::Failed("empty response".to_string())
                } else {
                    tracing::debug!(
                        "Formatting completed in {:.2}s",
                        start.elapsed().as_secs_f32()
                    );
                    FormattingOutcome::Formatted(trimmed.to_string())
                }
            }
            Ok(Ok(Err(e))) => {
                tracing::warn!("Formatter failed ({}), using raw transcript", e);
                FormattingOutcome::Failed(e.to_string())
            }
            Ok(Err(e)) => {
                tracing::warn!("Formatter task failed ({}), using raw transcript", e);
                FormattingOutcome::Failed(e.to_string())
            }
            Err(_) => {
                tracing::warn!(
                    "Formatter did not respond within {}s, using raw transcript",
                    self.timeout.as_secs()
                );
                FormattingOutcome::Failed(format!(
                    "no response within {}s",
                    self.timeout.as_secs()
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedFormatter {
        reply: String,
    }

    #[async_trait::async_trait]
    impl TextFormatter for FixedFormatter {
        async fn format(&self, _text: &str) -> Result<String, FormatError> {
            Ok(self.reply.clone())
        }

        fn available(&self) -> bool {
            true
        }
    }

    struct SlowFormatter;

    #[async_trait::async_trait]
    impl TextFormatter for SlowFormatter {
        async fn format(&self, text: &str) -> Result<String, FormatError> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(text.to_uppercase())
        }

        fn available(&self) -> bool {
            true
        }
    }

    struct FailingFormatter;

    #[async_trait::async_trait]
    impl TextFormatter for FailingFormatter {
        async fn format(&self, _text: &str) -> Result<String, FormatError> {
            Err(FormatError::Unreachable("connection refused".to_string()))
        }

        fn available(&self) -> bool {
            false
        }
    }

    fn stage<F: TextFormatter + 'static>(formatter: F, timeout_ms: u64) -> FormattingStage {
        FormattingStage::new(Arc::new(formatter), Duration::from_millis(timeout_ms))
    }

    #[tokio::test]
    async fn test_formatted_output() {
        let stage = stage(
            FixedFormatter {
                reply: "Hello, world.".to_string(),
            },
            1000,
        );
        let outcome = stage.run("hello world").await;
        assert_eq!(
            outcome,
            FormattingOutcome::Formatted("Hello, world.".to_string())
        );
    }

    #[tokio::test]
    async fn test_output_is_trimmed() {
        let stage = stage(
            FixedFormatter {
                reply: "  tidy  \n".to_string(),
            },
            1000,
        );
        let outcome = stage.run("tidy").await;
        assert_eq!(outcome, FormattingOutcome::Formatted("tidy".to_string()));
    }

    #[tokio::test]
    async fn test_empty_reply_is_failure() {
        let stage = stage(
            FixedFormatter {
                reply: "   ".to_string(),
            },
            1000,
        );
        let outcome = stage.run("something").await;
        assert!(matches!(outcome, FormattingOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn test_formatter_error_is_failure() {
        let stage = stage(FailingFormatter, 1000);
        let outcome = stage.run("something").await;
        match outcome {
            FormattingOutcome::Failed(reason) => {
                assert!(reason.contains("connection refused"))
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_is_failure() {
        let stage = stage(SlowFormatter, 50);
        let start = std::time::Instant::now();
        let outcome = stage.run("something").await;
        // The stage must give up well before the worker's 500ms sleep
        assert!(start.elapsed() < Duration::from_millis(400));
        match outcome {
            FormattingOutcome::Failed(reason) => assert!(reason.contains("no response")),
            other => panic!("expected timeout failure, got {:?}", other),
        }
    }
}
