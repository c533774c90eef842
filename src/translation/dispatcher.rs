//! # Translation Dispatcher
//!
//! Orchestrates one translation request: looks up the pipeline for the
//! requested language pair, chunks the input into fixed-size character
//! windows, translates each window in order, and joins the results with a
//! single space.
//!
//! Chunking is deliberately naive: contiguous 400-character windows with no
//! overlap and no word-boundary awareness, so a window may split mid-word.
//! Windows are measured in `char`s, never bytes, so multibyte text cannot be
//! split inside a code point.
//!
//! Failure policy: the first segment whose translation fails aborts the
//! whole request with the engine's message. No partial results, no retries.

use crate::error::{AppError, AppResult};
use crate::translation::registry::{LanguagePair, TranslatorRegistry};
use std::sync::Arc;
use std::time::Duration;

/// Number of characters per translation window.
pub const SEGMENT_SIZE: usize = 400;

/// Split `text` into contiguous windows of at most `window` characters.
pub fn segment_text(text: &str, window: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(window)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// Request-level translation orchestration over the startup-built registry.
///
/// Pipeline calls run on the blocking thread pool under a timeout so a stuck
/// model never wedges an HTTP worker.
pub struct TranslationDispatcher {
    registry: Arc<TranslatorRegistry>,
    timeout: Duration,
}

impl TranslationDispatcher {
    pub fn new(registry: Arc<TranslatorRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    /// Translate `text` for the given pair.
    ///
    /// Returns 400 when no pipeline is registered for the pair (the model is
    /// never invoked), 500 when any segment fails or the request times out.
    pub async fn translate(&self, text: String, pair: LanguagePair) -> AppResult<String> {
        if !self.registry.contains(&pair) {
            return Err(AppError::BadRequest(format!(
                "No translation model found for language pair {}",
                pair
            )));
        }

        if text.is_empty() {
            return Ok(String::new());
        }

        let registry = Arc::clone(&self.registry);
        let task = tokio::task::spawn_blocking(move || {
            let pipeline = registry
                .get(&pair)
                .ok_or_else(|| anyhow::anyhow!("Pipeline vanished for pair {}", pair))?;

            let segments = segment_text(&text, SEGMENT_SIZE);
            let mut translated = Vec::with_capacity(segments.len());
            for segment in &segments {
                translated.push(pipeline.translate(segment)?);
            }
            Ok::<String, anyhow::Error>(translated.join(" "))
        });

        match tokio::time::timeout(self.timeout, task).await {
            Err(_) => Err(AppError::Inference(format!(
                "Translation timed out after {}s",
                self.timeout.as_secs()
            ))),
            Ok(Err(join_err)) => Err(AppError::Internal(join_err.to_string())),
            Ok(Ok(Err(model_err))) => Err(AppError::Inference(model_err.to_string())),
            Ok(Ok(Ok(translation))) => Ok(translation),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::pipeline::TranslationPipeline;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TaggingPipeline {
        calls: Arc<AtomicUsize>,
    }

    impl TranslationPipeline for TaggingPipeline {
        fn translate(&self, text: &str) -> anyhow::Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("[{}:{}]", n, text.chars().count()))
        }
    }

    struct FailingPipeline {
        fail_at: usize,
        calls: Arc<AtomicUsize>,
    }

    impl TranslationPipeline for FailingPipeline {
        fn translate(&self, text: &str) -> anyhow::Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n == self.fail_at {
                anyhow::bail!("segment {} rejected", n);
            }
            Ok(text.to_string())
        }
    }

    fn dispatcher_with(
        pair: &str,
        pipeline: Box<dyn TranslationPipeline>,
    ) -> TranslationDispatcher {
        let mut registry = TranslatorRegistry::new();
        registry.insert(pair.parse().unwrap(), pipeline);
        TranslationDispatcher::new(Arc::new(registry), Duration::from_secs(5))
    }

    #[test]
    fn test_segment_count_matches_ceil_division() {
        for len in [1usize, 399, 400, 401, 850, 1200] {
            let text: String = "a".repeat(len);
            let segments = segment_text(&text, SEGMENT_SIZE);
            assert_eq!(segments.len(), len.div_ceil(SEGMENT_SIZE), "len {}", len);
        }
    }

    #[test]
    fn test_segments_are_contiguous_and_ordered() {
        let text: String = ('a'..='z').cycle().take(1000).collect();
        let segments = segment_text(&text, SEGMENT_SIZE);
        assert_eq!(segments.concat(), text);
        assert_eq!(segments[0].chars().count(), 400);
        assert_eq!(segments[2].chars().count(), 200);
    }

    #[test]
    fn test_segmenting_counts_chars_not_bytes() {
        // 500 three-byte characters; byte-based slicing would panic.
        let text: String = "日".repeat(500);
        let segments = segment_text(&text, SEGMENT_SIZE);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].chars().count(), 400);
        assert_eq!(segments[1].chars().count(), 100);
    }

    #[test]
    fn test_empty_text_yields_no_segments() {
        assert!(segment_text("", SEGMENT_SIZE).is_empty());
    }

    #[tokio::test]
    async fn test_unknown_pair_is_rejected_without_invoking_pipeline() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = dispatcher_with(
            "en-es",
            Box::new(TaggingPipeline {
                calls: Arc::clone(&calls),
            }),
        );

        let result = dispatcher
            .translate("hallo".to_string(), LanguagePair::new("de", "es"))
            .await;

        assert!(matches!(result, Err(AppError::BadRequest(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_segments_translated_in_order_and_space_joined() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = dispatcher_with(
            "en-es",
            Box::new(TaggingPipeline {
                calls: Arc::clone(&calls),
            }),
        );

        let text: String = "x".repeat(850);
        let result = dispatcher
            .translate(text, LanguagePair::new("en", "es"))
            .await
            .unwrap();

        assert_eq!(result, "[0:400] [1:400] [2:50]");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_segment_failure_aborts_whole_request() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = dispatcher_with(
            "en-es",
            Box::new(FailingPipeline {
                fail_at: 1,
                calls: Arc::clone(&calls),
            }),
        );

        let text: String = "x".repeat(900);
        let result = dispatcher
            .translate(text, LanguagePair::new("en", "es"))
            .await;

        match result {
            Err(AppError::Inference(msg)) => assert!(msg.contains("segment 1 rejected")),
            other => panic!("expected inference error, got {:?}", other.map(|_| ())),
        }
        // Third segment never attempted.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_text_translates_to_empty_string() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = dispatcher_with(
            "en-es",
            Box::new(TaggingPipeline {
                calls: Arc::clone(&calls),
            }),
        );

        let result = dispatcher
            .translate(String::new(), LanguagePair::new("en", "es"))
            .await
            .unwrap();

        assert_eq!(result, "");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
