//! Token counting
//!
//! A real tokenizer may be plugged in through [`TokenCounter`]. When it is
//! missing or fails, counts fall back to a whitespace-word estimate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Exact tokenizer seam
pub trait TokenCounter: Send + Sync {
    /// Count tokens in `text`, or `None` if the tokenizer cannot handle it
    fn count(&self, text: &str) -> Option<usize>;
}

/// Whitespace words scaled by a fixed ratio
#[derive(Debug, Clone, Copy)]
pub struct WhitespaceEstimator {
    pub tokens_per_word: f32,
}

impl WhitespaceEstimator {
    pub fn new(tokens_per_word: f32) -> Self {
        Self { tokens_per_word }
    }

    pub fn estimate_words(&self, words: usize) -> usize {
        (words as f32 * self.tokens_per_word).ceil() as usize
    }

    pub fn estimate(&self, text: &str) -> usize {
        self.estimate_words(text.split_whitespace().count())
    }
}

impl TokenCounter for WhitespaceEstimator {
    fn count(&self, text: &str) -> Option<usize> {
        Some(self.estimate(text))
    }
}

/// Token counter with whitespace fallback and fallback accounting
#[derive(Clone)]
pub struct TokenEstimator {
    tokenizer: Option<Arc<dyn TokenCounter>>,
    fallback: WhitespaceEstimator,
    fallbacks: Arc<AtomicU64>,
}

impl std::fmt::Debug for TokenEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenEstimator")
            .field("has_tokenizer", &self.tokenizer.is_some())
            .field("tokens_per_word", &self.fallback.tokens_per_word)
            .field("fallbacks", &self.fallback_count())
            .finish()
    }
}

impl TokenEstimator {
    /// Estimator without a tokenizer. Estimates are not counted as fallbacks.
    pub fn whitespace(tokens_per_word: f32) -> Self {
        Self {
            tokenizer: None,
            fallback: WhitespaceEstimator::new(tokens_per_word),
            fallbacks: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn TokenCounter>) -> Self {
        self.tokenizer = Some(tokenizer);
        self
    }

    pub fn has_tokenizer(&self) -> bool {
        self.tokenizer.is_some()
    }

    pub fn count(&self, text: &str) -> usize {
        match &self.tokenizer {
            None => self.fallback.estimate(text),
            Some(tokenizer) => match tokenizer.count(text) {
                Some(n) => n,
                None => {
                    self.fallbacks.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(chars = text.len(), "Tokenizer declined input, estimating");
                    self.fallback.estimate(text)
                }
            },
        }
    }

    /// Estimate for a known word count, bypassing the tokenizer
    pub fn estimate_words(&self, words: usize) -> usize {
        self.fallback.estimate_words(words)
    }

    pub fn tokens_per_word(&self) -> f32 {
        self.fallback.tokens_per_word
    }

    /// Number of tokenizer failures so far
    pub fn fallback_count(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }
}
