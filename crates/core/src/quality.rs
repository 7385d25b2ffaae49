//! Chunking quality accounting

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::chunk::{Chunk, ChunkingStrategy, QualityFlag};

/// Counters describing how a batch of documents was chunked
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QualityReport {
    pub documents: usize,
    pub chunks: usize,
    /// Documents per chosen strategy (after any degradation)
    pub strategies: BTreeMap<ChunkingStrategy, usize>,
    /// Degradations keyed as `from->to`
    pub degradations: BTreeMap<String, usize>,
    pub truncated_chunks: usize,
    pub undersized_chunks: usize,
    pub fixed_split_chunks: usize,
    pub skipped_documents: usize,
    pub resumed_documents: usize,
    pub cancelled_documents: usize,
    pub failed_documents: usize,
    pub tokenizer_fallbacks: u64,
    pub total_tokens: usize,
}

impl QualityReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one chunked document
    pub fn record_document(&mut self, strategy: ChunkingStrategy, chunks: &[Chunk]) {
        self.documents += 1;
        *self.strategies.entry(strategy).or_default() += 1;
        if strategy == ChunkingStrategy::Skip {
            self.skipped_documents += 1;
        }
        for chunk in chunks {
            self.chunks += 1;
            self.total_tokens += chunk.token_count;
            for flag in &chunk.quality_flags {
                match flag {
                    QualityFlag::Truncated { .. } => self.truncated_chunks += 1,
                    QualityFlag::Undersized => self.undersized_chunks += 1,
                    QualityFlag::FixedSizeSplit => self.fixed_split_chunks += 1,
                }
            }
        }
    }

    pub fn record_degradation(&mut self, from: ChunkingStrategy, to: ChunkingStrategy) {
        *self.degradations.entry(format!("{from}->{to}")).or_default() += 1;
    }

    pub fn degradation_count(&self) -> usize {
        self.degradations.values().sum()
    }

    pub fn strategy_count(&self, strategy: ChunkingStrategy) -> usize {
        self.strategies.get(&strategy).copied().unwrap_or(0)
    }

    /// Fold another report into this one
    pub fn merge(&mut self, other: &QualityReport) {
        self.documents += other.documents;
        self.chunks += other.chunks;
        for (strategy, n) in &other.strategies {
            *self.strategies.entry(*strategy).or_default() += n;
        }
        for (key, n) in &other.degradations {
            *self.degradations.entry(key.clone()).or_default() += n;
        }
        self.truncated_chunks += other.truncated_chunks;
        self.undersized_chunks += other.undersized_chunks;
        self.fixed_split_chunks += other.fixed_split_chunks;
        self.skipped_documents += other.skipped_documents;
        self.resumed_documents += other.resumed_documents;
        self.cancelled_documents += other.cancelled_documents;
        self.failed_documents += other.failed_documents;
        self.tokenizer_fallbacks += other.tokenizer_fallbacks;
        self.total_tokens += other.total_tokens;
    }

    /// Share of chunked documents that ended on token windows. Expected to
    /// stay a small minority of any corpus.
    pub fn token_based_fraction(&self) -> f64 {
        if self.documents == 0 {
            0.0
        } else {
            self.strategy_count(ChunkingStrategy::TokenBased) as f64 / self.documents as f64
        }
    }

    /// Share of chunks whose size came from the whitespace fallback
    pub fn tokenizer_fallback_fraction(&self) -> f64 {
        if self.chunks == 0 {
            0.0
        } else {
            (self.tokenizer_fallbacks as f64 / self.chunks as f64).min(1.0)
        }
    }
}
