//! Chunking engine
//!
//! Dispatches each document to one strategy and degrades down the chain
//! semantic -> paragraph -> token (entry -> paragraph) when the expected
//! structure is missing. Degradations are logged and counted, never raised.

pub mod markdown;

mod entry;
mod packing;
mod paragraph;
mod semantic;
mod token;

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use corpusrag_core::chunk::{entry_chunk_id, positional_chunk_id};
use corpusrag_core::{
    ids, Chunk, ChunkingConfig, ChunkingStrategy, Document, QualityFlag, QualityReport,
    SectionType, StrategyDetails, TokenCounter, TokenEstimator,
};
use tracing::{debug, instrument, warn};

use crate::analyzer::StructureAnalyzer;
use markdown::Outline;

/// Shared state for one chunking pass over one document
pub(crate) struct Pass<'a> {
    pub text: &'a str,
    pub outline: Outline<'a>,
    pub config: &'a ChunkingConfig,
    pub tokens: &'a TokenEstimator,
    pub section_type: SectionType,
}

impl Pass<'_> {
    pub fn count(&self, span: &Range<usize>) -> usize {
        self.tokens.count(&self.text[span.clone()])
    }
}

/// A chunk before ids, token counts and flags are assigned
#[derive(Debug, Clone)]
pub(crate) struct Draft {
    pub span: Range<usize>,
    pub details: StrategyDetails,
    pub fixed_split: bool,
    /// Subject to the soft minimum
    pub banded: bool,
}

/// Result of chunking one document
#[derive(Debug, Clone)]
pub struct ChunkOutcome {
    pub document_id: String,
    /// Strategy chosen by the analyzer
    pub selected: ChunkingStrategy,
    /// Strategy that produced the chunks
    pub strategy: ChunkingStrategy,
    /// Fallbacks taken, in order
    pub degradations: Vec<(ChunkingStrategy, ChunkingStrategy)>,
    pub chunks: Vec<Chunk>,
}

impl ChunkOutcome {
    pub fn quality(&self) -> QualityReport {
        let mut report = QualityReport::new();
        report.record_document(self.strategy, &self.chunks);
        for (from, to) in &self.degradations {
            report.record_degradation(*from, *to);
        }
        report
    }
}

/// Next strategy down the degradation chain
fn degrade(strategy: ChunkingStrategy) -> ChunkingStrategy {
    match strategy {
        ChunkingStrategy::SemanticBreaks | ChunkingStrategy::EntryBased => {
            ChunkingStrategy::ParagraphClusters
        }
        ChunkingStrategy::ParagraphClusters => ChunkingStrategy::TokenBased,
        other => other,
    }
}

/// Cuts documents into chunks. Cheap to share across worker threads.
#[derive(Debug, Clone)]
pub struct ChunkingEngine {
    config: ChunkingConfig,
    tokens: TokenEstimator,
    analyzer: StructureAnalyzer,
}

impl ChunkingEngine {
    pub fn new(config: ChunkingConfig) -> Self {
        let tokens = TokenEstimator::whitespace(config.tokens_per_word);
        Self {
            config,
            tokens,
            analyzer: StructureAnalyzer,
        }
    }

    /// Builder: count tokens with a precise tokenizer
    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn TokenCounter>) -> Self {
        self.tokens = self.tokens.with_tokenizer(tokenizer);
        self
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    pub fn token_estimator(&self) -> &TokenEstimator {
        &self.tokens
    }

    /// Chunk with the strategy the analyzer selects
    #[instrument(skip(self, doc), fields(doc = %ids::short_hash(doc.id())))]
    pub fn chunk(&self, doc: &Document) -> ChunkOutcome {
        let selected = self.analyzer.select(&doc.metadata);
        self.chunk_with(doc, selected)
    }

    /// Chunk starting from an explicit strategy
    pub fn chunk_with(&self, doc: &Document, selected: ChunkingStrategy) -> ChunkOutcome {
        let pass = Pass {
            text: &doc.text,
            outline: Outline::parse(&doc.text),
            config: &self.config,
            tokens: &self.tokens,
            section_type: doc.metadata.section_type,
        };

        let mut strategy = selected;
        let mut degradations = Vec::new();
        let drafts = loop {
            let attempt = match strategy {
                ChunkingStrategy::Skip => Some(Vec::new()),
                ChunkingStrategy::EntryBased => entry::chunk(&pass),
                ChunkingStrategy::SemanticBreaks => semantic::chunk(&pass),
                ChunkingStrategy::ParagraphClusters => paragraph::chunk(&pass),
                ChunkingStrategy::TokenBased => Some(token::chunk(&pass)),
            };
            match attempt {
                Some(drafts) => break drafts,
                None => {
                    let next = degrade(strategy);
                    warn!(
                        document = %ids::short_hash(doc.id()),
                        from = %strategy,
                        to = %next,
                        "Expected structure missing, degrading chunking strategy"
                    );
                    degradations.push((strategy, next));
                    strategy = next;
                }
            }
        };

        let chunks = self.finalize(doc, strategy, drafts);
        debug!(
            strategy = %strategy,
            chunks = chunks.len(),
            "Chunked document"
        );

        ChunkOutcome {
            document_id: doc.id().to_string(),
            selected,
            strategy,
            degradations,
            chunks,
        }
    }

    fn finalize(&self, doc: &Document, strategy: ChunkingStrategy, drafts: Vec<Draft>) -> Vec<Chunk> {
        let total = drafts.len();
        let mut entry_ids: HashMap<String, usize> = HashMap::new();

        drafts
            .into_iter()
            .enumerate()
            .map(|(ordinal, draft)| {
                let mut content = &doc.text[draft.span.clone()];
                let mut token_count = self.tokens.count(content);
                let mut quality_flags = Vec::new();

                if token_count > self.config.hard_max_tokens {
                    let original_tokens = token_count;
                    (content, token_count) = self.truncate(content);
                    warn!(
                        document = %ids::short_hash(doc.id()),
                        ordinal,
                        original_tokens,
                        token_count,
                        "Chunk over hard maximum, truncated"
                    );
                    quality_flags.push(QualityFlag::Truncated { original_tokens });
                }
                if draft.fixed_split {
                    quality_flags.push(QualityFlag::FixedSizeSplit);
                }
                if draft.banded && ordinal + 1 < total && token_count < self.config.soft_min_tokens {
                    quality_flags.push(QualityFlag::Undersized);
                }

                let chunk_id = match &draft.details {
                    StrategyDetails::Entry { entry_name, .. } => {
                        let base = entry_chunk_id(entry_name);
                        let seen = entry_ids.entry(base.clone()).or_insert(0);
                        *seen += 1;
                        if *seen == 1 {
                            base
                        } else {
                            format!("{base}-{seen}")
                        }
                    }
                    _ => positional_chunk_id(doc, ordinal),
                };

                Chunk {
                    chunk_id,
                    document_id: doc.id().to_string(),
                    content: content.to_string(),
                    ordinal,
                    token_count,
                    strategy,
                    metadata: doc.metadata.clone(),
                    details: draft.details,
                    quality_flags,
                }
            })
            .collect()
    }

    /// Longest char-boundary prefix within the hard maximum
    fn truncate<'t>(&self, content: &'t str) -> (&'t str, usize) {
        let hard_max = self.config.hard_max_tokens;
        let mut end = content.len();
        let mut tokens = self.tokens.count(content);

        while tokens > hard_max && end > 0 {
            let target = (end as f64 * hard_max as f64 / tokens as f64) as usize;
            end = markdown::floor_char_boundary(content, target.min(end - 1));
            tokens = self.tokens.count(&content[..end]);
        }
        (&content[..end], tokens)
    }
}

impl Default for ChunkingEngine {
    fn default() -> Self {
        Self::new(ChunkingConfig::default())
    }
}
