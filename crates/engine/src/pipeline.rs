//! Parallel ingestion: chunk documents on a worker pool and publish each
//! document's chunks atomically to a sink

use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use corpusrag_core::{ids, Document, PipelineConfig, QualityReport, TokenCounter};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::analyzer::StructureAnalyzer;
use crate::chunking::{ChunkOutcome, ChunkingEngine};
use crate::sink::ChunkSink;
use crate::Result;

/// Cooperative cancellation flag, checked once per document
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Summary of one ingestion run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub quality: QualityReport,
    /// Documents whose chunks were published in this run
    pub published: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cancelled: bool,
}

impl PipelineReport {
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

enum DocumentStatus {
    Published(ChunkOutcome),
    Resumed,
    Cancelled,
    Failed,
}

/// Chunks a batch of documents in parallel
pub struct IngestPipeline {
    config: PipelineConfig,
    engine: ChunkingEngine,
    pool: ThreadPool,
}

impl std::fmt::Debug for IngestPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestPipeline")
            .field("workers", &self.pool.current_num_threads())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl IngestPipeline {
    /// Validate the configuration and start the worker pool
    /// (`workers == 0` uses one thread per core)
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .thread_name(|i| format!("corpusrag-chunk-{i}"))
            .build()?;
        let engine = ChunkingEngine::new(config.chunking.clone());
        Ok(Self {
            config,
            engine,
            pool,
        })
    }

    /// Builder: count tokens with a precise tokenizer
    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn TokenCounter>) -> Self {
        self.engine = self.engine.with_tokenizer(tokenizer);
        self
    }

    pub fn engine(&self) -> &ChunkingEngine {
        &self.engine
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Chunk every document not already in `sink`.
    ///
    /// Per-document failures and cancellation are counted in the report;
    /// a cancelled document publishes nothing.
    #[instrument(skip_all, fields(documents = documents.len()))]
    pub fn run(
        &self,
        documents: &[Document],
        sink: &dyn ChunkSink,
        cancel: &CancellationToken,
    ) -> PipelineReport {
        let started_at = Utc::now();
        let fallbacks_before = self.engine.token_estimator().fallback_count();

        let statuses: Vec<DocumentStatus> = self.pool.install(|| {
            documents
                .par_iter()
                .map(|doc| self.process(doc, sink, cancel))
                .collect()
        });

        let mut quality = QualityReport::new();
        let mut published = 0;
        for status in statuses {
            match status {
                DocumentStatus::Published(outcome) => {
                    quality.merge(&outcome.quality());
                    published += 1;
                }
                DocumentStatus::Resumed => quality.resumed_documents += 1,
                DocumentStatus::Cancelled => quality.cancelled_documents += 1,
                DocumentStatus::Failed => quality.failed_documents += 1,
            }
        }
        quality.tokenizer_fallbacks = self
            .engine
            .token_estimator()
            .fallback_count()
            .saturating_sub(fallbacks_before);
        if quality.tokenizer_fallbacks > 0 {
            warn!(
                fallbacks = quality.tokenizer_fallbacks,
                "Tokenizer unavailable for some chunks, used whitespace estimate"
            );
        }

        let report = PipelineReport {
            published,
            cancelled: cancel.is_cancelled(),
            started_at,
            finished_at: Utc::now(),
            quality,
        };
        info!(
            published = report.published,
            chunks = report.quality.chunks,
            resumed = report.quality.resumed_documents,
            skipped = report.quality.skipped_documents,
            degraded = report.quality.degradation_count(),
            token_based_fraction = report.quality.token_based_fraction(),
            truncated = report.quality.truncated_chunks,
            cancelled = report.quality.cancelled_documents,
            failed = report.quality.failed_documents,
            elapsed_ms = report.elapsed().num_milliseconds(),
            "Ingestion finished"
        );
        report
    }

    fn process(&self, doc: &Document, sink: &dyn ChunkSink, cancel: &CancellationToken) -> DocumentStatus {
        if cancel.is_cancelled() {
            return DocumentStatus::Cancelled;
        }

        let doc = prepared(doc);
        match sink.contains(doc.id()) {
            Ok(true) => {
                debug!(doc = %ids::short_hash(doc.id()), "Already published, skipping");
                return DocumentStatus::Resumed;
            }
            Ok(false) => {}
            Err(err) => warn!(doc = %ids::short_hash(doc.id()), error = %err, "Sink lookup failed, rechunking"),
        }

        let outcome = self.engine.chunk(&doc);

        // a cancel that lands mid-document drops the unpublished result
        if cancel.is_cancelled() {
            return DocumentStatus::Cancelled;
        }

        match sink.publish(doc.id(), &outcome.chunks) {
            Ok(()) => DocumentStatus::Published(outcome),
            Err(err) => {
                warn!(doc = %ids::short_hash(doc.id()), error = %err, "Publishing chunks failed");
                DocumentStatus::Failed
            }
        }
    }
}

/// Fill in the content hash when upstream left it empty, and measure the
/// structure of records that arrived without one. Reported structure is
/// never touched.
fn prepared(doc: &Document) -> Cow<'_, Document> {
    let needs_hash = doc.content_hash.trim().is_empty();
    let needs_structure = doc.metadata.document_structure.is_none();
    if !needs_hash && !needs_structure {
        return Cow::Borrowed(doc);
    }

    let mut doc = doc.clone();
    doc.ensure_content_hash();
    if needs_structure {
        doc.metadata.document_structure = Some(StructureAnalyzer::measure(&doc.text));
    }
    Cow::Owned(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{JsonlChunkSink, MemoryChunkSink};
    use corpusrag_core::{ChunkingStrategy, RagPriority, SectionType};
    use tempfile::tempdir;

    fn documents() -> Vec<Document> {
        let prose = (0..30)
            .map(|i| format!("Paragraph {i} on the working day and the value of labour power."))
            .collect::<Vec<_>>()
            .join("\n\n");
        vec![
            Document::new(prose).with_title("Working Day").with_author("Karl Marx"),
            Document::new("## Marx, Karl\n\nGerman philosopher.\n\n## Mao Zedong\n\nChinese revolutionary.")
                .with_section_type(SectionType::Glossary),
            Document::new("a, b, c")
                .with_section_type(SectionType::Index)
                .with_priority(RagPriority::Low),
        ]
    }

    fn pipeline() -> IngestPipeline {
        let config = PipelineConfig {
            workers: 2,
            ..PipelineConfig::default()
        };
        IngestPipeline::new(config).unwrap()
    }

    #[test]
    fn test_run_publishes_every_document() {
        let sink = MemoryChunkSink::new();
        let docs = documents();
        let report = pipeline().run(&docs, &sink, &CancellationToken::new());

        assert_eq!(report.published, 3);
        assert_eq!(report.quality.documents, 3);
        assert_eq!(report.quality.skipped_documents, 1);
        assert_eq!(report.quality.strategy_count(ChunkingStrategy::EntryBased), 1);
        assert_eq!(report.quality.token_based_fraction(), 0.0);
        assert!(!report.cancelled);
        assert!(report.elapsed() >= chrono::Duration::zero());

        // skipped documents are recorded with no chunks
        assert_eq!(sink.chunks(docs[2].id()).unwrap().len(), 0);
        assert_eq!(sink.chunks(docs[1].id()).unwrap().len(), 2);
    }

    #[test]
    fn test_rerun_resumes_from_sink() {
        let dir = tempdir().unwrap();
        let sink = JsonlChunkSink::open(dir.path()).unwrap();
        let docs = documents();
        let pipeline = pipeline();

        let first = pipeline.run(&docs, &sink, &CancellationToken::new());
        let before = sink.read(docs[0].id()).unwrap();

        let second = pipeline.run(&docs, &sink, &CancellationToken::new());
        assert_eq!(first.published, 3);
        assert_eq!(second.published, 0);
        assert_eq!(second.quality.resumed_documents, 3);
        assert_eq!(sink.read(docs[0].id()).unwrap(), before);
    }

    #[test]
    fn test_cancelled_run_publishes_nothing() {
        let sink = MemoryChunkSink::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = pipeline().run(&documents(), &sink, &cancel);
        assert!(report.cancelled);
        assert_eq!(report.published, 0);
        assert_eq!(report.quality.cancelled_documents, 3);
        assert_eq!(sink.document_count(), 0);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = PipelineConfig::default();
        config.chunking.soft_min_tokens = 900;
        assert!(IngestPipeline::new(config).is_err());
    }

    #[test]
    fn test_missing_hash_and_structure_are_filled() {
        let mut doc = Document::new("# Title\n\n## Part\n\n### Detail\n\nBody text.");
        doc.content_hash.clear();

        let prepared = prepared(&doc);
        assert_eq!(prepared.content_hash, ids::content_hash(&doc.text));
        assert_eq!(prepared.metadata.heading_depth(), 3);
        let structure = prepared.metadata.document_structure.as_ref().unwrap();
        assert!(structure.word_count > 0);
    }

    #[test]
    fn test_reported_structure_is_kept() {
        // the extractor says flat even though the text has headings
        let doc = Document::new("### One\n\nBody.\n\n### Two\n\nMore body.").with_heading_depth(0);

        let prepared = prepared(&doc);
        assert!(matches!(prepared, Cow::Borrowed(_)));
        assert_eq!(prepared.metadata.heading_depth(), 0);

        let sink = MemoryChunkSink::new();
        pipeline().run(std::slice::from_ref(&doc), &sink, &CancellationToken::new());
        let published = sink.chunks(doc.id()).unwrap();
        assert!(published
            .iter()
            .all(|c| c.strategy == ChunkingStrategy::ParagraphClusters));
        assert_eq!(
            published[0].strategy,
            ChunkingEngine::default().chunk(&doc).strategy
        );
    }
}
