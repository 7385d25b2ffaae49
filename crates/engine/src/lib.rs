//! Chunking, graph construction and hybrid retrieval
//!
//! - [`StructureAnalyzer`]: picks a chunking strategy from document metadata
//! - [`ChunkingEngine`]: cuts documents into bounded, deterministic chunks
//! - [`EntityIndex`]: glossary lookup and mention extraction
//! - [`GraphBuilder`]: derives the typed knowledge graph
//! - [`HybridRetriever`]: vector search re-ranked by graph relevance
//! - [`IngestPipeline`]: parallel chunking with atomic publishing

pub mod analyzer;
pub mod chunking;
pub mod entity_index;
pub mod error;
pub mod graph;
pub mod pipeline;
pub mod retriever;
pub mod sink;
pub mod vector;

pub use analyzer::StructureAnalyzer;
pub use chunking::{ChunkOutcome, ChunkingEngine};
pub use entity_index::{EntityIndex, EntityMatch, MatchKind, Mention};
pub use error::{EngineError, Result};
pub use graph::{GraphBuildReport, GraphBuilder, KnowledgeGraph, PublishStats};
pub use pipeline::{CancellationToken, IngestPipeline, PipelineReport};
pub use retriever::{GraphConstraints, HybridRetriever, RetrievalResult};
pub use sink::{ChunkSink, JsonlChunkSink, MemoryChunkSink};
pub use vector::{
    ChunkPublisher, Embedder, HashingEmbedder, InMemoryVectorIndex, VectorHit, VectorIndex,
    VectorPublishStats,
};
