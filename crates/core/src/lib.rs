//! Core domain types for the corpus RAG pipeline
//!
//! This crate defines the data structures shared by chunking, graph
//! construction and retrieval: documents, chunks, glossary entries,
//! graph nodes and edges, plus configuration. It performs no I/O.

pub mod chunk;
pub mod config;
pub mod document;
pub mod edge;
pub mod entity;
pub mod error;
pub mod ids;
pub mod node;
pub mod quality;
pub mod tokens;

pub use chunk::{Chunk, ChunkingStrategy, QualityFlag, Section, StrategyDetails};
pub use config::{BoostMode, ChunkingConfig, EntityIndexConfig, PipelineConfig, RetrievalConfig};
pub use document::{Document, DocumentMetadata, DocumentStructure, RagPriority, SectionType};
pub use edge::{EdgeType, ExtractionMethod, KnowledgeGraphEdge};
pub use entity::{EntityType, GlossaryEntry};
pub use error::{CoreError, Result};
pub use node::{KnowledgeGraphNode, NodeType};
pub use quality::QualityReport;
pub use tokens::{TokenCounter, TokenEstimator, WhitespaceEstimator};
