//! Chunk types - the atomic retrieval units

use std::ops::Range;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::document::{Document, DocumentMetadata};
use crate::ids;

/// How a document is split into chunks
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingStrategy {
    /// One chunk per self-contained entry
    EntryBased,
    /// Heading-delimited sections packed into the soft band
    SemanticBreaks,
    /// Paragraphs packed into the soft band
    ParagraphClusters,
    /// Fixed-size overlapping windows
    TokenBased,
    /// Navigational document, not retrieval-worthy
    Skip,
}

impl ChunkingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkingStrategy::EntryBased => "entry_based",
            ChunkingStrategy::SemanticBreaks => "semantic_breaks",
            ChunkingStrategy::ParagraphClusters => "paragraph_clusters",
            ChunkingStrategy::TokenBased => "token_based",
            ChunkingStrategy::Skip => "skip",
        }
    }
}

impl std::fmt::Display for ChunkingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strategy-specific provenance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyDetails {
    Entry {
        entry_name: String,
        /// Link targets found in the entry text
        #[serde(default)]
        cross_references: Vec<String>,
    },
    Semantic {
        /// Headings of the sections inside this chunk
        headings: Vec<String>,
        /// Ancestor headings of the first section, outermost first
        heading_hierarchy: Vec<String>,
        section_count: usize,
    },
    Paragraph {
        paragraph_count: usize,
    },
    Token {
        /// Word offsets `[start, end)` into the document
        token_start: usize,
        token_end: usize,
    },
}

/// Per-chunk quality markers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "flag", rename_all = "snake_case")]
pub enum QualityFlag {
    /// Cut at a character boundary to fit the hard maximum
    Truncated { original_tokens: usize },
    /// Below the soft minimum without being the final chunk
    Undersized,
    /// Produced by a fixed-size word split (no usable sentence boundaries)
    FixedSizeSplit,
}

/// A bounded unit of document text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Deterministic identifier
    pub chunk_id: String,

    /// Content hash of the source document
    pub document_id: String,

    /// Verbatim slice of the document text
    pub content: String,

    /// Position within the source document
    pub ordinal: usize,

    /// Estimated token count of `content`
    pub token_count: usize,

    /// Strategy that produced the chunk (after any degradation)
    pub strategy: ChunkingStrategy,

    /// Inherited document metadata
    pub metadata: DocumentMetadata,

    pub details: StrategyDetails,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quality_flags: Vec<QualityFlag>,
}

impl Chunk {
    /// Entry name for entry-based chunks
    pub fn entry_name(&self) -> Option<&str> {
        match &self.details {
            StrategyDetails::Entry { entry_name, .. } => Some(entry_name),
            _ => None,
        }
    }

    /// Cross references carried in chunk metadata
    pub fn cross_references(&self) -> &[String] {
        match &self.details {
            StrategyDetails::Entry {
                cross_references, ..
            } => cross_references,
            _ => &[],
        }
    }

    /// UUID key for vector stores that require one
    pub fn point_id(&self) -> Uuid {
        ids::point_id(&self.chunk_id)
    }

    pub fn is_truncated(&self) -> bool {
        self.quality_flags
            .iter()
            .any(|f| matches!(f, QualityFlag::Truncated { .. }))
    }

    /// Payload handed to the vector index on upsert
    pub fn vector_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "content": self.content,
            "document_id": self.document_id,
            "chunk_index": self.ordinal,
            "point_id": self.point_id().to_string(),
            "strategy": self.strategy.as_str(),
            "title": self.metadata.title,
            "author": self.metadata.author,
            "date_written": self.metadata.date_written,
            "section_type": self.metadata.section_type.as_str(),
            "source_url": self.metadata.source_url,
            "entry_name": self.entry_name(),
        })
    }
}

const WORK_TAG_LEN: usize = 8;

/// Chunk id from an entry name; trailing life dates are not part of the key
pub fn entry_chunk_id(entry_name: &str) -> String {
    format!("entry:{}", ids::slugify(ids::strip_parenthetical(entry_name)))
}

/// Chunk id for position `ordinal` of a non-entry document.
///
/// Structured documents (author and title known) get a readable id; all
/// others fall back to the content hash. The work segment carries a
/// content-hash tag, so same-titled works by one author stay distinct.
pub fn positional_chunk_id(doc: &Document, ordinal: usize) -> String {
    let author = doc.metadata.author.as_deref().map(ids::slugify);
    let work = doc.metadata.title.as_deref().map(ids::slugify);
    let hash = ids::short_hash(&doc.content_hash);

    match (author, work) {
        (Some(author), Some(work)) if !author.is_empty() && !work.is_empty() => {
            let tag = hash.get(..WORK_TAG_LEN).unwrap_or(hash);
            format!("chunk:{}/{}-{}/{:04}", author, work, tag, ordinal)
        }
        _ => format!("chunk:{}/{:04}", hash, ordinal),
    }
}

/// A heading-delimited span of a document. Lives for one chunking pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section<'a> {
    pub heading: Option<&'a str>,
    /// Heading level (0 for text before the first heading)
    pub level: u8,
    /// Ancestor headings, outermost first
    pub hierarchy: Vec<&'a str>,
    /// Raw content including the heading line
    pub content: &'a str,
    /// Byte range of `content` in the document text
    pub span: Range<usize>,
}
