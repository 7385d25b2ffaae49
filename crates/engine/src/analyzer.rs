//! Structure analyzer - strategy selection from document shape

use corpusrag_core::{ChunkingStrategy, DocumentMetadata, DocumentStructure, RagPriority, SectionType};

use crate::chunking::markdown;

/// Selects a chunking strategy. Pure function of document metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructureAnalyzer;

impl StructureAnalyzer {
    /// First matching rule wins:
    /// glossary -> entries, low-priority index -> skip, depth >= 3 ->
    /// semantic breaks, depth 0 -> paragraph clusters, otherwise tokens.
    pub fn select(&self, metadata: &DocumentMetadata) -> ChunkingStrategy {
        let depth = metadata.heading_depth();

        match metadata.section_type {
            SectionType::Glossary => ChunkingStrategy::EntryBased,
            SectionType::Index if metadata.rag_priority == RagPriority::Low => ChunkingStrategy::Skip,
            _ if depth >= 3 => ChunkingStrategy::SemanticBreaks,
            _ if depth == 0 => ChunkingStrategy::ParagraphClusters,
            _ => ChunkingStrategy::TokenBased,
        }
    }

    /// Structural signals measured from the text itself, for records that
    /// arrive without a structure record
    pub fn measure(text: &str) -> DocumentStructure {
        let outline = markdown::Outline::parse(text);
        DocumentStructure {
            heading_depth: outline.deepest_level(),
            section_count: outline.headings.len(),
            word_count: text.split_whitespace().count(),
            paragraph_count: markdown::paragraphs(text, 0..text.len()).len(),
        }
    }
}
