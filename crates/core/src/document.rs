//! Document types - normalized input from the text-extraction collaborator

use serde::{Deserialize, Serialize};

use crate::ids;

/// Structural category assigned by the upstream extractor
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[serde(rename_all = "snake_case")]
pub enum SectionType {
    /// Works by an author (books, articles, letters)
    Archive,
    /// Self-contained definitional entries
    #[serde(alias = "glossary-like")]
    Glossary,
    /// Navigational pages with many links and little text
    #[serde(alias = "index-like")]
    Index,
    /// Reference material (encyclopedic articles)
    Reference,
    /// Subject collections
    Subject,
    /// Periodical issues
    Periodical,
    /// Anything else
    #[default]
    #[serde(other)]
    Other,
}

impl SectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionType::Archive => "archive",
            SectionType::Glossary => "glossary",
            SectionType::Index => "index",
            SectionType::Reference => "reference",
            SectionType::Subject => "subject",
            SectionType::Periodical => "periodical",
            SectionType::Other => "other",
        }
    }
}

impl std::fmt::Display for SectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retrieval priority hint from the extractor
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum RagPriority {
    High,
    #[default]
    Medium,
    Low,
}

/// Structural signals measured upstream
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentStructure {
    /// Deepest heading level present (0 = no headings)
    #[serde(default)]
    pub heading_depth: u8,

    #[serde(default)]
    pub section_count: usize,

    #[serde(default)]
    pub word_count: usize,

    #[serde(default)]
    pub paragraph_count: usize,
}

/// Metadata inherited by every chunk cut from a document
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DocumentMetadata {
    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub author: Option<String>,

    #[serde(default)]
    pub date_written: Option<String>,

    #[serde(default)]
    pub section_type: SectionType,

    /// `None` when the extractor sent no structure record
    #[serde(default)]
    pub document_structure: Option<DocumentStructure>,

    #[serde(default)]
    pub rag_priority: RagPriority,

    /// Outbound links to other documents or glossary entries
    #[serde(default)]
    pub cross_references: Vec<String>,

    #[serde(default, alias = "url")]
    pub source_url: Option<String>,

    #[serde(default)]
    pub language: Option<String>,

    /// Multi-part work this document belongs to
    #[serde(default, alias = "collection")]
    pub work_collection: Option<String>,

    #[serde(default)]
    pub chapter: Option<u32>,

    /// Subject/category tags
    #[serde(default, alias = "categories")]
    pub subjects: Vec<String>,
}

impl DocumentMetadata {
    /// Deepest heading level reported upstream (0 when unreported)
    pub fn heading_depth(&self) -> u8 {
        self.document_structure
            .as_ref()
            .map_or(0, |structure| structure.heading_depth)
    }
}

/// A normalized document. Read-only once produced upstream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Stable content identifier
    #[serde(default)]
    pub content_hash: String,

    /// Normalized Markdown text
    pub text: String,

    #[serde(flatten)]
    pub metadata: DocumentMetadata,
}

impl Document {
    /// Create a document from text, hashing the content
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            content_hash: ids::content_hash(&text),
            text,
            metadata: DocumentMetadata::default(),
        }
    }

    /// Parse a document record from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut doc: Document = serde_json::from_str(json)?;
        doc.ensure_content_hash();
        Ok(doc)
    }

    /// Fill in the content hash when the extractor left it empty
    pub fn ensure_content_hash(&mut self) {
        if self.content_hash.trim().is_empty() {
            self.content_hash = ids::content_hash(&self.text);
        }
    }

    /// Builder: set title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.metadata.title = Some(title.into());
        self
    }

    /// Builder: set author
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.metadata.author = Some(author.into());
        self
    }

    /// Builder: set section type
    pub fn with_section_type(mut self, section_type: SectionType) -> Self {
        self.metadata.section_type = section_type;
        self
    }

    /// Builder: set priority hint
    pub fn with_priority(mut self, priority: RagPriority) -> Self {
        self.metadata.rag_priority = priority;
        self
    }

    /// Builder: set heading depth
    pub fn with_heading_depth(mut self, depth: u8) -> Self {
        self.metadata
            .document_structure
            .get_or_insert_with(DocumentStructure::default)
            .heading_depth = depth;
        self
    }

    /// Builder: set source url
    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.metadata.source_url = Some(url.into());
        self
    }

    /// Builder: set cross references
    pub fn with_cross_references(mut self, refs: Vec<String>) -> Self {
        self.metadata.cross_references = refs;
        self
    }

    /// Builder: set collection membership
    pub fn with_collection(mut self, collection: impl Into<String>, chapter: Option<u32>) -> Self {
        self.metadata.work_collection = Some(collection.into());
        self.metadata.chapter = chapter;
        self
    }

    /// Builder: set subjects
    pub fn with_subjects(mut self, subjects: Vec<String>) -> Self {
        self.metadata.subjects = subjects;
        self
    }

    /// Stable document identifier (the content hash)
    pub fn id(&self) -> &str {
        &self.content_hash
    }

    /// Graph node id of this document
    pub fn node_id(&self) -> String {
        format!("work:{}", ids::short_hash(&self.content_hash))
    }

    /// Display label: title, else source url, else short hash
    pub fn label(&self) -> String {
        self.metadata
            .title
            .clone()
            .or_else(|| self.metadata.source_url.clone())
            .unwrap_or_else(|| ids::short_hash(&self.content_hash).to_string())
    }
}
