//! Edge types - typed relationships in the knowledge graph

use serde::{Deserialize, Serialize};

use crate::entity::EntityType;
use crate::error::CoreError;

/// Types of relationships between graph nodes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    /// Work (or collection) was written by a person/organization
    AuthoredBy,
    /// Work belongs to a multi-part collection
    PartOf,
    /// Chunk was cut from a work
    ChunkOf,
    /// Explicit link from one node to another
    CrossReferences,
    /// Chunk text mentions an entity of the given category
    Mentions(EntityType),
    /// Work is filed under a subject category
    InCategory,
}

impl EdgeType {
    /// Stable string form, e.g. `authored_by`, `mentions_person`
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::AuthoredBy => "authored_by",
            EdgeType::PartOf => "part_of",
            EdgeType::ChunkOf => "chunk_of",
            EdgeType::CrossReferences => "cross_references",
            EdgeType::Mentions(EntityType::Person) => "mentions_person",
            EdgeType::Mentions(EntityType::Term) => "mentions_term",
            EdgeType::Mentions(EntityType::Organization) => "mentions_organization",
            EdgeType::Mentions(EntityType::Event) => "mentions_event",
            EdgeType::Mentions(EntityType::Periodical) => "mentions_periodical",
            EdgeType::Mentions(EntityType::Place) => "mentions_place",
            EdgeType::InCategory => "in_category",
        }
    }

    pub fn is_mention(&self) -> bool {
        matches!(self, EdgeType::Mentions(_))
    }
}

impl std::fmt::Display for EdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EdgeType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let edge_type = match s {
            "authored_by" => EdgeType::AuthoredBy,
            "part_of" => EdgeType::PartOf,
            "chunk_of" => EdgeType::ChunkOf,
            "cross_references" => EdgeType::CrossReferences,
            "in_category" => EdgeType::InCategory,
            other => {
                let entity = other
                    .strip_prefix("mentions_")
                    .and_then(EntityType::parse)
                    .ok_or_else(|| CoreError::UnknownEdgeType(other.to_string()))?;
                EdgeType::Mentions(entity)
            }
        };
        Ok(edge_type)
    }
}

/// How an edge was derived
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    ExplicitLink,
    EntityMention,
    Metadata,
    Inferred,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::ExplicitLink => "explicit_link",
            ExtractionMethod::EntityMention => "entity_mention",
            ExtractionMethod::Metadata => "metadata",
            ExtractionMethod::Inferred => "inferred",
        }
    }
}

impl std::str::FromStr for ExtractionMethod {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "explicit_link" => Ok(ExtractionMethod::ExplicitLink),
            "entity_mention" => Ok(ExtractionMethod::EntityMention),
            "metadata" => Ok(ExtractionMethod::Metadata),
            "inferred" => Ok(ExtractionMethod::Inferred),
            other => Err(CoreError::Validation(format!(
                "unknown extraction method: {other}"
            ))),
        }
    }
}

/// A directed edge in the knowledge graph
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeGraphEdge {
    /// Deterministic id: `{source}|{edge_type}|{target}`
    pub id: String,

    pub edge_type: EdgeType,

    /// Source node ID (the "from" node)
    pub source: String,

    /// Target node ID (the "to" node)
    pub target: String,

    /// Confidence score (0.0 - 1.0)
    pub confidence: f32,

    pub method: ExtractionMethod,

    /// Short snippet around the evidence
    #[serde(default)]
    pub context: Option<String>,
}

impl KnowledgeGraphEdge {
    /// Create a new edge with full confidence
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        edge_type: EdgeType,
        method: ExtractionMethod,
    ) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: edge_id(&source, edge_type, &target),
            edge_type,
            source,
            target,
            confidence: 1.0,
            method,
            context: None,
        }
    }

    /// Builder: set confidence
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Builder: set context snippet
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// Deterministic edge id
pub fn edge_id(source: &str, edge_type: EdgeType, target: &str) -> String {
    format!("{}|{}|{}", source, edge_type.as_str(), target)
}
