//! Knowledge graph node types

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entity::EntityType;
use crate::error::CoreError;

/// Type tag of a graph node
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Person,
    Term,
    Organization,
    Event,
    Periodical,
    Place,
    /// A source document
    Work,
    /// A retrieval chunk
    Chunk,
    SubjectCategory,
    /// A multi-part work (book with chapters, collected volume)
    WorkCollection,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Person => "person",
            NodeType::Term => "term",
            NodeType::Organization => "organization",
            NodeType::Event => "event",
            NodeType::Periodical => "periodical",
            NodeType::Place => "place",
            NodeType::Work => "work",
            NodeType::Chunk => "chunk",
            NodeType::SubjectCategory => "subject_category",
            NodeType::WorkCollection => "work_collection",
        }
    }

    /// The entity category, for glossary-backed node types
    pub fn entity_type(&self) -> Option<EntityType> {
        match self {
            NodeType::Person => Some(EntityType::Person),
            NodeType::Term => Some(EntityType::Term),
            NodeType::Organization => Some(EntityType::Organization),
            NodeType::Event => Some(EntityType::Event),
            NodeType::Periodical => Some(EntityType::Periodical),
            NodeType::Place => Some(EntityType::Place),
            _ => None,
        }
    }
}

impl From<EntityType> for NodeType {
    fn from(value: EntityType) -> Self {
        match value {
            EntityType::Person => NodeType::Person,
            EntityType::Term => NodeType::Term,
            EntityType::Organization => NodeType::Organization,
            EntityType::Event => NodeType::Event,
            EntityType::Periodical => NodeType::Periodical,
            EntityType::Place => NodeType::Place,
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NodeType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let node_type = match s {
            "person" => NodeType::Person,
            "term" => NodeType::Term,
            "organization" => NodeType::Organization,
            "event" => NodeType::Event,
            "periodical" => NodeType::Periodical,
            "place" => NodeType::Place,
            "work" => NodeType::Work,
            "chunk" => NodeType::Chunk,
            "subject_category" => NodeType::SubjectCategory,
            "work_collection" => NodeType::WorkCollection,
            other => return Err(CoreError::UnknownNodeType(other.to_string())),
        };
        Ok(node_type)
    }
}

/// A node in the knowledge graph
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeGraphNode {
    /// Globally unique, derived from source identifiers
    pub id: String,

    pub node_type: NodeType,

    /// Display label
    pub label: String,

    /// Type-specific properties
    #[serde(default)]
    pub properties: BTreeMap<String, String>,

    /// External vector-index id (chunk and work nodes only)
    #[serde(default)]
    pub vector_id: Option<String>,

    #[serde(default)]
    pub aliases: Vec<String>,

    /// Incident cross-reference edges
    #[serde(default)]
    pub cross_reference_count: usize,
}

impl KnowledgeGraphNode {
    /// Create a new node
    pub fn new(id: impl Into<String>, node_type: NodeType, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type,
            label: label.into(),
            properties: BTreeMap::new(),
            vector_id: None,
            aliases: Vec::new(),
            cross_reference_count: 0,
        }
    }

    /// Builder: add a property (empty values are skipped)
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.properties.insert(key.into(), value);
        }
        self
    }

    /// Builder: add an optional property
    pub fn with_optional_property(self, key: impl Into<String>, value: Option<&str>) -> Self {
        match value {
            Some(value) => self.with_property(key, value),
            None => self,
        }
    }

    /// Builder: set vector id
    pub fn with_vector_id(mut self, vector_id: impl Into<String>) -> Self {
        self.vector_id = Some(vector_id.into());
        self
    }

    /// Builder: set aliases
    pub fn with_aliases(mut self, aliases: Vec<String>) -> Self {
        self.aliases = aliases;
        self
    }

    /// Node stands in for an author missing from the glossary
    pub fn is_placeholder(&self) -> bool {
        self.properties.get("placeholder").map(String::as_str) == Some("true")
    }
}
