//! Glossary types - people, terms, organizations, events, periodicals, places

use serde::{Deserialize, Serialize};

use crate::ids;

/// The category of a canonical entity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// A person
    #[serde(alias = "people")]
    Person,
    /// A concept or technical term
    #[serde(alias = "terms")]
    Term,
    /// A party, union or other organization
    #[serde(alias = "organisation", alias = "organizations")]
    Organization,
    /// A historical event
    #[serde(alias = "events")]
    Event,
    /// A newspaper, journal or magazine
    #[serde(alias = "periodicals")]
    Periodical,
    /// A geographic place
    #[serde(alias = "places")]
    Place,
}

impl EntityType {
    pub const ALL: [EntityType; 6] = [
        EntityType::Person,
        EntityType::Term,
        EntityType::Organization,
        EntityType::Event,
        EntityType::Periodical,
        EntityType::Place,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "person",
            EntityType::Term => "term",
            EntityType::Organization => "organization",
            EntityType::Event => "event",
            EntityType::Periodical => "periodical",
            EntityType::Place => "place",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == value)
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A canonical glossary record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlossaryEntry {
    /// The category of the entity
    #[serde(alias = "type")]
    pub entity_type: EntityType,

    /// Canonical display name
    pub name: String,

    /// Free-text definition
    #[serde(default)]
    pub definition: String,

    /// Alternate spellings and short forms
    #[serde(default)]
    pub aliases: Vec<String>,

    /// Outbound links to documents or other entries
    #[serde(default)]
    pub cross_references: Vec<String>,
}

impl GlossaryEntry {
    /// Create a new entry
    pub fn new(name: impl Into<String>, entity_type: EntityType) -> Self {
        Self {
            entity_type,
            name: name.into(),
            definition: String::new(),
            aliases: Vec::new(),
            cross_references: Vec::new(),
        }
    }

    /// Builder: set definition
    pub fn with_definition(mut self, definition: impl Into<String>) -> Self {
        self.definition = definition.into();
        self
    }

    /// Builder: set aliases
    pub fn with_aliases(mut self, aliases: Vec<String>) -> Self {
        self.aliases = aliases;
        self
    }

    /// Builder: set cross references
    pub fn with_cross_references(mut self, refs: Vec<String>) -> Self {
        self.cross_references = refs;
        self
    }

    /// Display name without trailing life dates
    pub fn display_name(&self) -> &str {
        ids::strip_parenthetical(&self.name)
    }

    /// Graph node id: `{type}:{slug}`
    pub fn node_id(&self) -> String {
        entity_node_id(self.entity_type, self.display_name())
    }

    /// Parse a glossary file (JSON array of entries)
    pub fn list_from_json(json: &str) -> Result<Vec<Self>, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Node id for an entity of `entity_type` named `name`
pub fn entity_node_id(entity_type: EntityType, name: &str) -> String {
    format!("{}:{}", entity_type.as_str(), ids::slugify(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_creation() {
        let entry = GlossaryEntry::new("Karl Marx (1818-1883)", EntityType::Person)
            .with_aliases(vec!["Marx".into()]);

        assert_eq!(entry.display_name(), "Karl Marx");
        assert_eq!(entry.node_id(), "person:karl-marx");
        assert_eq!(entry.aliases.len(), 1);
    }

    #[test]
    fn test_parse_glossary_file() {
        let json = r#"[
            {"type": "person", "name": "Karl Marx", "aliases": ["Marx"]},
            {"entity_type": "term", "name": "Surplus Value", "definition": "Unpaid labour"}
        ]"#;

        let entries = GlossaryEntry::list_from_json(json).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].entity_type, EntityType::Term);
        assert_eq!(entries[1].node_id(), "term:surplus-value");
    }

    #[test]
    fn test_entity_type_parse() {
        for t in EntityType::ALL {
            assert_eq!(EntityType::parse(t.as_str()), Some(t));
        }
        assert_eq!(EntityType::parse("planet"), None);
    }
}
