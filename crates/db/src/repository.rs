//! SurrealDB-backed graph store

use std::collections::BTreeMap;

use async_trait::async_trait;
use corpusrag_core::{EdgeType, KnowledgeGraphEdge, KnowledgeGraphNode};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::store::{Direction, GraphStats, GraphStore};
use crate::{DbConnection, Result};

/// Stored form of a graph node
#[derive(Debug, Clone, Serialize, Deserialize)]
struct NodeRecord {
    node_id: String,
    node_type: String,
    label: String,
    #[serde(default)]
    properties: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    vector_id: Option<String>,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    cross_reference_count: u64,
}

impl From<&KnowledgeGraphNode> for NodeRecord {
    fn from(node: &KnowledgeGraphNode) -> Self {
        Self {
            node_id: node.id.clone(),
            node_type: node.node_type.as_str().to_string(),
            label: node.label.clone(),
            properties: node.properties.clone(),
            vector_id: node.vector_id.clone(),
            aliases: node.aliases.clone(),
            cross_reference_count: node.cross_reference_count as u64,
        }
    }
}

impl TryFrom<NodeRecord> for KnowledgeGraphNode {
    type Error = crate::DbError;

    fn try_from(record: NodeRecord) -> Result<Self> {
        Ok(Self {
            id: record.node_id,
            node_type: record.node_type.parse()?,
            label: record.label,
            properties: record.properties,
            vector_id: record.vector_id,
            aliases: record.aliases,
            cross_reference_count: record.cross_reference_count as usize,
        })
    }
}

/// Stored form of a graph edge
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EdgeRecord {
    edge_id: String,
    edge_type: String,
    source: String,
    target: String,
    confidence: f64,
    method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    context: Option<String>,
}

impl From<&KnowledgeGraphEdge> for EdgeRecord {
    fn from(edge: &KnowledgeGraphEdge) -> Self {
        Self {
            edge_id: edge.id.clone(),
            edge_type: edge.edge_type.as_str().to_string(),
            source: edge.source.clone(),
            target: edge.target.clone(),
            confidence: f64::from(edge.confidence),
            method: edge.method.as_str().to_string(),
            context: edge.context.clone(),
        }
    }
}

impl TryFrom<EdgeRecord> for KnowledgeGraphEdge {
    type Error = crate::DbError;

    fn try_from(record: EdgeRecord) -> Result<Self> {
        Ok(Self {
            id: record.edge_id,
            edge_type: record.edge_type.parse()?,
            source: record.source,
            target: record.target,
            confidence: record.confidence as f32,
            method: record.method.parse()?,
            context: record.context,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TypeCount {
    #[serde(alias = "node_type", alias = "edge_type")]
    kind: String,
    count: u64,
}

#[derive(Debug, Deserialize)]
struct Total {
    count: u64,
}

/// Repository for graph operations on SurrealDB
#[derive(Clone)]
pub struct Repository {
    db: DbConnection,
}

impl Repository {
    /// Create a new repository
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    async fn count_by(&self, query: &'static str) -> Result<BTreeMap<String, usize>> {
        let rows: Vec<TypeCount> = self.db.query(query).await?.check()?.take(0)?;
        Ok(rows
            .into_iter()
            .map(|row| (row.kind, row.count as usize))
            .collect())
    }

    async fn total(&self, query: &'static str) -> Result<usize> {
        let rows: Vec<Total> = self.db.query(query).await?.check()?.take(0)?;
        Ok(rows.first().map_or(0, |row| row.count as usize))
    }
}

#[async_trait]
impl GraphStore for Repository {
    #[instrument(skip(self, nodes), fields(count = nodes.len()))]
    async fn upsert_nodes(&self, nodes: &[KnowledgeGraphNode]) -> Result<usize> {
        if nodes.is_empty() {
            return Ok(0);
        }
        let rows: Vec<NodeRecord> = nodes.iter().map(NodeRecord::from).collect();

        self.db
            .query(
                r#"
                FOR $row IN $rows {
                    UPSERT type::thing('kg_node', $row.node_id) CONTENT $row;
                };
            "#,
            )
            .bind(("rows", rows))
            .await?
            .check()?;

        Ok(nodes.len())
    }

    #[instrument(skip(self, edges), fields(count = edges.len()))]
    async fn upsert_edges(&self, edges: &[KnowledgeGraphEdge]) -> Result<usize> {
        if edges.is_empty() {
            return Ok(0);
        }
        let rows: Vec<EdgeRecord> = edges.iter().map(EdgeRecord::from).collect();

        self.db
            .query(
                r#"
                FOR $row IN $rows {
                    UPSERT type::thing('kg_edge', $row.edge_id) CONTENT $row;
                };
            "#,
            )
            .bind(("rows", rows))
            .await?
            .check()?;

        Ok(edges.len())
    }

    #[instrument(skip(self))]
    async fn get_node(&self, id: &str) -> Result<Option<KnowledgeGraphNode>> {
        let rows: Vec<NodeRecord> = self
            .db
            .query("SELECT * OMIT id FROM kg_node WHERE node_id = $node_id LIMIT 1")
            .bind(("node_id", id.to_string()))
            .await?
            .check()?
            .take(0)?;

        rows.into_iter().next().map(KnowledgeGraphNode::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn edges(
        &self,
        node_id: &str,
        edge_type: Option<EdgeType>,
        direction: Direction,
    ) -> Result<Vec<KnowledgeGraphEdge>> {
        let endpoint = match direction {
            Direction::Outgoing => "source = $node_id",
            Direction::Incoming => "target = $node_id",
            Direction::Both => "(source = $node_id OR target = $node_id)",
        };
        let type_filter = if edge_type.is_some() {
            " AND edge_type = $edge_type"
        } else {
            ""
        };
        let query = format!(
            "SELECT * OMIT id FROM kg_edge WHERE {endpoint}{type_filter} ORDER BY edge_id"
        );

        let rows: Vec<EdgeRecord> = self
            .db
            .query(query)
            .bind(("node_id", node_id.to_string()))
            .bind((
                "edge_type",
                edge_type.map(|t| t.as_str().to_string()).unwrap_or_default(),
            ))
            .await?
            .check()?
            .take(0)?;

        rows.into_iter().map(KnowledgeGraphEdge::try_from).collect()
    }

    #[instrument(skip(self))]
    async fn stats(&self) -> Result<GraphStats> {
        Ok(GraphStats {
            nodes: self
                .total("SELECT count() AS count FROM kg_node GROUP ALL")
                .await?,
            edges: self
                .total("SELECT count() AS count FROM kg_edge GROUP ALL")
                .await?,
            nodes_by_type: self
                .count_by("SELECT node_type, count() AS count FROM kg_node GROUP BY node_type")
                .await?,
            edges_by_type: self
                .count_by("SELECT edge_type, count() AS count FROM kg_edge GROUP BY edge_type")
                .await?,
        })
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<()> {
        self.db
            .query("DELETE kg_edge; DELETE kg_node;")
            .await?
            .check()?;
        Ok(())
    }
}
