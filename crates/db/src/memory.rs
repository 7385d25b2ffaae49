//! In-memory graph store

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use corpusrag_core::{EdgeType, KnowledgeGraphEdge, KnowledgeGraphNode};
use tokio::sync::RwLock;
use tracing::instrument;

use crate::store::{Direction, GraphStats, GraphStore};
use crate::Result;

#[derive(Debug, Default)]
struct Graph {
    nodes: BTreeMap<String, KnowledgeGraphNode>,
    edges: BTreeMap<String, KnowledgeGraphEdge>,
    /// node id -> ids of edges leaving it
    outgoing: BTreeMap<String, BTreeSet<String>>,
    /// node id -> ids of edges entering it
    incoming: BTreeMap<String, BTreeSet<String>>,
}

impl Graph {
    fn insert_edge(&mut self, edge: KnowledgeGraphEdge) {
        // Endpoints are part of the id, so a replaced edge keeps its adjacency
        if !self.edges.contains_key(&edge.id) {
            self.outgoing
                .entry(edge.source.clone())
                .or_default()
                .insert(edge.id.clone());
            self.incoming
                .entry(edge.target.clone())
                .or_default()
                .insert(edge.id.clone());
        }
        self.edges.insert(edge.id.clone(), edge);
    }

    fn incident(&self, node_id: &str, direction: Direction) -> BTreeSet<&String> {
        let mut ids = BTreeSet::new();
        if matches!(direction, Direction::Outgoing | Direction::Both) {
            ids.extend(self.outgoing.get(node_id).into_iter().flatten());
        }
        if matches!(direction, Direction::Incoming | Direction::Both) {
            ids.extend(self.incoming.get(node_id).into_iter().flatten());
        }
        ids
    }
}

/// Graph store held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryGraphStore {
    graph: RwLock<Graph>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    #[instrument(skip(self, nodes), fields(count = nodes.len()))]
    async fn upsert_nodes(&self, nodes: &[KnowledgeGraphNode]) -> Result<usize> {
        let mut graph = self.graph.write().await;
        for node in nodes {
            graph.nodes.insert(node.id.clone(), node.clone());
        }
        Ok(nodes.len())
    }

    #[instrument(skip(self, edges), fields(count = edges.len()))]
    async fn upsert_edges(&self, edges: &[KnowledgeGraphEdge]) -> Result<usize> {
        let mut graph = self.graph.write().await;
        for edge in edges {
            graph.insert_edge(edge.clone());
        }
        Ok(edges.len())
    }

    async fn get_node(&self, id: &str) -> Result<Option<KnowledgeGraphNode>> {
        Ok(self.graph.read().await.nodes.get(id).cloned())
    }

    async fn edges(
        &self,
        node_id: &str,
        edge_type: Option<EdgeType>,
        direction: Direction,
    ) -> Result<Vec<KnowledgeGraphEdge>> {
        let graph = self.graph.read().await;
        let edges = graph
            .incident(node_id, direction)
            .into_iter()
            .filter_map(|id| graph.edges.get(id))
            .filter(|edge| edge_type.map_or(true, |t| edge.edge_type == t))
            .cloned()
            .collect();
        Ok(edges)
    }

    async fn stats(&self) -> Result<GraphStats> {
        let graph = self.graph.read().await;
        let mut stats = GraphStats {
            nodes: graph.nodes.len(),
            edges: graph.edges.len(),
            ..GraphStats::default()
        };
        for node in graph.nodes.values() {
            *stats
                .nodes_by_type
                .entry(node.node_type.as_str().to_string())
                .or_default() += 1;
        }
        for edge in graph.edges.values() {
            *stats
                .edges_by_type
                .entry(edge.edge_type.as_str().to_string())
                .or_default() += 1;
        }
        Ok(stats)
    }

    async fn clear(&self) -> Result<()> {
        *self.graph.write().await = Graph::default();
        Ok(())
    }
}
