//! Repository interface over graph storage

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use async_trait::async_trait;
use corpusrag_core::{EdgeType, KnowledgeGraphEdge, KnowledgeGraphNode};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Edge direction relative to the node being expanded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Edges whose source is the node
    Outgoing,
    /// Edges whose target is the node
    Incoming,
    Both,
}

/// Node and edge counts
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
    pub nodes_by_type: BTreeMap<String, usize>,
    pub edges_by_type: BTreeMap<String, usize>,
}

/// Graph storage keyed by deterministic node and edge ids.
///
/// Upserts replace any record with the same id, so publishing the same
/// graph twice leaves storage unchanged.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Insert or replace nodes; returns the number written
    async fn upsert_nodes(&self, nodes: &[KnowledgeGraphNode]) -> Result<usize>;

    /// Insert or replace edges; returns the number written
    async fn upsert_edges(&self, edges: &[KnowledgeGraphEdge]) -> Result<usize>;

    async fn get_node(&self, id: &str) -> Result<Option<KnowledgeGraphNode>>;

    /// Edges incident to `node_id`, optionally filtered by type
    async fn edges(
        &self,
        node_id: &str,
        edge_type: Option<EdgeType>,
        direction: Direction,
    ) -> Result<Vec<KnowledgeGraphEdge>>;

    async fn stats(&self) -> Result<GraphStats>;

    /// Remove every node and edge
    async fn clear(&self) -> Result<()>;

    /// Ids of nodes one hop away, sorted and deduplicated
    async fn neighbors(
        &self,
        node_id: &str,
        edge_type: Option<EdgeType>,
        direction: Direction,
    ) -> Result<Vec<String>> {
        let edges = self.edges(node_id, edge_type, direction).await?;
        let ids: BTreeSet<String> = edges
            .into_iter()
            .map(|edge| {
                if edge.source == node_id {
                    edge.target
                } else {
                    edge.source
                }
            })
            .collect();
        Ok(ids.into_iter().collect())
    }

    /// Breadth-first expansion up to `depth` hops.
    ///
    /// Returns reached node ids (excluding `from`) in visit order; each
    /// level is visited in sorted order so results are deterministic.
    async fn traverse(
        &self,
        from: &str,
        edge_type: Option<EdgeType>,
        direction: Direction,
        depth: usize,
    ) -> Result<Vec<String>> {
        let mut seen = BTreeSet::from([from.to_string()]);
        let mut reached = Vec::new();
        let mut frontier = VecDeque::from([(from.to_string(), 0usize)]);

        while let Some((node, level)) = frontier.pop_front() {
            if level >= depth {
                continue;
            }
            for next in self.neighbors(&node, edge_type, direction).await? {
                if seen.insert(next.clone()) {
                    reached.push(next.clone());
                    frontier.push_back((next, level + 1));
                }
            }
        }

        Ok(reached)
    }
}
