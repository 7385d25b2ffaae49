//! Knowledge graph construction
//!
//! The graph is a deterministic view derived from documents, chunks and
//! the glossary: rebuilding from unchanged input yields identical node and
//! edge ids and properties.

mod builder;
pub mod references;

use std::collections::BTreeMap;

use corpusrag_core::{EdgeType, KnowledgeGraphEdge, KnowledgeGraphNode};
use corpusrag_db::GraphStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::Result;

pub use builder::GraphBuilder;

/// Build phases, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Entities,
    Documents,
    Authorship,
    CrossReferences,
    Mentions,
    Categories,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Entities => "entities",
            Phase::Documents => "documents",
            Phase::Authorship => "authorship",
            Phase::CrossReferences => "cross_references",
            Phase::Mentions => "mentions",
            Phase::Categories => "categories",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters from one graph build
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GraphBuildReport {
    pub nodes_by_type: BTreeMap<String, usize>,
    pub edges_by_type: BTreeMap<String, usize>,
    /// Cross references that matched no node
    pub unresolved_references: usize,
    /// Authors missing from the glossary
    pub placeholder_authors: usize,
    /// Nodes that repeated an existing id
    pub duplicate_nodes: usize,
    /// Edges dropped per phase (missing endpoint)
    pub skipped_edges: BTreeMap<String, usize>,
}

impl GraphBuildReport {
    pub fn node_count(&self) -> usize {
        self.nodes_by_type.values().sum()
    }

    pub fn edge_count(&self) -> usize {
        self.edges_by_type.values().sum()
    }

    pub fn skipped(&self, phase: Phase) -> usize {
        self.skipped_edges.get(phase.as_str()).copied().unwrap_or(0)
    }
}

/// Batched upsert totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishStats {
    pub nodes: usize,
    pub edges: usize,
    pub batches: usize,
}

/// An in-memory graph keyed by deterministic ids
#[derive(Debug, Clone, Default)]
pub struct KnowledgeGraph {
    nodes: BTreeMap<String, KnowledgeGraphNode>,
    edges: BTreeMap<String, KnowledgeGraphEdge>,
    report: GraphBuildReport,
}

impl KnowledgeGraph {
    pub fn node(&self, id: &str) -> Option<&KnowledgeGraphNode> {
        self.nodes.get(id)
    }

    pub fn edge(&self, id: &str) -> Option<&KnowledgeGraphEdge> {
        self.edges.get(id)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Nodes in id order
    pub fn nodes(&self) -> impl Iterator<Item = &KnowledgeGraphNode> {
        self.nodes.values()
    }

    /// Edges in id order
    pub fn edges(&self) -> impl Iterator<Item = &KnowledgeGraphEdge> {
        self.edges.values()
    }

    /// Outgoing edges of `source`, optionally of one type
    pub fn edges_from<'a>(
        &'a self,
        source: &'a str,
        edge_type: Option<EdgeType>,
    ) -> impl Iterator<Item = &'a KnowledgeGraphEdge> + 'a {
        self.edges
            .values()
            .filter(move |e| e.source == source && edge_type.map_or(true, |t| e.edge_type == t))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn report(&self) -> &GraphBuildReport {
        &self.report
    }

    /// Insert a node; an existing id is kept and counted as a duplicate
    pub(crate) fn add_node(&mut self, node: KnowledgeGraphNode) -> bool {
        if self.nodes.contains_key(&node.id) {
            self.report.duplicate_nodes += 1;
            return false;
        }
        self.nodes.insert(node.id.clone(), node);
        true
    }

    pub(crate) fn node_mut(&mut self, id: &str) -> Option<&mut KnowledgeGraphNode> {
        self.nodes.get_mut(id)
    }

    /// Insert an edge between existing nodes; repeated ids keep the highest
    /// confidence. Missing endpoints are counted against `phase`.
    pub(crate) fn add_edge(&mut self, phase: Phase, edge: KnowledgeGraphEdge) -> bool {
        if !self.nodes.contains_key(&edge.source) || !self.nodes.contains_key(&edge.target) {
            debug!(phase = %phase, edge = %edge.id, "Edge endpoint missing, skipped");
            *self
                .report
                .skipped_edges
                .entry(phase.as_str().to_string())
                .or_default() += 1;
            return false;
        }

        match self.edges.get_mut(&edge.id) {
            Some(existing) => {
                if edge.confidence > existing.confidence {
                    *existing = edge;
                }
            }
            None => {
                self.edges.insert(edge.id.clone(), edge);
            }
        }
        true
    }

    pub(crate) fn report_mut(&mut self) -> &mut GraphBuildReport {
        &mut self.report
    }

    /// Fill `cross_reference_count` and the per-type counters
    pub(crate) fn finish(&mut self) {
        let mut incident: BTreeMap<&str, usize> = BTreeMap::new();
        for edge in self.edges.values() {
            if edge.edge_type == EdgeType::CrossReferences {
                *incident.entry(edge.source.as_str()).or_default() += 1;
                *incident.entry(edge.target.as_str()).or_default() += 1;
            }
        }
        let counts: Vec<(String, usize)> = incident
            .into_iter()
            .map(|(id, n)| (id.to_string(), n))
            .collect();
        for node in self.nodes.values_mut() {
            node.cross_reference_count = 0;
        }
        for (id, n) in counts {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.cross_reference_count = n;
            }
        }

        let mut nodes_by_type = BTreeMap::new();
        for node in self.nodes.values() {
            *nodes_by_type.entry(node.node_type.as_str().to_string()).or_default() += 1;
        }
        let mut edges_by_type = BTreeMap::new();
        for edge in self.edges.values() {
            *edges_by_type.entry(edge.edge_type.as_str().to_string()).or_default() += 1;
        }
        self.report.nodes_by_type = nodes_by_type;
        self.report.edges_by_type = edges_by_type;
    }

    /// Push the graph into storage in batches (nodes first)
    #[instrument(skip(self, store))]
    pub async fn publish(&self, store: &dyn GraphStore, batch_size: usize) -> Result<PublishStats> {
        let batch_size = batch_size.max(1);
        let mut stats = PublishStats::default();

        let nodes: Vec<KnowledgeGraphNode> = self.nodes.values().cloned().collect();
        for batch in nodes.chunks(batch_size) {
            stats.nodes += store.upsert_nodes(batch).await?;
            stats.batches += 1;
        }

        let edges: Vec<KnowledgeGraphEdge> = self.edges.values().cloned().collect();
        for batch in edges.chunks(batch_size) {
            stats.edges += store.upsert_edges(batch).await?;
            stats.batches += 1;
        }

        info!(
            nodes = stats.nodes,
            edges = stats.edges,
            batches = stats.batches,
            "Published knowledge graph"
        );
        Ok(stats)
    }
}
