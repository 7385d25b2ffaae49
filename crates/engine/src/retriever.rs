//! Hybrid retrieval: vector candidates re-ranked by graph relevance
//!
//! Each query is independent. The vector index is a hard dependency and
//! its failures reach the caller; the graph only boosts, so graph errors
//! degrade to pure vector ranking.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::future::Future;
use std::sync::Arc;

use corpusrag_core::entity::entity_node_id;
use corpusrag_core::{ids, BoostMode, EdgeType, EntityType, RetrievalConfig};
use corpusrag_db::{Direction, GraphStore};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::entity_index::EntityIndex;
use crate::vector::{VectorHit, VectorIndex};
use crate::{EngineError, Result};

/// A ranked chunk with its score components
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub chunk_id: String,
    pub content: String,
    pub metadata: Value,
    pub vector_score: f32,
    pub graph_boost: f32,
    pub final_score: f32,
    /// Query entities that linked this chunk, sorted
    pub matched_entities: Vec<String>,
}

/// Structured constraints for graph-first retrieval
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphConstraints {
    /// Author name; chunks of works they wrote
    pub author: Option<String>,
    /// Entity name; chunks that mention it
    pub topic: Option<String>,
}

impl GraphConstraints {
    pub fn author(name: impl Into<String>) -> Self {
        Self {
            author: Some(name.into()),
            topic: None,
        }
    }

    pub fn topic(name: impl Into<String>) -> Self {
        Self {
            author: None,
            topic: Some(name.into()),
        }
    }

    /// Builder: add a topic
    pub fn with_topic(mut self, name: impl Into<String>) -> Self {
        self.topic = Some(name.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.author.is_none() && self.topic.is_none()
    }
}

/// Graph relevance of one chunk
#[derive(Debug, Clone, Default)]
struct GraphSignal {
    boost: f32,
    entities: BTreeSet<String>,
}

/// Vector search re-ranked with knowledge-graph evidence
pub struct HybridRetriever {
    vectors: Arc<dyn VectorIndex>,
    graph: Arc<dyn GraphStore>,
    index: Arc<EntityIndex>,
    config: RetrievalConfig,
}

impl std::fmt::Debug for HybridRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridRetriever")
            .field("entities", &self.index.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl HybridRetriever {
    pub fn new(
        vectors: Arc<dyn VectorIndex>,
        graph: Arc<dyn GraphStore>,
        index: Arc<EntityIndex>,
    ) -> Self {
        Self {
            vectors,
            graph,
            index,
            config: RetrievalConfig::default(),
        }
    }

    /// Builder: set retrieval weights and limits
    pub fn with_config(mut self, config: RetrievalConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Top `n_results` chunks for `query`.
    ///
    /// With `enhance_with_kg`, chunks that mention entities named in the
    /// query are boosted, including ones outside the vector candidate set.
    #[instrument(skip(self), fields(query_len = query.len()))]
    pub async fn retrieve(
        &self,
        query: &str,
        n_results: usize,
        enhance_with_kg: bool,
    ) -> Result<Vec<RetrievalResult>> {
        if n_results == 0 {
            return Ok(Vec::new());
        }

        let k = n_results.saturating_mul(self.config.candidate_multiplier.max(1));
        let candidates = self.with_timeout(self.vectors.search(query, k)).await?;
        debug!(candidates = candidates.len(), "Vector candidates");

        if !enhance_with_kg {
            return Ok(vector_only(candidates, n_results));
        }

        let signals = match self.graph_signals(query).await {
            Ok(signals) => signals,
            Err(err) => {
                warn!(error = %err, "Graph unavailable, using vector ranking");
                return Ok(vector_only(candidates, n_results));
            }
        };
        if signals.is_empty() {
            debug!("No graph-linked chunks for query");
        }

        let mut hits = candidates;
        let seen: HashSet<&str> = hits.iter().map(|h| h.chunk_id.as_str()).collect();
        let mut extra: Vec<(&String, &GraphSignal)> = signals
            .iter()
            .filter(|(id, _)| !seen.contains(id.as_str()))
            .collect();
        extra.sort_by(|a, b| b.1.boost.total_cmp(&a.1.boost).then_with(|| a.0.cmp(b.0)));
        extra.truncate(self.config.max_graph_candidates);

        if !extra.is_empty() {
            let ids: Vec<String> = extra.into_iter().map(|(id, _)| id.clone()).collect();
            let scored = self
                .with_timeout(self.vectors.search_within(query, &ids, ids.len()))
                .await?;
            debug!(requested = ids.len(), scored = scored.len(), "Scored graph-linked chunks");
            hits.extend(scored);
        }

        let mut results: Vec<RetrievalResult> = hits
            .into_iter()
            .map(|hit| {
                let signal = signals.get(&hit.chunk_id);
                let boost = signal.map_or(0.0, |s| s.boost);
                let entities = signal
                    .map(|s| s.entities.iter().cloned().collect())
                    .unwrap_or_default();
                self.combine(hit, boost, entities)
            })
            .collect();
        dedupe(&mut results);
        rank(&mut results, n_results);
        Ok(results)
    }

    /// Graph-first retrieval: restrict candidates to chunks satisfying the
    /// constraints, then rank them by vector similarity.
    #[instrument(skip(self, constraints), fields(author = ?constraints.author, topic = ?constraints.topic))]
    pub async fn retrieve_constrained(
        &self,
        query: &str,
        constraints: &GraphConstraints,
        n_results: usize,
    ) -> Result<Vec<RetrievalResult>> {
        if constraints.is_empty() {
            return self.retrieve(query, n_results, true).await;
        }
        if n_results == 0 {
            return Ok(Vec::new());
        }

        let (allowed, matched) = match self.constrained_chunks(constraints).await {
            Ok(found) => found,
            Err(err) => {
                warn!(error = %err, "Graph unavailable, ignoring constraints");
                let candidates = self
                    .with_timeout(self.vectors.search(query, n_results))
                    .await?;
                return Ok(vector_only(candidates, n_results));
            }
        };
        if allowed.is_empty() {
            debug!("No chunks satisfy the constraints");
            return Ok(Vec::new());
        }

        let ids: Vec<String> = allowed.into_iter().collect();
        let hits = self
            .with_timeout(self.vectors.search_within(query, &ids, n_results))
            .await?;

        let mut results: Vec<RetrievalResult> = hits
            .into_iter()
            .map(|hit| self.combine(hit, 1.0, matched.clone()))
            .collect();
        rank(&mut results, n_results);
        Ok(results)
    }

    async fn with_timeout<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        let limit = self.config.vector_timeout();
        tokio::time::timeout(limit, call)
            .await
            .map_err(|_| EngineError::VectorTimeout(limit))?
    }

    fn combine(&self, hit: VectorHit, boost: f32, matched_entities: Vec<String>) -> RetrievalResult {
        let final_score =
            self.config.vector_weight * hit.similarity + self.config.graph_weight * boost;
        RetrievalResult {
            chunk_id: hit.chunk_id,
            content: hit.content,
            metadata: hit.metadata,
            vector_score: hit.similarity,
            graph_boost: boost,
            final_score,
            matched_entities,
        }
    }

    /// Chunks reachable from query entities over mention edges
    async fn graph_signals(&self, query: &str) -> Result<BTreeMap<String, GraphSignal>> {
        // strongest occurrence of each entity named in the query
        let mut entities: BTreeMap<String, (EntityType, f32)> = BTreeMap::new();
        for mention in self.index.mentions_in(query) {
            let slot = entities
                .entry(mention.entity_id.clone())
                .or_insert((mention.entity_type, mention.confidence));
            slot.1 = slot.1.max(mention.confidence);
        }
        debug!(entities = entities.len(), "Query entities");

        let mut signals: BTreeMap<String, GraphSignal> = BTreeMap::new();
        for (entity_id, (entity_type, confidence)) in &entities {
            let edges = self
                .graph
                .edges(entity_id, Some(EdgeType::Mentions(*entity_type)), Direction::Incoming)
                .await?;
            for edge in edges {
                let boost = match self.config.boost_mode {
                    BoostMode::Binary => 1.0,
                    BoostMode::Graduated => (edge.confidence * confidence).clamp(0.0, 1.0),
                };
                let signal = signals.entry(edge.source).or_default();
                signal.boost = signal.boost.max(boost);
                signal.entities.insert(entity_id.clone());
            }
        }
        Ok(signals)
    }

    /// Allowed chunk ids and the constraint entities that selected them
    async fn constrained_chunks(
        &self,
        constraints: &GraphConstraints,
    ) -> Result<(BTreeSet<String>, Vec<String>)> {
        let mut allowed: Option<BTreeSet<String>> = None;
        let mut matched = Vec::new();

        if let Some(author) = constraints.author.as_deref() {
            let author_id = self.author_id(author);
            let chunks = self.authored_chunks(&author_id).await?;
            debug!(author = %author_id, chunks = chunks.len(), "Author constraint");
            matched.push(author_id);
            allowed = Some(chunks);
        }

        if let Some(topic) = constraints.topic.as_deref() {
            let chunks = match self.topic_entity(topic) {
                Some((topic_id, entity_type)) => {
                    let chunks: BTreeSet<String> = self
                        .graph
                        .neighbors(&topic_id, Some(EdgeType::Mentions(entity_type)), Direction::Incoming)
                        .await?
                        .into_iter()
                        .collect();
                    debug!(topic = %topic_id, chunks = chunks.len(), "Topic constraint");
                    matched.push(topic_id);
                    chunks
                }
                None => {
                    debug!(topic = %topic, "Topic not in glossary");
                    BTreeSet::new()
                }
            };
            allowed = Some(match allowed {
                Some(by_author) => by_author.intersection(&chunks).cloned().collect(),
                None => chunks,
            });
        }

        matched.sort();
        Ok((allowed.unwrap_or_default(), matched))
    }

    /// Glossary entity for an author, else the placeholder id
    fn author_id(&self, author: &str) -> String {
        self.index
            .lookup(author)
            .map(|found| found.entity_id)
            .unwrap_or_else(|| entity_node_id(EntityType::Person, ids::strip_parenthetical(author)))
    }

    fn topic_entity(&self, topic: &str) -> Option<(String, EntityType)> {
        if let Some(found) = self.index.lookup(topic) {
            return Some((found.entity_id, found.entity_type));
        }
        self.index
            .mentions_in(topic)
            .into_iter()
            .next()
            .map(|m| (m.entity_id, m.entity_type))
    }

    /// author <- works (directly or through collections) <- chunks
    async fn authored_chunks(&self, author_id: &str) -> Result<BTreeSet<String>> {
        let mut works = BTreeSet::new();
        for source in self
            .graph
            .neighbors(author_id, Some(EdgeType::AuthoredBy), Direction::Incoming)
            .await?
        {
            if source.starts_with("collection:") {
                works.extend(
                    self.graph
                        .neighbors(&source, Some(EdgeType::PartOf), Direction::Incoming)
                        .await?,
                );
            } else {
                works.insert(source);
            }
        }

        let mut chunks = BTreeSet::new();
        for work in &works {
            chunks.extend(
                self.graph
                    .neighbors(work, Some(EdgeType::ChunkOf), Direction::Incoming)
                    .await?,
            );
        }
        Ok(chunks)
    }
}

/// Pure vector ranking: the final score is the similarity
fn vector_only(hits: Vec<VectorHit>, n_results: usize) -> Vec<RetrievalResult> {
    let mut results: Vec<RetrievalResult> = hits
        .into_iter()
        .map(|hit| RetrievalResult {
            final_score: hit.similarity,
            vector_score: hit.similarity,
            graph_boost: 0.0,
            chunk_id: hit.chunk_id,
            content: hit.content,
            metadata: hit.metadata,
            matched_entities: Vec::new(),
        })
        .collect();
    dedupe(&mut results);
    rank(&mut results, n_results);
    results
}

/// Keep the first result per chunk id
fn dedupe(results: &mut Vec<RetrievalResult>) {
    let mut seen = HashSet::new();
    results.retain(|r| seen.insert(r.chunk_id.clone()));
}

/// Sort by final score, then vector score, then id; keep the top `n`
fn rank(results: &mut Vec<RetrievalResult>, n: usize) {
    results.sort_by(|a, b| {
        b.final_score
            .total_cmp(&a.final_score)
            .then_with(|| b.vector_score.total_cmp(&a.vector_score))
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    results.truncate(n);
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use corpusrag_core::{
        EntityIndexConfig, ExtractionMethod, GlossaryEntry, KnowledgeGraphEdge, KnowledgeGraphNode,
        NodeType,
    };
    use corpusrag_db::{DbError, GraphStats, MemoryGraphStore};

    /// Fixed similarity per chunk, independent of the query
    struct StaticIndex {
        scores: Vec<(&'static str, f32)>,
    }

    impl StaticIndex {
        fn hits(&self, filter: Option<&[String]>, k: usize) -> Vec<VectorHit> {
            let mut hits: Vec<VectorHit> = self
                .scores
                .iter()
                .filter(|(id, _)| filter.map_or(true, |ids| ids.iter().any(|i| i == id)))
                .map(|(id, score)| VectorHit {
                    chunk_id: id.to_string(),
                    similarity: *score,
                    content: format!("content of {id}"),
                    metadata: Value::Null,
                })
                .collect();
            hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
            hits.truncate(k);
            hits
        }
    }

    #[async_trait]
    impl VectorIndex for StaticIndex {
        async fn search(&self, _query: &str, k: usize) -> Result<Vec<VectorHit>> {
            Ok(self.hits(None, k))
        }

        async fn search_within(&self, _query: &str, ids: &[String], k: usize) -> Result<Vec<VectorHit>> {
            Ok(self.hits(Some(ids), k))
        }

        async fn upsert(&self, _chunk_id: &str, _vector: Vec<f32>, _payload: Value) -> Result<()> {
            Ok(())
        }
    }

    struct DownIndex;

    #[async_trait]
    impl VectorIndex for DownIndex {
        async fn search(&self, _query: &str, _k: usize) -> Result<Vec<VectorHit>> {
            Err(EngineError::VectorIndex("connection refused".into()))
        }

        async fn search_within(&self, _query: &str, _ids: &[String], _k: usize) -> Result<Vec<VectorHit>> {
            Err(EngineError::VectorIndex("connection refused".into()))
        }

        async fn upsert(&self, _chunk_id: &str, _vector: Vec<f32>, _payload: Value) -> Result<()> {
            Err(EngineError::VectorIndex("connection refused".into()))
        }
    }

    struct SlowIndex;

    #[async_trait]
    impl VectorIndex for SlowIndex {
        async fn search(&self, _query: &str, _k: usize) -> Result<Vec<VectorHit>> {
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            Ok(Vec::new())
        }

        async fn search_within(&self, _query: &str, _ids: &[String], _k: usize) -> Result<Vec<VectorHit>> {
            Ok(Vec::new())
        }

        async fn upsert(&self, _chunk_id: &str, _vector: Vec<f32>, _payload: Value) -> Result<()> {
            Ok(())
        }
    }

    struct DownGraph;

    fn graph_down() -> DbError {
        DbError::SchemaInit("graph offline".into())
    }

    #[async_trait]
    impl GraphStore for DownGraph {
        async fn upsert_nodes(&self, _nodes: &[KnowledgeGraphNode]) -> corpusrag_db::Result<usize> {
            Err(graph_down())
        }
        async fn upsert_edges(&self, _edges: &[KnowledgeGraphEdge]) -> corpusrag_db::Result<usize> {
            Err(graph_down())
        }
        async fn get_node(&self, _id: &str) -> corpusrag_db::Result<Option<KnowledgeGraphNode>> {
            Err(graph_down())
        }
        async fn edges(
            &self,
            _node_id: &str,
            _edge_type: Option<EdgeType>,
            _direction: Direction,
        ) -> corpusrag_db::Result<Vec<KnowledgeGraphEdge>> {
            Err(graph_down())
        }
        async fn stats(&self) -> corpusrag_db::Result<GraphStats> {
            Err(graph_down())
        }
        async fn clear(&self) -> corpusrag_db::Result<()> {
            Err(graph_down())
        }
    }

    fn index() -> Arc<EntityIndex> {
        let glossary = vec![
            GlossaryEntry::new("Karl Marx (1818-1883)", EntityType::Person),
            GlossaryEntry::new("Surplus Value", EntityType::Term),
        ];
        Arc::new(EntityIndex::build(&glossary, EntityIndexConfig::default()))
    }

    /// Chunk "x" mentions Karl Marx but ranks last by similarity
    fn scores() -> StaticIndex {
        StaticIndex {
            scores: vec![
                ("a", 0.62),
                ("b", 0.60),
                ("c", 0.58),
                ("d", 0.55),
                ("e", 0.50),
                ("f", 0.48),
                ("g", 0.45),
                ("x", 0.40),
            ],
        }
    }

    async fn graph() -> Arc<MemoryGraphStore> {
        let store = MemoryGraphStore::new();
        store
            .upsert_nodes(&[
                KnowledgeGraphNode::new("person:karl-marx", NodeType::Person, "Karl Marx"),
                KnowledgeGraphNode::new("work:capital", NodeType::Work, "Capital"),
                KnowledgeGraphNode::new("x", NodeType::Chunk, "x"),
                KnowledgeGraphNode::new("a", NodeType::Chunk, "a"),
            ])
            .await
            .unwrap();
        store
            .upsert_edges(&[
                KnowledgeGraphEdge::new(
                    "x",
                    "person:karl-marx",
                    EdgeType::Mentions(EntityType::Person),
                    ExtractionMethod::EntityMention,
                )
                .with_confidence(0.9),
                KnowledgeGraphEdge::new("x", "work:capital", EdgeType::ChunkOf, ExtractionMethod::Metadata),
                KnowledgeGraphEdge::new("a", "work:capital", EdgeType::ChunkOf, ExtractionMethod::Metadata),
                KnowledgeGraphEdge::new(
                    "work:capital",
                    "person:karl-marx",
                    EdgeType::AuthoredBy,
                    ExtractionMethod::Metadata,
                ),
            ])
            .await
            .unwrap();
        Arc::new(store)
    }

    const QUERY: &str = "What did Marx say about surplus value?";

    #[tokio::test]
    async fn test_graph_boost_lifts_mentioning_chunk_into_top_k() {
        let retriever = HybridRetriever::new(Arc::new(scores()), graph().await, index());

        let plain = retriever.retrieve(QUERY, 3, false).await.unwrap();
        assert!(plain.iter().all(|r| r.chunk_id != "x"));
        assert!(plain.iter().all(|r| r.graph_boost == 0.0));

        let boosted = retriever.retrieve(QUERY, 3, true).await.unwrap();
        assert_eq!(boosted.len(), 3);
        let x = boosted.iter().find(|r| r.chunk_id == "x").unwrap();
        assert_eq!(x.graph_boost, 1.0);
        assert_eq!(x.vector_score, 0.40);
        assert_eq!(x.matched_entities, vec!["person:karl-marx".to_string()]);
        assert_eq!(boosted[0].chunk_id, "x");
    }

    #[tokio::test]
    async fn test_enhanced_never_returns_fewer_results() {
        let retriever = HybridRetriever::new(Arc::new(scores()), graph().await, index());
        for n in 1..=10 {
            let plain = retriever.retrieve(QUERY, n, false).await.unwrap();
            let boosted = retriever.retrieve(QUERY, n, true).await.unwrap();
            assert!(boosted.len() >= plain.len(), "n = {n}");
        }
    }

    #[tokio::test]
    async fn test_graduated_boost_scales_with_confidence() {
        let config = RetrievalConfig {
            boost_mode: BoostMode::Graduated,
            ..RetrievalConfig::default()
        };
        let retriever =
            HybridRetriever::new(Arc::new(scores()), graph().await, index()).with_config(config);

        let results = retriever.retrieve(QUERY, 8, true).await.unwrap();
        let x = results.iter().find(|r| r.chunk_id == "x").unwrap();
        // edge 0.9 x derived surname 0.9
        assert!((x.graph_boost - 0.81).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_graph_failure_falls_back_to_vector_ranking() {
        let retriever = HybridRetriever::new(Arc::new(scores()), Arc::new(DownGraph), index());
        let results = retriever.retrieve(QUERY, 3, true).await.unwrap();

        let ids: Vec<_> = results.iter().map(|r| r.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(results.iter().all(|r| r.final_score == r.vector_score));
    }

    #[tokio::test]
    async fn test_vector_failure_is_an_error() {
        let retriever = HybridRetriever::new(Arc::new(DownIndex), graph().await, index());
        let err = retriever.retrieve(QUERY, 3, true).await.unwrap_err();
        assert!(matches!(err, EngineError::VectorIndex(_)));
    }

    #[tokio::test]
    async fn test_vector_timeout() {
        let config = RetrievalConfig {
            vector_timeout_ms: 20,
            ..RetrievalConfig::default()
        };
        let retriever =
            HybridRetriever::new(Arc::new(SlowIndex), graph().await, index()).with_config(config);
        let err = retriever.retrieve(QUERY, 3, false).await.unwrap_err();
        assert!(matches!(err, EngineError::VectorTimeout(_)));
    }

    #[tokio::test]
    async fn test_graph_first_by_author_and_topic() {
        let retriever = HybridRetriever::new(Arc::new(scores()), graph().await, index());

        let by_author = retriever
            .retrieve_constrained("value", &GraphConstraints::author("Karl Marx"), 5)
            .await
            .unwrap();
        let ids: Vec<_> = by_author.iter().map(|r| r.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "x"]);

        let both = retriever
            .retrieve_constrained(
                "value",
                &GraphConstraints::author("Karl Marx").with_topic("Marx"),
                5,
            )
            .await
            .unwrap();
        assert_eq!(both.len(), 1);
        assert_eq!(both[0].chunk_id, "x");

        let unknown = retriever
            .retrieve_constrained("value", &GraphConstraints::author("Rosa Luxemburg"), 5)
            .await
            .unwrap();
        assert!(unknown.is_empty());
    }

    #[tokio::test]
    async fn test_zero_results_requested() {
        let retriever = HybridRetriever::new(Arc::new(scores()), graph().await, index());
        assert!(retriever.retrieve(QUERY, 0, true).await.unwrap().is_empty());
    }
}
