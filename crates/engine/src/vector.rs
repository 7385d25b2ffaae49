//! Vector index and embedder seams
//!
//! The core never embeds text on its own terms: an [`Embedder`] produces
//! vectors and a [`VectorIndex`] stores and searches them. The in-memory
//! implementations here cover small corpora and tests.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use corpusrag_core::Chunk;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::{EngineError, Result};

const DEFAULT_PUBLISH_BATCH: usize = 64;

/// One similarity search result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorHit {
    pub chunk_id: String,
    /// Cosine similarity to the query
    pub similarity: f32,
    pub content: String,
    pub metadata: Value,
}

/// External similarity search over published chunks
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Top `k` chunks for the query text, most similar first
    async fn search(&self, query: &str, k: usize) -> Result<Vec<VectorHit>>;

    /// Like [`search`](Self::search), restricted to `chunk_ids`
    async fn search_within(&self, query: &str, chunk_ids: &[String], k: usize) -> Result<Vec<VectorHit>>;

    /// Store a chunk vector with its payload
    async fn upsert(&self, chunk_id: &str, vector: Vec<f32>, payload: Value) -> Result<()>;

    /// Whether a chunk is already stored
    async fn contains(&self, _chunk_id: &str) -> Result<bool> {
        Ok(false)
    }
}

/// Turns text into vectors
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn dimension(&self) -> usize;
}

/// Deterministic bag-of-words embedding: each lowercase word is hashed into
/// a bucket, and the vector is L2-normalized.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(8) }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dim];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            let bucket = (hasher.finish() % self.dim as u64) as usize;
            vector[bucket] += 1.0;
        }
        normalize(&mut vector);
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity; 0.0 for empty, mismatched or zero vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (&x, &y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[derive(Debug, Clone)]
struct StoredVector {
    vector: Vec<f32>,
    payload: Value,
}

/// Brute-force cosine search held in memory
pub struct InMemoryVectorIndex {
    embedder: Arc<dyn Embedder>,
    vectors: RwLock<BTreeMap<String, StoredVector>>,
}

impl InMemoryVectorIndex {
    /// Queries are embedded with `embedder`
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            vectors: RwLock::new(BTreeMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.vectors.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.vectors.read().await.is_empty()
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.embedder
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::Embedding("embedder returned no vector".into()))
    }

    async fn ranked(
        &self,
        query: &str,
        filter: Option<&HashSet<&str>>,
        k: usize,
    ) -> Result<Vec<VectorHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query = self.embed_query(query).await?;
        let vectors = self.vectors.read().await;

        let mut hits: Vec<VectorHit> = vectors
            .iter()
            .filter(|(id, _)| filter.map_or(true, |ids| ids.contains(id.as_str())))
            .map(|(id, stored)| VectorHit {
                chunk_id: id.clone(),
                similarity: cosine_similarity(&query, &stored.vector),
                content: stored
                    .payload
                    .get("content")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                metadata: stored.payload.clone(),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(k);
        Ok(hits)
    }
}

impl std::fmt::Debug for InMemoryVectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryVectorIndex")
            .field("dimension", &self.embedder.dimension())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<VectorHit>> {
        self.ranked(query, None, k).await
    }

    async fn search_within(&self, query: &str, chunk_ids: &[String], k: usize) -> Result<Vec<VectorHit>> {
        let ids: HashSet<&str> = chunk_ids.iter().map(String::as_str).collect();
        self.ranked(query, Some(&ids), k).await
    }

    async fn upsert(&self, chunk_id: &str, vector: Vec<f32>, payload: Value) -> Result<()> {
        let expected = self.embedder.dimension();
        if vector.len() != expected {
            return Err(EngineError::VectorIndex(format!(
                "vector for {chunk_id} has dimension {}, expected {expected}",
                vector.len()
            )));
        }
        self.vectors
            .write()
            .await
            .insert(chunk_id.to_string(), StoredVector { vector, payload });
        Ok(())
    }

    async fn contains(&self, chunk_id: &str) -> Result<bool> {
        Ok(self.vectors.read().await.contains_key(chunk_id))
    }
}

/// Upsert totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VectorPublishStats {
    pub upserted: usize,
    /// Already present in the index
    pub skipped: usize,
}

/// Embeds chunks and upserts them into a vector index
pub struct ChunkPublisher {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    batch_size: usize,
}

impl ChunkPublisher {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            embedder,
            index,
            batch_size: DEFAULT_PUBLISH_BATCH,
        }
    }

    /// Builder: set the embedding batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Publish chunks, skipping ids the index already holds
    #[instrument(skip(self, chunks), fields(chunks = chunks.len()))]
    pub async fn publish(&self, chunks: &[Chunk]) -> Result<VectorPublishStats> {
        let mut stats = VectorPublishStats::default();
        let mut pending = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            if self.index.contains(&chunk.chunk_id).await? {
                stats.skipped += 1;
            } else {
                pending.push(chunk);
            }
        }

        for batch in pending.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(EngineError::Embedding(format!(
                    "expected {} vectors, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }
            for (chunk, vector) in batch.iter().zip(vectors) {
                self.index
                    .upsert(&chunk.chunk_id, vector, chunk.vector_payload())
                    .await?;
                stats.upserted += 1;
            }
            debug!(batch = batch.len(), "Upserted chunk vectors");
        }

        info!(
            upserted = stats.upserted,
            skipped = stats.skipped,
            "Published chunk vectors"
        );
        Ok(stats)
    }
}
