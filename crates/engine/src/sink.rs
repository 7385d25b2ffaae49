//! Chunk sinks - where finished chunk sets are published
//!
//! A document's chunks become visible all at once or not at all, and a
//! document already present in the sink is not chunked again.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use corpusrag_core::{ids, Chunk};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::Result;

const STAGING_DIR: &str = "staging";
const CHUNKS_DIR: &str = "chunks";

/// Append-only output for chunked documents, shared by pipeline workers
pub trait ChunkSink: Send + Sync {
    /// Whether the document's chunks were already published
    fn contains(&self, document_id: &str) -> Result<bool>;

    /// Publish the complete chunk set of one document atomically
    fn publish(&self, document_id: &str, chunks: &[Chunk]) -> Result<()>;
}

/// Chunk sets kept in memory
#[derive(Debug, Default)]
pub struct MemoryChunkSink {
    documents: RwLock<BTreeMap<String, Vec<Chunk>>>,
}

impl MemoryChunkSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunks(&self, document_id: &str) -> Option<Vec<Chunk>> {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(document_id)
            .cloned()
    }

    /// Every published chunk, in document id order
    pub fn all_chunks(&self) -> Vec<Chunk> {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .flatten()
            .cloned()
            .collect()
    }

    pub fn document_count(&self) -> usize {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl ChunkSink for MemoryChunkSink {
    fn contains(&self, document_id: &str) -> Result<bool> {
        Ok(self
            .documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(document_id))
    }

    fn publish(&self, document_id: &str, chunks: &[Chunk]) -> Result<()> {
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(document_id.to_string(), chunks.to_vec());
        Ok(())
    }
}

/// One JSON-lines file per document under `{root}/chunks/`.
///
/// Files are written under `{root}/staging/` and renamed into place, so a
/// reader never sees a partial chunk set.
#[derive(Debug, Clone)]
pub struct JsonlChunkSink {
    root: PathBuf,
}

impl JsonlChunkSink {
    /// Open (creating if needed) a sink rooted at `root`
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(STAGING_DIR))?;
        fs::create_dir_all(root.join(CHUNKS_DIR))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, document_id: &str) -> PathBuf {
        let name = ids::slugify(document_id);
        self.root.join(CHUNKS_DIR).join(format!("{name}.jsonl"))
    }

    /// Published chunks of one document
    pub fn read(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let file = File::open(self.path_for(document_id))?;
        let mut chunks = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            chunks.push(serde_json::from_str(&line)?);
        }
        Ok(chunks)
    }

    /// Number of published documents
    pub fn document_count(&self) -> Result<usize> {
        let mut count = 0;
        for entry in fs::read_dir(self.root.join(CHUNKS_DIR))? {
            if entry?.path().extension().is_some_and(|ext| ext == "jsonl") {
                count += 1;
            }
        }
        Ok(count)
    }
}

impl ChunkSink for JsonlChunkSink {
    fn contains(&self, document_id: &str) -> Result<bool> {
        Ok(self.path_for(document_id).exists())
    }

    fn publish(&self, document_id: &str, chunks: &[Chunk]) -> Result<()> {
        let staged = NamedTempFile::new_in(self.root.join(STAGING_DIR))?;
        {
            let mut writer = BufWriter::new(staged.as_file());
            for chunk in chunks {
                serde_json::to_writer(&mut writer, chunk)?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
        }
        staged.as_file().sync_all()?;

        let target = self.path_for(document_id);
        staged.persist(&target).map_err(|err| err.error)?;
        debug!(path = %target.display(), chunks = chunks.len(), "Published chunk file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::ChunkingEngine;
    use corpusrag_core::Document;
    use tempfile::tempdir;

    fn chunks() -> (Document, Vec<Chunk>) {
        let doc = Document::new("One paragraph.\n\nAnother paragraph.")
            .with_title("Notes")
            .with_author("Anon");
        let chunks = ChunkingEngine::default().chunk(&doc).chunks;
        (doc, chunks)
    }

    #[test]
    fn test_memory_sink() {
        let (doc, chunks) = chunks();
        let sink = MemoryChunkSink::new();
        assert!(!sink.contains(doc.id()).unwrap());

        sink.publish(doc.id(), &chunks).unwrap();
        assert!(sink.contains(doc.id()).unwrap());
        assert_eq!(sink.chunks(doc.id()).unwrap(), chunks);
        assert_eq!(sink.document_count(), 1);
    }

    #[test]
    fn test_jsonl_sink_round_trip() {
        let dir = tempdir().unwrap();
        let (doc, chunks) = chunks();
        let sink = JsonlChunkSink::open(dir.path()).unwrap();

        assert!(!sink.contains(doc.id()).unwrap());
        sink.publish(doc.id(), &chunks).unwrap();

        assert!(sink.contains(doc.id()).unwrap());
        assert_eq!(sink.read(doc.id()).unwrap(), chunks);
        assert_eq!(sink.document_count().unwrap(), 1);

        // nothing left behind in staging
        let staged = fs::read_dir(dir.path().join(STAGING_DIR)).unwrap().count();
        assert_eq!(staged, 0);
    }

    #[test]
    fn test_jsonl_sink_records_empty_chunk_sets() {
        let dir = tempdir().unwrap();
        let sink = JsonlChunkSink::open(dir.path()).unwrap();

        sink.publish("skipped-doc", &[]).unwrap();
        assert!(sink.contains("skipped-doc").unwrap());
        assert!(sink.read("skipped-doc").unwrap().is_empty());
    }

    #[test]
    fn test_republish_replaces_file() {
        let dir = tempdir().unwrap();
        let (doc, chunks) = chunks();
        let sink = JsonlChunkSink::open(dir.path()).unwrap();

        sink.publish(doc.id(), &chunks).unwrap();
        sink.publish(doc.id(), &chunks[..1]).unwrap();
        assert_eq!(sink.read(doc.id()).unwrap().len(), 1);
    }
}
