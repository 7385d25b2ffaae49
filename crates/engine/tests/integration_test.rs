//! End-to-end tests: chunking, graph construction and hybrid retrieval

mod common;

use std::sync::Arc;

use common::{
    corpus, flat_document, glossary, glossary_document, index_document, mislabelled_document,
    prefaces, squash, StaticVectorIndex,
};
use corpusrag_core::{
    Chunk, ChunkingStrategy, Document, EdgeType, EntityIndexConfig, EntityType, GlossaryEntry,
    NodeType, PipelineConfig, StrategyDetails,
};
use corpusrag_db::{init_memory, GraphStore, MemoryGraphStore, Repository};
use corpusrag_engine::{
    CancellationToken, ChunkSink, ChunkingEngine, EntityIndex, GraphBuilder, GraphConstraints,
    ChunkPublisher, HashingEmbedder, HybridRetriever, InMemoryVectorIndex, IngestPipeline,
    JsonlChunkSink, KnowledgeGraph, MemoryChunkSink, StructureAnalyzer,
};

const QUERY: &str = "What did Marx say about surplus value?";

fn chunk_corpus() -> Vec<Chunk> {
    let engine = ChunkingEngine::default();
    corpus()
        .iter()
        .flat_map(|doc| engine.chunk(doc).chunks)
        .collect()
}

fn build_graph(chunks: &[Chunk]) -> KnowledgeGraph {
    let glossary = glossary();
    let index = Arc::new(EntityIndex::build(&glossary, EntityIndexConfig::default()));
    GraphBuilder::new(index).build(&glossary, &corpus(), chunks)
}

/// Retriever over the corpus graph where `entry:karl-marx` ranks last by
/// similarity alone
async fn marx_retriever() -> HybridRetriever {
    let chunks = chunk_corpus();
    let graph = build_graph(&chunks);
    let store = Arc::new(MemoryGraphStore::new());
    graph.publish(store.as_ref(), 100).await.expect("Failed to publish graph");

    let mut others = 0;
    let vectors = StaticVectorIndex::new(chunks.iter().map(|chunk| {
        let score = if chunk.chunk_id == "entry:karl-marx" {
            0.10
        } else {
            others += 1;
            0.40 - 0.02 * others as f32
        };
        (chunk.chunk_id.clone(), score, chunk.content.clone())
    }));

    let glossary = glossary();
    let index = Arc::new(EntityIndex::build(&glossary, EntityIndexConfig::default()));
    HybridRetriever::new(Arc::new(vectors), store, index)
}

#[test]
fn test_glossary_document_yields_one_chunk_per_entry() {
    let outcome = ChunkingEngine::default().chunk(&glossary_document());

    assert_eq!(outcome.strategy, ChunkingStrategy::EntryBased);
    assert_eq!(outcome.chunks.len(), 2);
    let names: Vec<_> = outcome.chunks.iter().filter_map(|c| c.entry_name()).collect();
    assert_eq!(names, vec!["Karl Marx (1818-1883)", "Mao Zedong (1893-1976)"]);
    assert_ne!(outcome.chunks[0].chunk_id, outcome.chunks[1].chunk_id);
    assert_eq!(outcome.chunks[0].chunk_id, "entry:karl-marx");
    assert_eq!(
        outcome.chunks[0].cross_references(),
        ["../e/n.htm#engels-friedrich".to_string()]
    );
}

#[test]
fn test_flat_document_uses_paragraph_clusters() {
    let engine = ChunkingEngine::default();
    let outcome = engine.chunk(&flat_document());
    let config = engine.config();

    assert_eq!(outcome.strategy, ChunkingStrategy::ParagraphClusters);
    assert!(outcome.chunks.len() >= 2);
    for chunk in &outcome.chunks {
        assert!(
            chunk.token_count >= config.soft_min_tokens && chunk.token_count <= config.soft_max_tokens,
            "{} tokens",
            chunk.token_count
        );
    }
}

#[test]
fn test_low_priority_index_is_skipped() {
    let outcome = ChunkingEngine::default().chunk(&index_document());
    assert_eq!(outcome.strategy, ChunkingStrategy::Skip);
    assert!(outcome.chunks.is_empty());
}

#[test]
fn test_chunks_reconstruct_source_within_bounds() {
    let engine = ChunkingEngine::default();
    let config = engine.config().clone();

    for doc in corpus() {
        let outcome = engine.chunk(&doc);
        if matches!(outcome.strategy, ChunkingStrategy::Skip | ChunkingStrategy::TokenBased) {
            continue;
        }

        let joined: Vec<&str> = outcome.chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(squash(&joined.join(" ")), squash(&doc.text));

        let last = outcome.chunks.len() - 1;
        for (i, chunk) in outcome.chunks.iter().enumerate() {
            assert!(chunk.token_count >= 1 && chunk.token_count <= config.hard_max_tokens);
            if i < last && chunk.strategy != ChunkingStrategy::EntryBased {
                assert!(chunk.token_count >= config.soft_min_tokens);
            }
        }
    }
}

#[test]
fn test_rechunking_is_idempotent() {
    assert_eq!(chunk_corpus(), chunk_corpus());
}

#[test]
fn test_strategy_selection_is_pure() {
    for doc in corpus() {
        let first = StructureAnalyzer.select(&doc.metadata);
        let again = StructureAnalyzer.select(&doc.clone().metadata);
        assert_eq!(first, again);
    }
}

#[test]
fn test_graph_rebuild_is_isomorphic() {
    let first = build_graph(&chunk_corpus());
    let second = build_graph(&chunk_corpus());

    let ids = |g: &KnowledgeGraph| {
        (
            g.nodes().map(|n| n.id.clone()).collect::<Vec<_>>(),
            g.edges().map(|e| e.id.clone()).collect::<Vec<_>>(),
        )
    };
    assert_eq!(ids(&first), ids(&second));
    assert_eq!(
        first.nodes().cloned().collect::<Vec<_>>(),
        second.nodes().cloned().collect::<Vec<_>>()
    );
    assert_eq!(first.report(), second.report());
}

#[test]
fn test_graph_links_corpus() {
    let graph = build_graph(&chunk_corpus());
    let capital = common::capital_document().node_id();

    // the entry chunk for Karl Marx mentions him
    let mention = graph
        .edges_from("entry:karl-marx", Some(EdgeType::Mentions(EntityType::Person)))
        .find(|e| e.target == "person:karl-marx")
        .expect("Missing mention edge");
    assert_eq!(mention.confidence, 1.0);

    let authored: Vec<_> = graph.edges_from(&capital, Some(EdgeType::AuthoredBy)).collect();
    assert_eq!(authored[0].target, "person:karl-marx");

    // the fragment names a glossary term, ch02 is not in the corpus
    let refs: Vec<_> = graph
        .edges_from(&capital, Some(EdgeType::CrossReferences))
        .map(|e| e.target.as_str())
        .collect();
    assert_eq!(refs, vec!["term:surplus-value"]);
    assert!(graph.report().unresolved_references >= 1);

    // "Anonymous" is not in the glossary
    assert!(graph.node("person:anonymous").expect("Missing placeholder").is_placeholder());
}

#[tokio::test]
async fn test_publish_to_surrealdb_is_idempotent() {
    let graph = build_graph(&chunk_corpus());
    let db = init_memory().await.expect("Failed to init db");
    let repo = Repository::new(db);

    graph.publish(&repo, 7).await.expect("Failed to publish graph");
    let first = repo.stats().await.expect("Failed to get stats");
    graph.publish(&repo, 7).await.expect("Failed to republish graph");
    let second = repo.stats().await.expect("Failed to get stats");

    assert_eq!(first, second);
    assert_eq!(first.nodes, graph.node_count());
    assert_eq!(first.edges, graph.edge_count());
}

#[tokio::test]
async fn test_marx_query_lifts_mentioning_chunk_into_top_k() {
    let retriever = marx_retriever().await;

    let plain = retriever.retrieve(QUERY, 3, false).await.expect("Retrieval failed");
    assert!(plain.iter().all(|r| r.chunk_id != "entry:karl-marx"));

    let enhanced = retriever.retrieve(QUERY, 3, true).await.expect("Retrieval failed");
    let marx = enhanced
        .iter()
        .find(|r| r.chunk_id == "entry:karl-marx")
        .expect("Marx chunk not in top k");
    assert_eq!(marx.graph_boost, 1.0);
    assert!(marx.final_score > marx.vector_score);
    assert!(marx.matched_entities.contains(&"person:karl-marx".to_string()));
}

#[tokio::test]
async fn test_enhanced_retrieval_never_returns_fewer_results() {
    let retriever = marx_retriever().await;
    for n in 1..=10 {
        let plain = retriever.retrieve(QUERY, n, false).await.expect("Retrieval failed");
        let enhanced = retriever.retrieve(QUERY, n, true).await.expect("Retrieval failed");
        assert!(enhanced.len() >= plain.len(), "n = {n}");
    }
}

#[tokio::test]
async fn test_graph_first_retrieval_by_author() {
    let retriever = marx_retriever().await;
    let results = retriever
        .retrieve_constrained("commodities", &GraphConstraints::author("Karl Marx"), 5)
        .await
        .expect("Retrieval failed");

    assert!(!results.is_empty());
    for result in &results {
        assert!(
            result.chunk_id.starts_with("chunk:karl-marx/"),
            "{}",
            result.chunk_id
        );
    }
}

#[test]
fn test_pipeline_resumes_from_jsonl_sink() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let sink = JsonlChunkSink::open(dir.path()).expect("Failed to open sink");
    let pipeline = IngestPipeline::new(PipelineConfig::default()).expect("Failed to build pipeline");
    let docs = corpus();

    let first = pipeline.run(&docs, &sink, &CancellationToken::new());
    assert_eq!(first.published, docs.len());
    assert_eq!(first.quality.skipped_documents, 1);
    assert_eq!(first.quality.chunks, chunk_corpus().len());

    let second = pipeline.run(&docs, &sink, &CancellationToken::new());
    assert_eq!(second.published, 0);
    assert_eq!(second.quality.resumed_documents, docs.len());

    for doc in &docs {
        assert!(sink.contains(doc.id()).expect("Sink lookup failed"));
    }
}

#[test]
fn test_pipeline_output_matches_direct_chunking() {
    let sink = MemoryChunkSink::new();
    let pipeline = IngestPipeline::new(PipelineConfig::default()).expect("Failed to build pipeline");
    pipeline.run(&corpus(), &sink, &CancellationToken::new());

    let engine = ChunkingEngine::default();
    let mut docs = corpus();
    docs.push(mislabelled_document());
    pipeline.run(&docs[docs.len() - 1..], &sink, &CancellationToken::new());

    for doc in docs {
        let direct = engine.chunk(&doc).chunks;
        let published = sink.chunks(doc.id()).expect("Document not published");

        // metadata may gain measured structure; ids and text do not change
        let key = |chunks: &[Chunk]| {
            chunks
                .iter()
                .map(|c| (c.chunk_id.clone(), c.content.clone(), c.strategy))
                .collect::<Vec<_>>()
        };
        assert_eq!(key(&published), key(&direct));
        for chunk in &published {
            if let StrategyDetails::Entry { entry_name, .. } = &chunk.details {
                assert!(!entry_name.is_empty());
            }
        }
    }
}

#[test]
fn test_reported_structure_drives_pipeline_strategy() {
    let doc = mislabelled_document();
    let sink = MemoryChunkSink::new();
    let pipeline = IngestPipeline::new(PipelineConfig::default()).expect("Failed to build pipeline");
    pipeline.run(std::slice::from_ref(&doc), &sink, &CancellationToken::new());

    let published = sink.chunks(doc.id()).expect("Document not published");
    assert!(!published.is_empty());
    assert!(published
        .iter()
        .all(|c| c.strategy == ChunkingStrategy::ParagraphClusters));
    assert_eq!(StructureAnalyzer.select(&doc.metadata), ChunkingStrategy::ParagraphClusters);
}

#[tokio::test]
async fn test_same_titled_works_keep_separate_chunks() {
    let docs = prefaces();
    let engine = ChunkingEngine::default();
    let chunks: Vec<Chunk> = docs.iter().flat_map(|doc| engine.chunk(doc).chunks).collect();
    assert_eq!(chunks.len(), 2);
    assert_ne!(chunks[0].chunk_id, chunks[1].chunk_id);

    let glossary = glossary();
    let index = Arc::new(EntityIndex::build(&glossary, EntityIndexConfig::default()));
    let graph = GraphBuilder::new(index).build(&glossary, &docs, &chunks);
    let chunk_nodes = graph.nodes().filter(|n| n.node_type == NodeType::Chunk).count();
    assert_eq!(chunk_nodes, 2);
    assert_eq!(graph.report().duplicate_nodes, 0);

    // each chunk belongs to its own work
    for (doc, chunk) in docs.iter().zip(&chunks) {
        let owners: Vec<_> = graph
            .edges_from(&chunk.chunk_id, Some(EdgeType::ChunkOf))
            .map(|e| e.target.clone())
            .collect();
        assert_eq!(owners, vec![doc.node_id()]);
    }

    let embedder = Arc::new(HashingEmbedder::default());
    let vectors = Arc::new(InMemoryVectorIndex::new(embedder.clone()));
    let stats = ChunkPublisher::new(embedder, vectors.clone())
        .publish(&chunks)
        .await
        .expect("Failed to publish vectors");
    assert_eq!(stats.upserted, 2);
    assert_eq!(vectors.len().await, 2);
}

#[test]
fn test_capitalised_prose_yields_no_fuzzy_mentions() {
    let mut glossary = glossary();
    glossary.push(GlossaryEntry::new("Vladimir Lenin (1870-1924)", EntityType::Person));
    let index = Arc::new(EntityIndex::build(&glossary, EntityIndexConfig::default()));

    let doc = Document::new(
        "Lemon and Linen were the main cargo at Leith that winter. Seven ships \
         sailed for Riga. Capital was scarce and the Commons debated tariffs.\n\n\
         Later, Lenin wrote about the harbour strikes.",
    )
    .with_title("Harbour Report")
    .with_author("Anonymous")
    .with_heading_depth(0);
    let chunks = ChunkingEngine::default().chunk(&doc).chunks;
    let graph = GraphBuilder::new(index).build(&glossary, std::slice::from_ref(&doc), &chunks);

    let mentions: Vec<_> = graph
        .edges()
        .filter(|e| matches!(e.edge_type, EdgeType::Mentions(_)))
        .collect();
    assert_eq!(mentions.len(), 1, "{mentions:?}");
    assert_eq!(mentions[0].target, "person:vladimir-lenin");
    assert!(mentions[0].confidence >= 0.9);
}
