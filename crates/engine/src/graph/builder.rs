//! Phase-ordered graph construction

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use corpusrag_core::entity::entity_node_id;
use corpusrag_core::{
    ids, Chunk, Document, EdgeType, EntityType, ExtractionMethod, GlossaryEntry,
    KnowledgeGraphEdge, KnowledgeGraphNode, NodeType,
};
use rayon::prelude::*;
use tracing::{debug, info, instrument};

use super::references::{document_key, resolve_url};
use super::{KnowledgeGraph, Phase};
use crate::chunking::markdown::floor_char_boundary;
use crate::entity_index::{EntityIndex, Mention};

/// Bytes of context kept on each side of a mention
const SNIPPET_RADIUS: usize = 40;

/// Derives the knowledge graph from the glossary, documents and chunks.
///
/// Phases run in a fixed order so later phases can rely on the nodes of
/// earlier ones: entities, documents and chunks, authorship, cross
/// references, mentions, categories.
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    index: Arc<EntityIndex>,
}

/// Document lookup tables for cross-reference resolution
#[derive(Debug, Default)]
struct DocumentUrls {
    /// Normalized url (fragment kept) -> work node
    exact: HashMap<String, String>,
    /// Normalized url without fragment -> work node
    by_key: HashMap<String, String>,
}

impl GraphBuilder {
    pub fn new(index: Arc<EntityIndex>) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &EntityIndex {
        &self.index
    }

    /// Build the full graph. Never fails: dropped edges and unresolved
    /// references are counted in the report.
    #[instrument(skip_all, fields(glossary = glossary.len(), documents = documents.len(), chunks = chunks.len()))]
    pub fn build(
        &self,
        glossary: &[GlossaryEntry],
        documents: &[Document],
        chunks: &[Chunk],
    ) -> KnowledgeGraph {
        let mut graph = KnowledgeGraph::default();

        self.add_entities(&mut graph, glossary);
        let urls = self.add_documents(&mut graph, documents, chunks);
        self.add_authorship(&mut graph, documents);
        self.add_cross_references(&mut graph, &urls, glossary, documents, chunks);
        self.add_mentions(&mut graph, chunks);
        self.add_categories(&mut graph, documents);

        graph.finish();
        let report = graph.report();
        info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            unresolved = report.unresolved_references,
            placeholders = report.placeholder_authors,
            duplicates = report.duplicate_nodes,
            "Built knowledge graph"
        );
        graph
    }

    fn add_entities(&self, graph: &mut KnowledgeGraph, glossary: &[GlossaryEntry]) {
        for entry in glossary {
            let id = entry.node_id();
            let node = KnowledgeGraphNode::new(
                id.clone(),
                NodeType::from(entry.entity_type),
                entry.display_name(),
            )
            .with_property("name", entry.name.as_str())
            .with_property("definition", entry.definition.as_str())
            .with_aliases(entry.aliases.clone());

            if !graph.add_node(node) {
                // Repeated entry: keep the first record, merge its aliases
                if let Some(existing) = graph.node_mut(&id) {
                    for alias in &entry.aliases {
                        if !existing.aliases.contains(alias) {
                            existing.aliases.push(alias.clone());
                        }
                    }
                }
            }
        }
        debug!(phase = %Phase::Entities, nodes = graph.node_count(), "Phase complete");
    }

    fn add_documents(
        &self,
        graph: &mut KnowledgeGraph,
        documents: &[Document],
        chunks: &[Chunk],
    ) -> DocumentUrls {
        let mut urls = DocumentUrls::default();

        for doc in documents {
            let id = doc.node_id();
            let meta = &doc.metadata;
            let node = KnowledgeGraphNode::new(id.clone(), NodeType::Work, doc.label())
                .with_property("document_id", doc.id())
                .with_property("section_type", meta.section_type.as_str())
                .with_optional_property("title", meta.title.as_deref())
                .with_optional_property("author", meta.author.as_deref())
                .with_optional_property("date_written", meta.date_written.as_deref())
                .with_optional_property("source_url", meta.source_url.as_deref())
                .with_optional_property("work_collection", meta.work_collection.as_deref())
                .with_optional_property(
                    "chapter",
                    meta.chapter.map(|c| c.to_string()).as_deref(),
                );
            graph.add_node(node);

            if let Some(url) = meta.source_url.as_deref() {
                urls.exact
                    .entry(resolve_url(None, url))
                    .or_insert_with(|| id.clone());
                urls.by_key.entry(document_key(url)).or_insert(id);
            }
        }

        for chunk in chunks {
            let work = work_node_id(&chunk.document_id);
            let label = chunk
                .entry_name()
                .map(str::to_string)
                .unwrap_or_else(|| chunk.chunk_id.clone());
            let node = KnowledgeGraphNode::new(chunk.chunk_id.clone(), NodeType::Chunk, label)
                .with_property("document_id", chunk.document_id.as_str())
                .with_property("ordinal", chunk.ordinal.to_string())
                .with_property("strategy", chunk.strategy.as_str())
                .with_property("token_count", chunk.token_count.to_string())
                .with_vector_id(chunk.point_id().to_string());
            graph.add_node(node);

            graph.add_edge(
                Phase::Documents,
                KnowledgeGraphEdge::new(
                    chunk.chunk_id.clone(),
                    work,
                    EdgeType::ChunkOf,
                    ExtractionMethod::Metadata,
                ),
            );
        }
        debug!(phase = %Phase::Documents, nodes = graph.node_count(), "Phase complete");
        urls
    }

    fn add_authorship(&self, graph: &mut KnowledgeGraph, documents: &[Document]) {
        for doc in documents {
            let work = doc.node_id();
            let author = doc
                .metadata
                .author
                .as_deref()
                .map(str::trim)
                .filter(|a| !a.is_empty());

            let author_ref = author.map(|name| self.author_node(graph, name));

            if let Some((author_id, confidence)) = &author_ref {
                graph.add_edge(
                    Phase::Authorship,
                    KnowledgeGraphEdge::new(
                        work.clone(),
                        author_id.clone(),
                        EdgeType::AuthoredBy,
                        ExtractionMethod::Metadata,
                    )
                    .with_confidence(*confidence),
                );
            }

            let Some(collection) = doc
                .metadata
                .work_collection
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
            else {
                continue;
            };

            let collection_id = match author {
                Some(name) => format!(
                    "collection:{}/{}",
                    ids::slugify(ids::strip_parenthetical(name)),
                    ids::slugify(collection)
                ),
                None => format!("collection:{}", ids::slugify(collection)),
            };
            if !graph.contains_node(&collection_id) {
                graph.add_node(
                    KnowledgeGraphNode::new(
                        collection_id.clone(),
                        NodeType::WorkCollection,
                        collection,
                    )
                    .with_optional_property("author", author),
                );
            }

            let mut part_of = KnowledgeGraphEdge::new(
                work,
                collection_id.clone(),
                EdgeType::PartOf,
                ExtractionMethod::Metadata,
            );
            if let Some(chapter) = doc.metadata.chapter {
                part_of = part_of.with_context(format!("chapter {chapter}"));
            }
            graph.add_edge(Phase::Authorship, part_of);

            if let Some((author_id, confidence)) = author_ref {
                graph.add_edge(
                    Phase::Authorship,
                    KnowledgeGraphEdge::new(
                        collection_id,
                        author_id,
                        EdgeType::AuthoredBy,
                        ExtractionMethod::Inferred,
                    )
                    .with_confidence(confidence),
                );
            }
        }
        debug!(
            phase = %Phase::Authorship,
            placeholders = graph.report().placeholder_authors,
            "Phase complete"
        );
    }

    /// Node id for an author name, creating a placeholder when the
    /// glossary does not know the name
    fn author_node(&self, graph: &mut KnowledgeGraph, name: &str) -> (String, f32) {
        if let Some(found) = self.index.lookup(name) {
            if graph.contains_node(&found.entity_id) {
                return (found.entity_id, found.confidence);
            }
        }

        let display = ids::strip_parenthetical(name);
        let id = entity_node_id(EntityType::Person, display);
        if !graph.contains_node(&id) {
            debug!(author = %name, id = %id, "Author not in glossary, adding placeholder");
            graph.add_node(
                KnowledgeGraphNode::new(id.clone(), NodeType::Person, display)
                    .with_property("name", name)
                    .with_property("placeholder", "true"),
            );
            graph.report_mut().placeholder_authors += 1;
        }
        (id, 1.0)
    }

    fn add_cross_references(
        &self,
        graph: &mut KnowledgeGraph,
        urls: &DocumentUrls,
        glossary: &[GlossaryEntry],
        documents: &[Document],
        chunks: &[Chunk],
    ) {
        // (source node, base url, reference)
        let mut pending: Vec<(String, Option<&str>, &str)> = Vec::new();
        for doc in documents {
            let source = doc.node_id();
            let base = doc.metadata.source_url.as_deref();
            for reference in &doc.metadata.cross_references {
                pending.push((source.clone(), base, reference.as_str()));
            }
        }
        for entry in glossary {
            let source = entry.node_id();
            for reference in &entry.cross_references {
                pending.push((source.clone(), None, reference.as_str()));
            }
        }
        for chunk in chunks {
            let base = chunk.metadata.source_url.as_deref();
            for reference in chunk.cross_references() {
                pending.push((chunk.chunk_id.clone(), base, reference.as_str()));
            }
        }

        let mut unresolved = 0;
        let mut edges = Vec::new();
        for (source, base, reference) in pending {
            match self.resolve_reference(graph, urls, base, reference) {
                Some(target) if target == source => {}
                Some(target) => edges.push(
                    KnowledgeGraphEdge::new(
                        source,
                        target,
                        EdgeType::CrossReferences,
                        ExtractionMethod::ExplicitLink,
                    )
                    .with_context(reference),
                ),
                None => {
                    debug!(source = %source, reference = %reference, "Unresolved cross reference");
                    unresolved += 1;
                }
            }
        }

        for edge in edges {
            graph.add_edge(Phase::CrossReferences, edge);
        }
        graph.report_mut().unresolved_references += unresolved;
        debug!(phase = %Phase::CrossReferences, unresolved, "Phase complete");
    }

    /// Resolution order: document url (with fragment), node id, entity
    /// slug, document url without fragment
    fn resolve_reference(
        &self,
        graph: &KnowledgeGraph,
        urls: &DocumentUrls,
        base: Option<&str>,
        reference: &str,
    ) -> Option<String> {
        let reference = reference.trim();
        if reference.is_empty() {
            return None;
        }

        let absolute = resolve_url(base, reference);
        if let Some(id) = urls.exact.get(&absolute) {
            return Some(id.clone());
        }
        if graph.contains_node(reference) {
            return Some(reference.to_string());
        }
        if let Some(id) = self.index.resolve_slug(reference) {
            if graph.contains_node(id) {
                return Some(id.to_string());
            }
        }
        urls.by_key.get(&document_key(&absolute)).cloned()
    }

    fn add_mentions(&self, graph: &mut KnowledgeGraph, chunks: &[Chunk]) {
        let index = &self.index;
        let edges: Vec<Vec<KnowledgeGraphEdge>> = chunks
            .par_iter()
            .map(|chunk| mention_edges(index, chunk))
            .collect();

        let mut count = 0;
        for edge in edges.into_iter().flatten() {
            if graph.add_edge(Phase::Mentions, edge) {
                count += 1;
            }
        }
        debug!(phase = %Phase::Mentions, edges = count, "Phase complete");
    }

    fn add_categories(&self, graph: &mut KnowledgeGraph, documents: &[Document]) {
        for doc in documents {
            let work = doc.node_id();
            for subject in &doc.metadata.subjects {
                let subject = subject.trim();
                let slug = ids::slugify(subject);
                if slug.is_empty() {
                    continue;
                }
                let id = format!("category:{slug}");
                if !graph.contains_node(&id) {
                    graph.add_node(KnowledgeGraphNode::new(
                        id.clone(),
                        NodeType::SubjectCategory,
                        subject,
                    ));
                }
                graph.add_edge(
                    Phase::Categories,
                    KnowledgeGraphEdge::new(
                        work.clone(),
                        id,
                        EdgeType::InCategory,
                        ExtractionMethod::Metadata,
                    ),
                );
            }
        }
        debug!(phase = %Phase::Categories, "Phase complete");
    }
}

fn work_node_id(document_id: &str) -> String {
    format!("work:{}", ids::short_hash(document_id))
}

/// One edge per mentioned entity, from its best-scoring occurrence
fn mention_edges(index: &EntityIndex, chunk: &Chunk) -> Vec<KnowledgeGraphEdge> {
    let mut best: BTreeMap<String, Mention> = BTreeMap::new();
    for mention in index.mentions_in(&chunk.content) {
        match best.get(&mention.entity_id) {
            Some(current) if current.confidence >= mention.confidence => {}
            _ => {
                best.insert(mention.entity_id.clone(), mention);
            }
        }
    }

    best.into_values()
        .map(|mention| {
            KnowledgeGraphEdge::new(
                chunk.chunk_id.clone(),
                mention.entity_id.clone(),
                EdgeType::Mentions(mention.entity_type),
                ExtractionMethod::EntityMention,
            )
            .with_confidence(mention.confidence)
            .with_context(snippet(&chunk.content, &mention.span))
        })
        .collect()
}

/// Whitespace-collapsed text around `span`
fn snippet(text: &str, span: &std::ops::Range<usize>) -> String {
    let start = floor_char_boundary(text, span.start.saturating_sub(SNIPPET_RADIUS));
    let mut end = (span.end + SNIPPET_RADIUS).min(text.len());
    while !text.is_char_boundary(end) {
        end += 1;
    }
    text[start..end].split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::ChunkingEngine;
    use corpusrag_core::{EntityIndexConfig, SectionType};

    const BASE: &str = "https://www.marxists.org/archive/marx/works/1867-c1";

    fn glossary() -> Vec<GlossaryEntry> {
        vec![
            GlossaryEntry::new("Karl Marx (1818-1883)", EntityType::Person)
                .with_definition("German philosopher and economist.")
                .with_aliases(vec!["Marx, Karl".to_string()]),
            GlossaryEntry::new("Surplus Value", EntityType::Term)
                .with_definition("Value produced beyond the value of labour-power.")
                .with_cross_references(vec!["../people/m/a.htm#marx-karl".to_string()]),
        ]
    }

    fn documents() -> Vec<Document> {
        vec![
            Document::new(
                "Karl Marx begins with the commodity. Surplus value appears later.\n\n\
                 The analysis of the commodity comes first.",
            )
            .with_title("The Commodity")
            .with_author("Karl Marx")
            .with_source_url(format!("{BASE}/ch01.htm"))
            .with_collection("Capital, Volume I", Some(1))
            .with_subjects(vec!["Political Economy".to_string()])
            .with_cross_references(vec![
                "ch02.htm".to_string(),
                "../../../../glossary/people/m/a.htm#marx-karl".to_string(),
                "missing.htm".to_string(),
                "#s2".to_string(),
            ]),
            Document::new("Commodities cannot go to market by themselves.")
                .with_title("Exchange")
                .with_author("Karl Marx")
                .with_source_url(format!("{BASE}/ch02.htm"))
                .with_collection("Capital, Volume I", Some(2))
                .with_subjects(vec!["Political Economy".to_string()]),
            Document::new("On authority, a short polemic.")
                .with_title("On Authority")
                .with_author("Friedrich Engels"),
        ]
    }

    fn build() -> (KnowledgeGraph, Vec<Document>) {
        let glossary = glossary();
        let documents = documents();
        let engine = ChunkingEngine::default();
        let chunks: Vec<Chunk> = documents
            .iter()
            .flat_map(|doc| engine.chunk(doc).chunks)
            .collect();
        let index = Arc::new(EntityIndex::build(&glossary, EntityIndexConfig::default()));
        let graph = GraphBuilder::new(index).build(&glossary, &documents, &chunks);
        (graph, documents)
    }

    #[test]
    fn test_rebuild_is_identical() {
        let (first, _) = build();
        let (second, _) = build();

        let first_nodes: Vec<_> = first.nodes().cloned().collect();
        let second_nodes: Vec<_> = second.nodes().cloned().collect();
        let first_edges: Vec<_> = first.edges().cloned().collect();
        let second_edges: Vec<_> = second.edges().cloned().collect();

        assert!(!first_nodes.is_empty());
        assert_eq!(first_nodes, second_nodes);
        assert_eq!(first_edges, second_edges);
        assert_eq!(first.report(), second.report());
    }

    #[test]
    fn test_entities_and_chunks() {
        let (graph, documents) = build();

        let marx = graph.node("person:karl-marx").unwrap();
        assert_eq!(marx.label, "Karl Marx");
        assert_eq!(marx.properties["name"], "Karl Marx (1818-1883)");
        assert!(marx.aliases.contains(&"Marx, Karl".to_string()));
        assert!(graph.node("term:surplus-value").is_some());

        let work = documents[0].node_id();
        let chunk_edges: Vec<_> = graph
            .edges()
            .filter(|e| e.edge_type == EdgeType::ChunkOf && e.target == work)
            .collect();
        assert!(!chunk_edges.is_empty());
        for edge in chunk_edges {
            let chunk = graph.node(&edge.source).unwrap();
            assert_eq!(chunk.node_type, NodeType::Chunk);
            assert!(chunk.vector_id.is_some());
        }
    }

    #[test]
    fn test_authorship_and_placeholder() {
        let (graph, documents) = build();

        let capital = documents[0].node_id();
        let authored: Vec<_> = graph
            .edges_from(&capital, Some(EdgeType::AuthoredBy))
            .collect();
        assert_eq!(authored.len(), 1);
        assert_eq!(authored[0].target, "person:karl-marx");

        let engels = graph.node("person:friedrich-engels").unwrap();
        assert!(engels.is_placeholder());
        assert_eq!(graph.report().placeholder_authors, 1);

        let collection = "collection:karl-marx/capital-volume-i";
        assert_eq!(
            graph.node(collection).unwrap().node_type,
            NodeType::WorkCollection
        );
        let part_of: Vec<_> = graph.edges_from(&capital, Some(EdgeType::PartOf)).collect();
        assert_eq!(part_of[0].target, collection);
        assert_eq!(part_of[0].context.as_deref(), Some("chapter 1"));
        assert_eq!(
            graph
                .edges_from(collection, Some(EdgeType::AuthoredBy))
                .count(),
            1
        );
    }

    #[test]
    fn test_cross_references_resolve_relative_urls() {
        let (graph, documents) = build();
        let ch01 = documents[0].node_id();
        let ch02 = documents[1].node_id();

        let targets: Vec<_> = graph
            .edges_from(&ch01, Some(EdgeType::CrossReferences))
            .map(|e| e.target.clone())
            .collect();
        assert!(targets.contains(&ch02));
        assert!(targets.contains(&"person:karl-marx".to_string()));
        assert!(!targets.contains(&ch01));

        // glossary entries resolve through the url fragment
        assert_eq!(
            graph
                .edges_from("term:surplus-value", Some(EdgeType::CrossReferences))
                .count(),
            1
        );
        // "missing.htm" only
        assert_eq!(graph.report().unresolved_references, 1);
        assert_eq!(graph.node(&ch01).unwrap().cross_reference_count, 2);
        assert_eq!(graph.node("person:karl-marx").unwrap().cross_reference_count, 2);
    }

    #[test]
    fn test_mentions_keep_best_match_per_entity() {
        let (graph, documents) = build();
        let work = documents[0].node_id();
        let chunk = graph
            .edges()
            .find(|e| e.edge_type == EdgeType::ChunkOf && e.target == work)
            .map(|e| e.source.clone())
            .unwrap();

        let mentions: Vec<_> = graph
            .edges_from(&chunk, None)
            .filter(|e| e.edge_type.is_mention())
            .collect();
        let person = mentions
            .iter()
            .find(|e| e.edge_type == EdgeType::Mentions(EntityType::Person))
            .unwrap();
        assert_eq!(person.target, "person:karl-marx");
        assert_eq!(person.confidence, 1.0);
        assert!(person.context.as_deref().unwrap().contains("Karl Marx"));
        assert!(mentions
            .iter()
            .any(|e| e.edge_type == EdgeType::Mentions(EntityType::Term)));
    }

    #[test]
    fn test_categories_shared_across_documents() {
        let (graph, documents) = build();
        let category = graph.node("category:political-economy").unwrap();
        assert_eq!(category.node_type, NodeType::SubjectCategory);

        let linked = graph
            .edges()
            .filter(|e| e.edge_type == EdgeType::InCategory)
            .count();
        assert_eq!(linked, 2);
        assert!(graph
            .edges_from(&documents[2].node_id(), Some(EdgeType::InCategory))
            .next()
            .is_none());
    }

    #[test]
    fn test_duplicate_glossary_entries_merge_aliases() {
        let glossary = vec![
            GlossaryEntry::new("Paris Commune", EntityType::Event)
                .with_aliases(vec!["the Commune".to_string()]),
            GlossaryEntry::new("Paris Commune", EntityType::Event)
                .with_aliases(vec!["Commune of 1871".to_string()]),
        ];
        let index = Arc::new(EntityIndex::build(&glossary, EntityIndexConfig::default()));
        let doc = Document::new("Index of events.").with_section_type(SectionType::Index);
        let graph = GraphBuilder::new(index).build(&glossary, &[doc], &[]);

        let node = graph.node("event:paris-commune").unwrap();
        assert_eq!(node.aliases.len(), 2);
        assert_eq!(graph.report().duplicate_nodes, 1);
    }

    #[test]
    fn test_snippet_collapses_whitespace() {
        let text = "alpha\n\nbeta   Karl Marx   gamma";
        let start = text.find("Karl").unwrap();
        let s = snippet(text, &(start..start + 9));
        assert_eq!(s, "alpha beta Karl Marx gamma");
    }
}
