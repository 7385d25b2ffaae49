//! Common test fixtures

#![allow(dead_code)]

use std::collections::BTreeMap;

use async_trait::async_trait;
use corpusrag_core::{Document, EntityType, GlossaryEntry, RagPriority, SectionType};
use corpusrag_engine::{Result, VectorHit, VectorIndex};
use serde_json::Value;

pub const CAPITAL_URL: &str = "https://www.marxists.org/archive/marx/works/1867-c1/ch01.htm";

pub fn glossary() -> Vec<GlossaryEntry> {
    vec![
        GlossaryEntry::new("Karl Marx (1818-1883)", EntityType::Person)
            .with_definition("German philosopher, economist and revolutionary."),
        GlossaryEntry::new("Mao Zedong (1893-1976)", EntityType::Person)
            .with_definition("Chinese revolutionary and founder of the People's Republic."),
        GlossaryEntry::new("Surplus Value", EntityType::Term)
            .with_aliases(vec!["surplus-value".to_string()]),
        GlossaryEntry::new("Paris Commune", EntityType::Event),
    ]
}

/// Two people entries under a letter heading
pub fn glossary_document() -> Document {
    Document::new(
        "## M\n\n\
         ### Karl Marx (1818-1883)\n\n\
         German philosopher and economist, co-author of the Manifesto with \
         [Engels](../e/n.htm#engels-friedrich).\n\n\
         ### Mao Zedong (1893-1976)\n\n\
         Chinese revolutionary, chairman of the Chinese Communist Party.",
    )
    .with_title("Glossary of People: M")
    .with_section_type(SectionType::Glossary)
    .with_priority(RagPriority::High)
}

/// No headings, about 2,000 estimated tokens
pub fn flat_document() -> Document {
    let text = (0..40)
        .map(|p| {
            (0..38)
                .map(|w| format!("labour{p}w{w}"))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    Document::new(text)
        .with_title("Notes on Labour")
        .with_author("Anonymous")
        .with_heading_depth(0)
}

pub fn index_document() -> Document {
    Document::new("Abstract labour, 12; Accumulation, 40; Alienation, 7")
        .with_title("Subject Index")
        .with_section_type(SectionType::Index)
        .with_priority(RagPriority::Low)
}

pub fn capital_document() -> Document {
    Document::new(
        "# Capital\n\n## Part I\n\n### Chapter 1: Commodities\n\n\
         The wealth of societies in which the capitalist mode of production \
         prevails presents itself as an immense accumulation of commodities.\n\n\
         ### Section 2\n\n\
         The two-fold character of the labour contained in commodities.",
    )
    .with_title("Capital, Volume I, Chapter 1")
    .with_author("Karl Marx")
    .with_heading_depth(3)
    .with_source_url(CAPITAL_URL)
    .with_collection("Capital, Volume I", Some(1))
    .with_subjects(vec!["Political Economy".to_string()])
    .with_cross_references(vec![
        "../../../../glossary/terms/s/u.htm#surplus-value".to_string(),
        "ch02.htm".to_string(),
    ])
}

/// Headed text whose extractor record reports no headings
pub fn mislabelled_document() -> Document {
    Document::new(
        "### First Thesis\n\nThe philosophers have only interpreted the world.\n\n\
         ### Second Thesis\n\nThe point, however, is to change it.",
    )
    .with_title("Theses")
    .with_heading_depth(0)
}

/// Two distinct prefaces by the same author
pub fn prefaces() -> Vec<Document> {
    ["Preface to the first German edition.", "Preface to the second German edition."]
        .into_iter()
        .map(|text| Document::new(text).with_title("Preface").with_author("Karl Marx"))
        .collect()
}

pub fn corpus() -> Vec<Document> {
    vec![
        glossary_document(),
        flat_document(),
        index_document(),
        capital_document(),
    ]
}

pub fn squash(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Vector index with a fixed similarity per chunk, whatever the query
pub struct StaticVectorIndex {
    entries: BTreeMap<String, (f32, String)>,
}

impl StaticVectorIndex {
    pub fn new(entries: impl IntoIterator<Item = (String, f32, String)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(id, score, content)| (id, (score, content)))
                .collect(),
        }
    }

    fn ranked(&self, allowed: Option<&[String]>, k: usize) -> Vec<VectorHit> {
        let mut hits: Vec<VectorHit> = self
            .entries
            .iter()
            .filter(|(id, _)| allowed.map_or(true, |ids| ids.contains(id)))
            .map(|(id, (score, content))| VectorHit {
                chunk_id: id.clone(),
                similarity: *score,
                content: content.clone(),
                metadata: Value::Null,
            })
            .collect();
        hits.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(k);
        hits
    }
}

#[async_trait]
impl VectorIndex for StaticVectorIndex {
    async fn search(&self, _query: &str, k: usize) -> Result<Vec<VectorHit>> {
        Ok(self.ranked(None, k))
    }

    async fn search_within(&self, _query: &str, chunk_ids: &[String], k: usize) -> Result<Vec<VectorHit>> {
        Ok(self.ranked(Some(chunk_ids), k))
    }

    async fn upsert(&self, _chunk_id: &str, _vector: Vec<f32>, _payload: Value) -> Result<()> {
        Ok(())
    }
}
