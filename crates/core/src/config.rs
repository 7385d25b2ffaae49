//! Pipeline configuration with environment overrides

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::document::SectionType;
use crate::error::{CoreError, Result};

const DEFAULT_SOFT_MIN_TOKENS: usize = 256;
const DEFAULT_SOFT_MAX_TOKENS: usize = 512;
const DEFAULT_HARD_MAX_TOKENS: usize = 1024;
const DEFAULT_TOKENS_PER_WORD: f32 = 1.3;
const DEFAULT_TOKEN_WINDOW: usize = 512;
const DEFAULT_TOKEN_OVERLAP: f32 = 0.1;
const DEFAULT_PRIMARY_HEADING_LEVEL: u8 = 3;
const DEFAULT_FUZZY_MAX_DISTANCE: usize = 2;
const DEFAULT_FUZZY_MIN_CHARS: usize = 5;
const DEFAULT_MAX_NAME_WORDS: usize = 6;
const DEFAULT_VECTOR_WEIGHT: f32 = 0.7;
const DEFAULT_GRAPH_WEIGHT: f32 = 0.3;
const DEFAULT_CANDIDATE_MULTIPLIER: usize = 2;
const DEFAULT_MAX_GRAPH_CANDIDATES: usize = 50;
const DEFAULT_VECTOR_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_GRAPH_BATCH_SIZE: usize = 500;

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|value| {
        let value = value.trim().to_ascii_lowercase();
        matches!(value.as_str(), "1" | "true" | "yes" | "on")
    })
}

/// Chunk size bounds and strategy knobs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunkingConfig {
    pub soft_min_tokens: usize,
    pub soft_max_tokens: usize,
    /// Absolute ceiling; forces splitting or truncation
    pub hard_max_tokens: usize,
    /// Whitespace-word to token scale used when no tokenizer is available
    pub tokens_per_word: f32,
    /// Window size for the token-based fallback
    pub token_window: usize,
    /// Overlap between consecutive windows, as a fraction of the window
    pub token_overlap_fraction: f32,
    /// Heading level that delimits sections when nothing more specific is configured
    pub default_primary_heading_level: u8,
    /// Per-section-type primary heading level
    pub primary_heading_levels: BTreeMap<SectionType, u8>,
    /// Heading level of glossary entries (`None` = primary level of the section type)
    pub entry_heading_level: Option<u8>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        let primary_heading_levels = BTreeMap::from([
            (SectionType::Glossary, 3),
            (SectionType::Reference, 4),
            (SectionType::Subject, 4),
        ]);

        Self {
            soft_min_tokens: DEFAULT_SOFT_MIN_TOKENS,
            soft_max_tokens: DEFAULT_SOFT_MAX_TOKENS,
            hard_max_tokens: DEFAULT_HARD_MAX_TOKENS,
            tokens_per_word: DEFAULT_TOKENS_PER_WORD,
            token_window: DEFAULT_TOKEN_WINDOW,
            token_overlap_fraction: DEFAULT_TOKEN_OVERLAP,
            default_primary_heading_level: DEFAULT_PRIMARY_HEADING_LEVEL,
            primary_heading_levels,
            entry_heading_level: None,
        }
    }
}

impl ChunkingConfig {
    /// Primary heading level for a section type
    pub fn primary_heading_level(&self, section_type: SectionType) -> u8 {
        self.primary_heading_levels
            .get(&section_type)
            .copied()
            .unwrap_or(self.default_primary_heading_level)
    }

    /// Window and overlap for the token fallback, in whitespace words
    pub fn window_words(&self) -> (usize, usize) {
        let window = ((self.token_window as f32 / self.tokens_per_word).floor() as usize).max(1);
        let overlap = (window as f32 * self.token_overlap_fraction).round() as usize;
        (window, overlap.min(window.saturating_sub(1)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.soft_min_tokens == 0 || self.soft_min_tokens > self.soft_max_tokens {
            return Err(CoreError::InvalidConfig(format!(
                "soft band [{}, {}] is empty",
                self.soft_min_tokens, self.soft_max_tokens
            )));
        }
        if self.soft_min_tokens + self.soft_max_tokens > self.hard_max_tokens {
            return Err(CoreError::InvalidConfig(format!(
                "soft_min + soft_max ({}) exceeds hard_max ({})",
                self.soft_min_tokens + self.soft_max_tokens,
                self.hard_max_tokens
            )));
        }
        if !(self.tokens_per_word > 0.0) {
            return Err(CoreError::InvalidConfig("tokens_per_word must be positive".into()));
        }
        if self.token_window == 0 || self.token_window > self.hard_max_tokens {
            return Err(CoreError::InvalidConfig(format!(
                "token_window {} must be in [1, hard_max]",
                self.token_window
            )));
        }
        if !(0.0..0.5).contains(&self.token_overlap_fraction) {
            return Err(CoreError::InvalidConfig(
                "token_overlap_fraction must be in [0, 0.5)".into(),
            ));
        }
        let levels = std::iter::once(self.default_primary_heading_level)
            .chain(self.primary_heading_levels.values().copied())
            .chain(self.entry_heading_level);
        for level in levels {
            if !(1..=6).contains(&level) {
                return Err(CoreError::InvalidConfig(format!(
                    "heading level {level} outside 1..=6"
                )));
            }
        }
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Some(v) = env_parse("CORPUSRAG_SOFT_MIN_TOKENS") {
            self.soft_min_tokens = v;
        }
        if let Some(v) = env_parse("CORPUSRAG_SOFT_MAX_TOKENS") {
            self.soft_max_tokens = v;
        }
        if let Some(v) = env_parse("CORPUSRAG_HARD_MAX_TOKENS") {
            self.hard_max_tokens = v;
        }
        if let Some(v) = env_parse("CORPUSRAG_TOKENS_PER_WORD") {
            self.tokens_per_word = v;
        }
        if let Some(v) = env_parse("CORPUSRAG_TOKEN_WINDOW") {
            self.token_window = v;
        }
        if let Some(v) = env_parse("CORPUSRAG_TOKEN_OVERLAP") {
            self.token_overlap_fraction = v;
        }
        if let Some(v) = env_parse("CORPUSRAG_PRIMARY_HEADING_LEVEL") {
            self.default_primary_heading_level = v;
        }
        if let Some(v) = env_parse("CORPUSRAG_ENTRY_HEADING_LEVEL") {
            self.entry_heading_level = Some(v);
        }
    }
}

/// Name matching knobs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EntityIndexConfig {
    pub fuzzy_enabled: bool,
    /// Maximum edit distance for a fuzzy match; names allow one edit per four chars up to this cap
    pub fuzzy_max_distance: usize,
    /// Names shorter than this only match exactly
    pub fuzzy_min_chars: usize,
    /// Longest name (in words) considered by mention scanning
    pub max_name_words: usize,
    /// Register unambiguous surnames of people as aliases
    pub derive_surname_aliases: bool,
}

impl Default for EntityIndexConfig {
    fn default() -> Self {
        Self {
            fuzzy_enabled: true,
            fuzzy_max_distance: DEFAULT_FUZZY_MAX_DISTANCE,
            fuzzy_min_chars: DEFAULT_FUZZY_MIN_CHARS,
            max_name_words: DEFAULT_MAX_NAME_WORDS,
            derive_surname_aliases: true,
        }
    }
}

impl EntityIndexConfig {
    fn apply_env(&mut self) {
        if let Some(v) = env_flag("CORPUSRAG_FUZZY_ENABLED") {
            self.fuzzy_enabled = v;
        }
        if let Some(v) = env_parse("CORPUSRAG_FUZZY_MAX_DISTANCE") {
            self.fuzzy_max_distance = v;
        }
        if let Some(v) = env_parse("CORPUSRAG_FUZZY_MIN_CHARS") {
            self.fuzzy_min_chars = v;
        }
        if let Some(v) = env_parse("CORPUSRAG_MAX_NAME_WORDS") {
            self.max_name_words = v;
        }
    }
}

/// How graph relevance turns into a boost
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BoostMode {
    /// 1.0 if the chunk is graph-related, else 0.0
    #[default]
    Binary,
    /// Mention-edge confidence scaled by query-entity confidence
    Graduated,
}

/// Hybrid retrieval knobs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub vector_weight: f32,
    pub graph_weight: f32,
    /// Candidate set size = n_results * multiplier
    pub candidate_multiplier: usize,
    pub boost_mode: BoostMode,
    /// Cap on graph-related chunks pulled in from outside the vector candidates
    pub max_graph_candidates: usize,
    pub vector_timeout_ms: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            vector_weight: DEFAULT_VECTOR_WEIGHT,
            graph_weight: DEFAULT_GRAPH_WEIGHT,
            candidate_multiplier: DEFAULT_CANDIDATE_MULTIPLIER,
            boost_mode: BoostMode::Binary,
            max_graph_candidates: DEFAULT_MAX_GRAPH_CANDIDATES,
            vector_timeout_ms: DEFAULT_VECTOR_TIMEOUT_MS,
        }
    }
}

impl RetrievalConfig {
    pub fn vector_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.vector_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, weight) in [("vector_weight", self.vector_weight), ("graph_weight", self.graph_weight)] {
            if !(0.0..=1.0).contains(&weight) {
                return Err(CoreError::InvalidConfig(format!("{name} must be in [0, 1]")));
            }
        }
        if self.candidate_multiplier == 0 {
            return Err(CoreError::InvalidConfig("candidate_multiplier must be >= 1".into()));
        }
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Some(v) = env_parse("CORPUSRAG_VECTOR_WEIGHT") {
            self.vector_weight = v;
        }
        if let Some(v) = env_parse("CORPUSRAG_GRAPH_WEIGHT") {
            self.graph_weight = v;
        }
        if let Some(v) = env_parse("CORPUSRAG_CANDIDATE_MULTIPLIER") {
            self.candidate_multiplier = v;
        }
        if let Ok(mode) = std::env::var("CORPUSRAG_BOOST_MODE") {
            match mode.trim().to_ascii_lowercase().as_str() {
                "graduated" => self.boost_mode = BoostMode::Graduated,
                "binary" => self.boost_mode = BoostMode::Binary,
                _ => {}
            }
        }
        if let Some(v) = env_parse("CORPUSRAG_MAX_GRAPH_CANDIDATES") {
            self.max_graph_candidates = v;
        }
        if let Some(v) = env_parse("CORPUSRAG_VECTOR_TIMEOUT_MS") {
            self.vector_timeout_ms = v;
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub chunking: ChunkingConfig,
    pub entities: EntityIndexConfig,
    pub retrieval: RetrievalConfig,
    /// Worker threads for chunking and mention extraction (0 = one per core)
    pub workers: usize,
    /// Nodes/edges per storage upsert batch
    pub graph_batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            entities: EntityIndexConfig::default(),
            retrieval: RetrievalConfig::default(),
            workers: 0,
            graph_batch_size: DEFAULT_GRAPH_BATCH_SIZE,
        }
    }
}

impl PipelineConfig {
    /// Defaults overlaid with `CORPUSRAG_*` environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.chunking.apply_env();
        config.entities.apply_env();
        config.retrieval.apply_env();
        if let Some(v) = env_parse("CORPUSRAG_WORKERS") {
            config.workers = v;
        }
        if let Some(v) = env_parse::<usize>("CORPUSRAG_GRAPH_BATCH_SIZE").filter(|v| *v > 0) {
            config.graph_batch_size = v;
        }
        config
    }

    /// Parse from JSON (missing fields take defaults)
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        self.retrieval.validate()?;
        if self.graph_batch_size == 0 {
            return Err(CoreError::InvalidConfig("graph_batch_size must be >= 1".into()));
        }
        Ok(())
    }
}
