//! Entity index - glossary lookup and mention extraction
//!
//! Built once from the glossary and frozen; every lookup takes `&self`, so
//! one index is shared across chunking and graph-building workers.

use std::collections::HashMap;
use std::ops::Range;

use corpusrag_core::{ids, EntityIndexConfig, EntityType, GlossaryEntry};
use serde::Serialize;
use tracing::{debug, info, instrument};

const DERIVED_ALIAS_CONFIDENCE: f32 = 0.9;
const FUZZY_CEILING: f32 = 0.95;
const MIN_DERIVED_SURNAME_CHARS: usize = 4;
/// One edit allowed per this many chars of the glossary name
const CHARS_PER_EDIT: usize = 4;

/// How a name was matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Canonical name (or its "Surname, Given" form)
    Canonical,
    /// Alias listed in the glossary
    Alias,
    /// Surname derived from a person's name
    DerivedAlias,
    /// Within the edit-distance threshold of a known name
    Fuzzy { distance: usize },
}

/// A resolved name
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityMatch {
    pub entity_id: String,
    pub entity_type: EntityType,
    pub confidence: f32,
    pub kind: MatchKind,
}

/// A name found in running text
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mention {
    pub entity_id: String,
    pub entity_type: EntityType,
    /// Byte range of the matched text
    pub span: Range<usize>,
    pub matched: String,
    pub confidence: f32,
}

#[derive(Debug)]
struct IndexedEntity {
    id: String,
    entity_type: EntityType,
    name: String,
}

#[derive(Debug, Clone, Copy)]
struct Key {
    entity: usize,
    confidence: f32,
    kind: MatchKind,
}

/// Read-only lookup over the glossary
#[derive(Debug)]
pub struct EntityIndex {
    entities: Vec<IndexedEntity>,
    by_id: HashMap<String, usize>,
    /// normalized name -> entity
    names: HashMap<String, Key>,
    /// slug -> entity, for URL fragments
    slugs: HashMap<String, usize>,
    /// word count -> normalized names eligible for fuzzy matching
    fuzzy: HashMap<usize, Vec<String>>,
    config: EntityIndexConfig,
}

/// Lowercase alphanumeric runs joined by single spaces
fn normalize(name: &str) -> String {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// "Marx, Karl" -> "Karl Marx"
fn swap_comma_name(name: &str) -> Option<String> {
    let (surname, given) = name.split_once(',')?;
    let (surname, given) = (surname.trim(), given.trim());
    if surname.is_empty() || given.is_empty() {
        return None;
    }
    Some(format!("{given} {surname}"))
}

/// Byte spans of alphanumeric runs
fn word_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start = None;
    for (idx, c) in text.char_indices() {
        match (c.is_alphanumeric(), start) {
            (true, None) => start = Some(idx),
            (false, Some(s)) => {
                spans.push(s..idx);
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push(s..text.len());
    }
    spans
}

fn starts_uppercase(word: &str) -> bool {
    word.chars().next().is_some_and(char::is_uppercase)
}

/// Levenshtein distance over chars, `None` once it must exceed `max`
fn bounded_levenshtein(a: &str, b: &str, max: usize) -> Option<usize> {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.len().abs_diff(b.len()) > max {
        return None;
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        let mut row_min = curr[0];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
            row_min = row_min.min(curr[j + 1]);
        }
        if row_min > max {
            return None;
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    let distance = prev[b.len()];
    (distance <= max).then_some(distance)
}

impl EntityIndex {
    /// Build the index from glossary entries
    #[instrument(skip(entries, config), fields(entries = entries.len()))]
    pub fn build(entries: &[GlossaryEntry], config: EntityIndexConfig) -> Self {
        let mut index = Self {
            entities: Vec::with_capacity(entries.len()),
            by_id: HashMap::with_capacity(entries.len()),
            names: HashMap::new(),
            slugs: HashMap::new(),
            fuzzy: HashMap::new(),
            config,
        };

        // entity slot for each entry, duplicates share the first slot
        let mut slots = Vec::with_capacity(entries.len());
        for entry in entries {
            let id = entry.node_id();
            let slot = match index.by_id.get(&id) {
                Some(&slot) => slot,
                None => {
                    let slot = index.entities.len();
                    index.entities.push(IndexedEntity {
                        id: id.clone(),
                        entity_type: entry.entity_type,
                        name: entry.display_name().to_string(),
                    });
                    index.by_id.insert(id, slot);
                    slot
                }
            };
            slots.push(slot);
        }

        // canonical names first so they win over any alias collision
        for (entry, &slot) in entries.iter().zip(&slots) {
            for name in [entry.name.as_str(), entry.display_name()] {
                index.register(name, slot, 1.0, MatchKind::Canonical);
                if let Some(swapped) = swap_comma_name(name) {
                    index.register(&swapped, slot, 1.0, MatchKind::Canonical);
                }
            }
        }
        for (entry, &slot) in entries.iter().zip(&slots) {
            for alias in &entry.aliases {
                index.register(ids::strip_parenthetical(alias), slot, 1.0, MatchKind::Alias);
                if let Some(swapped) = swap_comma_name(alias) {
                    index.register(&swapped, slot, 1.0, MatchKind::Alias);
                }
            }
        }
        if index.config.derive_surname_aliases {
            index.derive_surnames(entries, &slots);
        }

        for (entry, &slot) in entries.iter().zip(&slots) {
            index.register_slugs(entry, slot);
        }

        let min_chars = index.config.fuzzy_min_chars;
        for key in index.names.keys() {
            if key.chars().count() >= min_chars {
                let words = key.split(' ').count();
                index.fuzzy.entry(words).or_default().push(key.clone());
            }
        }
        for keys in index.fuzzy.values_mut() {
            keys.sort();
        }

        info!(
            entities = index.entities.len(),
            names = index.names.len(),
            "Entity index built"
        );
        index
    }

    fn register(&mut self, name: &str, entity: usize, confidence: f32, kind: MatchKind) {
        let key = normalize(name);
        if key.is_empty() {
            return;
        }
        match self.names.get(&key) {
            Some(existing) if existing.entity != entity => {
                debug!(name = %key, kept = %self.entities[existing.entity].id, "Ambiguous name, keeping first");
            }
            Some(_) => {}
            None => {
                self.names.insert(key, Key { entity, confidence, kind });
            }
        }
    }

    /// Last name of each person, when no other person shares it
    fn derive_surnames(&mut self, entries: &[GlossaryEntry], slots: &[usize]) {
        let mut owners: HashMap<String, Vec<usize>> = HashMap::new();
        for (entry, &slot) in entries.iter().zip(slots) {
            if entry.entity_type != EntityType::Person {
                continue;
            }
            let name = swap_comma_name(entry.display_name())
                .unwrap_or_else(|| entry.display_name().to_string());
            let key = normalize(&name);
            let mut words = key.split(' ');
            let Some(surname) = words.next_back() else {
                continue;
            };
            if words.next().is_none() || surname.chars().count() < MIN_DERIVED_SURNAME_CHARS {
                continue;
            }
            let owner = owners.entry(surname.to_string()).or_default();
            if !owner.contains(&slot) {
                owner.push(slot);
            }
        }

        for (surname, owner) in owners {
            if owner.len() == 1 && !self.names.contains_key(&surname) {
                self.names.insert(
                    surname,
                    Key {
                        entity: owner[0],
                        confidence: DERIVED_ALIAS_CONFIDENCE,
                        kind: MatchKind::DerivedAlias,
                    },
                );
            }
        }
    }

    fn register_slugs(&mut self, entry: &GlossaryEntry, slot: usize) {
        let display = entry.display_name();
        let mut forms = vec![display.to_string(), entry.name.clone()];
        forms.extend(swap_comma_name(display));
        forms.extend(entry.aliases.iter().cloned());

        if entry.entity_type == EntityType::Person {
            let words: Vec<&str> = display.split_whitespace().collect();
            if let Some((last, rest)) = words.split_last() {
                if !rest.is_empty() {
                    forms.push(format!("{} {}", last, rest.join(" ")));
                }
            }
        }

        for form in forms {
            let slug = ids::slugify(&form);
            if !slug.is_empty() {
                self.slugs.entry(slug).or_insert(slot);
            }
        }
    }

    fn find(&self, name: &str) -> Option<Key> {
        let key = normalize(ids::strip_parenthetical(name));
        if key.is_empty() {
            return None;
        }
        if let Some(hit) = self.names.get(&key) {
            return Some(*hit);
        }
        if let Some(swapped) = swap_comma_name(name) {
            if let Some(hit) = self.names.get(&normalize(&swapped)) {
                return Some(*hit);
            }
        }
        self.fuzzy_find(&key)
    }

    fn fuzzy_find(&self, key: &str) -> Option<Key> {
        if !self.config.fuzzy_enabled {
            return None;
        }
        let chars = key.chars().count();
        if chars < self.config.fuzzy_min_chars {
            return None;
        }

        let words = key.split(' ').count();
        let mut best: Option<(usize, &String)> = None;
        for candidate in self.fuzzy.get(&words).into_iter().flatten() {
            let max = self
                .config
                .fuzzy_max_distance
                .min(candidate.chars().count() / CHARS_PER_EDIT);
            let Some(distance) = bounded_levenshtein(key, candidate, max) else {
                continue;
            };
            if distance == 0 {
                continue;
            }
            if best.map_or(true, |(d, _)| distance < d) {
                best = Some((distance, candidate));
            }
        }

        let (distance, candidate) = best?;
        let exact = self.names.get(candidate)?;
        let len = candidate.chars().count().max(1) as f32;
        let confidence = exact.confidence * FUZZY_CEILING * (1.0 - distance as f32 / len);
        Some(Key {
            entity: exact.entity,
            confidence: confidence.max(0.0),
            kind: MatchKind::Fuzzy { distance },
        })
    }

    fn to_match(&self, key: Key) -> EntityMatch {
        let entity = &self.entities[key.entity];
        EntityMatch {
            entity_id: entity.id.clone(),
            entity_type: entity.entity_type,
            confidence: key.confidence,
            kind: key.kind,
        }
    }

    /// Entity id for a name: exact, alias, then fuzzy
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.find(name).map(|key| self.entities[key.entity].id.as_str())
    }

    /// Like [`resolve`](Self::resolve), with confidence and match kind
    pub fn lookup(&self, name: &str) -> Option<EntityMatch> {
        self.find(name).map(|key| self.to_match(key))
    }

    /// Entity id for a URL fragment or page slug, e.g. `glossary/m.htm#marx-karl`
    pub fn resolve_slug(&self, reference: &str) -> Option<&str> {
        let reference = reference.trim();
        let fragment = match reference.rsplit_once('#') {
            Some((_, fragment)) => fragment,
            None => {
                let segment = reference.trim_end_matches('/').rsplit('/').next().unwrap_or(reference);
                segment
                    .strip_suffix(".html")
                    .or_else(|| segment.strip_suffix(".htm"))
                    .or_else(|| segment.strip_suffix(".md"))
                    .unwrap_or(segment)
            }
        };
        let slug = ids::slugify(fragment);
        self.slugs
            .get(&slug)
            .map(|&slot| self.entities[slot].id.as_str())
    }

    /// All entity names in `text`, longest match first at each position.
    ///
    /// Every occurrence is returned; exact matches carry their registered
    /// confidence, fuzzy matches strictly less.
    pub fn mentions_in(&self, text: &str) -> Vec<Mention> {
        let spans = word_spans(text);
        let lower: Vec<String> = spans.iter().map(|s| text[s.clone()].to_lowercase()).collect();
        let max_words = self.config.max_name_words.max(1);

        let mut mentions = Vec::new();
        let mut i = 0;
        while i < spans.len() {
            let longest = max_words.min(spans.len() - i);
            let mut found: Option<(usize, Key)> = None;

            for len in (1..=longest).rev() {
                let key = lower[i..i + len].join(" ");
                if let Some(hit) = self.names.get(&key) {
                    found = Some((len, *hit));
                    break;
                }
            }

            if found.is_none() && self.config.fuzzy_enabled {
                for len in (1..=longest).rev() {
                    let first = &text[spans[i].clone()];
                    let last = &text[spans[i + len - 1].clone()];
                    if !starts_uppercase(first) || !starts_uppercase(last) {
                        continue;
                    }
                    let key = lower[i..i + len].join(" ");
                    if let Some(hit) = self.fuzzy_find(&key) {
                        found = Some((len, hit));
                        break;
                    }
                }
            }

            match found {
                Some((len, key)) => {
                    let span = spans[i].start..spans[i + len - 1].end;
                    let entity = &self.entities[key.entity];
                    mentions.push(Mention {
                        entity_id: entity.id.clone(),
                        entity_type: entity.entity_type,
                        matched: text[span.clone()].to_string(),
                        span,
                        confidence: key.confidence,
                    });
                    i += len;
                }
                None => i += 1,
            }
        }
        mentions
    }

    pub fn entity_type(&self, id: &str) -> Option<EntityType> {
        self.by_id.get(id).map(|&slot| self.entities[slot].entity_type)
    }

    /// Display name of an entity
    pub fn name(&self, id: &str) -> Option<&str> {
        self.by_id.get(id).map(|&slot| self.entities[slot].name.as_str())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
