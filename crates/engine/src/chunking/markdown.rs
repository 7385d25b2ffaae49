//! Markdown structure as byte spans of the source text
//!
//! Headings, sections, paragraphs, sentences and words are all returned as
//! ranges into the original string so that chunk content can be sliced
//! verbatim.

use std::ops::Range;
use std::sync::LazyLock;

use corpusrag_core::Section;
use regex::Regex;

static MARKDOWN_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\[[^\]]*\]\(\s*<?([^)\s>]+)>?(?:\s+"[^"]*")?\s*\)"#)
        .expect("markdown link pattern is valid")
});

/// An ATX heading line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heading<'a> {
    pub level: u8,
    pub title: &'a str,
    /// Byte offset of the heading line
    pub start: usize,
}

/// Headings of a document with their ancestor chains
#[derive(Debug, Clone)]
pub struct Outline<'a> {
    pub headings: Vec<Heading<'a>>,
    chains: Vec<Vec<&'a str>>,
}

impl<'a> Outline<'a> {
    pub fn parse(text: &'a str) -> Self {
        let headings = parse_headings(text);
        let mut stack: Vec<(u8, &'a str)> = Vec::new();
        let chains = headings
            .iter()
            .map(|heading| {
                while stack.last().is_some_and(|(level, _)| *level >= heading.level) {
                    stack.pop();
                }
                let chain = stack.iter().map(|(_, title)| *title).collect();
                stack.push((heading.level, heading.title));
                chain
            })
            .collect();
        Self { headings, chains }
    }

    pub fn is_empty(&self) -> bool {
        self.headings.is_empty()
    }

    /// Deepest heading level present (0 when there are no headings)
    pub fn deepest_level(&self) -> u8 {
        self.headings.iter().map(|h| h.level).max().unwrap_or(0)
    }

    /// Whether any heading inside `range` has a level of at most `max_level`
    pub fn has_cut(&self, range: &Range<usize>, max_level: u8) -> bool {
        self.headings
            .iter()
            .any(|h| range.contains(&h.start) && h.level <= max_level)
    }

    /// Heading chain enclosing byte offset `pos`, outermost first
    fn enclosing(&self, pos: usize) -> Vec<&'a str> {
        match self.headings.iter().rposition(|h| h.start < pos) {
            Some(idx) => {
                let mut chain = self.chains[idx].clone();
                chain.push(self.headings[idx].title);
                chain
            }
            None => Vec::new(),
        }
    }

    /// Split `range` of `text` at headings of level `<= max_level`.
    ///
    /// Text before the first cut becomes a heading-less section; blank
    /// segments are dropped.
    pub fn sections(&self, text: &'a str, range: Range<usize>, max_level: u8) -> Vec<Section<'a>> {
        let cuts: Vec<usize> = self
            .headings
            .iter()
            .enumerate()
            .filter(|(_, h)| range.contains(&h.start) && h.level <= max_level)
            .map(|(idx, _)| idx)
            .collect();

        let mut sections = Vec::with_capacity(cuts.len() + 1);
        let first_cut = cuts
            .first()
            .map_or(range.end, |&idx| self.headings[idx].start);

        if !text[range.start..first_cut].trim().is_empty() {
            sections.push(Section {
                heading: None,
                level: 0,
                hierarchy: self.enclosing(range.start),
                content: &text[range.start..first_cut],
                span: range.start..first_cut,
            });
        }

        for (n, &idx) in cuts.iter().enumerate() {
            let heading = self.headings[idx];
            let end = cuts
                .get(n + 1)
                .map_or(range.end, |&next| self.headings[next].start);
            sections.push(Section {
                heading: Some(heading.title),
                level: heading.level,
                hierarchy: self.chains[idx].clone(),
                content: &text[heading.start..end],
                span: heading.start..end,
            });
        }

        sections
    }
}

/// ATX headings outside fenced code blocks
pub fn parse_headings(text: &str) -> Vec<Heading<'_>> {
    let mut headings = Vec::new();
    let mut in_fence = false;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let start = offset;
        offset += line.len();

        let indent = line.len() - line.trim_start_matches(' ').len();
        if indent > 3 {
            continue;
        }
        let body = line[indent..].trim_end();

        if body.starts_with("```") || body.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }

        let hashes = body.len() - body.trim_start_matches('#').len();
        if hashes == 0 || hashes > 6 {
            continue;
        }
        let rest = &body[hashes..];
        if !rest.is_empty() && !rest.starts_with([' ', '\t']) {
            continue;
        }

        let mut title = rest.trim();
        let closing = title.trim_end_matches('#');
        if closing.is_empty() || closing.ends_with([' ', '\t']) {
            title = closing.trim_end();
        }

        headings.push(Heading {
            level: hashes as u8,
            title,
            start,
        });
    }

    headings
}

/// Blank-line separated paragraphs, trimmed of trailing whitespace
pub fn paragraphs(text: &str, range: Range<usize>) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut current: Option<Range<usize>> = None;
    let mut offset = range.start;

    for line in text[range.clone()].split_inclusive('\n') {
        let start = offset;
        offset += line.len();

        let trimmed = line.trim_end();
        if trimmed.trim_start().is_empty() {
            if let Some(span) = current.take() {
                spans.push(span);
            }
            continue;
        }

        let end = start + trimmed.len();
        match current.as_mut() {
            Some(span) => span.end = end,
            None => {
                let lead = trimmed.len() - trimmed.trim_start().len();
                current = Some(start + lead..end);
            }
        }
    }

    if let Some(span) = current {
        spans.push(span);
    }
    spans
}

/// Sentences ending in `.`, `!` or `?` followed by whitespace
pub fn sentences(text: &str, range: Range<usize>) -> Vec<Range<usize>> {
    let slice = &text[range.clone()];
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;
    let mut chars = slice.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        if start.is_none() && !c.is_whitespace() {
            start = Some(idx);
        }
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }

        let mut end = idx + c.len_utf8();
        while let Some(&(next_idx, next)) = chars.peek() {
            if matches!(next, '"' | '\'' | ')' | ']' | '\u{201d}' | '\u{2019}') {
                end = next_idx + next.len_utf8();
                chars.next();
            } else {
                break;
            }
        }

        let boundary = chars.peek().map_or(true, |&(_, next)| next.is_whitespace());
        if boundary {
            if let Some(s) = start.take() {
                spans.push(range.start + s..range.start + end);
            }
        }
    }

    if let Some(s) = start {
        let tail = slice[s..].trim_end();
        if !tail.is_empty() {
            spans.push(range.start + s..range.start + s + tail.len());
        }
    }
    spans
}

/// Whitespace-delimited words
pub fn words(text: &str, range: Range<usize>) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;

    for (idx, c) in text[range.clone()].char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push(range.start + s..range.start + idx);
                start = None;
            }
            (false, None) => start = Some(idx),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push(range.start + s..range.end);
    }
    spans
}

/// Markdown link targets in order of appearance, deduplicated
pub fn link_targets(text: &str) -> Vec<String> {
    let mut targets: Vec<String> = Vec::new();
    for capture in MARKDOWN_LINK.captures_iter(text) {
        if let Some(target) = capture.get(1) {
            let target = target.as_str().to_string();
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
    }
    targets
}

/// Largest char boundary `<= idx`
pub fn floor_char_boundary(text: &str, idx: usize) -> usize {
    if idx >= text.len() {
        return text.len();
    }
    let mut idx = idx;
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
