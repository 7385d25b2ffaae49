//! Size-bounded units and greedy packing

use std::ops::Range;

use corpusrag_core::ChunkingConfig;

use super::markdown;
use super::Pass;

/// A span that fits under the hard maximum on its own
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Unit {
    pub span: Range<usize>,
    pub tokens: usize,
    /// Index of the section or paragraph the unit came from
    pub group: usize,
    /// Produced by a fixed-size word split
    pub fixed: bool,
}

impl Unit {
    fn new(pass: &Pass<'_>, span: Range<usize>, group: usize) -> Self {
        Self {
            tokens: pass.count(&span),
            span,
            group,
            fixed: false,
        }
    }
}

/// One unit for `span`, or paragraph, sentence and fixed-size pieces if it
/// exceeds the hard maximum
pub(crate) fn split_oversized(pass: &Pass<'_>, span: Range<usize>, group: usize) -> Vec<Unit> {
    let unit = Unit::new(pass, span.clone(), group);
    if unit.tokens <= pass.config.hard_max_tokens {
        return vec![unit];
    }

    let paragraphs = markdown::paragraphs(pass.text, span.clone());
    if paragraphs.len() > 1 {
        paragraphs
            .into_iter()
            .flat_map(|p| split_paragraph(pass, p, group))
            .collect()
    } else {
        split_paragraph(pass, span, group)
    }
}

/// Split a paragraph at sentences, falling back to fixed word windows
pub(crate) fn split_paragraph(pass: &Pass<'_>, span: Range<usize>, group: usize) -> Vec<Unit> {
    let unit = Unit::new(pass, span.clone(), group);
    if unit.tokens <= pass.config.hard_max_tokens {
        return vec![unit];
    }

    let sentences = markdown::sentences(pass.text, span.clone());
    if sentences.len() <= 1 {
        return split_fixed(pass, span, group);
    }

    sentences
        .into_iter()
        .flat_map(|sentence| {
            let unit = Unit::new(pass, sentence.clone(), group);
            if unit.tokens <= pass.config.hard_max_tokens {
                vec![unit]
            } else {
                split_fixed(pass, sentence, group)
            }
        })
        .collect()
}

/// Windows of whole words sized to the soft maximum
fn split_fixed(pass: &Pass<'_>, span: Range<usize>, group: usize) -> Vec<Unit> {
    let words = markdown::words(pass.text, span);
    let per_window =
        ((pass.config.soft_max_tokens as f32 / pass.config.tokens_per_word).floor() as usize).max(1);

    words
        .chunks(per_window)
        .map(|window| {
            let span = window[0].start..window[window.len() - 1].end;
            Unit {
                fixed: true,
                ..Unit::new(pass, span, group)
            }
        })
        .collect()
}

/// Greedy packing into index ranges over `units`.
///
/// A group closes when the next unit would push it past the soft maximum
/// (once it has reached the soft minimum) or past the hard maximum. A short
/// final group is folded into its predecessor when both fit.
pub(crate) fn pack(units: &[Unit], config: &ChunkingConfig) -> Vec<Range<usize>> {
    let mut groups = Vec::new();
    let mut start = 0;
    let mut current = 0;

    for (idx, unit) in units.iter().enumerate() {
        if idx > start {
            let next = current + unit.tokens;
            let past_soft = next > config.soft_max_tokens && current >= config.soft_min_tokens;
            if past_soft || next > config.hard_max_tokens {
                groups.push(start..idx);
                start = idx;
                current = 0;
            }
        }
        current += unit.tokens;
    }
    if start < units.len() {
        groups.push(start..units.len());
    }

    if groups.len() >= 2 {
        let size = |range: &Range<usize>| units[range.clone()].iter().map(|u| u.tokens).sum::<usize>();
        let last = groups[groups.len() - 1].clone();
        let prev = groups[groups.len() - 2].clone();
        let (last_size, prev_size) = (size(&last), size(&prev));
        if last_size < config.soft_min_tokens && prev_size + last_size <= config.hard_max_tokens {
            groups.pop();
            if let Some(merged) = groups.last_mut() {
                merged.end = last.end;
            }
        }
    }

    groups
}
