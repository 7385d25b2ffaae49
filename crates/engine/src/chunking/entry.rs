//! One chunk per glossary entry

use std::ops::Range;

use corpusrag_core::StrategyDetails;

use super::markdown;
use super::{Draft, Pass};

/// `None` when no heading sits at the entry level.
///
/// Sections above the entry level (letter headings, preamble) are folded
/// into the following entry, or the preceding one at the end of the text.
/// Deeper headings stay inside their entry.
pub(crate) fn chunk(pass: &Pass<'_>) -> Option<Vec<Draft>> {
    let level = entry_level(pass)?;

    let mut entries: Vec<(&str, Range<usize>)> = Vec::new();
    let mut pending: Option<usize> = None;

    for section in pass.outline.sections(pass.text, 0..pass.text.len(), level) {
        match section.heading {
            Some(name) if section.level == level => {
                let start = pending.take().unwrap_or(section.span.start);
                entries.push((name, start..section.span.end));
            }
            _ => {
                pending.get_or_insert(section.span.start);
            }
        }
    }
    if pending.is_some() {
        if let Some((_, span)) = entries.last_mut() {
            span.end = pass.text.len();
        }
    }

    let drafts = entries
        .into_iter()
        .map(|(name, span)| Draft {
            details: StrategyDetails::Entry {
                entry_name: name.trim().to_string(),
                cross_references: markdown::link_targets(&pass.text[span.clone()]),
            },
            span,
            fixed_split: false,
            banded: false,
        })
        .collect();

    Some(drafts)
}

/// Configured entry level, else the section type's primary level, else the
/// deepest heading when nothing sits at the primary level
fn entry_level(pass: &Pass<'_>) -> Option<u8> {
    let present = |level: u8| pass.outline.headings.iter().any(|h| h.level == level);

    if let Some(level) = pass.config.entry_heading_level {
        return present(level).then_some(level);
    }
    let primary = pass.config.primary_heading_level(pass.section_type);
    if present(primary) {
        return Some(primary);
    }
    let deepest = pass.outline.deepest_level();
    (deepest > 0).then_some(deepest)
}
