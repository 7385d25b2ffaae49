//! Heading-delimited chunking

use std::collections::BTreeSet;

use corpusrag_core::{Section, StrategyDetails};

use super::packing::{self, Unit};
use super::{Draft, Pass};

/// `None` when the text has no heading at or above the primary level
pub(crate) fn chunk(pass: &Pass<'_>) -> Option<Vec<Draft>> {
    let level = pass.config.primary_heading_level(pass.section_type);
    let whole = 0..pass.text.len();
    if !pass.outline.has_cut(&whole, level) {
        return None;
    }

    let mut sections: Vec<Section<'_>> = Vec::new();
    for section in pass.outline.sections(pass.text, whole, level) {
        let inner = section.span.start + 1..section.span.end;
        let oversized = pass.count(&section.span) > pass.config.hard_max_tokens;
        if oversized && level < 6 && pass.outline.has_cut(&inner, level + 1) {
            sections.extend(pass.outline.sections(pass.text, section.span.clone(), level + 1));
        } else {
            sections.push(section);
        }
    }

    let units: Vec<Unit> = sections
        .iter()
        .enumerate()
        .flat_map(|(idx, section)| packing::split_oversized(pass, section.span.clone(), idx))
        .collect();

    let drafts = packing::pack(&units, pass.config)
        .into_iter()
        .map(|group| {
            let members = &units[group];
            let groups: BTreeSet<usize> = members.iter().map(|u| u.group).collect();
            let first = &sections[members[0].group];

            let headings = groups
                .iter()
                .filter_map(|&idx| sections[idx].heading)
                .map(str::to_string)
                .collect();

            Draft {
                span: members[0].span.start..members[members.len() - 1].span.end,
                details: StrategyDetails::Semantic {
                    headings,
                    heading_hierarchy: first.hierarchy.iter().map(|h| h.to_string()).collect(),
                    section_count: groups.len(),
                },
                fixed_split: members.iter().any(|u| u.fixed),
                banded: true,
            }
        })
        .collect();

    Some(drafts)
}
