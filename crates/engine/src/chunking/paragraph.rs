//! Paragraph-cluster chunking

use std::collections::BTreeSet;

use corpusrag_core::StrategyDetails;

use super::markdown;
use super::packing::{self, Unit};
use super::{Draft, Pass};

/// `None` for an oversized wall of text with neither paragraph nor sentence breaks
pub(crate) fn chunk(pass: &Pass<'_>) -> Option<Vec<Draft>> {
    let whole = 0..pass.text.len();
    let paragraphs = markdown::paragraphs(pass.text, whole.clone());

    if paragraphs.len() == 1
        && pass.count(&whole) > pass.config.hard_max_tokens
        && markdown::sentences(pass.text, paragraphs[0].clone()).len() <= 1
    {
        return None;
    }

    let units: Vec<Unit> = paragraphs
        .into_iter()
        .enumerate()
        .flat_map(|(idx, span)| packing::split_paragraph(pass, span, idx))
        .collect();

    let drafts = packing::pack(&units, pass.config)
        .into_iter()
        .map(|group| {
            let members = &units[group];
            let paragraph_count = members
                .iter()
                .map(|u| u.group)
                .collect::<BTreeSet<_>>()
                .len();

            Draft {
                span: members[0].span.start..members[members.len() - 1].span.end,
                details: StrategyDetails::Paragraph { paragraph_count },
                fixed_split: members.iter().any(|u| u.fixed),
                banded: true,
            }
        })
        .collect();

    Some(drafts)
}
