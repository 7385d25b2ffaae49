//! Overlapping word windows

use corpusrag_core::StrategyDetails;

use super::markdown;
use super::{Draft, Pass};

pub(crate) fn chunk(pass: &Pass<'_>) -> Vec<Draft> {
    let words = markdown::words(pass.text, 0..pass.text.len());
    let (window, overlap) = pass.config.window_words();
    let step = window.saturating_sub(overlap).max(1);

    let mut drafts = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = (start + window).min(words.len());
        drafts.push(Draft {
            span: words[start].start..words[end - 1].end,
            details: StrategyDetails::Token {
                token_start: start,
                token_end: end,
            },
            fixed_split: false,
            banded: false,
        });
        if end == words.len() {
            break;
        }
        start += step;
    }
    drafts
}
