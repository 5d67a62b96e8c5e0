//! Removal of model "internal reasoning" from answer text.
//!
//! Two tiers, used at different points of the pipeline:
//! - [`filter`] strips tag-style markup (`<thinking>...</thinking>`,
//!   `<reasoning/>`, `<redacted_thinking>` ...) from each streamed fragment.
//! - [`strip_labeled_sections`] strips plain-text sections introduced by
//!   `思考过程:` / `推理过程:` from the final accumulated answer.
//!
//! Fragments are filtered independently. A tag split across two fragments
//! (`<thi` + `nking>`) passes through the live stream; the `formatted` event
//! is what the caller is expected to display at the end.

use regex::Regex;
use std::sync::LazyLock;

/// Paired tags of the denylisted family, content included, across lines.
static PAIRED_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)<[^>]*(?:thinking|reasoning|redacted)[^>]*>.*?</[^>]*(?:thinking|reasoning|redacted)[^>]*>",
    )
    .expect("Invalid paired tag regex")
});

/// Lone opening, closing or self-closing tags of the same family.
static LONE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<[^>]*(?:thinking|reasoning|redacted)[^>]*/?>")
        .expect("Invalid lone tag regex")
});

const SECTION_LABELS: [&str; 2] = ["思考过程", "推理过程"];

/// Section markers end a labeled reasoning block.
const SECTION_START: char = '【';

/// Strips tag-style reasoning markup. Idempotent: patterns are reapplied
/// until nothing matches, so removing one tag can never leave another behind.
pub fn filter(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let without_pairs = PAIRED_TAG.replace_all(&current, "");
        let cleaned = LONE_TAG.replace_all(&without_pairs, "").into_owned();
        if cleaned == current {
            return cleaned;
        }
        current = cleaned;
    }
}

/// Removes `思考过程:` / `推理过程:` (ASCII or full-width colon) and
/// everything after it up to the next `【` or the end of the text.
pub fn strip_labeled_sections(text: &str) -> String {
    let mut current = text.to_string();
    while let Some((start, body)) = find_label(&current) {
        let end = current[body..]
            .find(SECTION_START)
            .map_or(current.len(), |offset| body + offset);
        current.replace_range(start..end, "");
    }
    current
}

/// Byte range start of the earliest label and the offset just after its colon.
fn find_label(text: &str) -> Option<(usize, usize)> {
    SECTION_LABELS
        .iter()
        .filter_map(|label| {
            text.match_indices(label).find_map(|(start, _)| {
                let after = start + label.len();
                let colon = text[after..].chars().next()?;
                matches!(colon, ':' | '：').then(|| (start, after + colon.len_utf8()))
            })
        })
        .min_by_key(|(start, _)| *start)
}
