//! Stage 5: tag sanitation.
//!
//! Portal keywords arrive with quotes, brackets, slashes, and stray
//! punctuation. After the replacement table runs, only alphanumerics,
//! spaces, hyphens, underscores, and dots survive; whitespace collapses;
//! length is bounded; duplicates are dropped case-insensitively.

use log::debug;
use std::collections::HashSet;

use super::{Stage, StageContext};
use crate::models::Dataset;

pub const MIN_TAG_LEN: usize = 2;
pub const MAX_TAG_LEN: usize = 100;

/// Character rewrites applied before filtering.
const REPLACEMENTS: &[(&str, &str)] = &[
    ("\"", ""),
    ("'", ""),
    ("«", ""),
    ("»", ""),
    ("“", ""),
    ("”", ""),
    ("(", " "),
    (")", " "),
    ("[", " "),
    ("]", " "),
    ("{", " "),
    ("}", " "),
    ("/", "-"),
    ("\\", "-"),
    ("–", "-"),
    ("—", "-"),
    (":", "-"),
    (";", " "),
    (",", " "),
    ("+", "-plus"),
    ("&", "and"),
];

/// Clean a single tag. Returns `None` when nothing usable remains.
pub fn clean_tag(raw: &str) -> Option<String> {
    let mut tag = raw.to_string();
    for (from, to) in REPLACEMENTS {
        tag = tag.replace(from, to);
    }

    let tag: String = tag
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || matches!(c, '-' | '_' | '.'))
        .collect();
    let tag = tag.split_whitespace().collect::<Vec<_>>().join(" ");
    let tag = tag.trim_matches(|c| c == '-' || c == '.').trim().to_string();

    if tag.chars().count() < MIN_TAG_LEN {
        return None;
    }
    // Punctuation-only leftovers ("-", "..", "___") carry no meaning.
    if !tag.chars().any(char::is_alphanumeric) {
        return None;
    }
    Some(tag.chars().take(MAX_TAG_LEN).collect())
}

pub struct TagsStage;

impl Stage for TagsStage {
    fn name(&self) -> &'static str {
        "tags"
    }

    fn apply(&self, mut dataset: Dataset, ctx: &StageContext) -> Dataset {
        let mut seen: HashSet<String> = HashSet::new();
        let mut cleaned = Vec::new();

        for raw in std::mem::take(&mut dataset.tags) {
            match clean_tag(&raw) {
                Some(tag) => {
                    if seen.insert(tag.to_lowercase()) {
                        cleaned.push(tag);
                    }
                }
                None => debug!("guid={} dropping unusable tag '{}'", ctx.guid, raw),
            }
        }

        dataset.tags = cleaned;
        dataset
    }
}
