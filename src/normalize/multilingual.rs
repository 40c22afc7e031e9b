//! Stage 1: multilingual fallback.
//!
//! Guarantees every record leaves with a non-empty title and notes.
//! Fallback order: primary locale translation → secondary locale
//! translation → plain field → configured default. The primary-locale slot
//! is back-filled from whatever won, so downstream consumers can always
//! read `title_translated[primary]`.

use super::{Stage, StageContext};
use crate::models::Dataset;

pub struct MultilingualStage;

fn non_empty(value: Option<&String>) -> Option<String> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty()).map(str::to_string)
}

fn resolve(
    plain: &Option<String>,
    translated: &std::collections::BTreeMap<String, String>,
    primary: &str,
    secondary: &str,
    fallback: &str,
) -> String {
    non_empty(translated.get(primary))
        .or_else(|| non_empty(translated.get(secondary)))
        .or_else(|| non_empty(plain.as_ref()))
        .unwrap_or_else(|| fallback.to_string())
}

impl Stage for MultilingualStage {
    fn name(&self) -> &'static str {
        "multilingual"
    }

    fn apply(&self, mut dataset: Dataset, ctx: &StageContext) -> Dataset {
        let primary = &ctx.defaults.primary_locale;
        let secondary = &ctx.defaults.secondary_locale;

        let title = resolve(
            &dataset.title,
            &dataset.title_translated,
            primary,
            secondary,
            &ctx.defaults.default_title,
        );
        let notes = resolve(
            &dataset.notes,
            &dataset.notes_translated,
            primary,
            secondary,
            &ctx.defaults.default_notes,
        );

        dataset.title = Some(title.clone());
        dataset.notes = Some(notes.clone());
        dataset
            .title_translated
            .entry(primary.clone())
            .or_insert(title);
        dataset
            .notes_translated
            .entry(primary.clone())
            .or_insert(notes);

        // Resource names get the same treatment, minus the hard default.
        for resource in &mut dataset.resources {
            if let Some(name) = non_empty(resource.name_translated.get(primary))
                .or_else(|| non_empty(resource.name_translated.get(secondary)))
                .or_else(|| non_empty(resource.name.as_ref()))
            {
                resource.name = Some(name);
            }
        }

        dataset
    }
}
