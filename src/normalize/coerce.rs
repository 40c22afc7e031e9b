//! Stage 2: array/scalar coercion.
//!
//! Feeds routinely ship list fields as JSON-encoded strings
//! (`"[\"a\",\"b\"]"`) and scalar fields as single-element arrays. This
//! stage unwraps both shapes so later stages see clean values. Values that
//! cannot be coerced are dropped with a logged reason, never propagated as
//! errors.

use log::debug;
use serde_json::Value;

use super::{Stage, StageContext};
use crate::models::Dataset;

pub struct CoerceStage;

/// Expand any JSON-encoded array strings inside a list field, flattening
/// one level of nesting. Plain values pass through.
fn coerce_list(field: &str, guid: &str, values: Vec<String>) -> Vec<String> {
    let mut out = Vec::new();
    for value in values {
        let trimmed = value.trim();
        if trimmed.starts_with('[') {
            match serde_json::from_str::<Value>(trimmed) {
                Ok(Value::Array(items)) => {
                    for item in items {
                        match item {
                            Value::String(s) if !s.trim().is_empty() => {
                                out.push(s.trim().to_string())
                            }
                            Value::String(_) => {}
                            other => debug!(
                                "guid={} dropping non-string element in '{}': {}",
                                guid, field, other
                            ),
                        }
                    }
                }
                _ => {
                    debug!(
                        "guid={} dropping unparseable encoded list in '{}': {}",
                        guid, field, trimmed
                    );
                }
            }
        } else if !trimmed.is_empty() {
            out.push(trimmed.to_string());
        }
    }
    out
}

/// A scalar field holding a JSON-encoded array keeps its first element.
fn coerce_scalar(field: &str, guid: &str, value: Option<String>) -> Option<String> {
    let value = value?;
    let trimmed = value.trim();
    if !trimmed.starts_with('[') {
        return (!trimmed.is_empty()).then(|| trimmed.to_string());
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Array(items)) => items.into_iter().find_map(|item| match item {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        }),
        _ => {
            debug!(
                "guid={} dropping unparseable scalar in '{}': {}",
                guid, field, trimmed
            );
            None
        }
    }
}

impl Stage for CoerceStage {
    fn name(&self) -> &'static str {
        "coerce"
    }

    fn apply(&self, mut dataset: Dataset, ctx: &StageContext) -> Dataset {
        let guid = ctx.guid;

        dataset.theme = coerce_list("theme", guid, std::mem::take(&mut dataset.theme));
        dataset.hvd_category =
            coerce_list("hvd_category", guid, std::mem::take(&mut dataset.hvd_category));
        dataset.applicable_legislation = coerce_list(
            "applicable_legislation",
            guid,
            std::mem::take(&mut dataset.applicable_legislation),
        );
        dataset.tags = coerce_list("tags", guid, std::mem::take(&mut dataset.tags));

        dataset.language = coerce_scalar("language", guid, dataset.language.take());
        dataset.frequency = coerce_scalar("frequency", guid, dataset.frequency.take());
        dataset.access_rights = coerce_scalar("access_rights", guid, dataset.access_rights.take());
        dataset.availability = coerce_scalar("availability", guid, dataset.availability.take());

        dataset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_list_is_expanded() {
        let out = coerce_list(
            "theme",
            "g",
            vec![r#"["http://a", "http://b"]"#.to_string(), "http://c".to_string()],
        );
        assert_eq!(out, vec!["http://a", "http://b", "http://c"]);
    }

    #[test]
    fn nested_encoding_unwraps_one_level() {
        // A list element that is itself an encoded pair keeps its strings.
        let out = coerce_list("theme", "g", vec![r#"["uri", "label"]"#.to_string()]);
        assert_eq!(out, vec!["uri", "label"]);
    }

    #[test]
    fn unparseable_list_value_is_dropped() {
        let out = coerce_list("theme", "g", vec!["[broken".to_string(), "kept".to_string()]);
        assert_eq!(out, vec!["kept"]);
    }

    #[test]
    fn scalar_takes_first_element_of_encoded_array() {
        assert_eq!(
            coerce_scalar("language", "g", Some(r#"["el", "en"]"#.to_string())),
            Some("el".to_string())
        );
        assert_eq!(
            coerce_scalar("language", "g", Some("el".to_string())),
            Some("el".to_string())
        );
        assert_eq!(coerce_scalar("language", "g", Some("[]".to_string())), None);
        assert_eq!(coerce_scalar("language", "g", Some("  ".to_string())), None);
    }
}
