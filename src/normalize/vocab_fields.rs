//! Stage 3: vocabulary-controlled field normalization.
//!
//! Every controlled field is rewritten to its authority URI or removed.
//! An empty code set for a vocabulary (not loaded, or the store failed)
//! disables validation for that field only; the record passes through
//! untouched rather than being rejected wholesale.

use log::debug;

use super::{Stage, StageContext};
use crate::models::Dataset;
use crate::vocab::{
    code_from_identifier, VocabResolver, ACCESS_RIGHT_AUTHORITY, AVAILABILITY_AUTHORITY,
    DATA_THEME_AUTHORITY, FREQUENCY_AUTHORITY, HVD_AUTHORITY, LANGUAGE_AUTHORITY,
    LICENCE_AUTHORITY, VOC_ACCESS_RIGHTS, VOC_AVAILABILITY, VOC_DATA_THEMES, VOC_FREQUENCY,
    VOC_HVD_CATEGORIES, VOC_LANGUAGES, VOC_LICENCE, VOC_MEDIA_TYPES,
};

pub struct VocabularyStage;

/// Map common licence spellings onto EU authority codes before validation.
pub fn license_alias_code(value: &str) -> Option<&'static str> {
    let key: String = value
        .to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    match key.as_str() {
        "ccby" | "ccby4" | "ccby40" | "creativecommonsattribution" => Some("CC_BY_4_0"),
        "ccbysa" | "ccbysa4" | "ccbysa40" => Some("CC_BYSA_4_0"),
        "cc0" | "cczero" | "cc010" => Some("CC0_1_0"),
        "odbl" | "odcodbl" => Some("ODC_ODBL"),
        "odcby" => Some("ODC_BY"),
        "pddl" | "odcpddl" => Some("ODC_PDDL"),
        "apache" | "apache20" | "apl20" => Some("APL_2_0"),
        "gfdl" => Some("GFDL"),
        _ => None,
    }
}

/// Map two-letter and colloquial language codes onto ISO 639-3 authority
/// codes.
pub fn language_alias_code(value: &str) -> String {
    match value.trim().to_ascii_uppercase().as_str() {
        "EN" => "ENG".to_string(),
        "EL" | "GR" => "ELL".to_string(),
        other => other.to_string(),
    }
}

/// Rewrite a scalar field to `{authority}{CODE}` if the code validates;
/// remove it otherwise. Returns the field unchanged when the vocabulary
/// has no codes (degrade open).
fn normalize_scalar(
    vocab: &VocabResolver,
    vocabulary: &str,
    authority: &str,
    field: &str,
    guid: &str,
    value: Option<String>,
) -> Option<String> {
    let value = value?;
    let codes = vocab.codes(vocabulary);
    if codes.is_empty() {
        return Some(value);
    }
    let code = code_from_identifier(&value).to_ascii_uppercase();
    if codes.contains(&code) {
        Some(format!("{}{}", authority, code))
    } else {
        debug!(
            "guid={} removing '{}': '{}' not in vocabulary '{}'",
            guid, field, value, vocabulary
        );
        None
    }
}

impl Stage for VocabularyStage {
    fn name(&self) -> &'static str {
        "vocabulary"
    }

    fn apply(&self, mut dataset: Dataset, ctx: &StageContext) -> Dataset {
        let vocab = ctx.vocab;
        let guid = ctx.guid;

        dataset.frequency = normalize_scalar(
            vocab,
            VOC_FREQUENCY,
            FREQUENCY_AUTHORITY,
            "frequency",
            guid,
            dataset.frequency.take(),
        );
        dataset.access_rights = normalize_scalar(
            vocab,
            VOC_ACCESS_RIGHTS,
            ACCESS_RIGHT_AUTHORITY,
            "access_rights",
            guid,
            dataset.access_rights.take(),
        );
        dataset.availability = normalize_scalar(
            vocab,
            VOC_AVAILABILITY,
            AVAILABILITY_AUTHORITY,
            "availability",
            guid,
            dataset.availability.take(),
        );

        // Licence: alias table first, then the usual code path.
        if let Some(raw) = dataset.license.take().or_else(|| dataset.license_id.clone()) {
            let aliased = license_alias_code(&raw)
                .map(str::to_string)
                .unwrap_or(raw);
            dataset.license = normalize_scalar(
                vocab,
                VOC_LICENCE,
                LICENCE_AUTHORITY,
                "license",
                guid,
                Some(aliased),
            );
        }

        // Language: two-letter aliases, then the usual code path.
        if let Some(raw) = dataset.language.take() {
            let code = language_alias_code(&code_from_identifier(&raw));
            let codes = vocab.codes(VOC_LANGUAGES);
            dataset.language = if codes.is_empty() {
                Some(raw)
            } else if codes.contains(&code) {
                Some(format!("{}{}", LANGUAGE_AUTHORITY, code))
            } else {
                debug!("guid={} removing 'language': '{}' unmapped", guid, raw);
                None
            };
        }

        // Themes: unmapped values are preserved as tags, then removed.
        let theme_codes = vocab.codes(VOC_DATA_THEMES);
        if !theme_codes.is_empty() {
            let mut kept = Vec::new();
            for value in std::mem::take(&mut dataset.theme) {
                if value.contains("authority/data-theme/") {
                    kept.push(value);
                    continue;
                }
                let code = code_from_identifier(&value).to_ascii_uppercase();
                if theme_codes.contains(&code) {
                    kept.push(format!("{}{}", DATA_THEME_AUTHORITY, code));
                } else {
                    debug!("guid={} theme '{}' unmapped; kept as tag", guid, value);
                    dataset.tags.push(value.to_lowercase());
                }
            }
            kept.sort();
            kept.dedup();
            dataset.theme = kept;
        }

        // HVD categories: must live under the BNA namespace.
        let hvd_codes = vocab.codes(VOC_HVD_CATEGORIES);
        if !hvd_codes.is_empty() {
            let mut kept = Vec::new();
            for value in std::mem::take(&mut dataset.hvd_category) {
                if value.contains("data.europa.eu/bna/") {
                    kept.push(value);
                    continue;
                }
                let code = code_from_identifier(&value).to_ascii_uppercase();
                if hvd_codes.contains(&code) {
                    kept.push(format!("{}{}", HVD_AUTHORITY, code));
                } else {
                    debug!("guid={} dropping unmapped hvd_category '{}'", guid, value);
                }
            }
            kept.sort();
            kept.dedup();
            dataset.hvd_category = kept;
        }

        // Resource media types: rewrite to the IANA URI from the
        // vocabulary map; unmapped types are dropped but preserved as tags.
        let media_map = vocab.uri_map(VOC_MEDIA_TYPES);
        if !media_map.is_empty() {
            for resource in &mut dataset.resources {
                if let Some(raw) = resource.mimetype.take() {
                    let code = code_from_identifier(&raw).to_ascii_uppercase();
                    match media_map.get(&code) {
                        Some(uri) => resource.mimetype = Some(uri.clone()),
                        None => {
                            debug!(
                                "guid={} mimetype '{}' unmapped; kept as tag",
                                guid, raw
                            );
                            dataset.tags.push(raw.to_lowercase());
                        }
                    }
                }
            }
        }

        dataset
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::super::StageContext;
    use super::*;
    use crate::vocab::testing::MemoryVocabularyStore;
    use crate::vocab::VocabResolver;

    async fn resolver() -> VocabResolver {
        let mut store = MemoryVocabularyStore::default();
        store.insert(VOC_FREQUENCY, &[("DAILY", None), ("ANNUAL", None)]);
        store.insert(VOC_LICENCE, &[("CC_BY_4_0", None), ("CC0_1_0", None)]);
        store.insert(VOC_ACCESS_RIGHTS, &[("PUBLIC", None), ("RESTRICTED", None)]);
        store.insert(VOC_LANGUAGES, &[("ELL", None), ("ENG", None)]);
        store.insert(VOC_DATA_THEMES, &[("ENVI", None), ("TRAN", None)]);
        store.insert(VOC_HVD_CATEGORIES, &[("C_A3F1", None)]);
        store.insert(
            VOC_MEDIA_TYPES,
            &[(
                "TEXT/CSV",
                Some("https://www.iana.org/assignments/media-types/text/csv"),
            )],
        );
        let resolver = VocabResolver::new();
        resolver
            .preload(&store, crate::vocab::ALL_VOCABULARIES)
            .await;
        resolver
    }

    fn run(resolver: &VocabResolver, dataset: Dataset) -> Dataset {
        let source = source_info();
        let defaults = defaults();
        let ctx = StageContext {
            vocab: resolver,
            source: &source,
            defaults: &defaults,
            harvest_object_id: "obj",
            guid: "guid",
        };
        VocabularyStage.apply(dataset, &ctx)
    }

    #[tokio::test]
    async fn valid_codes_become_authority_uris() {
        let resolver = resolver().await;
        let dataset = Dataset {
            frequency: Some("daily".to_string()),
            language: Some("el".to_string()),
            access_rights: Some("PUBLIC".to_string()),
            ..Default::default()
        };
        let out = run(&resolver, dataset);
        assert_eq!(
            out.frequency.as_deref(),
            Some("http://publications.europa.eu/resource/authority/frequency/DAILY")
        );
        assert_eq!(
            out.language.as_deref(),
            Some("https://publications.europa.eu/resource/authority/language/ELL")
        );
        assert_eq!(
            out.access_rights.as_deref(),
            Some("http://publications.europa.eu/resource/authority/access-right/PUBLIC")
        );
    }

    #[tokio::test]
    async fn unmapped_scalar_is_removed() {
        let resolver = resolver().await;
        let dataset = Dataset {
            frequency: Some("whenever".to_string()),
            ..Default::default()
        };
        let out = run(&resolver, dataset);
        assert!(out.frequency.is_none());
    }

    #[tokio::test]
    async fn license_alias_maps_cc_by() {
        let resolver = resolver().await;
        let dataset = Dataset {
            license_id: Some("cc-by".to_string()),
            ..Default::default()
        };
        let out = run(&resolver, dataset);
        assert_eq!(
            out.license.as_deref(),
            Some("http://publications.europa.eu/resource/authority/licence/CC_BY_4_0")
        );
    }

    #[tokio::test]
    async fn unmapped_theme_becomes_tag() {
        let resolver = resolver().await;
        let dataset = Dataset {
            theme: vec!["ENVI".to_string(), "Local Culture".to_string()],
            ..Default::default()
        };
        let out = run(&resolver, dataset);
        assert_eq!(
            out.theme,
            vec!["http://publications.europa.eu/resource/authority/data-theme/ENVI"]
        );
        assert!(out.tags.contains(&"local culture".to_string()));
    }

    #[tokio::test]
    async fn hvd_requires_bna_namespace() {
        let resolver = resolver().await;
        let dataset = Dataset {
            hvd_category: vec![
                "https://data.europa.eu/bna/c_ac64a52d".to_string(),
                "c_a3f1".to_string(),
                "nonsense".to_string(),
            ],
            ..Default::default()
        };
        let out = run(&resolver, dataset);
        assert_eq!(out.hvd_category.len(), 2);
        assert!(out
            .hvd_category
            .iter()
            .all(|v| v.contains("data.europa.eu/bna/")));
    }

    #[tokio::test]
    async fn unmapped_mimetype_dropped_but_preserved_as_tag() {
        let resolver = resolver().await;
        let dataset = Dataset {
            resources: vec![
                crate::models::Resource {
                    mimetype: Some("text/csv".to_string()),
                    ..Default::default()
                },
                crate::models::Resource {
                    mimetype: Some("application/x-proprietary".to_string()),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let out = run(&resolver, dataset);
        assert_eq!(
            out.resources[0].mimetype.as_deref(),
            Some("https://www.iana.org/assignments/media-types/text/csv")
        );
        assert!(out.resources[1].mimetype.is_none());
        assert!(out.tags.contains(&"application/x-proprietary".to_string()));
    }

    #[tokio::test]
    async fn empty_vocabulary_degrades_open() {
        let resolver = VocabResolver::new();
        let dataset = Dataset {
            frequency: Some("whenever".to_string()),
            ..Default::default()
        };
        let out = run(&resolver, dataset);
        assert_eq!(out.frequency.as_deref(), Some("whenever"));
    }
}
