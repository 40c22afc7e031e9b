//! Controlled vocabulary resolution.
//!
//! Vocabulary-controlled fields (frequency, licence, access rights,
//! availability, language, themes, media types, HVD categories) must end up
//! as authority URIs or be removed. The [`VocabResolver`] loads each
//! vocabulary once per process through a [`VocabularyStore`], caches the
//! derived code set and code→URI map, and degrades open: a vocabulary that
//! fails to load yields an empty code set, which callers treat as "skip
//! validation for this field" rather than rejecting every record.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::warn;
use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use crate::models::{Vocabulary, VocabularyEntry};

// ═══════════════════════════════════════════════════════════════════════
// Authority bases
// ═══════════════════════════════════════════════════════════════════════

pub const FREQUENCY_AUTHORITY: &str =
    "http://publications.europa.eu/resource/authority/frequency/";
pub const LICENCE_AUTHORITY: &str = "http://publications.europa.eu/resource/authority/licence/";
pub const ACCESS_RIGHT_AUTHORITY: &str =
    "http://publications.europa.eu/resource/authority/access-right/";
pub const AVAILABILITY_AUTHORITY: &str =
    "http://publications.europa.eu/resource/authority/planned-availability/";
pub const DATA_THEME_AUTHORITY: &str =
    "http://publications.europa.eu/resource/authority/data-theme/";
pub const LANGUAGE_AUTHORITY: &str =
    "https://publications.europa.eu/resource/authority/language/";
pub const IANA_MEDIA_TYPES: &str = "https://www.iana.org/assignments/media-types/";
pub const HVD_AUTHORITY: &str = "https://data.europa.eu/bna/";

pub const PUBLIC_ACCESS_RIGHT: &str =
    "http://publications.europa.eu/resource/authority/access-right/PUBLIC";

// ═══════════════════════════════════════════════════════════════════════
// Canonical vocabulary names
// ═══════════════════════════════════════════════════════════════════════

pub const VOC_FREQUENCY: &str = "Frequency";
pub const VOC_LICENCE: &str = "Licence";
pub const VOC_ACCESS_RIGHTS: &str = "Access rights";
pub const VOC_AVAILABILITY: &str = "Planned availability";
pub const VOC_LANGUAGES: &str = "Languages";
pub const VOC_MEDIA_TYPES: &str = "Media types";
pub const VOC_DATA_THEMES: &str = "Data themes";
pub const VOC_HVD_CATEGORIES: &str = "HVD categories";

pub const ALL_VOCABULARIES: &[&str] = &[
    VOC_FREQUENCY,
    VOC_LICENCE,
    VOC_ACCESS_RIGHTS,
    VOC_AVAILABILITY,
    VOC_LANGUAGES,
    VOC_MEDIA_TYPES,
    VOC_DATA_THEMES,
    VOC_HVD_CATEGORIES,
];

/// Map the loose vocabulary names found in configs and source feeds to the
/// canonical store names. Lookup is case-insensitive; unknown names pass
/// through unchanged.
pub fn canonical_vocabulary(name: &str) -> String {
    let key = name.trim().to_ascii_lowercase();
    let canonical = match key.as_str() {
        "frequency" | "frequencies" | "accrual periodicity" => VOC_FREQUENCY,
        "licence" | "license" | "licences" | "licenses" => VOC_LICENCE,
        "access right" | "access rights" | "access_rights" => VOC_ACCESS_RIGHTS,
        "availability" | "planned availability" | "planned_availability" => VOC_AVAILABILITY,
        "language" | "languages" => VOC_LANGUAGES,
        "media type" | "media types" | "media_types" | "mimetype" | "mimetypes" | "file type"
        | "file types" | "machine readable file format" => VOC_MEDIA_TYPES,
        "theme" | "themes" | "data theme" | "data themes" | "data_themes" => VOC_DATA_THEMES,
        "hvd category" | "hvd categories" | "hvd_categories" => VOC_HVD_CATEGORIES,
        _ => return name.trim().to_string(),
    };
    canonical.to_string()
}

/// Extract the code portion of a vocabulary identifier.
///
/// IANA media type URLs keep everything after `media-types/` (the code is
/// `text/csv`, not `csv`); other http(s) URIs yield their last path
/// segment; anything else is the trimmed value itself.
pub fn code_from_identifier(value: &str) -> String {
    let value = value.trim();
    if let Some((_, code)) = value.split_once("media-types/") {
        return code.trim_matches('/').to_string();
    }
    if value.starts_with("http://") || value.starts_with("https://") {
        return value
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(value)
            .to_string();
    }
    value.to_string()
}

// ═══════════════════════════════════════════════════════════════════════
// Store
// ═══════════════════════════════════════════════════════════════════════

#[async_trait]
pub trait VocabularyStore: Send + Sync {
    async fn show_vocabulary(&self, name: &str) -> Result<Vocabulary>;
}

pub struct SqliteVocabularyStore {
    pool: SqlitePool,
}

impl SqliteVocabularyStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VocabularyStore for SqliteVocabularyStore {
    async fn show_vocabulary(&self, name: &str) -> Result<Vocabulary> {
        let rows: Vec<(String, Option<String>, String)> = sqlx::query_as(
            "SELECT code, value_uri, labels FROM vocabulary_tags WHERE vocabulary = ? ORDER BY code",
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to load vocabulary '{}'", name))?;

        let entries = rows
            .into_iter()
            .map(|(code, value_uri, labels)| {
                let labels: BTreeMap<String, String> =
                    serde_json::from_str(&labels).unwrap_or_default();
                VocabularyEntry {
                    code,
                    value_uri,
                    labels,
                }
            })
            .collect();

        Ok(Vocabulary {
            name: name.to_string(),
            entries,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Resolver
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default)]
struct VocabData {
    codes: HashSet<String>,
    uri_map: HashMap<String, String>,
}

/// Process-lifetime vocabulary cache. No TTL; [`invalidate`] is the only
/// way to drop entries.
///
/// [`invalidate`]: VocabResolver::invalidate
#[derive(Default)]
pub struct VocabResolver {
    cache: Mutex<HashMap<String, VocabData>>,
}

impl VocabResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the named vocabularies into the cache. Already-cached entries
    /// are not re-fetched. A load failure caches an empty entry so the
    /// pipeline degrades open instead of failing the job.
    pub async fn preload(&self, store: &dyn VocabularyStore, names: &[&str]) {
        for name in names {
            let canonical = canonical_vocabulary(name);
            if self.cache.lock().unwrap().contains_key(&canonical) {
                continue;
            }
            let data = match store.show_vocabulary(&canonical).await {
                Ok(vocabulary) => {
                    if vocabulary.entries.is_empty() {
                        warn!(
                            "Vocabulary '{}' is empty; validation for its fields is disabled",
                            canonical
                        );
                    }
                    vocab_data(&vocabulary)
                }
                Err(err) => {
                    warn!(
                        "Failed to load vocabulary '{}' ({}); validation for its fields is disabled",
                        canonical, err
                    );
                    VocabData::default()
                }
            };
            self.cache.lock().unwrap().insert(canonical, data);
        }
    }

    /// Upper-cased code set for a vocabulary. Empty when the vocabulary is
    /// missing or failed to load.
    pub fn codes(&self, name: &str) -> HashSet<String> {
        let canonical = canonical_vocabulary(name);
        self.cache
            .lock()
            .unwrap()
            .get(&canonical)
            .map(|d| d.codes.clone())
            .unwrap_or_default()
    }

    /// CODE → canonical value map (value URI preferred over the bare code).
    pub fn uri_map(&self, name: &str) -> HashMap<String, String> {
        let canonical = canonical_vocabulary(name);
        self.cache
            .lock()
            .unwrap()
            .get(&canonical)
            .map(|d| d.uri_map.clone())
            .unwrap_or_default()
    }

    /// Whether a code is valid for a vocabulary. An unloaded or empty
    /// vocabulary accepts everything (degrade open).
    pub fn is_valid(&self, name: &str, code: &str) -> bool {
        let codes = self.codes(name);
        codes.is_empty() || codes.contains(&code.to_ascii_uppercase())
    }

    /// Drop every cached vocabulary; the next preload re-reads the store.
    pub fn invalidate(&self) {
        self.cache.lock().unwrap().clear();
    }
}

fn vocab_data(vocabulary: &Vocabulary) -> VocabData {
    let mut codes = HashSet::new();
    let mut uri_map = HashMap::new();
    for entry in &vocabulary.entries {
        let code = entry.code.to_ascii_uppercase();
        let value = entry
            .value_uri
            .clone()
            .unwrap_or_else(|| entry.code.clone());
        codes.insert(code.clone());
        uri_map.insert(code, value);
    }
    VocabData { codes, uri_map }
}


#[cfg(test)]
mod tests {
    use super::testing::MemoryVocabularyStore;
    use super::*;

    #[test]
    fn aliases_resolve_case_insensitively() {
        assert_eq!(canonical_vocabulary("license"), VOC_LICENCE);
        assert_eq!(canonical_vocabulary("Licence"), VOC_LICENCE);
        assert_eq!(canonical_vocabulary("MIMETYPE"), VOC_MEDIA_TYPES);
        assert_eq!(canonical_vocabulary("media type"), VOC_MEDIA_TYPES);
        assert_eq!(canonical_vocabulary("Languages"), VOC_LANGUAGES);
        assert_eq!(canonical_vocabulary("something else"), "something else");
    }

    #[test]
    fn code_extraction_rules() {
        assert_eq!(
            code_from_identifier("https://www.iana.org/assignments/media-types/text/csv"),
            "text/csv"
        );
        assert_eq!(
            code_from_identifier(
                "http://publications.europa.eu/resource/authority/frequency/DAILY"
            ),
            "DAILY"
        );
        assert_eq!(
            code_from_identifier("http://example.org/vocab/ANNUAL/"),
            "ANNUAL"
        );
        assert_eq!(code_from_identifier("  daily "), "daily");
    }

    #[tokio::test]
    async fn preload_caches_codes_and_uris() {
        let store = MemoryVocabularyStore::with(
            VOC_FREQUENCY,
            &[
                ("DAILY", Some("http://publications.europa.eu/resource/authority/frequency/DAILY")),
                ("annual", None),
            ],
        );
        let resolver = VocabResolver::new();
        resolver.preload(&store, &[VOC_FREQUENCY]).await;

        assert!(resolver.is_valid(VOC_FREQUENCY, "daily"));
        assert!(resolver.is_valid(VOC_FREQUENCY, "ANNUAL"));
        assert!(!resolver.is_valid(VOC_FREQUENCY, "HOURLY"));
        assert_eq!(
            resolver.uri_map(VOC_FREQUENCY).get("DAILY").map(String::as_str),
            Some("http://publications.europa.eu/resource/authority/frequency/DAILY")
        );
    }

    #[tokio::test]
    async fn load_failure_degrades_open() {
        let store = MemoryVocabularyStore {
            fail: true,
            ..Default::default()
        };
        let resolver = VocabResolver::new();
        resolver.preload(&store, &[VOC_LICENCE]).await;

        // Empty code set accepts everything.
        assert!(resolver.codes(VOC_LICENCE).is_empty());
        assert!(resolver.is_valid(VOC_LICENCE, "ANYTHING"));
    }

    #[tokio::test]
    async fn invalidate_forces_reload() {
        let mut store = MemoryVocabularyStore::default();
        store.insert(VOC_LANGUAGES, &[("ELL", None)]);
        let resolver = VocabResolver::new();
        resolver.preload(&store, &[VOC_LANGUAGES]).await;
        assert!(!resolver.is_valid(VOC_LANGUAGES, "ENG"));

        store.insert(VOC_LANGUAGES, &[("ELL", None), ("ENG", None)]);
        resolver.invalidate();
        resolver.preload(&store, &[VOC_LANGUAGES]).await;
        assert!(resolver.is_valid(VOC_LANGUAGES, "ENG"));
    }

    #[tokio::test]
    async fn round_trip_code_uri_code() {
        let uri = format!("{}CC_BY_4_0", LICENCE_AUTHORITY);
        let store = MemoryVocabularyStore::with(VOC_LICENCE, &[("cc_by_4_0", Some(&uri))]);
        let resolver = VocabResolver::new();
        resolver.preload(&store, &[VOC_LICENCE]).await;

        let mapped = resolver.uri_map(VOC_LICENCE);
        let round = mapped.get("CC_BY_4_0").unwrap();
        assert_eq!(code_from_identifier(round), "CC_BY_4_0");
    }
}
