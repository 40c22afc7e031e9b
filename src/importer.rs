//! Record import: loosely-typed source payloads become initial [`Dataset`]
//! values, with stable names derived deterministically.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use log::debug;
use regex::Regex;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;

use crate::models::{Dataset, Extra, Resource};
use crate::parse::{
    Graph, DCAT_ACCESS_URL, DCAT_BYTE_SIZE, DCAT_DISTRIBUTION, DCAT_DOWNLOAD_URL, DCAT_MEDIA_TYPE,
    DCT_DESCRIPTION, DCT_FORMAT, DCT_LICENSE, DCT_TITLE, FOAF_PAGE,
};

pub const MAX_NAME_LEN: usize = 100;

// ═══════════════════════════════════════════════════════════════════════
// Slugs and names
// ═══════════════════════════════════════════════════════════════════════

/// Greek-to-Latin transliteration used before slug filtering; source
/// portals are predominantly Greek and plain ASCII folding would drop
/// their titles entirely.
const GREEK_LATIN: &[(char, &str)] = &[
    ('α', "a"), ('β', "v"), ('γ', "g"), ('δ', "d"), ('ε', "e"), ('ζ', "z"),
    ('η', "i"), ('θ', "th"), ('ι', "i"), ('κ', "k"), ('λ', "l"), ('μ', "m"),
    ('ν', "n"), ('ξ', "x"), ('ο', "o"), ('π', "p"), ('ρ', "r"), ('σ', "s"),
    ('ς', "s"), ('τ', "t"), ('υ', "y"), ('φ', "f"), ('χ', "ch"), ('ψ', "ps"),
    ('ω', "o"), ('ά', "a"), ('έ', "e"), ('ή', "i"), ('ί', "i"), ('ό', "o"),
    ('ύ', "y"), ('ώ', "o"), ('ϊ', "i"), ('ϋ', "y"), ('ΐ', "i"), ('ΰ', "y"),
];

fn transliterate(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match GREEK_LATIN.iter().find(|(g, _)| *g == ch) {
            Some((_, latin)) => out.push_str(latin),
            None => out.push(ch),
        }
    }
    out
}

/// Lower-case, transliterate, collapse everything non-alphanumeric to
/// single hyphens, and cap the length. May return an empty string when the
/// input has no usable characters; callers fall back to a generated name.
pub fn slugify(input: &str) -> String {
    static NON_ALNUM: OnceLock<Regex> = OnceLock::new();
    let re = NON_ALNUM.get_or_init(|| Regex::new(r"[^a-z0-9]+").unwrap());

    let lowered = transliterate(&input.to_lowercase());
    let slug = re.replace_all(&lowered, "-");
    let slug = slug.trim_matches('-');
    slug.chars().take(MAX_NAME_LEN).collect()
}

/// Short random suffix for records with nothing slug-worthy.
pub fn generated_name() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("dataset-{}", &hex[..8])
}

/// Tracks names claimed during a single run so two records in one gather
/// pass never collide.
#[derive(Debug, Default)]
pub struct NamePool {
    used: HashSet<String>,
}

impl NamePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `base` or the first free `base-2`, `base-3`… variant.
    pub fn claim(&mut self, base: &str) -> String {
        let base = if base.is_empty() {
            generated_name()
        } else {
            base.to_string()
        };
        if self.used.insert(base.clone()) {
            return base;
        }
        for n in 2.. {
            let candidate = truncate_for_suffix(&base, n);
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
        }
        unreachable!()
    }
}

fn truncate_for_suffix(base: &str, n: u32) -> String {
    let suffix = format!("-{}", n);
    let room = MAX_NAME_LEN.saturating_sub(suffix.len());
    let head: String = base.chars().take(room).collect();
    format!("{}{}", head, suffix)
}

/// Derive a stable catalog name for an imported record.
///
/// Candidate order: existing name, identifier, plain title, translated
/// titles. Records with no slug-worthy candidate get a generated name.
pub fn derive_name(dataset: &Dataset, pool: &mut NamePool) -> String {
    let mut candidates: Vec<&str> = Vec::new();
    if !dataset.name.is_empty() {
        candidates.push(&dataset.name);
    }
    if let Some(identifier) = &dataset.identifier {
        candidates.push(identifier);
    }
    if let Some(title) = &dataset.title {
        candidates.push(title);
    }
    for title in dataset.title_translated.values() {
        candidates.push(title);
    }

    for candidate in candidates {
        let slug = slugify(candidate);
        if !slug.is_empty() {
            return pool.claim(&slug);
        }
    }
    pool.claim(&generated_name())
}

// ═══════════════════════════════════════════════════════════════════════
// Text cleanup
// ═══════════════════════════════════════════════════════════════════════

/// Strip markup tags and unescape the common entities. Scraped portal
/// descriptions arrive wrapped in markup we never want to store.
pub fn strip_html(input: &str) -> String {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    let re = TAGS.get_or_init(|| Regex::new(r"<[^>]*>").unwrap());

    let text = re.replace_all(input, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    collapse_whitespace(&text)
}

pub fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Stable content hash, used as a last-resort GUID for records that carry
/// no identifier at all.
pub fn content_guid(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ═══════════════════════════════════════════════════════════════════════
// Value coercion helpers
// ═══════════════════════════════════════════════════════════════════════

/// Best-effort string view of a JSON value. Arrays yield their first
/// usable element.
pub fn string_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Array(list) => list.iter().find_map(string_of),
        _ => None,
    }
}

/// Best-effort list-of-strings view of a JSON value. Scalars become a
/// single-element list.
pub fn list_of_strings(value: &Value) -> Vec<String> {
    match value {
        Value::Array(list) => list.iter().filter_map(string_of).collect(),
        other => string_of(other).into_iter().collect(),
    }
}

/// Parse the timestamp formats the sources actually emit.
pub fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.and_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }
    if let Ok(d) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(d.and_hms_opt(0, 0, 0)?.and_utc());
    }
    if let Ok(d) = NaiveDate::parse_from_str(value, "%d/%m/%Y") {
        return Some(d.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════
// Record mapping
// ═══════════════════════════════════════════════════════════════════════

fn translated_map(value: Option<&Value>) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    if let Some(Value::Object(map)) = value {
        for (lang, text) in map {
            if let Some(text) = string_of(text) {
                out.insert(lang.clone(), text);
            }
        }
    }
    out
}

/// Map a loosely-typed record (POD data.json, JSON-LD node, or the flat
/// view produced by the XML parser) onto an initial [`Dataset`].
pub fn dataset_from_value(record: &Value) -> Dataset {
    let get = |keys: &[&str]| -> Option<String> {
        keys.iter().find_map(|k| record.get(*k).and_then(string_of))
    };
    let get_list = |keys: &[&str]| -> Vec<String> {
        keys.iter()
            .find_map(|k| {
                let list = list_of_strings(record.get(*k)?);
                (!list.is_empty()).then_some(list)
            })
            .unwrap_or_default()
    };

    let mut dataset = Dataset {
        title: get(&["title"]),
        notes: get(&["description", "notes"]),
        title_translated: translated_map(record.get("title_translated")),
        notes_translated: translated_map(record.get("notes_translated")),
        identifier: get(&["identifier", "id"]),
        landing_page: get(&["landingPage", "landing_page"]),
        license_id: get(&["license_id"]),
        license: get(&["license"]),
        license_title: get(&["license_title"]),
        license_url: get(&["license_url"]),
        frequency: get(&["accrualPeriodicity", "frequency"]),
        access_rights: get(&["accessRights", "access_rights"]),
        availability: get(&["availability", "planned_availability"]),
        language: get(&["language"]),
        theme: get_list(&["theme", "themes"]),
        hvd_category: get_list(&["hvd_category", "hvdCategory"]),
        applicable_legislation: get_list(&["applicable_legislation", "applicableLegislation"]),
        contact_name: get(&["contact_name", "maintainer"]),
        contact_email: get(&["contact_email", "maintainer_email"]),
        contact_phone: get(&["contact_phone"]),
        metadata_modified: get(&["modified", "metadata_modified"])
            .and_then(|v| parse_datetime(&v)),
        is_open: record.get("isopen").and_then(Value::as_bool),
        tags: tags_from_value(record),
        resources: resources_from_value(record),
        extras: extras_from_value(record.get("extras")),
        ..Default::default()
    };

    // contactPoint nesting (POD style)
    if dataset.contact_name.is_none() {
        if let Some(contact) = record.get("contactPoint") {
            dataset.contact_name = contact.get("fn").and_then(string_of);
            dataset.contact_email = contact
                .get("hasEmail")
                .and_then(string_of)
                .map(|e| e.trim_start_matches("mailto:").to_string());
        }
    }

    dataset
}

fn tags_from_value(record: &Value) -> Vec<String> {
    if let Some(keywords) = record.get("keyword").or_else(|| record.get("keywords")) {
        return list_of_strings(keywords);
    }
    match record.get("tags") {
        Some(Value::Array(list)) => list
            .iter()
            .filter_map(|t| match t {
                Value::Object(map) => map.get("name").and_then(string_of),
                other => string_of(other),
            })
            .collect(),
        Some(other) => list_of_strings(other),
        None => Vec::new(),
    }
}

fn extras_from_value(value: Option<&Value>) -> Vec<Extra> {
    let Some(Value::Array(list)) = value else {
        return Vec::new();
    };
    list.iter()
        .filter_map(|item| {
            let key = item.get("key").and_then(string_of)?;
            let value = item.get("value").and_then(string_of).unwrap_or_default();
            Some(Extra { key, value })
        })
        .collect()
}

fn resources_from_value(record: &Value) -> Vec<Resource> {
    let list = record
        .get("distribution")
        .or_else(|| record.get("resources"));
    let Some(Value::Array(list)) = list else {
        return Vec::new();
    };
    list.iter().map(resource_from_value).collect()
}

pub fn resource_from_value(value: &Value) -> Resource {
    let get = |keys: &[&str]| -> Option<String> {
        keys.iter().find_map(|k| value.get(*k).and_then(string_of))
    };
    Resource {
        url: get(&["url"]),
        download_url: get(&["downloadURL", "download_url"]),
        access_url: get(&["accessURL", "access_url"]),
        page_url: get(&["page", "page_url"]),
        name: get(&["title", "name"]),
        name_translated: translated_map(value.get("name_translated")),
        description: get(&["description"]).map(|d| strip_html(&d)),
        description_translated: translated_map(value.get("description_translated")),
        format: get(&["format"]),
        mimetype: get(&["mediaType", "mimetype"]),
        size: value
            .get("byteSize")
            .or_else(|| value.get("size"))
            .and_then(parse_size),
        license: get(&["license"]),
    }
}

fn parse_size(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Graph fallback
// ═══════════════════════════════════════════════════════════════════════

/// Recover distribution-level resources from the parsed graph when the
/// flat record view carried none. Distributions without any usable URL are
/// skipped.
pub fn resources_from_graph(graph: &Graph, dataset_uri: &str) -> Vec<Resource> {
    let mut resources = Vec::new();
    for dist in graph.uris(dataset_uri, DCAT_DISTRIBUTION) {
        let download_url = graph.uri(dist, DCAT_DOWNLOAD_URL).map(str::to_string);
        let access_url = graph.uri(dist, DCAT_ACCESS_URL).map(str::to_string);
        let page_url = graph.uri(dist, FOAF_PAGE).map(str::to_string);
        if download_url.is_none() && access_url.is_none() && page_url.is_none() {
            debug!("Skipping distribution without URL: {}", dist);
            continue;
        }

        resources.push(Resource {
            url: None,
            download_url,
            access_url,
            page_url,
            name: graph.literal(dist, DCT_TITLE).map(str::to_string),
            description: graph
                .literal(dist, DCT_DESCRIPTION)
                .map(|d| strip_html(d)),
            format: graph
                .value(dist, DCT_FORMAT)
                .map(|f| crate::vocab::code_from_identifier(f)),
            mimetype: graph.value(dist, DCAT_MEDIA_TYPE).map(str::to_string),
            size: graph
                .literal(dist, DCAT_BYTE_SIZE)
                .and_then(|s| s.trim().parse::<i64>().ok()),
            license: graph.value(dist, DCT_LICENSE).map(str::to_string),
            ..Default::default()
        });
    }
    resources
}
