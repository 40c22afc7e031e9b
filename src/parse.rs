//! Metadata feed parsing.
//!
//! Source adapters hand raw feed bodies to a [`MetadataParser`] and get back
//! a [`ParsedDoc`]: the dataset records as loosely-typed JSON values plus a
//! small triple [`Graph`] used to recover distribution details that the
//! flat record view loses (the graph is only populated by the XML parser).
//!
//! This is deliberately not a general RDF library. The XML parser handles
//! the striped RDF/XML serialization that DCAT-AP feeds actually emit:
//! node elements carrying `rdf:about`, property elements carrying either
//! `rdf:resource` or literal text with an optional `xml:lang`.

use anyhow::{bail, Context, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{json, Value};
use std::collections::HashMap;

// ═══════════════════════════════════════════════════════════════════════
// Namespaces
// ═══════════════════════════════════════════════════════════════════════

pub const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const DCT_NS: &str = "http://purl.org/dc/terms/";
pub const DCAT_NS: &str = "http://www.w3.org/ns/dcat#";
pub const FOAF_NS: &str = "http://xmlns.com/foaf/0.1/";
pub const VCARD_NS: &str = "http://www.w3.org/2006/vcard/ns#";

pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const DCAT_DATASET: &str = "http://www.w3.org/ns/dcat#Dataset";
pub const DCAT_DISTRIBUTION_CLASS: &str = "http://www.w3.org/ns/dcat#Distribution";
pub const DCAT_DISTRIBUTION: &str = "http://www.w3.org/ns/dcat#distribution";
pub const DCAT_DOWNLOAD_URL: &str = "http://www.w3.org/ns/dcat#downloadURL";
pub const DCAT_ACCESS_URL: &str = "http://www.w3.org/ns/dcat#accessURL";
pub const DCAT_BYTE_SIZE: &str = "http://www.w3.org/ns/dcat#byteSize";
pub const DCAT_MEDIA_TYPE: &str = "http://www.w3.org/ns/dcat#mediaType";
pub const DCAT_KEYWORD: &str = "http://www.w3.org/ns/dcat#keyword";
pub const DCAT_THEME: &str = "http://www.w3.org/ns/dcat#theme";
pub const DCAT_LANDING_PAGE: &str = "http://www.w3.org/ns/dcat#landingPage";
pub const DCAT_CONTACT_POINT: &str = "http://www.w3.org/ns/dcat#contactPoint";
pub const DCT_TITLE: &str = "http://purl.org/dc/terms/title";
pub const DCT_DESCRIPTION: &str = "http://purl.org/dc/terms/description";
pub const DCT_IDENTIFIER: &str = "http://purl.org/dc/terms/identifier";
pub const DCT_MODIFIED: &str = "http://purl.org/dc/terms/modified";
pub const DCT_FORMAT: &str = "http://purl.org/dc/terms/format";
pub const DCT_LICENSE: &str = "http://purl.org/dc/terms/license";
pub const DCT_ACCESS_RIGHTS: &str = "http://purl.org/dc/terms/accessRights";
pub const DCT_LANGUAGE: &str = "http://purl.org/dc/terms/language";
pub const DCT_ACCRUAL_PERIODICITY: &str = "http://purl.org/dc/terms/accrualPeriodicity";
pub const FOAF_PAGE: &str = "http://xmlns.com/foaf/0.1/page";
pub const VCARD_FN: &str = "http://www.w3.org/2006/vcard/ns#fn";
pub const VCARD_HAS_EMAIL: &str = "http://www.w3.org/2006/vcard/ns#hasEmail";

// ═══════════════════════════════════════════════════════════════════════
// Graph
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Literal { value: String, lang: Option<String> },
    Uri(String),
}

#[derive(Debug, Clone)]
struct Triple {
    subject: String,
    predicate: String,
    object: Object,
}

/// Minimal in-memory triple store backing the distribution fallback.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    triples: Vec<Triple>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    pub fn insert_literal(&mut self, subject: &str, predicate: &str, value: &str) {
        self.insert_literal_lang(subject, predicate, value, None);
    }

    pub fn insert_literal_lang(
        &mut self,
        subject: &str,
        predicate: &str,
        value: &str,
        lang: Option<&str>,
    ) {
        self.triples.push(Triple {
            subject: subject.to_string(),
            predicate: predicate.to_string(),
            object: Object::Literal {
                value: value.to_string(),
                lang: lang.map(|l| l.to_string()),
            },
        });
    }

    pub fn insert_uri(&mut self, subject: &str, predicate: &str, uri: &str) {
        self.triples.push(Triple {
            subject: subject.to_string(),
            predicate: predicate.to_string(),
            object: Object::Uri(uri.to_string()),
        });
    }

    /// First literal value for (subject, predicate), any language.
    pub fn literal(&self, subject: &str, predicate: &str) -> Option<&str> {
        self.triples.iter().find_map(|t| {
            if t.subject == subject && t.predicate == predicate {
                match &t.object {
                    Object::Literal { value, .. } => Some(value.as_str()),
                    Object::Uri(_) => None,
                }
            } else {
                None
            }
        })
    }

    /// All lang-tagged literals for (subject, predicate) as (lang, value).
    pub fn literals_by_lang(&self, subject: &str, predicate: &str) -> Vec<(&str, &str)> {
        self.triples
            .iter()
            .filter(|t| t.subject == subject && t.predicate == predicate)
            .filter_map(|t| match &t.object {
                Object::Literal {
                    value,
                    lang: Some(lang),
                } => Some((lang.as_str(), value.as_str())),
                _ => None,
            })
            .collect()
    }

    /// All untagged literal values for (subject, predicate).
    pub fn literals(&self, subject: &str, predicate: &str) -> Vec<&str> {
        self.triples
            .iter()
            .filter(|t| t.subject == subject && t.predicate == predicate)
            .filter_map(|t| match &t.object {
                Object::Literal { value, .. } => Some(value.as_str()),
                Object::Uri(_) => None,
            })
            .collect()
    }

    /// First URI object for (subject, predicate).
    pub fn uri(&self, subject: &str, predicate: &str) -> Option<&str> {
        self.triples.iter().find_map(|t| {
            if t.subject == subject && t.predicate == predicate {
                match &t.object {
                    Object::Uri(uri) => Some(uri.as_str()),
                    Object::Literal { .. } => None,
                }
            } else {
                None
            }
        })
    }

    /// All URI objects for (subject, predicate).
    pub fn uris(&self, subject: &str, predicate: &str) -> Vec<&str> {
        self.triples
            .iter()
            .filter(|t| t.subject == subject && t.predicate == predicate)
            .filter_map(|t| match &t.object {
                Object::Uri(uri) => Some(uri.as_str()),
                Object::Literal { .. } => None,
            })
            .collect()
    }

    /// Either the URI object or the literal value for (subject, predicate).
    pub fn value(&self, subject: &str, predicate: &str) -> Option<&str> {
        self.triples.iter().find_map(|t| {
            if t.subject == subject && t.predicate == predicate {
                match &t.object {
                    Object::Uri(uri) => Some(uri.as_str()),
                    Object::Literal { value, .. } => Some(value.as_str()),
                }
            } else {
                None
            }
        })
    }

    /// Subjects carrying an `rdf:type` of the given class.
    pub fn subjects_of_type(&self, class_uri: &str) -> Vec<&str> {
        self.triples
            .iter()
            .filter(|t| t.predicate == RDF_TYPE)
            .filter_map(|t| match &t.object {
                Object::Uri(uri) if uri == class_uri => Some(t.subject.as_str()),
                _ => None,
            })
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Parser facade
// ═══════════════════════════════════════════════════════════════════════

/// Feed serialization hint, configured per source via `rdf_format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RdfFormat {
    DataJson,
    DcatXml,
}

impl RdfFormat {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "data.json" | "json" | "json-ld" => Ok(RdfFormat::DataJson),
            "xml" | "dcat-xml" | "rdf-xml" => Ok(RdfFormat::DcatXml),
            other => bail!("Unknown rdf_format '{}'", other),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParsedDoc {
    pub datasets: Vec<Value>,
    pub graph: Graph,
}

pub trait MetadataParser: Send + Sync {
    fn parse(&self, content: &str, format: RdfFormat) -> Result<ParsedDoc>;
}

/// Dispatches to the JSON or XML parser based on the format hint.
pub struct FeedParser;

impl MetadataParser for FeedParser {
    fn parse(&self, content: &str, format: RdfFormat) -> Result<ParsedDoc> {
        match format {
            RdfFormat::DataJson => parse_json_catalog(content),
            RdfFormat::DcatXml => parse_dcat_xml(content),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// JSON catalogs
// ═══════════════════════════════════════════════════════════════════════

/// Parse a JSON catalog document (data.json / JSON-LD `@graph` / plain
/// array). The graph is left empty; JSON feeds carry their distributions
/// inline.
pub fn parse_json_catalog(content: &str) -> Result<ParsedDoc> {
    let value: Value = serde_json::from_str(content).context("Invalid JSON catalog document")?;

    let datasets = if let Some(list) = value.get("dataset").and_then(|d| d.as_array()) {
        list.clone()
    } else if let Some(graph) = value.get("@graph").and_then(|g| g.as_array()) {
        graph
            .iter()
            .filter(|node| {
                node.get("@type")
                    .map(|t| type_matches_dataset(t))
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    } else if let Some(list) = value.as_array() {
        list.to_vec()
    } else if value.is_object() {
        vec![value]
    } else {
        bail!("JSON catalog document has no recognizable dataset list");
    };

    Ok(ParsedDoc {
        datasets,
        graph: Graph::new(),
    })
}

fn type_matches_dataset(t: &Value) -> bool {
    let matches = |s: &str| s == "dcat:Dataset" || s == DCAT_DATASET || s == "Dataset";
    match t {
        Value::String(s) => matches(s),
        Value::Array(list) => list
            .iter()
            .any(|v| v.as_str().map(matches).unwrap_or(false)),
        _ => false,
    }
}

// ═══════════════════════════════════════════════════════════════════════
// DCAT RDF/XML
// ═══════════════════════════════════════════════════════════════════════

const KNOWN_PREFIXES: &[(&str, &str)] = &[
    ("rdf", RDF_NS),
    ("dct", DCT_NS),
    ("dcterms", DCT_NS),
    ("dcat", DCAT_NS),
    ("foaf", FOAF_NS),
    ("vcard", VCARD_NS),
];

struct XmlState {
    graph: Graph,
    namespaces: HashMap<String, String>,
    /// Stack of open node subjects.
    subjects: Vec<String>,
    /// Stack of open property predicates with accumulated text and lang.
    properties: Vec<(String, String, Option<String>)>,
    blank_counter: usize,
}

impl XmlState {
    fn new() -> Self {
        let namespaces = KNOWN_PREFIXES
            .iter()
            .map(|(p, ns)| (p.to_string(), ns.to_string()))
            .collect();
        Self {
            graph: Graph::new(),
            namespaces,
            subjects: Vec::new(),
            properties: Vec::new(),
            blank_counter: 0,
        }
    }

    fn resolve(&self, qname: &str) -> String {
        match qname.split_once(':') {
            Some((prefix, local)) => match self.namespaces.get(prefix) {
                Some(ns) => format!("{}{}", ns, local),
                None => qname.to_string(),
            },
            None => qname.to_string(),
        }
    }
}

fn read_attrs(e: &BytesStart) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    for attr in e.attributes() {
        let attr = attr.context("Malformed XML attribute")?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr.unescape_value().context("Bad attribute value")?;
        out.push((key, value.to_string()));
    }
    Ok(out)
}

/// Classes whose elements open a new node (subject) rather than a property.
fn is_node_element(resolved: &str, attrs: &[(String, String)]) -> bool {
    if resolved == format!("{}Description", RDF_NS) || resolved == format!("{}RDF", RDF_NS) {
        return true;
    }
    // An element with rdf:about that is not a known property is a typed node.
    let has_about = attrs.iter().any(|(k, _)| k == "rdf:about");
    let local_upper_camel = resolved
        .rsplit(['#', '/'])
        .next()
        .map(|l| l.chars().next().map(|c| c.is_uppercase()).unwrap_or(false))
        .unwrap_or(false);
    has_about || local_upper_camel
}

/// What an opened element contributed, so the matching End pops it.
enum Opened {
    Root,
    Node,
    Property,
    Skipped,
}

fn open_element(state: &mut XmlState, e: &BytesStart, empty: bool) -> Result<Opened> {
    let qname = String::from_utf8_lossy(e.name().as_ref()).to_string();
    let attrs = read_attrs(e)?;

    // Collect namespace declarations as they appear.
    for (key, value) in &attrs {
        if let Some(prefix) = key.strip_prefix("xmlns:") {
            state.namespaces.insert(prefix.to_string(), value.clone());
        }
    }

    let resolved = state.resolve(&qname);
    if resolved == format!("{}RDF", RDF_NS) {
        return Ok(Opened::Root);
    }

    if is_node_element(&resolved, &attrs) {
        let subject = attrs
            .iter()
            .find(|(k, _)| k == "rdf:about" || k == "rdf:nodeID")
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| {
                state.blank_counter += 1;
                format!("_:b{}", state.blank_counter)
            });

        // A node opened inside a property element is that property's object.
        if let (Some(parent), Some((predicate, _, _))) =
            (state.subjects.last(), state.properties.last())
        {
            let parent = parent.clone();
            let predicate = predicate.clone();
            state.graph.insert_uri(&parent, &predicate, &subject);
        }

        if resolved != format!("{}Description", RDF_NS) {
            state.graph.insert_uri(&subject, RDF_TYPE, &resolved);
        }
        if empty {
            return Ok(Opened::Skipped);
        }
        state.subjects.push(subject);
        return Ok(Opened::Node);
    }

    // Property element.
    let Some(subject) = state.subjects.last().cloned() else {
        return Ok(Opened::Skipped);
    };
    if let Some((_, resource)) = attrs.iter().find(|(k, _)| k == "rdf:resource") {
        state.graph.insert_uri(&subject, &resolved, resource);
        if empty {
            return Ok(Opened::Skipped);
        }
        // Placeholder so the matching End pops cleanly; no literal emitted.
        state.properties.push((resolved, String::new(), None));
        return Ok(Opened::Property);
    }

    if empty {
        return Ok(Opened::Skipped);
    }
    let lang = attrs
        .iter()
        .find(|(k, _)| k == "xml:lang")
        .map(|(_, v)| v.clone());
    state.properties.push((resolved, String::new(), lang));
    Ok(Opened::Property)
}

/// Parse a DCAT-AP RDF/XML feed into dataset records plus a triple graph.
pub fn parse_dcat_xml(content: &str) -> Result<ParsedDoc> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut state = XmlState::new();
    let mut opened: Vec<Opened> = Vec::new();

    loop {
        match reader.read_event().context("Malformed XML feed")? {
            Event::Start(e) => {
                let kind = open_element(&mut state, &e, false)?;
                opened.push(kind);
            }
            Event::Empty(e) => {
                open_element(&mut state, &e, true)?;
            }
            Event::Text(t) => {
                if let Some((_, text, _)) = state.properties.last_mut() {
                    text.push_str(&t.unescape().context("Bad text node")?);
                }
            }
            Event::End(_) => match opened.pop() {
                Some(Opened::Node) => {
                    state.subjects.pop();
                }
                Some(Opened::Property) => {
                    if let Some((predicate, text, lang)) = state.properties.pop() {
                        let text = text.trim();
                        if !text.is_empty() {
                            if let Some(subject) = state.subjects.last().cloned() {
                                state.graph.insert_literal_lang(
                                    &subject,
                                    &predicate,
                                    text,
                                    lang.as_deref(),
                                );
                            }
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    let datasets = datasets_from_graph(&state.graph);
    if datasets.is_empty() && state.graph.is_empty() {
        bail!("XML feed contains no triples");
    }
    Ok(ParsedDoc {
        datasets,
        graph: state.graph,
    })
}

/// Flatten each `dcat:Dataset` node into a loosely-typed record value.
fn datasets_from_graph(graph: &Graph) -> Vec<Value> {
    graph
        .subjects_of_type(DCAT_DATASET)
        .into_iter()
        .map(|subject| {
            let mut record = json!({ "uri": subject });
            let obj = record.as_object_mut().unwrap();

            if let Some(title) = graph.literal(subject, DCT_TITLE) {
                obj.insert("title".into(), json!(title));
            }
            let titles = graph.literals_by_lang(subject, DCT_TITLE);
            if !titles.is_empty() {
                let map: serde_json::Map<String, Value> = titles
                    .iter()
                    .map(|(lang, text)| (lang.to_string(), json!(text)))
                    .collect();
                obj.insert("title_translated".into(), Value::Object(map));
            }
            if let Some(desc) = graph.literal(subject, DCT_DESCRIPTION) {
                obj.insert("description".into(), json!(desc));
            }
            let descs = graph.literals_by_lang(subject, DCT_DESCRIPTION);
            if !descs.is_empty() {
                let map: serde_json::Map<String, Value> = descs
                    .iter()
                    .map(|(lang, text)| (lang.to_string(), json!(text)))
                    .collect();
                obj.insert("notes_translated".into(), Value::Object(map));
            }
            if let Some(identifier) = graph.value(subject, DCT_IDENTIFIER) {
                obj.insert("identifier".into(), json!(identifier));
            }
            if let Some(modified) = graph.literal(subject, DCT_MODIFIED) {
                obj.insert("modified".into(), json!(modified));
            }
            if let Some(page) = graph.uri(subject, DCAT_LANDING_PAGE) {
                obj.insert("landingPage".into(), json!(page));
            }
            if let Some(freq) = graph.value(subject, DCT_ACCRUAL_PERIODICITY) {
                obj.insert("accrualPeriodicity".into(), json!(freq));
            }
            if let Some(license) = graph.value(subject, DCT_LICENSE) {
                obj.insert("license".into(), json!(license));
            }
            if let Some(rights) = graph.value(subject, DCT_ACCESS_RIGHTS) {
                obj.insert("accessRights".into(), json!(rights));
            }
            if let Some(language) = graph.value(subject, DCT_LANGUAGE) {
                obj.insert("language".into(), json!(language));
            }
            let themes: Vec<&str> = graph.uris(subject, DCAT_THEME);
            if !themes.is_empty() {
                obj.insert("theme".into(), json!(themes));
            }
            let keywords: Vec<&str> = graph
                .literals(subject, DCAT_KEYWORD)
                .into_iter()
                .chain(
                    graph
                        .literals_by_lang(subject, DCAT_KEYWORD)
                        .into_iter()
                        .map(|(_, v)| v),
                )
                .collect();
            if !keywords.is_empty() {
                obj.insert("keyword".into(), json!(keywords));
            }
            if let Some(contact) = graph.uri(subject, DCAT_CONTACT_POINT) {
                if let Some(name) = graph.literal(contact, VCARD_FN) {
                    obj.insert("contact_name".into(), json!(name));
                }
                if let Some(email) = graph.value(contact, VCARD_HAS_EMAIL) {
                    obj.insert(
                        "contact_email".into(),
                        json!(email.trim_start_matches("mailto:")),
                    );
                }
            }

            record
        })
        .collect()
}
