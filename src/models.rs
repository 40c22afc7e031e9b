//! Core data models used throughout the harvester.
//!
//! These types carry the job and object lifecycle states and the canonical
//! dataset records that flow through the gather → fetch → import pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle state of a harvest job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Finished,
    FinishedWithErrors,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Finished => "finished",
            JobStatus::FinishedWithErrors => "finished_with_errors",
        }
    }
}

/// What the gather diff decided about a remote record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectStatus {
    New,
    Changed,
    Deleted,
}

impl ObjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectStatus::New => "new",
            ObjectStatus::Changed => "changed",
            ObjectStatus::Deleted => "deleted",
        }
    }
}

/// Terminal outcome recorded on a harvest object after import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Updated,
    Unchanged,
    Failed,
    Deleted,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Created => "created",
            Outcome::Updated => "updated",
            Outcome::Unchanged => "unchanged",
            Outcome::Failed => "failed",
            Outcome::Deleted => "deleted",
        }
    }
}

/// Raw page or record body as fetched from a source.
#[derive(Debug, Clone)]
pub struct RawContent {
    pub body: String,
    pub content_type: String,
}

/// One remote record discovered during the gather phase.
///
/// Catalog-style sources usually carry the record body inline (the listing
/// response already contained it); probe-style sources carry only the URL
/// and fetch the body later.
#[derive(Debug, Clone)]
pub struct GatheredRecord {
    pub guid: String,
    pub url: Option<String>,
    pub content: Option<RawContent>,
    /// Adapter-specific payload (e.g. portal category labels).
    pub meta: serde_json::Value,
}

impl GatheredRecord {
    pub fn new(guid: impl Into<String>) -> Self {
        Self {
            guid: guid.into(),
            url: None,
            content: None,
            meta: serde_json::Value::Null,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_content(mut self, body: impl Into<String>, content_type: &str) -> Self {
        self.content = Some(RawContent {
            body: body.into(),
            content_type: content_type.to_string(),
        });
        self
    }
}

/// Canonical dataset record. This is what the normalizer chain operates on
/// and what the catalog store persists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub title_translated: BTreeMap<String, String>,
    #[serde(default)]
    pub notes_translated: BTreeMap<String, String>,
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub landing_page: Option<String>,
    #[serde(default)]
    pub license_id: Option<String>,
    /// Vocabulary-controlled licence; an authority URI after normalization.
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub license_title: Option<String>,
    #[serde(default)]
    pub license_url: Option<String>,
    #[serde(default)]
    pub frequency: Option<String>,
    #[serde(default)]
    pub access_rights: Option<String>,
    #[serde(default)]
    pub availability: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub theme: Vec<String>,
    #[serde(default)]
    pub hvd_category: Vec<String>,
    #[serde(default)]
    pub applicable_legislation: Vec<String>,
    #[serde(default)]
    pub contact_name: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub contact_phone: Option<String>,
    #[serde(default)]
    pub owner_org: Option<String>,
    #[serde(default)]
    pub metadata_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_open: Option<bool>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub extras: Vec<Extra>,
}

impl Dataset {
    /// Look up an extra by key.
    pub fn extra(&self, key: &str) -> Option<&str> {
        self.extras
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.value.as_str())
    }

    /// Set an extra, replacing any existing value for the key.
    pub fn set_extra(&mut self, key: &str, value: impl Into<String>) {
        self.extras.retain(|e| e.key != key);
        self.extras.push(Extra {
            key: key.to_string(),
            value: value.into(),
        });
    }
}

/// A downloadable or linked representation of a dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub access_url: Option<String>,
    #[serde(default)]
    pub page_url: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub name_translated: BTreeMap<String, String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub description_translated: BTreeMap<String, String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub mimetype: Option<String>,
    #[serde(default)]
    pub size: Option<i64>,
    #[serde(default)]
    pub license: Option<String>,
}

/// Free-form key/value pair attached to a dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extra {
    pub key: String,
    pub value: String,
}

/// A controlled vocabulary loaded from the store.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    pub name: String,
    pub entries: Vec<VocabularyEntry>,
}

/// One code in a controlled vocabulary. Immutable once loaded.
#[derive(Debug, Clone, Default)]
pub struct VocabularyEntry {
    pub code: String,
    pub value_uri: Option<String>,
    pub labels: BTreeMap<String, String>,
}
