//! DKAN adapter.
//!
//! DKAN speaks the CKAN search dialect but with looser data hygiene:
//! human-readable resource sizes ("1.2 MB"), legacy date formats, and
//! maintainer fields standing in for contact points. Import reuses the
//! CKAN package mapping and repairs those quirks.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::ckan::import_package;
use super::{Harvester, SourceHandle};
use crate::fetch::PageFetcher;
use crate::importer::{parse_datetime, string_of};
use crate::models::{Dataset, GatheredRecord, RawContent};

/// Parse "1.2 MB" / "340 KB" / "512" style size declarations into bytes.
pub fn parse_human_size(value: &str) -> Option<i64> {
    let value = value.trim().to_ascii_uppercase();
    if value.is_empty() {
        return None;
    }
    if let Ok(bytes) = value.parse::<i64>() {
        return Some(bytes);
    }

    let (number, unit) = value.split_at(value.find(|c: char| c.is_ascii_alphabetic())?);
    let number: f64 = number.trim().replace(',', ".").parse().ok()?;
    let factor: f64 = match unit.trim() {
        "B" | "BYTE" | "BYTES" => 1.0,
        "KB" | "KIB" => 1024.0,
        "MB" | "MIB" => 1024.0 * 1024.0,
        "GB" | "GIB" => 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };
    Some((number * factor).round() as i64)
}

pub struct DkanHarvester {
    handle: SourceHandle,
    inner: super::ckan::CkanHarvester,
}

impl DkanHarvester {
    pub fn new(handle: SourceHandle) -> Self {
        let inner = super::ckan::CkanHarvester::new(handle.clone());
        Self { handle, inner }
    }
}

#[async_trait]
impl Harvester for DkanHarvester {
    fn name(&self) -> &str {
        &self.handle.name
    }

    fn source_type(&self) -> &'static str {
        "dkan"
    }

    fn description(&self) -> &'static str {
        "DKAN portal via the CKAN-compatible search API"
    }

    fn handle(&self) -> &SourceHandle {
        &self.handle
    }

    async fn gather(&self, fetcher: &PageFetcher) -> Result<Vec<GatheredRecord>> {
        self.inner.gather(fetcher).await
    }

    fn import(&self, record: &GatheredRecord, raw: &RawContent) -> Result<Dataset> {
        let value: Value = serde_json::from_str(&raw.body)
            .with_context(|| format!("Corrupt stored package for guid {}", record.guid))?;
        let mut dataset = import_package(&value);
        dataset.owner_org = self.handle.owner_org.clone();

        // DKAN resource sizes arrive as display strings.
        if let Some(resources) = value.get("resources").and_then(Value::as_array) {
            for (i, resource) in resources.iter().enumerate() {
                if let Some(slot) = dataset.resources.get_mut(i) {
                    if slot.size.is_none() {
                        if let Some(size) = resource.get("size").and_then(string_of) {
                            slot.size = parse_human_size(&size);
                        }
                    }
                }
            }
        }

        // Legacy date fields when metadata_modified is absent or odd.
        if dataset.metadata_modified.is_none() {
            dataset.metadata_modified = value
                .get("changed")
                .or_else(|| value.get("revision_timestamp"))
                .and_then(string_of)
                .and_then(|v| parse_datetime(&v));
        }

        if dataset.landing_page.is_none() {
            dataset.landing_page = Some(format!("{}/dataset/{}", self.handle.url, record.guid));
        }

        Ok(dataset)
    }
}
