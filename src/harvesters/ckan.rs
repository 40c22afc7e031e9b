//! Remote CKAN adapter: pages through `package_search`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use serde_json::Value;

use super::{Harvester, SourceHandle};
use crate::fetch::PageFetcher;
use crate::importer::{dataset_from_value, string_of};
use crate::models::{Dataset, GatheredRecord, RawContent};
use crate::normalize::NormalizerChain;

pub struct CkanHarvester {
    handle: SourceHandle,
}

impl CkanHarvester {
    pub fn new(handle: SourceHandle) -> Self {
        Self { handle }
    }

    fn search_url(&self, rows: u32, start: u64) -> String {
        format!(
            "{}/api/3/action/package_search?rows={}&start={}",
            self.handle.url, rows, start
        )
    }
}

/// Map a CKAN package onto a canonical record. Shared with the DKAN
/// adapter, whose API speaks the same dialect.
pub(crate) fn import_package(value: &Value) -> Dataset {
    let mut dataset = dataset_from_value(value);

    // Group titles become plain tags; themes are assigned downstream from
    // the controlled vocabulary, not from portal groups.
    if let Some(groups) = value.get("groups").and_then(Value::as_array) {
        for group in groups {
            if let Some(label) = group
                .get("title")
                .and_then(string_of)
                .or_else(|| group.get("name").and_then(string_of))
            {
                dataset.tags.push(label);
            }
        }
    }

    dataset
}

#[async_trait]
impl Harvester for CkanHarvester {
    fn name(&self) -> &str {
        &self.handle.name
    }

    fn source_type(&self) -> &'static str {
        "ckan"
    }

    fn description(&self) -> &'static str {
        "Remote CKAN portal via the package_search API"
    }

    fn handle(&self) -> &SourceHandle {
        &self.handle
    }

    async fn gather(&self, fetcher: &PageFetcher) -> Result<Vec<GatheredRecord>> {
        let rows = self.handle.settings.page_size;
        let mut start: u64 = 0;
        let mut records = Vec::new();

        loop {
            let url = self.search_url(rows, start);
            let raw = fetcher.get_required(&url).await?;
            let response: Value = serde_json::from_str(&raw.body)
                .with_context(|| format!("Invalid package_search response at {}", url))?;
            if response.get("success").and_then(Value::as_bool) == Some(false) {
                anyhow::bail!("package_search reported failure at {}", url);
            }

            let result = &response["result"];
            let total = result.get("count").and_then(Value::as_u64).unwrap_or(0);
            let page = result
                .get("results")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            if page.is_empty() {
                break;
            }

            debug!("package_search start={} returned {} packages", start, page.len());
            for package in &page {
                let guid = package
                    .get("id")
                    .and_then(string_of)
                    .or_else(|| package.get("name").and_then(string_of));
                let Some(guid) = guid else {
                    debug!("Skipping package without id or name");
                    continue;
                };
                records.push(
                    GatheredRecord::new(guid)
                        .with_content(package.to_string(), "application/json"),
                );
            }

            start += page.len() as u64;
            if start >= total {
                break;
            }
        }

        Ok(records)
    }

    fn import(&self, record: &GatheredRecord, raw: &RawContent) -> Result<Dataset> {
        let value: Value = serde_json::from_str(&raw.body)
            .with_context(|| format!("Corrupt stored package for guid {}", record.guid))?;
        let mut dataset = import_package(&value);
        dataset.owner_org = self.handle.owner_org.clone();
        Ok(dataset)
    }

    fn chain(&self, _record: &GatheredRecord) -> NormalizerChain {
        let base = self.handle.url.clone();
        NormalizerChain::standard().with_post("resources", move |mut dataset, _ctx| {
            // Remote CKAN records always have a canonical dataset page.
            if dataset.landing_page.is_none() {
                let tail = dataset
                    .identifier
                    .clone()
                    .unwrap_or_else(|| dataset.name.clone());
                if !tail.is_empty() {
                    dataset.landing_page = Some(format!("{}/dataset/{}", base, tail));
                }
            }
            dataset
        })
    }
}
