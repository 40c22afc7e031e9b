//! EKAN adapter: per-record nid probing.
//!
//! The portal exposes no catalog listing, only per-dataset DCAT-AP XML
//! exports at `/dataset/<nid>/dcat-ap-2.0/xml`. Gather probes the bounded
//! nid range; a 404 is a gap in the sequence, not a failure. The fetcher's
//! throttle applies between every probe.

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, warn};

use super::dcat::import_from_xml;
use super::{Harvester, SourceHandle};
use crate::fetch::PageFetcher;
use crate::importer::string_of;
use crate::models::{Dataset, GatheredRecord, RawContent};
use crate::normalize::NormalizerChain;
use crate::normalize::resources::service_code_from_url;
use crate::parse::parse_dcat_xml;

/// ISO-8601 repetition intervals → frequency authority codes.
pub fn iso_frequency_code(value: &str) -> Option<&'static str> {
    match value.trim().to_ascii_uppercase().as_str() {
        "R/PT1H" | "PT1H" => Some("HOURLY"),
        "P1D" | "R/P1D" => Some("DAILY"),
        "P7D" | "P1W" | "R/P1W" => Some("WEEKLY"),
        "P1M" | "R/P1M" => Some("MONTHLY"),
        "P3M" | "R/P3M" => Some("QUARTERLY"),
        "P1Y" | "R/P1Y" => Some("ANNUAL"),
        _ => None,
    }
}

pub struct EkanHarvester {
    handle: SourceHandle,
}

impl EkanHarvester {
    pub fn new(handle: SourceHandle) -> Self {
        Self { handle }
    }

    fn record_url(&self, nid: u32) -> String {
        format!("{}/dataset/{}/dcat-ap-2.0/xml", self.handle.url, nid)
    }
}

#[async_trait]
impl Harvester for EkanHarvester {
    fn name(&self) -> &str {
        &self.handle.name
    }

    fn source_type(&self) -> &'static str {
        "ekan"
    }

    fn description(&self) -> &'static str {
        "EKAN portal probed by node id (per-dataset DCAT-AP XML export)"
    }

    fn handle(&self) -> &SourceHandle {
        &self.handle
    }

    async fn gather(&self, fetcher: &PageFetcher) -> Result<Vec<GatheredRecord>> {
        let settings = &self.handle.settings;
        let mut records = Vec::new();

        for nid in settings.nid_start..=settings.max_nid {
            let url = self.record_url(nid);
            let Some(raw) = fetcher.get(&url).await? else {
                continue; // gap in the nid sequence
            };
            if !raw.body.contains("<rdf") {
                debug!("nid {} returned a non-RDF body; skipping", nid);
                continue;
            }

            let guid = match parse_dcat_xml(&raw.body) {
                Ok(doc) => doc
                    .datasets
                    .first()
                    .and_then(|d| {
                        d.get("identifier")
                            .and_then(string_of)
                            .or_else(|| d.get("uri").and_then(string_of))
                    })
                    .unwrap_or_else(|| url.clone()),
                Err(err) => {
                    warn!("nid {} export is unparseable ({}); skipping", nid, err);
                    continue;
                }
            };

            let mut record =
                GatheredRecord::new(guid).with_content(raw.body, "application/rdf+xml");
            record.meta = serde_json::json!({ "nid": nid });
            records.push(record);
        }

        Ok(records)
    }

    fn import(&self, record: &GatheredRecord, raw: &RawContent) -> Result<Dataset> {
        let mut dataset = import_from_xml(record, raw)?;
        dataset.owner_org = self.handle.owner_org.clone();
        if dataset.landing_page.is_none() {
            if let Some(nid) = record.meta.get("nid").and_then(|n| n.as_u64()) {
                dataset.landing_page = Some(format!("{}/dataset/{}", self.handle.url, nid));
            }
        }
        Ok(dataset)
    }

    fn chain(&self, _record: &GatheredRecord) -> NormalizerChain {
        NormalizerChain::standard()
            .with_pre("vocabulary", |mut dataset, _ctx| {
                if let Some(frequency) = &dataset.frequency {
                    if let Some(code) = iso_frequency_code(frequency) {
                        dataset.frequency = Some(code.to_string());
                    }
                }
                dataset
            })
            .with_post("resources", |mut dataset, _ctx| {
                // OGC service endpoints rarely declare a format.
                for resource in &mut dataset.resources {
                    if resource.format.is_none() {
                        if let Some(url) = &resource.url {
                            if let Some(code) = service_code_from_url(url) {
                                resource.format = Some(code.to_string());
                            }
                        }
                    }
                }
                dataset
            })
    }
}
