//! Source adapters.
//!
//! Each adapter implements [`Harvester`]: enumerate remote records
//! (`gather`), obtain one record's raw body (`fetch`), map it onto an
//! initial [`Dataset`] (`import`), and declare its normalizer chain
//! (`chain`). Adapters customize the standard chain by wrapping named
//! stages, never by replacing the chain's order.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │              HarvesterRegistry               │
//! │ ┌──────┐ ┌──────┐ ┌──────┐ ┌──────────────┐ │
//! │ │ dcat │ │ ekan │ │ ckan │ │ dkan/attica/ │ │
//! │ │      │ │      │ │      │ │ apd/bog      │ │
//! │ └──────┘ └──────┘ └──────┘ └──────────────┘ │
//! └──────────────────────┬───────────────────────┘
//!                        ▼
//!            run_harvest() → import pipeline
//! ```

pub mod apd_kritis;
pub mod attica;
pub mod bank_of_greece;
pub mod ckan;
pub mod dcat;
pub mod dkan;
pub mod ekan;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::{Config, SourceConfig, SourceSettings};
use crate::fetch::PageFetcher;
use crate::models::{Dataset, GatheredRecord, RawContent};
use crate::normalize::{NormalizerChain, SourceInfo};

/// Per-instance identity and settings shared by all adapters.
#[derive(Debug, Clone)]
pub struct SourceHandle {
    pub name: String,
    pub url: String,
    pub title: String,
    pub owner_org: Option<String>,
    pub settings: SourceSettings,
}

impl SourceHandle {
    pub fn from_config(name: &str, config: &SourceConfig) -> Self {
        Self {
            name: name.to_string(),
            url: config.url.trim_end_matches('/').to_string(),
            title: config.title.clone().unwrap_or_else(|| name.to_string()),
            owner_org: config.owner_org.clone(),
            settings: config.settings.clone(),
        }
    }

    pub fn info(&self) -> SourceInfo {
        SourceInfo {
            id: self.name.clone(),
            title: self.title.clone(),
            url: self.url.clone(),
        }
    }
}

#[async_trait]
pub trait Harvester: Send + Sync {
    /// Instance name (the `[sources.<name>]` key).
    fn name(&self) -> &str;

    /// Adapter type identifier (e.g. `"ckan"`, `"attica"`).
    fn source_type(&self) -> &'static str;

    /// One-line description for `odh sources` output.
    fn description(&self) -> &'static str;

    fn handle(&self) -> &SourceHandle;

    fn info(&self) -> SourceInfo {
        self.handle().info()
    }

    /// Enumerate the source. One [`GatheredRecord`] per remote GUID.
    /// An error here means the source is unreachable and aborts the job
    /// without touching deletion state.
    async fn gather(&self, fetcher: &PageFetcher) -> Result<Vec<GatheredRecord>>;

    /// Obtain the raw body for one record. The default serves inline
    /// content from gather, or fetches the record URL.
    async fn fetch(&self, record: &GatheredRecord, fetcher: &PageFetcher) -> Result<RawContent> {
        if let Some(content) = &record.content {
            return Ok(content.clone());
        }
        if let Some(url) = &record.url {
            return fetcher.get_required(url).await;
        }
        anyhow::bail!("Record {} has neither inline content nor a URL", record.guid)
    }

    /// Map the raw body onto an initial canonical record.
    fn import(&self, record: &GatheredRecord, raw: &RawContent) -> Result<Dataset>;

    /// The normalizer chain for one record. Adapters wrap named stages of
    /// the standard chain; the default is the standard chain itself.
    fn chain(&self, record: &GatheredRecord) -> NormalizerChain {
        let _ = record;
        NormalizerChain::standard()
    }
}

/// Registry of adapters resolved from the config file.
pub struct HarvesterRegistry {
    harvesters: Vec<Box<dyn Harvester>>,
}

impl HarvesterRegistry {
    pub fn new() -> Self {
        Self {
            harvesters: Vec::new(),
        }
    }

    /// Build every configured source's adapter.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut registry = Self::new();
        for (name, source) in &config.sources {
            let handle = SourceHandle::from_config(name, source);
            let harvester: Box<dyn Harvester> = match source.source_type.as_str() {
                "dcat" => Box::new(dcat::DcatHarvester::new(handle)?),
                "ekan" => Box::new(ekan::EkanHarvester::new(handle)),
                "ckan" => Box::new(ckan::CkanHarvester::new(handle)),
                "dkan" => Box::new(dkan::DkanHarvester::new(handle)),
                "attica" => Box::new(attica::AtticaHarvester::new(handle)?),
                "apd_kritis" => Box::new(apd_kritis::ApdKritisHarvester::new(handle)),
                "bank_of_greece" => Box::new(bank_of_greece::BankOfGreeceHarvester::new(handle)),
                other => anyhow::bail!("Unknown source type '{}'", other),
            };
            registry.register(harvester);
        }
        Ok(registry)
    }

    pub fn register(&mut self, harvester: Box<dyn Harvester>) {
        self.harvesters.push(harvester);
    }

    pub fn harvesters(&self) -> &[Box<dyn Harvester>] {
        &self.harvesters
    }

    pub fn find(&self, name: &str) -> Option<&dyn Harvester> {
        self.harvesters
            .iter()
            .find(|h| h.name() == name)
            .map(|h| h.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.harvesters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.harvesters.len()
    }
}

impl Default for HarvesterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
