//! APD Kritis adapter.
//!
//! The decentralized administration of Crete publishes a Project Open
//! Data `data.json` catalog. Records carry no license and no themes, so
//! the chain injects the portal-wide CC-BY terms and derives themes and
//! high-value-dataset categories from the catalog keywords.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::dcat::gather_json_catalog;
use super::{Harvester, SourceHandle};
use crate::fetch::PageFetcher;
use crate::importer::dataset_from_value;
use crate::models::{Dataset, GatheredRecord, RawContent};
use crate::normalize::NormalizerChain;
use crate::vocab::{DATA_THEME_AUTHORITY, HVD_AUTHORITY};

/// Keyword stems → (data-theme code, HVD category code). Matching is a
/// case-insensitive substring test so inflected Greek forms still hit.
const KEYWORD_CATEGORY_MAP: &[(&str, &str, &str)] = &[
    ("γεωχωρικ", "REGI", "c_ac64a52d"),
    ("μετεωρολογ", "ENVI", "c_a9135398"),
    ("στατιστικ", "GOVE", "c_e1da4e07"),
    ("περιβάλλο", "ENVI", "c_164e0bf5"),
    ("κινητικότητ", "TRAN", "c_b79e35eb"),
];

pub fn categories_for_keyword(keyword: &str) -> Option<(&'static str, &'static str)> {
    let keyword = keyword.trim().to_lowercase();
    KEYWORD_CATEGORY_MAP
        .iter()
        .find(|(stem, _, _)| keyword.contains(stem))
        .map(|(_, theme, hvd)| (*theme, *hvd))
}

pub struct ApdKritisHarvester {
    handle: SourceHandle,
}

impl ApdKritisHarvester {
    pub fn new(handle: SourceHandle) -> Self {
        Self { handle }
    }

    fn catalog_url(&self) -> String {
        format!("{}/data.json", self.handle.url)
    }
}

#[async_trait]
impl Harvester for ApdKritisHarvester {
    fn name(&self) -> &str {
        &self.handle.name
    }

    fn source_type(&self) -> &'static str {
        "apd_kritis"
    }

    fn description(&self) -> &'static str {
        "APD Kritis data.json catalog with CC-BY terms and keyword-derived themes"
    }

    fn handle(&self) -> &SourceHandle {
        &self.handle
    }

    async fn gather(&self, fetcher: &PageFetcher) -> Result<Vec<GatheredRecord>> {
        gather_json_catalog(&self.catalog_url(), fetcher).await
    }

    fn import(&self, record: &GatheredRecord, raw: &RawContent) -> Result<Dataset> {
        let value: Value = serde_json::from_str(&raw.body)
            .with_context(|| format!("Corrupt stored record for guid {}", record.guid))?;
        let mut dataset = dataset_from_value(&value);
        dataset.owner_org = self.handle.owner_org.clone();
        Ok(dataset)
    }

    fn chain(&self, _record: &GatheredRecord) -> NormalizerChain {
        NormalizerChain::standard().with_pre("vocabulary", |mut dataset, _ctx| {
            // Portal-wide terms of use; records never declare a license.
            if dataset.license.is_none() && dataset.license_id.is_none() {
                dataset.license_id = Some("cc-by".to_string());
            }

            for tag in &dataset.tags {
                if let Some((theme, hvd)) = categories_for_keyword(tag) {
                    dataset
                        .theme
                        .push(format!("{}{}", DATA_THEME_AUTHORITY, theme));
                    dataset
                        .hvd_category
                        .push(format!("{}{}", HVD_AUTHORITY, hvd));
                }
            }
            dataset.theme.sort();
            dataset.theme.dedup();
            dataset.hvd_category.sort();
            dataset.hvd_category.dedup();
            dataset
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DefaultsConfig;
    use crate::normalize::testing::{empty_resolver, source_info};
    use crate::normalize::StageContext;

    #[test]
    fn keyword_stems_match_inflections() {
        assert_eq!(
            categories_for_keyword("Γεωχωρικά δεδομένα"),
            Some(("REGI", "c_ac64a52d"))
        );
        assert_eq!(
            categories_for_keyword("μετεωρολογία"),
            Some(("ENVI", "c_a9135398"))
        );
        assert_eq!(categories_for_keyword("τουρισμός"), None);
    }

    #[tokio::test]
    async fn chain_injects_license_and_categories() {
        let handle = SourceHandle {
            name: "apd".to_string(),
            url: "https://apd.example.gr".to_string(),
            title: "APD".to_string(),
            owner_org: None,
            settings: Default::default(),
        };
        let harvester = ApdKritisHarvester::new(handle);
        let record = GatheredRecord::new("ds-1");

        let dataset = Dataset {
            title: Some("Μετεωρολογικοί σταθμοί".to_string()),
            tags: vec!["μετεωρολογία".to_string()],
            ..Default::default()
        };
        let defaults = DefaultsConfig::default();
        let source = source_info();
        let ctx = StageContext {
            vocab: empty_resolver(),
            source: &source,
            defaults: &defaults,
            harvest_object_id: "obj-1",
            guid: "ds-1",
        };
        let out = harvester.chain(&record).run(dataset, &ctx);
        assert!(out
            .hvd_category
            .contains(&format!("{}c_a9135398", HVD_AUTHORITY)));
        // Empty vocabularies pass codes through unvalidated.
        assert!(out.license.is_some() || out.license_id.is_some());
    }
}
