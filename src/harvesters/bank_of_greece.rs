//! Bank of Greece adapter.
//!
//! The bank publishes a single DCAT-AP RDF/XML feed for its statistical
//! series. Frequencies arrive as free text (Greek or English) and license
//! statements as prose, so the chain maps both onto authority codes before
//! vocabulary validation.

use anyhow::Result;
use async_trait::async_trait;

use super::dcat::{gather_xml_feed, import_from_xml};
use super::{Harvester, SourceHandle};
use crate::fetch::PageFetcher;
use crate::models::{Dataset, GatheredRecord, RawContent};
use crate::normalize::NormalizerChain;

/// Free-text frequency declarations → authority codes. Stem matching, so
/// both Greek inflections and English spellings resolve.
pub fn frequency_code_from_text(value: &str) -> Option<&'static str> {
    let value = value.trim().to_lowercase();
    // Quarterly before monthly: "τριμηνιαία" contains the monthly stem.
    const STEMS: &[(&str, &str)] = &[
        ("τριμην", "QUARTERLY"),
        ("quarterly", "QUARTERLY"),
        ("ετήσ", "ANNUAL"),
        ("ετησ", "ANNUAL"),
        ("annual", "ANNUAL"),
        ("μηνια", "MONTHLY"),
        ("monthly", "MONTHLY"),
        ("εβδομαδ", "WEEKLY"),
        ("weekly", "WEEKLY"),
        ("ημερησ", "DAILY"),
        ("ημερήσ", "DAILY"),
        ("daily", "DAILY"),
    ];
    STEMS
        .iter()
        .find(|(stem, _)| value.contains(stem))
        .map(|(_, code)| *code)
}

/// Detect a Creative Commons attribution license in a prose statement.
pub fn is_cc_by_statement(value: &str) -> bool {
    let value = value.to_lowercase();
    value.contains("creative commons") || value.contains("cc by") || value.contains("cc-by")
}

pub struct BankOfGreeceHarvester {
    handle: SourceHandle,
}

impl BankOfGreeceHarvester {
    pub fn new(handle: SourceHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl Harvester for BankOfGreeceHarvester {
    fn name(&self) -> &str {
        &self.handle.name
    }

    fn source_type(&self) -> &'static str {
        "bank_of_greece"
    }

    fn description(&self) -> &'static str {
        "Bank of Greece statistical series (DCAT-AP XML feed)"
    }

    fn handle(&self) -> &SourceHandle {
        &self.handle
    }

    async fn gather(&self, fetcher: &PageFetcher) -> Result<Vec<GatheredRecord>> {
        gather_xml_feed(&self.handle.url, fetcher).await
    }

    fn import(&self, record: &GatheredRecord, raw: &RawContent) -> Result<Dataset> {
        let mut dataset = import_from_xml(record, raw)?;
        dataset.owner_org = self.handle.owner_org.clone();
        Ok(dataset)
    }

    fn chain(&self, _record: &GatheredRecord) -> NormalizerChain {
        NormalizerChain::standard().with_pre("vocabulary", |mut dataset, _ctx| {
            if let Some(frequency) = &dataset.frequency {
                if let Some(code) = frequency_code_from_text(frequency) {
                    dataset.frequency = Some(code.to_string());
                }
            }
            let statement = dataset
                .license
                .as_deref()
                .or(dataset.license_title.as_deref());
            if let Some(statement) = statement {
                if !statement.starts_with("http") && is_cc_by_statement(statement) {
                    dataset.license = Some("CC_BY_4_0".to_string());
                }
            }
            dataset
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_text_frequencies() {
        assert_eq!(frequency_code_from_text("Ετήσια"), Some("ANNUAL"));
        assert_eq!(frequency_code_from_text("Μηνιαία συχνότητα"), Some("MONTHLY"));
        assert_eq!(frequency_code_from_text("weekly"), Some("WEEKLY"));
        assert_eq!(frequency_code_from_text("Ημερήσια"), Some("DAILY"));
        assert_eq!(frequency_code_from_text("Τριμηνιαία"), Some("QUARTERLY"));
        assert_eq!(frequency_code_from_text("ad hoc"), None);
    }

    #[test]
    fn cc_by_prose_detection() {
        assert!(is_cc_by_statement(
            "Data is provided under a Creative Commons Attribution 4.0 license"
        ));
        assert!(is_cc_by_statement("CC BY 4.0"));
        assert!(!is_cc_by_statement("All rights reserved"));
    }
}
