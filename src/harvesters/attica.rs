//! Attica region portal adapter: scraped HTML listings.
//!
//! The portal has no machine-readable catalog. Gather walks the paginated
//! dataset listing, stopping after three consecutive empty pages, and
//! optionally crawls the category pages to tag each dataset with its
//! portal categories. Import scrapes the dataset detail page.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::debug;
use scraper::{Html, Selector};
use serde_json::json;
use std::collections::BTreeMap;
use url::Url;

use super::{Harvester, SourceHandle};
use crate::fetch::PageFetcher;
use crate::importer::{collapse_whitespace, strip_html};
use crate::models::{Dataset, GatheredRecord, RawContent, Resource};
use crate::normalize::NormalizerChain;
use crate::vocab::DATA_THEME_AUTHORITY;

const EMPTY_PAGE_STOP: u32 = 3;

/// Portal category labels → EU data-theme codes. Labels the map does not
/// know survive as plain tags.
pub const CATEGORY_LABEL_THEME_MAP: &[(&str, &str)] = &[
    ("Κοινωνία και Ελεύθερος Χρόνος", "SOCI"),
    ("Γεωργία, Αλιεία, Δασοκομία και Τρόφιμα", "AGRI"),
    ("Υγεία", "HEAL"),
    ("Κυβέρνηση και Δημόσιος Τομέας", "GOVE"),
    ("Περιφέρειες και Πόλεις", "REGI"),
    ("Μεταφορές", "TRAN"),
    ("Οικονομία και Χρηματοοικονομικά", "ECON"),
    ("Δικαιοσύνη, Νομικό Σύστημα και Δημόσια Ασφάλεια", "JUST"),
    ("Περιβάλλον", "ENVI"),
    ("Διεθνή Θέματα", "INTR"),
    ("Ενέργεια", "ENER"),
    ("Εκπαίδευση, Πολιτισμός και Αθλητισμός", "EDUC"),
];

pub fn theme_code_for_label(label: &str) -> Option<&'static str> {
    let label = label.trim();
    CATEGORY_LABEL_THEME_MAP
        .iter()
        .find(|(l, _)| l.eq_ignore_ascii_case(label) || *l == label)
        .map(|(_, code)| *code)
}

pub struct AtticaHarvester {
    handle: SourceHandle,
    dataset_link: Selector,
    category_link: Selector,
    title_sel: Selector,
    notes_sel: Selector,
    tag_sel: Selector,
    resource_item: Selector,
    resource_url: Selector,
    format_label: Selector,
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Bad selector '{}': {}", css, e))
}

impl AtticaHarvester {
    pub fn new(handle: SourceHandle) -> Result<Self> {
        Ok(Self {
            handle,
            dataset_link: selector("li.dataset-item h3.dataset-heading a")?,
            category_link: selector("a[href*='/category/']")?,
            title_sel: selector("h1")?,
            notes_sel: selector("div.notes")?,
            tag_sel: selector("a[href*='/tag/']")?,
            resource_item: selector("li.resource-item")?,
            resource_url: selector("a.resource-url-analytics")?,
            format_label: selector("span.format-label")?,
        })
    }

    fn absolutize(&self, href: &str) -> Option<String> {
        let base = Url::parse(&self.handle.url).ok()?;
        base.join(href).ok().map(|u| u.to_string())
    }

    /// Dataset detail links on one listing page. Sync so the parsed DOM
    /// never crosses an await point.
    fn extract_dataset_links(&self, body: &str) -> Vec<String> {
        let html = Html::parse_document(body);
        html.select(&self.dataset_link)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| self.absolutize(href))
            .collect()
    }

    fn extract_category_links(&self, body: &str) -> Vec<(String, String)> {
        let html = Html::parse_document(body);
        html.select(&self.category_link)
            .filter_map(|a| {
                let href = a.value().attr("href")?;
                let label = collapse_whitespace(&a.text().collect::<String>());
                if label.is_empty() {
                    return None;
                }
                Some((label, self.absolutize(href)?))
            })
            .collect()
    }

    fn scrape_detail(&self, guid: &str, body: &str) -> Dataset {
        let html = Html::parse_document(body);

        let title = html
            .select(&self.title_sel)
            .next()
            .map(|h| collapse_whitespace(&h.text().collect::<String>()))
            .filter(|t| !t.is_empty());
        let notes = html
            .select(&self.notes_sel)
            .next()
            .map(|n| strip_html(&n.inner_html()))
            .filter(|n| !n.is_empty());
        let tags: Vec<String> = html
            .select(&self.tag_sel)
            .map(|a| collapse_whitespace(&a.text().collect::<String>()))
            .filter(|t| !t.is_empty())
            .collect();

        let mut resources = Vec::new();
        for item in html.select(&self.resource_item) {
            let url = item
                .select(&self.resource_url)
                .next()
                .and_then(|a| a.value().attr("href"))
                .and_then(|href| self.absolutize(href));
            let format = item
                .select(&self.format_label)
                .next()
                .map(|f| {
                    f.value()
                        .attr("data-format")
                        .map(str::to_string)
                        .unwrap_or_else(|| collapse_whitespace(&f.text().collect::<String>()))
                })
                .filter(|f| !f.is_empty());
            resources.push(Resource {
                url,
                format,
                ..Default::default()
            });
        }

        Dataset {
            title,
            notes,
            identifier: Some(guid.to_string()),
            landing_page: Some(guid.to_string()),
            tags,
            resources,
            ..Default::default()
        }
    }
}

#[async_trait]
impl Harvester for AtticaHarvester {
    fn name(&self) -> &str {
        &self.handle.name
    }

    fn source_type(&self) -> &'static str {
        "attica"
    }

    fn description(&self) -> &'static str {
        "Scraped HTML dataset listing with portal category crawl"
    }

    fn handle(&self) -> &SourceHandle {
        &self.handle
    }

    async fn gather(&self, fetcher: &PageFetcher) -> Result<Vec<GatheredRecord>> {
        let settings = &self.handle.settings;
        let mut discovered: Vec<String> = Vec::new();
        let mut empty_streak = 0u32;

        for page in settings.start_page..=settings.end_page {
            let url = format!("{}/dataset?page={}", self.handle.url, page);
            let links = match fetcher.get(&url).await? {
                Some(raw) => self.extract_dataset_links(&raw.body),
                None => Vec::new(),
            };
            if links.is_empty() {
                empty_streak += 1;
                if empty_streak >= EMPTY_PAGE_STOP {
                    debug!("{} consecutive empty pages; stopping at page {}", EMPTY_PAGE_STOP, page);
                    break;
                }
                continue;
            }
            empty_streak = 0;
            discovered.extend(links);
        }

        // Second pass: category membership per dataset URL.
        let mut categories: BTreeMap<String, Vec<String>> = BTreeMap::new();
        if settings.include_categories {
            let category_pages = match fetcher
                .get(&format!("{}/categories", self.handle.url))
                .await?
            {
                Some(raw) => self.extract_category_links(&raw.body),
                None => Vec::new(),
            };
            for (label, href) in category_pages {
                let mut empty_streak = 0u32;
                for page in 1..=settings.end_page {
                    let url = format!("{}?page={}", href, page);
                    let links = match fetcher.get(&url).await? {
                        Some(raw) => self.extract_dataset_links(&raw.body),
                        None => Vec::new(),
                    };
                    if links.is_empty() {
                        empty_streak += 1;
                        if empty_streak >= EMPTY_PAGE_STOP {
                            break;
                        }
                        continue;
                    }
                    empty_streak = 0;
                    for link in links {
                        categories.entry(link).or_default().push(label.clone());
                    }
                }
            }
        }

        let mut seen = std::collections::HashSet::new();
        let records = discovered
            .into_iter()
            .filter(|link| seen.insert(link.clone()))
            .map(|link| {
                let labels = categories.get(&link).cloned().unwrap_or_default();
                let mut record = GatheredRecord::new(link.clone()).with_url(link);
                record.meta = json!({ "portal_categories": labels });
                record
            })
            .collect();
        Ok(records)
    }

    fn import(&self, record: &GatheredRecord, raw: &RawContent) -> Result<Dataset> {
        let mut dataset = self.scrape_detail(&record.guid, &raw.body);
        dataset.owner_org = self.handle.owner_org.clone();
        Ok(dataset)
    }

    fn chain(&self, record: &GatheredRecord) -> NormalizerChain {
        let labels: Vec<String> = record
            .meta
            .get("portal_categories")
            .and_then(|v| v.as_array())
            .map(|list| {
                list.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        NormalizerChain::standard()
            .with_pre("vocabulary", move |mut dataset, _ctx| {
                for label in &labels {
                    match theme_code_for_label(label) {
                        Some(code) => dataset
                            .theme
                            .push(format!("{}{}", DATA_THEME_AUTHORITY, code)),
                        None => dataset.tags.push(label.clone()),
                    }
                }
                dataset.theme.sort();
                dataset.theme.dedup();
                dataset
            })
            .with_pre("tags", |mut dataset, _ctx| {
                // Every record from this portal is regional by definition.
                dataset.tags.push("περιφέρεια αττικής".to_string());
                dataset
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn harvester() -> AtticaHarvester {
        AtticaHarvester::new(SourceHandle {
            name: "attica".to_string(),
            url: "https://data.attica.example.gr".to_string(),
            title: "Attica".to_string(),
            owner_org: None,
            settings: Default::default(),
        })
        .unwrap()
    }

    #[test]
    fn listing_links_are_extracted_and_absolutized() {
        let body = r#"
            <ul>
              <li class="dataset-item"><h3 class="dataset-heading">
                <a href="/dataset/air-quality">Ποιότητα αέρα</a></h3></li>
              <li class="dataset-item"><h3 class="dataset-heading">
                <a href="/dataset/noise">Θόρυβος</a></h3></li>
              <li class="other"><a href="/dataset/ignored">x</a></li>
            </ul>"#;
        let links = harvester().extract_dataset_links(body);
        assert_eq!(
            links,
            vec![
                "https://data.attica.example.gr/dataset/air-quality",
                "https://data.attica.example.gr/dataset/noise"
            ]
        );
    }

    #[test]
    fn detail_page_scrape() {
        let body = r#"
            <h1> Ποιότητα αέρα </h1>
            <div class="notes"><p>Ωριαίες μετρήσεις</p></div>
            <a href="/tag/αέρας">αέρας</a>
            <ul>
              <li class="resource-item">
                <a class="resource-url-analytics" href="/files/air.csv">Download</a>
                <span class="format-label" data-format="csv">CSV</span>
              </li>
            </ul>"#;
        let dataset = harvester().scrape_detail("https://data.attica.example.gr/dataset/air", body);
        assert_eq!(dataset.title.as_deref(), Some("Ποιότητα αέρα"));
        assert_eq!(dataset.notes.as_deref(), Some("Ωριαίες μετρήσεις"));
        assert_eq!(dataset.tags, vec!["αέρας"]);
        assert_eq!(
            dataset.resources[0].url.as_deref(),
            Some("https://data.attica.example.gr/files/air.csv")
        );
        assert_eq!(dataset.resources[0].format.as_deref(), Some("csv"));
    }

    #[test]
    fn category_labels_map_to_theme_codes() {
        assert_eq!(theme_code_for_label("Περιβάλλον"), Some("ENVI"));
        assert_eq!(theme_code_for_label("Μεταφορές"), Some("TRAN"));
        assert_eq!(theme_code_for_label("Άγνωστη Κατηγορία"), None);
    }
}
