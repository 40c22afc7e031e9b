use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub harvest: HarvestConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HarvestConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_error_report_limit")]
    pub error_report_limit: usize,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            error_report_limit: default_error_report_limit(),
        }
    }
}

fn default_user_agent() -> String {
    format!("open-data-harvester/{}", env!("CARGO_PKG_VERSION"))
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_error_report_limit() -> usize {
    5
}

/// Locale and fallback defaults applied by the normalizer chain.
#[derive(Debug, Deserialize, Clone)]
pub struct DefaultsConfig {
    #[serde(default = "default_primary_locale")]
    pub primary_locale: String,
    #[serde(default = "default_secondary_locale")]
    pub secondary_locale: String,
    #[serde(default = "default_title")]
    pub default_title: String,
    #[serde(default = "default_notes")]
    pub default_notes: String,
    /// Legislation URI stamped on PUBLIC datasets that declare none.
    #[serde(default = "default_open_data_legislation")]
    pub open_data_legislation: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            primary_locale: default_primary_locale(),
            secondary_locale: default_secondary_locale(),
            default_title: default_title(),
            default_notes: default_notes(),
            open_data_legislation: default_open_data_legislation(),
        }
    }
}

fn default_primary_locale() -> String {
    "el".to_string()
}
fn default_secondary_locale() -> String {
    "en".to_string()
}
fn default_title() -> String {
    "Untitled dataset".to_string()
}
fn default_notes() -> String {
    "No description provided.".to_string()
}
fn default_open_data_legislation() -> String {
    "http://data.europa.eu/eli/dir/2019/1024/oj".to_string()
}

/// One harvest source entry (`[sources.<name>]` in the config file).
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub url: String,
    pub source_type: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub owner_org: Option<String>,
    #[serde(default)]
    pub settings: SourceSettings,
}

/// Free-form per-source settings. Recognized keys are deserialized out;
/// everything else is preserved untouched in `extra`.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceSettings {
    #[serde(default)]
    pub rdf_format: Option<String>,
    #[serde(default = "default_max_nid")]
    pub max_nid: u32,
    #[serde(default = "default_nid_start")]
    pub nid_start: u32,
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,
    #[serde(default = "default_page_size", alias = "limit")]
    pub page_size: u32,
    #[serde(default = "default_start_page")]
    pub start_page: u32,
    #[serde(default = "default_end_page")]
    pub end_page: u32,
    #[serde(default = "default_include_categories")]
    pub include_categories: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            rdf_format: None,
            max_nid: default_max_nid(),
            nid_start: default_nid_start(),
            throttle_ms: default_throttle_ms(),
            page_size: default_page_size(),
            start_page: default_start_page(),
            end_page: default_end_page(),
            include_categories: default_include_categories(),
            extra: BTreeMap::new(),
        }
    }
}

fn default_max_nid() -> u32 {
    500
}
fn default_nid_start() -> u32 {
    1
}
fn default_throttle_ms() -> u64 {
    300
}
fn default_page_size() -> u32 {
    100
}
fn default_start_page() -> u32 {
    1
}
fn default_end_page() -> u32 {
    30
}
fn default_include_categories() -> bool {
    true
}

pub const SOURCE_TYPES: &[&str] = &[
    "dcat",
    "ekan",
    "ckan",
    "dkan",
    "attica",
    "apd_kritis",
    "bank_of_greece",
];

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.harvest.timeout_secs == 0 {
        anyhow::bail!("harvest.timeout_secs must be > 0");
    }

    for (name, source) in &config.sources {
        if source.url.trim().is_empty() {
            anyhow::bail!("sources.{}.url must not be empty", name);
        }
        if !SOURCE_TYPES.contains(&source.source_type.as_str()) {
            anyhow::bail!(
                "Unknown source type '{}' for source '{}'. Must be one of: {}",
                source.source_type,
                name,
                SOURCE_TYPES.join(", ")
            );
        }
        let s = &source.settings;
        if s.nid_start == 0 || s.max_nid < s.nid_start {
            anyhow::bail!(
                "sources.{}: nid_start must be >= 1 and max_nid >= nid_start",
                name
            );
        }
        if s.start_page == 0 || s.end_page < s.start_page {
            anyhow::bail!(
                "sources.{}: start_page must be >= 1 and end_page >= start_page",
                name
            );
        }
        if s.page_size == 0 {
            anyhow::bail!("sources.{}: page_size must be > 0", name);
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(body: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    #[test]
    fn minimal_config_parses_with_defaults() {
        let f = write_config(
            r#"
[db]
path = "harvest.db"

[sources.geodata]
url = "https://geodata.example.gr"
source_type = "dcat"
"#,
        );
        let config = load_config(f.path()).unwrap();
        assert_eq!(config.harvest.timeout_secs, 30);
        assert_eq!(config.defaults.primary_locale, "el");
        let source = &config.sources["geodata"];
        assert_eq!(source.source_type, "dcat");
        assert_eq!(source.settings.throttle_ms, 300);
        assert_eq!(source.settings.max_nid, 500);
        assert!(source.settings.include_categories);
    }

    #[test]
    fn unknown_source_type_is_rejected() {
        let f = write_config(
            r#"
[db]
path = "harvest.db"

[sources.bad]
url = "https://example.org"
source_type = "socrata"
"#,
        );
        let err = load_config(f.path()).unwrap_err();
        assert!(err.to_string().contains("Unknown source type"));
    }

    #[test]
    fn settings_limit_alias_and_passthrough() {
        let f = write_config(
            r#"
[db]
path = "harvest.db"

[sources.portal]
url = "https://portal.example.gr"
source_type = "ckan"

[sources.portal.settings]
limit = 50
custom_flag = "kept"
"#,
        );
        let config = load_config(f.path()).unwrap();
        let settings = &config.sources["portal"].settings;
        assert_eq!(settings.page_size, 50);
        assert_eq!(
            settings.extra.get("custom_flag").and_then(|v| v.as_str()),
            Some("kept")
        );
    }

    #[test]
    fn bad_page_window_is_rejected() {
        let f = write_config(
            r#"
[db]
path = "harvest.db"

[sources.portal]
url = "https://portal.example.gr"
source_type = "attica"

[sources.portal.settings]
start_page = 5
end_page = 2
"#,
        );
        assert!(load_config(f.path()).is_err());
    }
}
