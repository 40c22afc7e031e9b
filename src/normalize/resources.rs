//! Stage 4: resource-level inheritance and repair.
//!
//! Resources inherit the dataset licence when they declare none, get a
//! usable URL via the download → access → page fallback (or are dropped),
//! and have format/mimetype completed from a small set of fixed tables.

use log::debug;

use super::{Stage, StageContext};
use crate::models::{Dataset, Resource};

/// Declared formats that carry no information.
pub const PLACEHOLDER_FORMATS: &[&str] = &[
    "",
    "UNKNOWN",
    "N/A",
    "NONE",
    "OTHER",
    "APPLICATION/OCTET-STREAM",
    "BINARY",
];

/// File extension → format code.
pub const EXT_TO_CODE: &[(&str, &str)] = &[
    ("csv", "CSV"),
    ("json", "JSON"),
    ("geojson", "GEOJSON"),
    ("xml", "XML"),
    ("rdf", "RDF_XML"),
    ("xls", "XLS"),
    ("xlsx", "XLSX"),
    ("zip", "ZIP"),
    ("pdf", "PDF"),
    ("shp", "SHP"),
    ("kml", "KML"),
    ("kmz", "KMZ"),
    ("txt", "TXT"),
    ("html", "HTML"),
    ("htm", "HTML"),
    ("ods", "ODS"),
    ("tiff", "TIFF"),
    ("tif", "TIFF"),
];

/// Format code → IANA media type.
pub const CODE_TO_MIME: &[(&str, &str)] = &[
    ("CSV", "text/csv"),
    ("JSON", "application/json"),
    ("GEOJSON", "application/geo+json"),
    ("XML", "application/xml"),
    ("RDF_XML", "application/rdf+xml"),
    ("XLS", "application/vnd.ms-excel"),
    (
        "XLSX",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ),
    ("ZIP", "application/zip"),
    ("PDF", "application/pdf"),
    ("KML", "application/vnd.google-earth.kml+xml"),
    ("KMZ", "application/vnd.google-earth.kmz"),
    ("TXT", "text/plain"),
    ("HTML", "text/html"),
    ("ODS", "application/vnd.oasis.opendocument.spreadsheet"),
    ("TIFF", "image/tiff"),
];

const MAX_RESOURCE_NAME: usize = 100;
const MAX_RESOURCE_DESCRIPTION: usize = 1000;
const MAX_BYTE_SIZE: i64 = 1_000_000_000_000;

pub fn is_placeholder_format(format: &str) -> bool {
    PLACEHOLDER_FORMATS.contains(&format.trim().to_ascii_uppercase().as_str())
}

/// Format code from a file URL's extension, ignoring query strings.
pub fn format_from_url(url: &str) -> Option<&'static str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let ext = path.rsplit('/').next()?.rsplit_once('.')?.1.to_ascii_lowercase();
    EXT_TO_CODE
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, code)| *code)
}

/// OGC service code from a service endpoint URL.
pub fn service_code_from_url(url: &str) -> Option<&'static str> {
    let lower = url.to_ascii_lowercase();
    if lower.contains("service=wmts") || lower.contains("/wmts") {
        Some("WMTS_SRVC")
    } else if lower.contains("service=wms") || lower.contains("/wms") {
        Some("WMS_SRVC")
    } else if lower.contains("service=wfs") || lower.contains("/wfs") {
        Some("WFS_SRVC")
    } else if lower.contains("service=wcs") || lower.contains("/wcs") {
        Some("WCS_SRVC")
    } else if lower.contains("/mapserver") {
        Some("MAP_SRVC")
    } else {
        None
    }
}

pub fn mime_for_code(code: &str) -> Option<&'static str> {
    let code = code.to_ascii_uppercase();
    CODE_TO_MIME
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, mime)| *mime)
}

fn effective_url(resource: &Resource) -> Option<String> {
    [
        &resource.url,
        &resource.download_url,
        &resource.access_url,
        &resource.page_url,
    ]
    .into_iter()
    .flatten()
    .map(|u| u.trim())
    .find(|u| !u.is_empty())
    .map(str::to_string)
}

fn name_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let tail = path.trim_end_matches('/').rsplit('/').next()?;
    if tail.is_empty() || tail.starts_with("http") {
        return None;
    }
    Some(tail.chars().take(MAX_RESOURCE_NAME).collect())
}

fn truncate(value: String, max: usize) -> String {
    if value.chars().count() <= max {
        value
    } else {
        value.chars().take(max).collect()
    }
}

pub struct ResourcesStage;

impl Stage for ResourcesStage {
    fn name(&self) -> &'static str {
        "resources"
    }

    fn apply(&self, mut dataset: Dataset, ctx: &StageContext) -> Dataset {
        let inherited_license = dataset
            .license
            .clone()
            .or_else(|| dataset.license_id.clone());

        let resources = std::mem::take(&mut dataset.resources);
        let mut kept = Vec::with_capacity(resources.len());

        for mut resource in resources {
            // URL fallback; a resource that points nowhere is useless.
            let Some(url) = effective_url(&resource) else {
                debug!(
                    "guid={} dropping resource '{}' without any URL",
                    ctx.guid,
                    resource.name.as_deref().unwrap_or("(unnamed)")
                );
                continue;
            };
            resource.url = Some(url.clone());

            if resource.license.is_none() {
                resource.license = inherited_license.clone();
            }

            // Format repair: placeholder → URL extension → declared media type.
            let declared = resource
                .format
                .take()
                .filter(|f| !is_placeholder_format(f));
            resource.format = declared
                .map(|f| f.trim().to_ascii_uppercase())
                .or_else(|| format_from_url(&url).map(str::to_string))
                .or_else(|| {
                    resource
                        .mimetype
                        .as_deref()
                        .map(crate::vocab::code_from_identifier)
                        .and_then(|code| {
                            let upper = code.to_ascii_uppercase();
                            CODE_TO_MIME
                                .iter()
                                .find(|(_, mime)| mime.eq_ignore_ascii_case(&upper) || **mime == code)
                                .map(|(c, _)| c.to_string())
                        })
                });

            if resource.mimetype.is_none() {
                if let Some(format) = &resource.format {
                    resource.mimetype = mime_for_code(format).map(str::to_string);
                }
            }

            if resource.name.as_deref().map(str::trim).unwrap_or("").is_empty() {
                resource.name = name_from_url(&url);
            }
            if let Some(name) = resource.name.take() {
                resource.name = Some(truncate(name, MAX_RESOURCE_NAME));
            }
            if let Some(description) = resource.description.take() {
                resource.description = Some(truncate(description, MAX_RESOURCE_DESCRIPTION));
            }
            if let Some(size) = resource.size {
                if !(0..=MAX_BYTE_SIZE).contains(&size) {
                    debug!("guid={} dropping implausible byteSize {}", ctx.guid, size);
                    resource.size = None;
                }
            }

            kept.push(resource);
        }

        dataset.resources = kept;
        dataset
    }
}
