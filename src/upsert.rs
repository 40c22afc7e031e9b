//! Catalog upsert: turning a normalized record into a created / updated /
//! unchanged catalog entry, and keeping the per-GUID `current` flag honest.
//!
//! Identity resolution order: the dataset a previous current harvest
//! object is linked to wins; the derived stable name is the fallback. A
//! renamed source record therefore keeps its catalog identity and its
//! stored name.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::importer::MAX_NAME_LEN;
use crate::models::{Dataset, Outcome};

/// A stored catalog entry.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
    pub dataset: Dataset,
    pub state: String,
    pub metadata_modified: Option<i64>,
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn show(&self, id: &str) -> Result<Option<CatalogEntry>>;
    async fn show_by_name(&self, name: &str) -> Result<Option<CatalogEntry>>;
    async fn create(&self, dataset: &Dataset) -> Result<CatalogEntry>;
    async fn update(&self, id: &str, dataset: &Dataset) -> Result<CatalogEntry>;
    async fn patch_state(&self, id: &str, state: &str) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════
// SQLite catalog
// ═══════════════════════════════════════════════════════════════════════

pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn validate_dataset(dataset: &Dataset) -> Result<()> {
    let name = dataset.name.trim();
    if name.is_empty() {
        bail!("Validation failed: dataset name is empty");
    }
    if name.chars().count() > MAX_NAME_LEN {
        bail!("Validation failed: dataset name exceeds {} chars", MAX_NAME_LEN);
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        bail!("Validation failed: dataset name '{}' has invalid characters", name);
    }
    if dataset.title.as_deref().map(str::trim).unwrap_or("").is_empty() {
        bail!("Validation failed: dataset title is empty");
    }
    Ok(())
}

fn entry_from_row(row: (String, String, String, String, Option<i64>)) -> Result<CatalogEntry> {
    let (id, name, data, state, metadata_modified) = row;
    let dataset: Dataset =
        serde_json::from_str(&data).context("Corrupt dataset row in catalog store")?;
    Ok(CatalogEntry {
        id,
        name,
        dataset,
        state,
        metadata_modified,
    })
}

const SELECT_ENTRY: &str = "SELECT id, name, data, state, metadata_modified FROM datasets";

#[async_trait]
impl CatalogStore for SqliteCatalog {
    async fn show(&self, id: &str) -> Result<Option<CatalogEntry>> {
        let row: Option<(String, String, String, String, Option<i64>)> =
            sqlx::query_as(&format!("{} WHERE id = ?", SELECT_ENTRY))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(entry_from_row).transpose()
    }

    async fn show_by_name(&self, name: &str) -> Result<Option<CatalogEntry>> {
        let row: Option<(String, String, String, String, Option<i64>)> =
            sqlx::query_as(&format!("{} WHERE name = ?", SELECT_ENTRY))
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        row.map(entry_from_row).transpose()
    }

    async fn create(&self, dataset: &Dataset) -> Result<CatalogEntry> {
        validate_dataset(dataset)?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().timestamp();
        let metadata_modified = dataset.metadata_modified.map(|d| d.timestamp());
        let data = serde_json::to_string(dataset)?;

        sqlx::query(
            "INSERT INTO datasets (id, name, data, state, metadata_modified, created_at, updated_at)
             VALUES (?, ?, ?, 'active', ?, ?, ?)",
        )
        .bind(&id)
        .bind(&dataset.name)
        .bind(&data)
        .bind(metadata_modified)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to insert dataset")?;

        Ok(CatalogEntry {
            id,
            name: dataset.name.clone(),
            dataset: dataset.clone(),
            state: "active".to_string(),
            metadata_modified,
        })
    }

    async fn update(&self, id: &str, dataset: &Dataset) -> Result<CatalogEntry> {
        validate_dataset(dataset)?;
        let now = Utc::now().timestamp();
        let metadata_modified = dataset.metadata_modified.map(|d| d.timestamp());
        let data = serde_json::to_string(dataset)?;

        let result = sqlx::query(
            "UPDATE datasets SET data = ?, metadata_modified = ?, state = 'active', updated_at = ?
             WHERE id = ?",
        )
        .bind(&data)
        .bind(metadata_modified)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            bail!("No dataset with id {}", id);
        }

        Ok(CatalogEntry {
            id: id.to_string(),
            name: dataset.name.clone(),
            dataset: dataset.clone(),
            state: "active".to_string(),
            metadata_modified,
        })
    }

    async fn patch_state(&self, id: &str, state: &str) -> Result<()> {
        sqlx::query("UPDATE datasets SET state = ?, updated_at = ? WHERE id = ?")
            .bind(state)
            .bind(Utc::now().timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Commit
// ═══════════════════════════════════════════════════════════════════════

/// Dataset id linked from the current harvest object for a GUID, if any.
async fn linked_dataset_id(pool: &SqlitePool, guid: &str) -> Result<Option<String>> {
    let row: Option<(Option<String>,)> = sqlx::query_as(
        "SELECT dataset_id FROM harvest_objects
         WHERE guid = ? AND current = 1 AND dataset_id IS NOT NULL
         ORDER BY gathered_at DESC LIMIT 1",
    )
    .bind(guid)
    .fetch_optional(pool)
    .await?;
    Ok(row.and_then(|(id,)| id))
}

/// Flip every other object for this GUID (and dataset) off, then make the
/// given object the single current one.
async fn make_current(
    pool: &SqlitePool,
    object_id: &str,
    guid: &str,
    dataset_id: Option<&str>,
    outcome: Outcome,
) -> Result<()> {
    sqlx::query("UPDATE harvest_objects SET current = 0 WHERE guid = ?")
        .bind(guid)
        .execute(pool)
        .await?;
    if let Some(dataset_id) = dataset_id {
        sqlx::query("UPDATE harvest_objects SET current = 0 WHERE dataset_id = ?")
            .bind(dataset_id)
            .execute(pool)
            .await?;
    }
    sqlx::query(
        "UPDATE harvest_objects SET current = 1, dataset_id = ?, outcome = ? WHERE id = ?",
    )
    .bind(dataset_id)
    .bind(outcome.as_str())
    .bind(object_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Record a per-record failure on the harvest object. The job carries on.
pub async fn record_failure(pool: &SqlitePool, object_id: &str, error: &str) -> Result<()> {
    let errors = serde_json::to_string(&vec![error])?;
    sqlx::query("UPDATE harvest_objects SET outcome = 'failed', errors = ? WHERE id = ?")
        .bind(errors)
        .bind(object_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Commit a normalized record to the catalog.
///
/// Returns the outcome; validation failures surface as errors for the
/// caller to record as a `failed` outcome.
pub async fn commit_record(
    pool: &SqlitePool,
    catalog: &dyn CatalogStore,
    object_id: &str,
    guid: &str,
    mut dataset: Dataset,
) -> Result<Outcome> {
    // Resolve identity: prior linkage first, stored name second.
    let existing = match linked_dataset_id(pool, guid).await? {
        Some(id) => catalog.show(&id).await?,
        None => None,
    };
    let existing = match existing {
        Some(entry) => Some(entry),
        None => catalog.show_by_name(&dataset.name).await?,
    };

    match existing {
        Some(entry) => {
            // Unchanged short-circuit: both timestamps known and the
            // incoming one is not newer.
            let incoming = dataset.metadata_modified.map(|d| d.timestamp());
            if let (Some(incoming), Some(stored)) = (incoming, entry.metadata_modified) {
                if incoming <= stored && entry.state == "active" {
                    debug!("guid={} unchanged (metadata not newer)", guid);
                    make_current(pool, object_id, guid, Some(&entry.id), Outcome::Unchanged)
                        .await?;
                    return Ok(Outcome::Unchanged);
                }
            }

            // The stored name is the stable identity; keep it.
            dataset.name = entry.name.clone();
            catalog.update(&entry.id, &dataset).await?;
            make_current(pool, object_id, guid, Some(&entry.id), Outcome::Updated).await?;
            Ok(Outcome::Updated)
        }
        None => {
            let entry = catalog.create(&dataset).await?;
            make_current(pool, object_id, guid, Some(&entry.id), Outcome::Created).await?;
            Ok(Outcome::Created)
        }
    }
}

/// Commit a deletion: the catalog entry flips to `deleted` state and the
/// delete-marked object becomes current, so the GUID leaves the known set.
pub async fn commit_deletion(
    pool: &SqlitePool,
    catalog: &dyn CatalogStore,
    object_id: &str,
    guid: &str,
) -> Result<Outcome> {
    let dataset_id = linked_dataset_id(pool, guid).await?;
    if let Some(id) = &dataset_id {
        catalog.patch_state(id, "deleted").await?;
    } else {
        debug!("guid={} deletion with no linked dataset", guid);
    }
    make_current(pool, object_id, guid, dataset_id.as_deref(), Outcome::Deleted).await?;
    Ok(Outcome::Deleted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_dataset(name: &str) -> Dataset {
        Dataset {
            name: name.to_string(),
            title: Some("A title".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn validation_rejects_bad_names() {
        assert!(validate_dataset(&valid_dataset("air-quality")).is_ok());
        assert!(validate_dataset(&valid_dataset("")).is_err());
        assert!(validate_dataset(&valid_dataset("Air Quality")).is_err());
        assert!(validate_dataset(&valid_dataset(&"x".repeat(101))).is_err());

        let untitled = Dataset {
            name: "ok-name".to_string(),
            ..Default::default()
        };
        assert!(validate_dataset(&untitled).is_err());
    }

    #[tokio::test]
    async fn create_show_update_round_trip() {
        let pool = crate::db::connect_memory().await.unwrap();
        crate::migrate::run_migrations(&pool).await.unwrap();
        let catalog = SqliteCatalog::new(pool);

        let created = catalog.create(&valid_dataset("air-quality")).await.unwrap();
        let shown = catalog.show(&created.id).await.unwrap().unwrap();
        assert_eq!(shown.name, "air-quality");
        assert_eq!(shown.state, "active");

        let mut updated = valid_dataset("air-quality");
        updated.notes = Some("fresh".to_string());
        catalog.update(&created.id, &updated).await.unwrap();
        let shown = catalog.show_by_name("air-quality").await.unwrap().unwrap();
        assert_eq!(shown.dataset.notes.as_deref(), Some("fresh"));

        catalog.patch_state(&created.id, "deleted").await.unwrap();
        let shown = catalog.show(&created.id).await.unwrap().unwrap();
        assert_eq!(shown.state, "deleted");
    }

    #[tokio::test]
    async fn duplicate_name_insert_fails() {
        let pool = crate::db::connect_memory().await.unwrap();
        crate::migrate::run_migrations(&pool).await.unwrap();
        let catalog = SqliteCatalog::new(pool);

        catalog.create(&valid_dataset("dup")).await.unwrap();
        assert!(catalog.create(&valid_dataset("dup")).await.is_err());
    }
}
