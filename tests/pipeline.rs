//! End-to-end pipeline tests against an in-memory catalog, driven by a
//! stub source adapter so no network is involved.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;

use open_data_harvester::config::{Config, DbConfig};
use open_data_harvester::fetch::PageFetcher;
use open_data_harvester::harvesters::{Harvester, SourceHandle};
use open_data_harvester::job::{run_harvest, RunOptions};
use open_data_harvester::models::{Dataset, GatheredRecord, RawContent};
use open_data_harvester::{db, migrate};

struct StubHarvester {
    handle: SourceHandle,
    records: Vec<GatheredRecord>,
    fail_gather: bool,
}

impl StubHarvester {
    fn new(records: Vec<GatheredRecord>) -> Self {
        Self {
            handle: SourceHandle {
                name: "stub".to_string(),
                url: "https://stub.example.gr".to_string(),
                title: "Stub Source".to_string(),
                owner_org: None,
                settings: Default::default(),
            },
            records,
            fail_gather: false,
        }
    }

    fn unreachable() -> Self {
        let mut stub = Self::new(Vec::new());
        stub.fail_gather = true;
        stub
    }
}

#[async_trait]
impl Harvester for StubHarvester {
    fn name(&self) -> &str {
        &self.handle.name
    }

    fn source_type(&self) -> &'static str {
        "stub"
    }

    fn description(&self) -> &'static str {
        "In-memory stub"
    }

    fn handle(&self) -> &SourceHandle {
        &self.handle
    }

    async fn gather(&self, _fetcher: &PageFetcher) -> Result<Vec<GatheredRecord>> {
        if self.fail_gather {
            anyhow::bail!("connection refused");
        }
        Ok(self.records.clone())
    }

    fn import(&self, _record: &GatheredRecord, raw: &RawContent) -> Result<Dataset> {
        Ok(serde_json::from_str(&raw.body)?)
    }
}

/// Probe-style stub: gather yields bare URLs, the body only arrives when
/// `fetch` is called for the record.
struct FetchingStub {
    handle: SourceHandle,
    bodies: HashMap<String, String>,
}

impl FetchingStub {
    fn new(bodies: &[(&str, &str)]) -> Self {
        Self {
            handle: SourceHandle {
                name: "stub".to_string(),
                url: "https://stub.example.gr".to_string(),
                title: "Stub Source".to_string(),
                owner_org: None,
                settings: Default::default(),
            },
            bodies: bodies
                .iter()
                .map(|(guid, title)| {
                    let body = json!({
                        "title": title,
                        "metadata_modified": "2024-01-01T00:00:00Z"
                    });
                    (guid.to_string(), body.to_string())
                })
                .collect(),
        }
    }
}

#[async_trait]
impl Harvester for FetchingStub {
    fn name(&self) -> &str {
        &self.handle.name
    }

    fn source_type(&self) -> &'static str {
        "stub"
    }

    fn description(&self) -> &'static str {
        "In-memory stub with per-record fetch"
    }

    fn handle(&self) -> &SourceHandle {
        &self.handle
    }

    async fn gather(&self, _fetcher: &PageFetcher) -> Result<Vec<GatheredRecord>> {
        Ok(self
            .bodies
            .keys()
            .map(|guid| {
                GatheredRecord::new(guid.clone())
                    .with_url(format!("https://stub.example.gr/dataset/{}", guid))
            })
            .collect())
    }

    async fn fetch(&self, record: &GatheredRecord, _fetcher: &PageFetcher) -> Result<RawContent> {
        let body = self
            .bodies
            .get(&record.guid)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no body for {}", record.guid))?;
        Ok(RawContent {
            body,
            content_type: "application/json".to_string(),
        })
    }

    fn import(&self, _record: &GatheredRecord, raw: &RawContent) -> Result<Dataset> {
        Ok(serde_json::from_str(&raw.body)?)
    }
}

// No identifier in the body: catalog names then derive from the title.
fn record(guid: &str, title: &str) -> GatheredRecord {
    let body = json!({
        "title": title,
        "metadata_modified": "2024-01-01T00:00:00Z"
    });
    GatheredRecord::new(guid).with_content(body.to_string(), "application/json")
}

/// A record the default fetch cannot serve: no inline content, no URL.
fn broken_record(guid: &str) -> GatheredRecord {
    GatheredRecord::new(guid)
}

fn config() -> Config {
    Config {
        db: DbConfig {
            path: "unused.db".into(),
        },
        harvest: Default::default(),
        defaults: Default::default(),
        sources: Default::default(),
    }
}

async fn pool() -> SqlitePool {
    let pool = db::connect_memory().await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    pool
}

async fn run(pool: &SqlitePool, harvester: &StubHarvester) -> open_data_harvester::job::JobSummary {
    run_harvest(
        &config(),
        pool,
        harvester,
        &RunOptions::default(),
        &AtomicBool::new(false),
    )
    .await
    .unwrap()
}

async fn current_count(pool: &SqlitePool, guid: &str) -> i64 {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM harvest_objects WHERE guid = ? AND current = 1")
            .bind(guid)
            .fetch_one(pool)
            .await
            .unwrap();
    count
}

async fn dataset_state(pool: &SqlitePool, name: &str) -> Option<String> {
    let row: Option<(String,)> = sqlx::query_as("SELECT state FROM datasets WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await
        .unwrap();
    row.map(|(state,)| state)
}

#[tokio::test]
async fn first_run_creates_second_run_is_unchanged() {
    let pool = pool().await;
    let stub = StubHarvester::new(vec![record("a", "Alpha"), record("b", "Beta")]);

    let first = run(&pool, &stub).await;
    assert_eq!(first.created, 2);
    assert_eq!(first.failed, 0);
    assert_eq!(first.status.as_str(), "finished");

    // Identical records with an unchanged timestamp short-circuit.
    let second = run(&pool, &stub).await;
    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 0);
    assert_eq!(second.unchanged, 2);

    // Currency moved to the second run's objects but stayed singular.
    assert_eq!(current_count(&pool, "a").await, 1);
    assert_eq!(current_count(&pool, "b").await, 1);
}

#[tokio::test]
async fn vanished_guid_is_deleted_and_only_that_one() {
    let pool = pool().await;
    let all = StubHarvester::new(vec![
        record("a", "Alpha"),
        record("b", "Beta"),
        record("c", "Gamma"),
    ]);
    run(&pool, &all).await;

    let fewer = StubHarvester::new(vec![record("a", "Alpha"), record("b", "Beta")]);
    let summary = run(&pool, &fewer).await;
    assert_eq!(summary.deleted, 1);
    assert_eq!(summary.unchanged, 2);

    assert_eq!(dataset_state(&pool, "gamma").await.as_deref(), Some("deleted"));
    assert_eq!(dataset_state(&pool, "alpha").await.as_deref(), Some("active"));
    assert_eq!(current_count(&pool, "c").await, 1);
}

#[tokio::test]
async fn reappearing_guid_revives_its_catalog_entry() {
    let pool = pool().await;
    let all = StubHarvester::new(vec![record("a", "Alpha"), record("c", "Gamma")]);
    run(&pool, &all).await;
    run(&pool, &StubHarvester::new(vec![record("a", "Alpha")])).await;
    assert_eq!(dataset_state(&pool, "gamma").await.as_deref(), Some("deleted"));

    // The GUID left the known set, so it comes back as new, but the prior
    // object linkage maps it onto the same catalog entry.
    let summary = run(&pool, &all).await;
    assert_eq!(summary.created, 0);
    assert_eq!(summary.updated, 1);
    assert_eq!(dataset_state(&pool, "gamma").await.as_deref(), Some("active"));

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM datasets")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn one_bad_record_does_not_sink_the_job() {
    let pool = pool().await;
    let stub = StubHarvester::new(vec![
        record("a", "Alpha"),
        record("b", "Beta"),
        broken_record("c"),
        record("d", "Delta"),
        record("e", "Epsilon"),
    ]);

    let summary = run(&pool, &stub).await;
    assert_eq!(summary.created, 4);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.status.as_str(), "finished_with_errors");

    let (errors,): (String,) = sqlx::query_as(
        "SELECT errors FROM harvest_objects WHERE guid = 'c' AND outcome = 'failed'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert!(errors.contains("guid=c"));
}

#[tokio::test]
async fn unreachable_source_leaves_deletion_state_alone() {
    let pool = pool().await;
    run(&pool, &StubHarvester::new(vec![record("a", "Alpha")])).await;

    let summary = run(&pool, &StubHarvester::unreachable()).await;
    assert!(summary.gather_error.is_some());
    assert_eq!(summary.deleted, 0);
    assert_eq!(summary.status.as_str(), "finished_with_errors");

    // Nothing got deleted because the portal was down.
    assert_eq!(dataset_state(&pool, "alpha").await.as_deref(), Some("active"));
    assert_eq!(current_count(&pool, "a").await, 1);
}

#[tokio::test]
async fn dry_run_writes_nothing() {
    let pool = pool().await;
    let stub = StubHarvester::new(vec![record("a", "Alpha"), record("b", "Beta")]);

    let options = RunOptions {
        limit: None,
        dry_run: true,
    };
    let summary = run_harvest(&config(), &pool, &stub, &options, &AtomicBool::new(false))
        .await
        .unwrap();

    let planned = summary.planned.expect("dry run reports the planned diff");
    assert_eq!(planned.to_create.len(), 2);
    assert!(planned.to_delete.is_empty());

    for table in ["harvest_jobs", "harvest_objects", "datasets"] {
        let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0, "{} should be untouched", table);
    }
}

#[tokio::test]
async fn limit_caps_imports_without_deleting() {
    let pool = pool().await;
    let stub = StubHarvester::new(vec![
        record("a", "Alpha"),
        record("b", "Beta"),
        record("c", "Gamma"),
    ]);

    let options = RunOptions {
        limit: Some(2),
        dry_run: false,
    };
    let summary = run_harvest(&config(), &pool, &stub, &options, &AtomicBool::new(false))
        .await
        .unwrap();
    assert_eq!(summary.created, 2);
    assert_eq!(summary.deleted, 0);
}

#[tokio::test]
async fn running_job_blocks_a_second_run() {
    let pool = pool().await;
    sqlx::query(
        "INSERT INTO harvest_jobs (id, source, status, started_at) VALUES ('j1', 'stub', 'running', 0)",
    )
    .execute(&pool)
    .await
    .unwrap();

    let stub = StubHarvester::new(vec![record("a", "Alpha")]);
    let err = run_harvest(
        &config(),
        &pool,
        &stub,
        &RunOptions::default(),
        &AtomicBool::new(false),
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("already has a running job"));
}

#[tokio::test]
async fn fetched_body_is_stored_on_the_object() {
    let pool = pool().await;
    let stub = FetchingStub::new(&[("a", "Alpha")]);
    let summary = run_harvest(
        &config(),
        &pool,
        &stub,
        &RunOptions::default(),
        &AtomicBool::new(false),
    )
    .await
    .unwrap();
    assert_eq!(summary.created, 1);

    // The per-record fetch result lands on the harvest object, so a later
    // import can reuse the stored body instead of hitting the portal.
    let (content, content_type): (Option<String>, Option<String>) = sqlx::query_as(
        "SELECT content, content_type FROM harvest_objects WHERE guid = 'a' AND current = 1",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert!(content.unwrap().contains("Alpha"));
    assert_eq!(content_type.as_deref(), Some("application/json"));
}

#[tokio::test]
async fn duplicate_gathered_guid_is_imported_once() {
    let pool = pool().await;
    let stub = StubHarvester::new(vec![
        record("a", "Alpha"),
        record("a", "Alpha"),
        record("b", "Beta"),
    ]);

    let summary = run(&pool, &stub).await;
    assert_eq!(summary.created, 2);

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM harvest_objects WHERE guid = 'a'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
    assert_eq!(current_count(&pool, "a").await, 1);
}

#[tokio::test]
async fn renamed_record_keeps_its_stored_name() {
    let pool = pool().await;
    run(&pool, &StubHarvester::new(vec![record("a", "Alpha")])).await;

    // Same GUID, new title and newer timestamp: an update, not a create.
    let body = json!({
        "title": "Alpha Renamed",
        "metadata_modified": "2024-06-01T00:00:00Z"
    });
    let renamed = GatheredRecord::new("a").with_content(body.to_string(), "application/json");
    let summary = run(&pool, &StubHarvester::new(vec![renamed])).await;
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.created, 0);

    let entry = dataset_state(&pool, "alpha").await;
    assert_eq!(entry.as_deref(), Some("active"));
    let (data,): (String,) = sqlx::query_as("SELECT data FROM datasets WHERE name = 'alpha'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert!(data.contains("Alpha Renamed"));
}
