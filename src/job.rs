//! The harvest job driver: gather → diff → fetch/import/normalize →
//! upsert → deletion reconciliation, with per-job bookkeeping.
//!
//! One job runs one source. Per-record failures are recorded on the
//! harvest object and the job carries on; a gather failure aborts the job
//! before any deletion reconciliation, so an unreachable source never
//! deletes its own catalog entries.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use log::{debug, info, warn};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

use crate::config::Config;
use crate::fetch::PageFetcher;
use crate::gather::{diff_guids, GuidDiff};
use crate::harvesters::Harvester;
use crate::importer::{derive_name, NamePool};
use crate::models::{GatheredRecord, JobStatus, ObjectStatus, Outcome, RawContent};
use crate::normalize::StageContext;
use crate::upsert::{commit_deletion, commit_record, record_failure, CatalogStore, SqliteCatalog};
use crate::vocab::{SqliteVocabularyStore, VocabResolver, ALL_VOCABULARIES};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Cap on how many create/update records are imported this run.
    pub limit: Option<usize>,
    /// Gather and diff only; nothing is written.
    pub dry_run: bool,
}

/// What one run did, or would do for a dry run.
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub job_id: String,
    pub source: String,
    pub status: JobStatus,
    pub created: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub failed: u64,
    pub deleted: u64,
    pub gather_error: Option<String>,
    pub planned: Option<GuidDiff>,
}

impl JobSummary {
    fn empty(job_id: &str, source: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            source: source.to_string(),
            status: JobStatus::Running,
            created: 0,
            updated: 0,
            unchanged: 0,
            failed: 0,
            deleted: 0,
            gather_error: None,
            planned: None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Job bookkeeping
// ═══════════════════════════════════════════════════════════════════════

/// GUIDs this source currently holds in the catalog: one current harvest
/// object each, not marked deleted.
pub async fn known_guids(pool: &SqlitePool, source: &str) -> Result<HashSet<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT guid FROM harvest_objects
         WHERE source = ? AND current = 1 AND status != 'deleted'",
    )
    .bind(source)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(guid,)| guid).collect())
}

async fn has_running_job(pool: &SqlitePool, source: &str) -> Result<bool> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM harvest_jobs WHERE source = ? AND status = 'running'",
    )
    .bind(source)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

async fn insert_job(pool: &SqlitePool, job_id: &str, source: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO harvest_jobs (id, source, status, started_at) VALUES (?, ?, 'running', ?)",
    )
    .bind(job_id)
    .bind(source)
    .bind(Utc::now().timestamp())
    .execute(pool)
    .await
    .context("Failed to insert harvest job")?;
    Ok(())
}

async fn finish_job(pool: &SqlitePool, summary: &JobSummary) -> Result<()> {
    sqlx::query(
        "UPDATE harvest_jobs
         SET status = ?, finished_at = ?,
             created = ?, updated = ?, unchanged = ?, failed = ?, deleted = ?
         WHERE id = ?",
    )
    .bind(summary.status.as_str())
    .bind(Utc::now().timestamp())
    .bind(summary.created as i64)
    .bind(summary.updated as i64)
    .bind(summary.unchanged as i64)
    .bind(summary.failed as i64)
    .bind(summary.deleted as i64)
    .bind(&summary.job_id)
    .execute(pool)
    .await?;
    Ok(())
}

async fn insert_object(
    pool: &SqlitePool,
    job_id: &str,
    source: &str,
    guid: &str,
    status: ObjectStatus,
    record: Option<&GatheredRecord>,
) -> Result<String> {
    let id = Uuid::new_v4().to_string();
    let (content, content_type) = match record.and_then(|r| r.content.as_ref()) {
        Some(raw) => (Some(raw.body.clone()), Some(raw.content_type.clone())),
        None => (None, None),
    };
    sqlx::query(
        "INSERT INTO harvest_objects
         (id, guid, job_id, source, status, content, content_type, current, gathered_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?)",
    )
    .bind(&id)
    .bind(guid)
    .bind(job_id)
    .bind(source)
    .bind(status.as_str())
    .bind(content)
    .bind(content_type)
    .bind(Utc::now().timestamp())
    .execute(pool)
    .await
    .context("Failed to insert harvest object")?;
    Ok(id)
}

/// Write a fetched body back onto the object, so a later import can read
/// the stored content instead of hitting the source again.
async fn store_content(pool: &SqlitePool, object_id: &str, raw: &RawContent) -> Result<()> {
    sqlx::query("UPDATE harvest_objects SET content = ?, content_type = ? WHERE id = ?")
        .bind(&raw.body)
        .bind(&raw.content_type)
        .bind(object_id)
        .execute(pool)
        .await
        .context("Failed to store fetched content")?;
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════
// The run
// ═══════════════════════════════════════════════════════════════════════

/// Run one source through the full pipeline.
pub async fn run_harvest(
    config: &Config,
    pool: &SqlitePool,
    harvester: &dyn Harvester,
    options: &RunOptions,
    cancel: &AtomicBool,
) -> Result<JobSummary> {
    let source = harvester.name().to_string();
    let settings = &harvester.handle().settings;

    if !options.dry_run && has_running_job(pool, &source).await? {
        bail!("Source '{}' already has a running job", source);
    }

    let fetcher = PageFetcher::new(
        &config.harvest.user_agent,
        config.harvest.timeout_secs,
        settings.throttle_ms,
    )?;

    let resolver = VocabResolver::new();
    let store = SqliteVocabularyStore::new(pool.clone());
    resolver.preload(&store, ALL_VOCABULARIES).await;

    let job_id = Uuid::new_v4().to_string();
    let mut summary = JobSummary::empty(&job_id, &source);

    if !options.dry_run {
        insert_job(pool, &job_id, &source).await?;
        info!("job={} source={} started", job_id, source);
    }

    // Gather. A failure here aborts the run: the known set is left alone
    // so nothing gets deleted because a portal was down.
    let records = match harvester.gather(&fetcher).await {
        Ok(records) => records,
        Err(err) => {
            warn!("job={} gather failed: {:#}", job_id, err);
            summary.status = JobStatus::FinishedWithErrors;
            summary.gather_error = Some(format!("{:#}", err));
            if !options.dry_run {
                finish_job(pool, &summary).await?;
            }
            return Ok(summary);
        }
    };

    let known = known_guids(pool, &source).await?;
    let discovered: Vec<String> = records.iter().map(|r| r.guid.clone()).collect();
    let diff = diff_guids(&discovered, &known);
    info!(
        "job={} gathered {} records: {} new, {} changed, {} to delete",
        job_id,
        records.len(),
        diff.to_create.len(),
        diff.to_update.len(),
        diff.to_delete.len()
    );

    if options.dry_run {
        summary.status = JobStatus::Finished;
        summary.planned = Some(diff);
        return Ok(summary);
    }

    let catalog = SqliteCatalog::new(pool.clone());
    let mut to_import: HashSet<&str> = diff
        .to_create
        .iter()
        .chain(diff.to_update.iter())
        .map(String::as_str)
        .collect();

    let mut name_pool = NamePool::new();
    let defaults = &config.defaults;
    let source_info = harvester.info();
    let mut imported = 0usize;

    for record in &records {
        if cancel.load(Ordering::SeqCst) {
            warn!("job={} cancelled; skipping remaining records", job_id);
            break;
        }
        if !to_import.remove(record.guid.as_str()) {
            continue; // a second discovery of a GUID imported this run
        }
        if let Some(limit) = options.limit {
            if imported >= limit {
                debug!("job={} record limit {} reached", job_id, limit);
                break;
            }
        }
        imported += 1;

        let status = if known.contains(&record.guid) {
            ObjectStatus::Changed
        } else {
            ObjectStatus::New
        };
        let object_id =
            insert_object(pool, &job_id, &source, &record.guid, status, Some(record)).await?;

        let outcome = import_one(
            pool,
            &catalog,
            harvester,
            &fetcher,
            &resolver,
            defaults,
            &source_info,
            record,
            &object_id,
            &mut name_pool,
        )
        .await;

        match outcome {
            Ok(outcome) => match outcome {
                Outcome::Created => summary.created += 1,
                Outcome::Updated => summary.updated += 1,
                Outcome::Unchanged => summary.unchanged += 1,
                Outcome::Failed | Outcome::Deleted => {}
            },
            Err(err) => {
                let message = format!("guid={}: {:#}", record.guid, err);
                warn!("job={} {}", job_id, message);
                record_failure(pool, &object_id, &message).await?;
                summary.failed += 1;
            }
        }
    }

    // Deletion reconciliation, skipped entirely on cancellation.
    if !cancel.load(Ordering::SeqCst) {
        for guid in &diff.to_delete {
            let object_id =
                insert_object(pool, &job_id, &source, guid, ObjectStatus::Deleted, None).await?;
            commit_deletion(pool, &catalog, &object_id, guid).await?;
            summary.deleted += 1;
        }
    }

    summary.status = if summary.failed == 0 {
        JobStatus::Finished
    } else {
        JobStatus::FinishedWithErrors
    };
    finish_job(pool, &summary).await?;
    info!(
        "job={} finished: {} created, {} updated, {} unchanged, {} failed, {} deleted",
        job_id, summary.created, summary.updated, summary.unchanged, summary.failed, summary.deleted
    );
    Ok(summary)
}

#[allow(clippy::too_many_arguments)]
async fn import_one(
    pool: &SqlitePool,
    catalog: &dyn CatalogStore,
    harvester: &dyn Harvester,
    fetcher: &PageFetcher,
    resolver: &VocabResolver,
    defaults: &crate::config::DefaultsConfig,
    source_info: &crate::normalize::SourceInfo,
    record: &GatheredRecord,
    object_id: &str,
    name_pool: &mut NamePool,
) -> Result<Outcome> {
    let raw = harvester.fetch(record, fetcher).await?;
    if record.content.is_none() {
        store_content(pool, object_id, &raw).await?;
    }
    let dataset = harvester.import(record, &raw)?;

    let ctx = StageContext {
        vocab: resolver,
        source: source_info,
        defaults,
        harvest_object_id: object_id,
        guid: &record.guid,
    };
    let mut dataset = harvester.chain(record).run(dataset, &ctx);

    if dataset.name.is_empty() {
        dataset.name = derive_name(&dataset, name_pool);
    }

    commit_record(pool, catalog, object_id, &record.guid, dataset).await
}
