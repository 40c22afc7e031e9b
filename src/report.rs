//! Job listings and per-job error reports.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

/// One row of `odh jobs` output.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub source: String,
    pub status: String,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    pub created: i64,
    pub updated: i64,
    pub unchanged: i64,
    pub failed: i64,
    pub deleted: i64,
}

/// A job row plus a sample of its per-record errors.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job: JobRow,
    pub total_failed: i64,
    pub errors: Vec<RecordError>,
}

#[derive(Debug, Clone)]
pub struct RecordError {
    pub guid: String,
    pub messages: Vec<String>,
}

type JobTuple = (
    String,
    String,
    String,
    i64,
    Option<i64>,
    i64,
    i64,
    i64,
    i64,
    i64,
);

const SELECT_JOB: &str = "SELECT id, source, status, started_at, finished_at,
        created, updated, unchanged, failed, deleted
 FROM harvest_jobs";

fn job_from_row(row: JobTuple) -> JobRow {
    let (id, source, status, started_at, finished_at, created, updated, unchanged, failed, deleted) =
        row;
    JobRow {
        id,
        source,
        status,
        started_at,
        finished_at,
        created,
        updated,
        unchanged,
        failed,
        deleted,
    }
}

/// Most recent jobs, newest first.
pub async fn list_jobs(pool: &SqlitePool, limit: u32) -> Result<Vec<JobRow>> {
    let rows: Vec<JobTuple> =
        sqlx::query_as(&format!("{} ORDER BY started_at DESC LIMIT ?", SELECT_JOB))
            .bind(limit)
            .fetch_all(pool)
            .await
            .context("Failed to list harvest jobs")?;
    Ok(rows.into_iter().map(job_from_row).collect())
}

/// Build the report for one job: its counters plus up to `error_limit`
/// failed records with their stored error messages.
pub async fn job_report(pool: &SqlitePool, job_id: &str, error_limit: usize) -> Result<JobReport> {
    let row: Option<JobTuple> = sqlx::query_as(&format!("{} WHERE id = ?", SELECT_JOB))
        .bind(job_id)
        .fetch_optional(pool)
        .await?;
    let Some(row) = row else {
        bail!("No job with id {}", job_id);
    };
    let job = job_from_row(row);

    let (total_failed,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM harvest_objects WHERE job_id = ? AND outcome = 'failed'",
    )
    .bind(job_id)
    .fetch_one(pool)
    .await?;

    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT guid, errors FROM harvest_objects
         WHERE job_id = ? AND outcome = 'failed'
         ORDER BY gathered_at LIMIT ?",
    )
    .bind(job_id)
    .bind(error_limit as i64)
    .fetch_all(pool)
    .await?;

    let errors = rows
        .into_iter()
        .map(|(guid, errors)| RecordError {
            guid,
            messages: serde_json::from_str(&errors).unwrap_or_default(),
        })
        .collect();

    Ok(JobReport {
        job,
        total_failed,
        errors,
    })
}

fn format_timestamp(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ts.to_string())
}

pub fn print_jobs(jobs: &[JobRow]) {
    if jobs.is_empty() {
        println!("No jobs recorded yet.");
        return;
    }
    println!(
        "{:<36} {:<20} {:<22} {:<20} {}",
        "JOB", "SOURCE", "STATUS", "STARTED", "C/U/N/F/D"
    );
    for job in jobs {
        println!(
            "{:<36} {:<20} {:<22} {:<20} {}/{}/{}/{}/{}",
            job.id,
            job.source,
            job.status,
            format_timestamp(job.started_at),
            job.created,
            job.updated,
            job.unchanged,
            job.failed,
            job.deleted
        );
    }
}

pub fn print_report(report: &JobReport) {
    let job = &report.job;
    println!("Job {} (source: {})", job.id, job.source);
    println!("  status:    {}", job.status);
    println!("  started:   {}", format_timestamp(job.started_at));
    if let Some(finished) = job.finished_at {
        println!("  finished:  {}", format_timestamp(finished));
    }
    println!(
        "  outcomes:  {} created, {} updated, {} unchanged, {} failed, {} deleted",
        job.created, job.updated, job.unchanged, job.failed, job.deleted
    );

    if report.total_failed == 0 {
        return;
    }
    println!(
        "  errors ({} of {} failed records):",
        report.errors.len(),
        report.total_failed
    );
    for error in &report.errors {
        for message in &error.messages {
            println!("    {}", message);
        }
        if error.messages.is_empty() {
            println!("    guid={}: (no error recorded)", error.guid);
        }
    }
}
