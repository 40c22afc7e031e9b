use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::warn;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use open_data_harvester::config::{load_config, Config};
use open_data_harvester::harvesters::HarvesterRegistry;
use open_data_harvester::job::{run_harvest, RunOptions};
use open_data_harvester::report::{job_report, list_jobs, print_jobs, print_report};
use open_data_harvester::sources::{get_sources, print_sources};
use open_data_harvester::vocab::canonical_vocabulary;
use open_data_harvester::{db, migrate};

#[derive(Parser)]
#[command(name = "odh", about = "Harvester for Greek open-data portals", version)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "harvester.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database and run migrations
    Init,
    /// List configured sources and their last job
    Sources,
    /// Run one source through the harvest pipeline
    Run {
        /// Source name (the `[sources.<name>]` config key)
        source: String,
        /// Import at most N new/changed records
        #[arg(long)]
        limit: Option<usize>,
        /// Gather and diff only; write nothing
        #[arg(long)]
        dry_run: bool,
    },
    /// List recent harvest jobs
    Jobs {
        /// How many jobs to show
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Show one job's outcome counts and errors
    Report {
        /// Job id
        job_id: String,
    },
    /// Manage controlled vocabularies
    #[command(subcommand)]
    Vocab(VocabCommand),
}

#[derive(Subcommand)]
enum VocabCommand {
    /// Import vocabulary entries from a JSON file
    Import {
        /// Vocabulary name (e.g. "Frequency", "Licence")
        name: String,
        /// JSON file: an array of {code, value_uri, labels} objects
        file: PathBuf,
    },
    /// Remove a vocabulary's entries, or all of them
    Clear {
        /// Vocabulary name; omit to clear every vocabulary
        name: Option<String>,
    },
}

#[derive(Deserialize)]
struct VocabularyEntryFile {
    code: String,
    #[serde(default)]
    value_uri: Option<String>,
    #[serde(default)]
    labels: BTreeMap<String, String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Command::Init => init(&config).await,
        Command::Sources => sources(&config).await,
        Command::Run {
            source,
            limit,
            dry_run,
        } => run(&config, &source, limit, dry_run).await,
        Command::Jobs { limit } => jobs(&config, limit).await,
        Command::Report { job_id } => report(&config, &job_id).await,
        Command::Vocab(command) => vocab(&config, command).await,
    }
}

async fn init(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;
    println!("Database ready at {}", config.db.path.display());
    Ok(())
}

async fn sources(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;
    let sources = get_sources(config, &pool).await?;
    print_sources(&sources);
    Ok(())
}

async fn run(config: &Config, source: &str, limit: Option<usize>, dry_run: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;

    let registry = HarvesterRegistry::from_config(config)?;
    let Some(harvester) = registry.find(source) else {
        bail!(
            "No source named '{}'. Configured sources: {}",
            source,
            config
                .sources
                .keys()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        );
    };

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received; finishing the current record");
                cancel.store(true, Ordering::SeqCst);
            }
        });
    }

    let options = RunOptions { limit, dry_run };
    let summary = run_harvest(config, &pool, harvester, &options, &cancel).await?;

    if let Some(error) = &summary.gather_error {
        println!("Gather failed for '{}': {}", source, error);
        println!("Nothing was imported or deleted.");
        return Ok(());
    }
    if let Some(planned) = &summary.planned {
        println!(
            "Dry run for '{}': {} to create, {} to update, {} to delete",
            source,
            planned.to_create.len(),
            planned.to_update.len(),
            planned.to_delete.len()
        );
        return Ok(());
    }
    println!(
        "Job {} ({}): {} created, {} updated, {} unchanged, {} failed, {} deleted",
        summary.job_id,
        summary.status.as_str(),
        summary.created,
        summary.updated,
        summary.unchanged,
        summary.failed,
        summary.deleted
    );
    Ok(())
}

async fn jobs(config: &Config, limit: u32) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;
    let jobs = list_jobs(&pool, limit).await?;
    print_jobs(&jobs);
    Ok(())
}

async fn report(config: &Config, job_id: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;
    let report = job_report(&pool, job_id, config.harvest.error_report_limit).await?;
    print_report(&report);
    Ok(())
}

async fn vocab(config: &Config, command: VocabCommand) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;

    match command {
        VocabCommand::Import { name, file } => {
            let canonical = canonical_vocabulary(&name);
            let body = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let entries: Vec<VocabularyEntryFile> = serde_json::from_str(&body)
                .with_context(|| format!("Invalid vocabulary file {}", file.display()))?;

            let count = entries.len();
            for entry in entries {
                sqlx::query(
                    "INSERT OR REPLACE INTO vocabulary_tags (vocabulary, code, value_uri, labels)
                     VALUES (?, ?, ?, ?)",
                )
                .bind(&canonical)
                .bind(&entry.code)
                .bind(&entry.value_uri)
                .bind(serde_json::to_string(&entry.labels)?)
                .execute(&pool)
                .await?;
            }
            println!("Imported {} entries into '{}'", count, canonical);
        }
        VocabCommand::Clear { name } => match name {
            Some(name) => {
                let canonical = canonical_vocabulary(&name);
                let result = sqlx::query("DELETE FROM vocabulary_tags WHERE vocabulary = ?")
                    .bind(&canonical)
                    .execute(&pool)
                    .await?;
                println!(
                    "Removed {} entries from '{}'",
                    result.rows_affected(),
                    canonical
                );
            }
            None => {
                let result = sqlx::query("DELETE FROM vocabulary_tags").execute(&pool).await?;
                println!("Removed {} entries", result.rows_affected());
            }
        },
    }
    Ok(())
}
