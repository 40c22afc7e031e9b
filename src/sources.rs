//! Configured source overview for `odh sources`.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;

#[derive(Debug, Clone)]
pub struct SourceStatus {
    pub name: String,
    pub source_type: String,
    pub url: String,
    pub last_job_status: Option<String>,
    pub last_job_at: Option<i64>,
}

/// Every configured source with its most recent job, config order.
pub async fn get_sources(config: &Config, pool: &SqlitePool) -> Result<Vec<SourceStatus>> {
    let mut statuses = Vec::with_capacity(config.sources.len());
    for (name, source) in &config.sources {
        let row: Option<(String, i64)> = sqlx::query_as(
            "SELECT status, started_at FROM harvest_jobs
             WHERE source = ? ORDER BY started_at DESC LIMIT 1",
        )
        .bind(name)
        .fetch_optional(pool)
        .await?;
        let (last_job_status, last_job_at) = match row {
            Some((status, started_at)) => (Some(status), Some(started_at)),
            None => (None, None),
        };
        statuses.push(SourceStatus {
            name: name.clone(),
            source_type: source.source_type.clone(),
            url: source.url.clone(),
            last_job_status,
            last_job_at,
        });
    }
    Ok(statuses)
}

pub fn print_sources(sources: &[SourceStatus]) {
    if sources.is_empty() {
        println!("No sources configured.");
        return;
    }
    println!("{:<20} {:<16} {:<22} {}", "SOURCE", "TYPE", "LAST JOB", "URL");
    for source in sources {
        let last = source.last_job_status.as_deref().unwrap_or("never run");
        println!(
            "{:<20} {:<16} {:<22} {}",
            source.name, source.source_type, last, source.url
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DbConfig, SourceConfig};

    fn config_with_source(name: &str) -> Config {
        let mut config = Config {
            db: DbConfig {
                path: "harvest.db".into(),
            },
            harvest: Default::default(),
            defaults: Default::default(),
            sources: Default::default(),
        };
        config.sources.insert(
            name.to_string(),
            SourceConfig {
                url: "https://portal.example.gr".to_string(),
                source_type: "ckan".to_string(),
                title: None,
                owner_org: None,
                settings: Default::default(),
            },
        );
        config
    }

    #[tokio::test]
    async fn sources_carry_their_last_job() {
        let pool = crate::db::connect_memory().await.unwrap();
        crate::migrate::run_migrations(&pool).await.unwrap();
        let config = config_with_source("portal");

        let sources = get_sources(&config, &pool).await.unwrap();
        assert_eq!(sources.len(), 1);
        assert!(sources[0].last_job_status.is_none());

        for (id, status, at) in [("j1", "finished", 100), ("j2", "running", 200)] {
            sqlx::query(
                "INSERT INTO harvest_jobs (id, source, status, started_at) VALUES (?, 'portal', ?, ?)",
            )
            .bind(id)
            .bind(status)
            .bind(at)
            .execute(&pool)
            .await
            .unwrap();
        }
        let sources = get_sources(&config, &pool).await.unwrap();
        assert_eq!(sources[0].last_job_status.as_deref(), Some("running"));
        assert_eq!(sources[0].last_job_at, Some(200));
    }
}
