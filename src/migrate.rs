use anyhow::Result;
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Create harvest_jobs table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS harvest_jobs (
            id TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            status TEXT NOT NULL,
            started_at INTEGER NOT NULL,
            finished_at INTEGER,
            created INTEGER NOT NULL DEFAULT 0,
            updated INTEGER NOT NULL DEFAULT 0,
            unchanged INTEGER NOT NULL DEFAULT 0,
            failed INTEGER NOT NULL DEFAULT 0,
            deleted INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create harvest_objects table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS harvest_objects (
            id TEXT PRIMARY KEY,
            guid TEXT NOT NULL,
            job_id TEXT NOT NULL,
            source TEXT NOT NULL,
            status TEXT NOT NULL,
            content TEXT,
            content_type TEXT,
            current INTEGER NOT NULL DEFAULT 0,
            dataset_id TEXT,
            outcome TEXT,
            errors TEXT NOT NULL DEFAULT '[]',
            gathered_at INTEGER NOT NULL,
            FOREIGN KEY (job_id) REFERENCES harvest_jobs(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create datasets table (the local catalog)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS datasets (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            data TEXT NOT NULL,
            state TEXT NOT NULL DEFAULT 'active',
            metadata_modified INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create vocabulary_tags table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vocabulary_tags (
            vocabulary TEXT NOT NULL,
            code TEXT NOT NULL,
            value_uri TEXT,
            labels TEXT NOT NULL DEFAULT '{}',
            PRIMARY KEY (vocabulary, code)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_harvest_objects_guid ON harvest_objects(guid, current)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_harvest_objects_job ON harvest_objects(job_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_harvest_jobs_source ON harvest_jobs(source, status)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_datasets_state ON datasets(state)")
        .execute(pool)
        .await?;

    Ok(())
}
