use std::str::FromStr;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        // Short lock wait; past it the transaction runner's retry loop
        // takes over.
        .busy_timeout(Duration::from_millis(250));

    SqlitePoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    // Create runs table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            status TEXT NOT NULL DEFAULT 'unknown',
            posted TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create jobs table; job_id is unique only within its run
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id INTEGER NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
            job_id TEXT NOT NULL,
            name TEXT,
            status TEXT NOT NULL DEFAULT 'queued',
            posted TEXT NOT NULL,
            updated TEXT NOT NULL,
            targets TEXT NOT NULL DEFAULT '{}',
            metadata TEXT NOT NULL DEFAULT '{}',
            UNIQUE (run_id, job_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Derived view of node names observed in job targets, maintained
    // transactionally with each job mutation. Kept separate from the
    // explicit nodes table.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS job_targets (
            job_id INTEGER NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
            node_name TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT '',
            PRIMARY KEY (job_id, node_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create nodes table (explicit rows only)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS nodes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            locked INTEGER NOT NULL DEFAULT 0,
            machine_type TEXT,
            is_vm INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for better query performance
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_run_id ON jobs(run_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_posted ON jobs(posted DESC)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_job_targets_node ON job_targets(node_name)")
        .execute(pool)
        .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
