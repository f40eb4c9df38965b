//! Run Service
//!
//! Business logic for run lifecycle. Run status is owned by the job
//! service's aggregation step; nothing here writes it directly.

use regatta_core::domain::run::{Run, RunStatus};
use regatta_core::dto::run::CreateRun;
use sqlx::SqlitePool;

use crate::error::{Error, Result};
use crate::repository::run_repository;
use crate::txn::{self, Isolation};

/// Create a run explicitly. Posting a job against an unseen run name does
/// this implicitly; callers that want the run row up front use this.
pub async fn create_run(pool: &SqlitePool, req: CreateRun) -> Result<Run> {
    let name = req.name.as_deref().map(str::trim).unwrap_or_default().to_string();
    if name.is_empty() {
        return Err(Error::InvalidInput(
            "could not find required key: 'name'".to_string(),
        ));
    }

    let run = txn::run_txn(
        pool,
        Isolation::Immediate,
        txn::DEFAULT_TXN_ATTEMPTS,
        move |conn| {
            let name = name.clone();
            Box::pin(async move {
                let created = run_repository::create(conn, &name).await?;
                run_repository::find_by_name(conn, &created.name)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("run {:?}", created.name)))
            })
        },
    )
    .await?;

    tracing::info!(run = %run.name, "run created");

    Ok(run)
}

/// Get a run by name, with its derived status
pub async fn get_run(pool: &SqlitePool, name: &str) -> Result<Run> {
    let name = name.to_string();
    txn::run_txn(
        pool,
        Isolation::Deferred,
        txn::DEFAULT_TXN_ATTEMPTS,
        move |conn| {
            let name = name.clone();
            Box::pin(async move {
                run_repository::find_by_name(conn, &name)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("run {name:?}")))
            })
        },
    )
    .await
}

/// The run's current derived status
pub async fn get_run_status(pool: &SqlitePool, name: &str) -> Result<RunStatus> {
    Ok(get_run(pool, name).await?.status)
}

/// List all runs, most recently posted first
pub async fn list_runs(pool: &SqlitePool) -> Result<Vec<Run>> {
    txn::run_txn(
        pool,
        Isolation::Deferred,
        txn::DEFAULT_TXN_ATTEMPTS,
        |conn| Box::pin(async move { run_repository::list_all(conn).await }),
    )
    .await
}

/// Delete a run and, through the store's cascade, all of its jobs
pub async fn delete_run(pool: &SqlitePool, name: &str) -> Result<()> {
    let owned = name.to_string();
    txn::run_txn(
        pool,
        Isolation::Immediate,
        txn::DEFAULT_TXN_ATTEMPTS,
        move |conn| {
            let name = owned.clone();
            Box::pin(async move {
                if !run_repository::delete(conn, &name).await? {
                    return Err(Error::NotFound(format!("run {name:?}")));
                }
                Ok(())
            })
        },
    )
    .await?;

    tracing::info!(run = name, "run deleted");

    Ok(())
}
