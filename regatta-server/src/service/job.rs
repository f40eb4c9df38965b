//! Job Service
//!
//! Business logic for the job lifecycle. Every mutation runs in one
//! `Immediate` transaction and re-aggregates the owning run's status before
//! committing, so a committed run status is never inconsistent with its
//! jobs.

use chrono::Utc;
use regatta_core::domain::job::{Job, JobStatus};
use regatta_core::dto::job::{CreateJob, UpdateJob};
use regatta_core::status::{self, JobStats};
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::{Error, Result};
use crate::repository::run_repository::RunRef;
use crate::repository::{job_repository, run_repository};
use crate::txn::{self, Isolation};

/// Create a job within a run, creating the run on first reference.
pub async fn create_job(pool: &SqlitePool, run_name: &str, req: CreateJob) -> Result<Job> {
    let job_id = normalize_job_id(req.job_id.as_ref())?;
    let owned_run = run_name.to_string();
    let status = req.status.unwrap_or_default();
    let name = req.name;
    let targets = req.targets.unwrap_or_default();
    let metadata = req.extra;

    let job = txn::run_txn(
        pool,
        Isolation::Immediate,
        txn::DEFAULT_TXN_ATTEMPTS,
        move |conn| {
            let run_name = owned_run.clone();
            let job_id = job_id.clone();
            let name = name.clone();
            let targets = targets.clone();
            let metadata = metadata.clone();
            Box::pin(async move {
                let run = run_repository::get_or_create(conn, &run_name).await?;
                let row = job_repository::create(
                    conn,
                    run.id,
                    job_repository::NewJob {
                        job_id: &job_id,
                        name: name.as_deref(),
                        status,
                        targets: &targets,
                        metadata: &metadata,
                    },
                )
                .await?;
                reaggregate(conn, &run).await?;
                Ok(row.into_job(&run_name))
            })
        },
    )
    .await?;

    tracing::info!(run = %job.run, job_id = %job.job_id, status = %job.status, "job created");

    Ok(job)
}

/// Merge a patch onto an existing job. A status change triggers run
/// re-aggregation within the same transaction.
pub async fn update_job(
    pool: &SqlitePool,
    run_name: &str,
    job_id: &str,
    patch: UpdateJob,
) -> Result<Job> {
    let owned_run = run_name.to_string();
    let owned_job_id = job_id.to_string();

    txn::run_txn(
        pool,
        Isolation::Immediate,
        txn::DEFAULT_TXN_ATTEMPTS,
        move |conn| {
            let run_name = owned_run.clone();
            let job_id = owned_job_id.clone();
            let patch = patch.clone();
            Box::pin(async move {
                let run = require_run(conn, &run_name).await?;
                let row = job_repository::find_by_job_id(conn, run.id, &job_id)
                    .await?
                    .ok_or_else(|| {
                        Error::NotFound(format!("job {job_id:?} in run {run_name:?}"))
                    })?;

                let row_id = row.id;
                let mut job = row.into_job(&run_name);
                let old_status = job.status;

                if let Some(name) = patch.name {
                    job.name = Some(name);
                }
                if let Some(status) = patch.status {
                    job.status = status;
                }
                if let Some(targets) = patch.targets {
                    job.targets = targets;
                }
                for (key, value) in patch.extra {
                    job.metadata.insert(key, value);
                }
                job.updated = Utc::now();

                job_repository::update(conn, row_id, &job).await?;

                if job.status != old_status {
                    tracing::info!(
                        run = %run_name,
                        job_id = %job_id,
                        old = %old_status,
                        new = %job.status,
                        "job status changed"
                    );
                    reaggregate(conn, &run).await?;
                }

                Ok(job)
            })
        },
    )
    .await
}

/// Delete a job, then re-aggregate the run over its remaining jobs.
/// Removing the last job leaves the run in place with status `unknown`.
pub async fn delete_job(pool: &SqlitePool, run_name: &str, job_id: &str) -> Result<()> {
    let owned_run = run_name.to_string();
    let owned_job_id = job_id.to_string();

    txn::run_txn(
        pool,
        Isolation::Immediate,
        txn::DEFAULT_TXN_ATTEMPTS,
        move |conn| {
            let run_name = owned_run.clone();
            let job_id = owned_job_id.clone();
            Box::pin(async move {
                let run = require_run(conn, &run_name).await?;
                let row = job_repository::find_by_job_id(conn, run.id, &job_id)
                    .await?
                    .ok_or_else(|| {
                        Error::NotFound(format!("job {job_id:?} in run {run_name:?}"))
                    })?;

                job_repository::delete(conn, row.id).await?;
                reaggregate(conn, &run).await?;
                Ok(())
            })
        },
    )
    .await?;

    tracing::info!(run = run_name, job_id = job_id, "job deleted");

    Ok(())
}

/// Get one job by its run-scoped id
pub async fn get_job(pool: &SqlitePool, run_name: &str, job_id: &str) -> Result<Job> {
    let owned_run = run_name.to_string();
    let owned_job_id = job_id.to_string();

    txn::run_txn(
        pool,
        Isolation::Deferred,
        txn::DEFAULT_TXN_ATTEMPTS,
        move |conn| {
            let run_name = owned_run.clone();
            let job_id = owned_job_id.clone();
            Box::pin(async move {
                let run = require_run(conn, &run_name).await?;
                let row = job_repository::find_by_job_id(conn, run.id, &job_id)
                    .await?
                    .ok_or_else(|| {
                        Error::NotFound(format!("job {job_id:?} in run {run_name:?}"))
                    })?;
                Ok(row.into_job(&run_name))
            })
        },
    )
    .await
}

/// List a run's jobs, most recently posted first, optionally narrowed to
/// one status. An unknown run name is an empty listing, not an error.
pub async fn list_jobs(
    pool: &SqlitePool,
    run_name: &str,
    status: Option<JobStatus>,
) -> Result<Vec<Job>> {
    let owned_run = run_name.to_string();

    txn::run_txn(
        pool,
        Isolation::Deferred,
        txn::DEFAULT_TXN_ATTEMPTS,
        move |conn| {
            let run_name = owned_run.clone();
            Box::pin(async move {
                let Some(run) = run_repository::find_ref(conn, &run_name).await? else {
                    return Ok(Vec::new());
                };
                let rows = job_repository::list_for_run(conn, run.id, status).await?;
                Ok(rows.into_iter().map(|row| row.into_job(&run_name)).collect())
            })
        },
    )
    .await
}

/// Project each job onto a comma-separated list of field names.
/// An unknown field name is an input error, never an empty column.
pub fn slice_jobs(
    jobs: &[Job],
    fields: &str,
) -> Result<Vec<serde_json::Map<String, serde_json::Value>>> {
    let names: Vec<&str> = fields
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .collect();
    if names.is_empty() {
        return Err(Error::InvalidInput("no fields specified".to_string()));
    }

    jobs.iter()
        .map(|job| {
            job.slice(&names)
                .map_err(|err| Error::InvalidInput(err.to_string()))
        })
        .collect()
}

/// Recompute the owning run's status from its current jobs. Runs inside
/// the caller's transaction.
async fn reaggregate(conn: &mut SqliteConnection, run: &RunRef) -> Result<()> {
    let stats: JobStats = job_repository::statuses_for_run(conn, run.id)
        .await?
        .into_iter()
        .collect();
    let new_status = status::aggregate(&stats);

    if new_status != run.status {
        tracing::info!(
            run = %run.name,
            old = %run.status,
            new = %new_status,
            "run status changed"
        );
        run_repository::set_status(conn, run.id, new_status).await?;
    }

    Ok(())
}

async fn require_run(conn: &mut SqliteConnection, name: &str) -> Result<RunRef> {
    run_repository::find_ref(conn, name)
        .await?
        .ok_or_else(|| Error::NotFound(format!("run {name:?}")))
}

/// Canonical string form of a caller-supplied job id. The original wire
/// format allows both strings and bare numbers.
fn normalize_job_id(raw: Option<&serde_json::Value>) -> Result<String> {
    match raw {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(serde_json::Value::Number(n)) => Ok(n.to_string()),
        _ => Err(Error::InvalidInput(
            "could not find required key: 'job_id'".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn job_id_accepts_strings_and_numbers() {
        assert_eq!(normalize_job_id(Some(&json!("42"))).unwrap(), "42");
        assert_eq!(normalize_job_id(Some(&json!(" 42 "))).unwrap(), "42");
        assert_eq!(normalize_job_id(Some(&json!(276))).unwrap(), "276");
    }

    #[test]
    fn job_id_rejects_missing_empty_and_other_shapes() {
        assert!(normalize_job_id(None).is_err());
        assert!(normalize_job_id(Some(&json!(""))).is_err());
        assert!(normalize_job_id(Some(&json!("   "))).is_err());
        assert!(normalize_job_id(Some(&json!(["1"]))).is_err());
        assert!(normalize_job_id(Some(&json!(true))).is_err());
    }
}
