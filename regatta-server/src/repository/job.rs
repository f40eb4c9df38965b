//! Job Repository
//!
//! Handles all database operations related to jobs, including the derived
//! `job_targets` rows that record which nodes a job references.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use regatta_core::domain::job::{Job, JobStatus};
use regatta_core::domain::node::node_name_from_target;
use sqlx::SqliteConnection;
use sqlx::types::Json;

use crate::error::{Error, Result, is_unique_violation};

/// Fields of a job about to be inserted
pub struct NewJob<'a> {
    pub job_id: &'a str,
    pub name: Option<&'a str>,
    pub status: JobStatus,
    pub targets: &'a BTreeMap<String, String>,
    pub metadata: &'a serde_json::Map<String, serde_json::Value>,
}

/// Insert a new job row for `run_id` and record its target nodes.
///
/// A uniqueness violation on `(run_id, job_id)` is classified by re-checking
/// existence inside the open transaction: a visible committed row is a
/// genuine duplicate (`Conflict`), an invisible one means a concurrent
/// writer holds the key and the transaction should retry (`Race`).
pub async fn create(conn: &mut SqliteConnection, run_id: i64, new: NewJob<'_>) -> Result<JobRow> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO jobs (run_id, job_id, name, status, posted, updated, targets, metadata)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(run_id)
    .bind(new.job_id)
    .bind(new.name)
    .bind(new.status.as_str())
    .bind(now)
    .bind(now)
    .bind(Json(new.targets))
    .bind(Json(new.metadata))
    .execute(&mut *conn)
    .await;

    let id = match result {
        Ok(done) => done.last_insert_rowid(),
        Err(err) if is_unique_violation(&err) => {
            return match find_by_job_id(conn, run_id, new.job_id).await? {
                Some(_) => Err(Error::Conflict(format!(
                    "job {:?} already exists in this run",
                    new.job_id
                ))),
                None => Err(Error::Race(err)),
            };
        }
        Err(err) => return Err(err.into()),
    };

    replace_targets(&mut *conn, id, new.targets).await?;

    Ok(JobRow {
        id,
        job_id: new.job_id.to_string(),
        name: new.name.map(str::to_string),
        status: new.status.as_str().to_string(),
        posted: now,
        updated: now,
        targets: Json(new.targets.clone()),
        metadata: Json(new.metadata.clone()),
    })
}

/// Overwrite a job row's mutable fields with the merged state
pub async fn update(conn: &mut SqliteConnection, id: i64, job: &Job) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE jobs
        SET name = ?1, status = ?2, updated = ?3, targets = ?4, metadata = ?5
        WHERE id = ?6
        "#,
    )
    .bind(&job.name)
    .bind(job.status.as_str())
    .bind(job.updated)
    .bind(Json(&job.targets))
    .bind(Json(&job.metadata))
    .bind(id)
    .execute(&mut *conn)
    .await?;

    replace_targets(&mut *conn, id, &job.targets).await
}

/// Delete a job row; its target records go with it
pub async fn delete(conn: &mut SqliteConnection, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM jobs WHERE id = ?1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Find a job within a run by its caller-supplied id
pub async fn find_by_job_id(
    conn: &mut SqliteConnection,
    run_id: i64,
    job_id: &str,
) -> Result<Option<JobRow>> {
    let row = sqlx::query_as::<_, JobRow>(
        r#"
        SELECT id, job_id, name, status, posted, updated, targets, metadata
        FROM jobs
        WHERE run_id = ?1 AND job_id = ?2
        "#,
    )
    .bind(run_id)
    .bind(job_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row)
}

/// List a run's jobs, most recently posted first, optionally narrowed to
/// one status. The insertion id is the tie-break so same-timestamp batches
/// still read newest-first.
pub async fn list_for_run(
    conn: &mut SqliteConnection,
    run_id: i64,
    status: Option<JobStatus>,
) -> Result<Vec<JobRow>> {
    let rows = match status {
        Some(status) => {
            sqlx::query_as::<_, JobRow>(
                r#"
                SELECT id, job_id, name, status, posted, updated, targets, metadata
                FROM jobs
                WHERE run_id = ?1 AND status = ?2
                ORDER BY posted DESC, id DESC
                "#,
            )
            .bind(run_id)
            .bind(status.as_str())
            .fetch_all(&mut *conn)
            .await?
        }
        None => {
            sqlx::query_as::<_, JobRow>(
                r#"
                SELECT id, job_id, name, status, posted, updated, targets, metadata
                FROM jobs
                WHERE run_id = ?1
                ORDER BY posted DESC, id DESC
                "#,
            )
            .bind(run_id)
            .fetch_all(&mut *conn)
            .await?
        }
    };

    Ok(rows)
}

/// Statuses of every job in a run, for aggregation
pub async fn statuses_for_run(conn: &mut SqliteConnection, run_id: i64) -> Result<Vec<JobStatus>> {
    let rows = sqlx::query_scalar::<_, String>("SELECT status FROM jobs WHERE run_id = ?1")
        .bind(run_id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(rows
        .into_iter()
        .map(|s| s.parse().unwrap_or(JobStatus::Unknown))
        .collect())
}

/// List jobs referencing a node, newest first, optionally scoped to a run
pub async fn list_for_node(
    conn: &mut SqliteConnection,
    node_name: &str,
    run_id: Option<i64>,
) -> Result<Vec<JobWithRunRow>> {
    let rows = match run_id {
        Some(run_id) => {
            sqlx::query_as::<_, JobWithRunRow>(
                r#"
                SELECT jobs.id, jobs.job_id, jobs.name, jobs.status, jobs.posted,
                       jobs.updated, jobs.targets, jobs.metadata, runs.name AS run_name
                FROM jobs
                JOIN job_targets ON job_targets.job_id = jobs.id
                JOIN runs ON runs.id = jobs.run_id
                WHERE job_targets.node_name = ?1 AND jobs.run_id = ?2
                ORDER BY jobs.posted DESC, jobs.id DESC
                "#,
            )
            .bind(node_name)
            .bind(run_id)
            .fetch_all(&mut *conn)
            .await?
        }
        None => {
            sqlx::query_as::<_, JobWithRunRow>(
                r#"
                SELECT jobs.id, jobs.job_id, jobs.name, jobs.status, jobs.posted,
                       jobs.updated, jobs.targets, jobs.metadata, runs.name AS run_name
                FROM jobs
                JOIN job_targets ON job_targets.job_id = jobs.id
                JOIN runs ON runs.id = jobs.run_id
                WHERE job_targets.node_name = ?1
                ORDER BY jobs.posted DESC, jobs.id DESC
                "#,
            )
            .bind(node_name)
            .fetch_all(&mut *conn)
            .await?
        }
    };

    Ok(rows)
}

/// Per-status job counts for one node, optionally scoped to a run
pub async fn status_counts_for_node(
    conn: &mut SqliteConnection,
    node_name: &str,
    run_id: Option<i64>,
) -> Result<Vec<(String, i64)>> {
    let rows = match run_id {
        Some(run_id) => {
            sqlx::query_as::<_, (String, i64)>(
                r#"
                SELECT jobs.status, COUNT(*)
                FROM jobs
                JOIN job_targets ON job_targets.job_id = jobs.id
                WHERE job_targets.node_name = ?1 AND jobs.run_id = ?2
                GROUP BY jobs.status
                "#,
            )
            .bind(node_name)
            .bind(run_id)
            .fetch_all(&mut *conn)
            .await?
        }
        None => {
            sqlx::query_as::<_, (String, i64)>(
                r#"
                SELECT jobs.status, COUNT(*)
                FROM jobs
                JOIN job_targets ON job_targets.job_id = jobs.id
                WHERE job_targets.node_name = ?1
                GROUP BY jobs.status
                "#,
            )
            .bind(node_name)
            .fetch_all(&mut *conn)
            .await?
        }
    };

    Ok(rows)
}

/// Per-status job counts grouped by node, across every observed node
pub async fn status_counts_by_node(
    conn: &mut SqliteConnection,
) -> Result<Vec<(String, String, i64)>> {
    let rows = sqlx::query_as::<_, (String, String, i64)>(
        r#"
        SELECT job_targets.node_name, jobs.status, COUNT(*)
        FROM jobs
        JOIN job_targets ON job_targets.job_id = jobs.id
        GROUP BY job_targets.node_name, jobs.status
        ORDER BY job_targets.node_name
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows)
}

/// Rewrite the derived node records for a job. Distinct target keys can
/// normalize to the same node name, hence OR REPLACE.
async fn replace_targets(
    conn: &mut SqliteConnection,
    job_row_id: i64,
    targets: &BTreeMap<String, String>,
) -> Result<()> {
    sqlx::query("DELETE FROM job_targets WHERE job_id = ?1")
        .bind(job_row_id)
        .execute(&mut *conn)
        .await?;

    for (key, role) in targets {
        sqlx::query(
            "INSERT OR REPLACE INTO job_targets (job_id, node_name, role) VALUES (?1, ?2, ?3)",
        )
        .bind(job_row_id)
        .bind(node_name_from_target(key))
        .bind(role)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

// =============================================================================
// Database Row Types
// =============================================================================

/// One job row as stored. Conversion to the domain type needs the owning
/// run's name, which the row does not carry.
#[derive(sqlx::FromRow)]
pub struct JobRow {
    pub id: i64,
    pub job_id: String,
    pub name: Option<String>,
    pub status: String,
    pub posted: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub targets: Json<BTreeMap<String, String>>,
    pub metadata: Json<serde_json::Map<String, serde_json::Value>>,
}

impl JobRow {
    pub fn into_job(self, run: &str) -> Job {
        Job {
            run: run.to_string(),
            job_id: self.job_id,
            name: self.name,
            status: self.status.parse().unwrap_or(JobStatus::Unknown),
            posted: self.posted,
            updated: self.updated,
            targets: self.targets.0,
            metadata: self.metadata.0,
        }
    }
}

/// A job row joined with its run's name, for node-scoped listings that
/// cross run boundaries.
#[derive(sqlx::FromRow)]
pub struct JobWithRunRow {
    #[sqlx(flatten)]
    pub job: JobRow,
    pub run_name: String,
}

impl From<JobWithRunRow> for Job {
    fn from(row: JobWithRunRow) -> Self {
        let run_name = row.run_name;
        row.job.into_job(&run_name)
    }
}
