//! Run Repository
//!
//! Handles all database operations related to runs.

use chrono::{DateTime, Utc};
use regatta_core::domain::run::{Run, RunStatus};
use sqlx::SqliteConnection;

use crate::error::{Error, Result, is_unique_violation};

/// Internal handle for a run row. The rowid never leaves the server; runs
/// are addressed by name everywhere else.
#[derive(Debug, Clone)]
pub struct RunRef {
    pub id: i64,
    pub name: String,
    pub status: RunStatus,
}

/// Insert a new run. A uniqueness violation is classified by re-checking
/// existence: a visible committed row is a genuine duplicate, an invisible
/// one means another writer is mid-flight and the transaction should retry.
pub async fn create(conn: &mut SqliteConnection, name: &str) -> Result<RunRef> {
    let now = Utc::now();

    let result = sqlx::query("INSERT INTO runs (name, status, posted) VALUES (?1, ?2, ?3)")
        .bind(name)
        .bind(RunStatus::Unknown.as_str())
        .bind(now)
        .execute(&mut *conn)
        .await;

    match result {
        Ok(done) => Ok(RunRef {
            id: done.last_insert_rowid(),
            name: name.to_string(),
            status: RunStatus::Unknown,
        }),
        Err(err) if is_unique_violation(&err) => match find_ref(conn, name).await? {
            Some(_) => Err(Error::Conflict(format!("run {name:?} already exists"))),
            None => Err(Error::Race(err)),
        },
        Err(err) => Err(err.into()),
    }
}

/// Fetch the run named `name`, creating it on first reference.
pub async fn get_or_create(conn: &mut SqliteConnection, name: &str) -> Result<RunRef> {
    if let Some(run) = find_ref(&mut *conn, name).await? {
        return Ok(run);
    }
    tracing::info!(run = name, "creating run");
    match create(&mut *conn, name).await {
        // Lost the creation race, but the row exists now; use it.
        Err(Error::Conflict(_)) => find_ref(conn, name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("run {name:?}"))),
        other => other,
    }
}

/// Find a run's internal handle by name
pub async fn find_ref(conn: &mut SqliteConnection, name: &str) -> Result<Option<RunRef>> {
    let row = sqlx::query_as::<_, (i64, String, String)>(
        "SELECT id, name, status FROM runs WHERE name = ?1",
    )
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|(id, name, status)| RunRef {
        id,
        name,
        status: status.parse().unwrap_or(RunStatus::Unknown),
    }))
}

/// Find a run by name
pub async fn find_by_name(conn: &mut SqliteConnection, name: &str) -> Result<Option<Run>> {
    let row = sqlx::query_as::<_, RunRow>(
        "SELECT name, status, posted FROM runs WHERE name = ?1",
    )
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// List all runs, most recently posted first
pub async fn list_all(conn: &mut SqliteConnection) -> Result<Vec<Run>> {
    let rows = sqlx::query_as::<_, RunRow>(
        "SELECT name, status, posted FROM runs ORDER BY posted DESC, id DESC",
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Overwrite a run's derived status
pub async fn set_status(
    conn: &mut SqliteConnection,
    run_id: i64,
    status: RunStatus,
) -> Result<()> {
    sqlx::query("UPDATE runs SET status = ?1 WHERE id = ?2")
        .bind(status.as_str())
        .bind(run_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Delete a run by name; its jobs go with it
pub async fn delete(conn: &mut SqliteConnection, name: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM runs WHERE name = ?1")
        .bind(name)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct RunRow {
    name: String,
    status: String,
    posted: DateTime<Utc>,
}

impl From<RunRow> for Run {
    fn from(row: RunRow) -> Self {
        Run {
            name: row.name,
            status: row.status.parse().unwrap_or(RunStatus::Unknown),
            posted: row.posted,
        }
    }
}
