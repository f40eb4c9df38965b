//! Node Repository
//!
//! Handles database operations for explicit node rows and the derived set
//! of node names observed in job targets.

use regatta_core::domain::node::Node;
use sqlx::SqliteConnection;

use crate::error::{Error, Result, is_unique_violation};

/// Insert an explicit node row. Uniqueness violations are classified the
/// same way as job creation: visible committed row means duplicate,
/// invisible means concurrent writer.
pub async fn create(conn: &mut SqliteConnection, node: &Node) -> Result<()> {
    let result = sqlx::query(
        "INSERT INTO nodes (name, locked, machine_type, is_vm) VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(&node.name)
    .bind(node.locked)
    .bind(&node.machine_type)
    .bind(node.is_vm)
    .execute(&mut *conn)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(err) if is_unique_violation(&err) => match find_by_name(conn, &node.name).await? {
            Some(_) => Err(Error::Conflict(format!(
                "node {:?} already exists",
                node.name
            ))),
            None => Err(Error::Race(err)),
        },
        Err(err) => Err(err.into()),
    }
}

/// Find an explicit node row by name
pub async fn find_by_name(conn: &mut SqliteConnection, name: &str) -> Result<Option<Node>> {
    let row = sqlx::query_as::<_, NodeRow>(
        "SELECT name, locked, machine_type, is_vm FROM nodes WHERE name = ?1",
    )
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// Overwrite an explicit node row's attributes
pub async fn update(conn: &mut SqliteConnection, node: &Node) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE nodes SET locked = ?1, machine_type = ?2, is_vm = ?3 WHERE name = ?4",
    )
    .bind(node.locked)
    .bind(&node.machine_type)
    .bind(node.is_vm)
    .bind(&node.name)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete an explicit node row by name
pub async fn delete(conn: &mut SqliteConnection, name: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM nodes WHERE name = ?1")
        .bind(name)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// List explicit node rows, sorted by name
pub async fn list_explicit(conn: &mut SqliteConnection) -> Result<Vec<Node>> {
    let rows = sqlx::query_as::<_, NodeRow>(
        "SELECT name, locked, machine_type, is_vm FROM nodes ORDER BY name",
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Every known node name: explicit rows plus names observed in job
/// targets, deduplicated and sorted.
pub async fn known_names(conn: &mut SqliteConnection) -> Result<Vec<String>> {
    let names = sqlx::query_scalar::<_, String>(
        r#"
        SELECT name FROM nodes
        UNION
        SELECT node_name FROM job_targets
        ORDER BY name
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(names)
}

/// Whether any job's targets reference this name
pub async fn is_observed(conn: &mut SqliteConnection, name: &str) -> Result<bool> {
    let observed = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM job_targets WHERE node_name = ?1)",
    )
    .bind(name)
    .fetch_one(&mut *conn)
    .await?;

    Ok(observed)
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct NodeRow {
    name: String,
    locked: bool,
    machine_type: Option<String>,
    is_vm: bool,
}

impl From<NodeRow> for Node {
    fn from(row: NodeRow) -> Self {
        Node {
            name: row.name,
            locked: row.locked,
            machine_type: row.machine_type,
            is_vm: row.is_vm,
        }
    }
}
