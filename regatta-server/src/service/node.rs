//! Node Service
//!
//! Explicit node CRUD plus the derived job/node association: queries over
//! which jobs reference a node and the per-node status statistics. A node
//! is "known" if it has an explicit row or any job's targets reference it;
//! the two origins are never conflated.

use std::collections::BTreeMap;

use regatta_core::domain::job::{Job, JobStatus};
use regatta_core::domain::node::Node;
use regatta_core::dto::node::{CreateNode, UpdateNode};
use regatta_core::status::JobStats;
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::{Error, Result};
use crate::repository::{job_repository, node_repository, run_repository};
use crate::txn::{self, Isolation};

/// Register a node explicitly
pub async fn create_node(pool: &SqlitePool, req: CreateNode) -> Result<Node> {
    let name = req.name.as_deref().map(str::trim).unwrap_or_default().to_string();
    if name.is_empty() {
        return Err(Error::InvalidInput(
            "could not find required key: 'name'".to_string(),
        ));
    }

    let node = Node {
        name,
        locked: req.locked.unwrap_or(false),
        machine_type: req.machine_type,
        is_vm: req.is_vm.unwrap_or(false),
    };

    let node = txn::run_txn(
        pool,
        Isolation::Immediate,
        txn::DEFAULT_TXN_ATTEMPTS,
        move |conn| {
            let node = node.clone();
            Box::pin(async move {
                node_repository::create(conn, &node).await?;
                Ok(node)
            })
        },
    )
    .await?;

    tracing::info!(node = %node.name, "node created");

    Ok(node)
}

/// Get a node by name. A name observed only in job targets resolves to a
/// node with default attributes.
pub async fn get_node(pool: &SqlitePool, name: &str) -> Result<Node> {
    let owned = name.to_string();
    txn::run_txn(
        pool,
        Isolation::Deferred,
        txn::DEFAULT_TXN_ATTEMPTS,
        move |conn| {
            let name = owned.clone();
            Box::pin(async move {
                if let Some(node) = node_repository::find_by_name(conn, &name).await? {
                    return Ok(node);
                }
                if node_repository::is_observed(conn, &name).await? {
                    return Ok(Node::observed(name));
                }
                Err(Error::NotFound(format!("node {name:?}")))
            })
        },
    )
    .await
}

/// Patch an explicit node's attributes. Observed-only names have no row to
/// update and report not-found.
pub async fn update_node(pool: &SqlitePool, name: &str, patch: UpdateNode) -> Result<Node> {
    let owned = name.to_string();
    txn::run_txn(
        pool,
        Isolation::Immediate,
        txn::DEFAULT_TXN_ATTEMPTS,
        move |conn| {
            let name = owned.clone();
            let patch = patch.clone();
            Box::pin(async move {
                let mut node = node_repository::find_by_name(conn, &name)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("node {name:?}")))?;

                if let Some(locked) = patch.locked {
                    node.locked = locked;
                }
                if let Some(machine_type) = patch.machine_type {
                    node.machine_type = Some(machine_type);
                }
                if let Some(is_vm) = patch.is_vm {
                    node.is_vm = is_vm;
                }

                if !node_repository::update(conn, &node).await? {
                    return Err(Error::NotFound(format!("node {name:?}")));
                }
                Ok(node)
            })
        },
    )
    .await
}

/// Delete an explicit node row
pub async fn delete_node(pool: &SqlitePool, name: &str) -> Result<()> {
    let owned = name.to_string();
    txn::run_txn(
        pool,
        Isolation::Immediate,
        txn::DEFAULT_TXN_ATTEMPTS,
        move |conn| {
            let name = owned.clone();
            Box::pin(async move {
                if !node_repository::delete(conn, &name).await? {
                    return Err(Error::NotFound(format!("node {name:?}")));
                }
                Ok(())
            })
        },
    )
    .await?;

    tracing::info!(node = name, "node deleted");

    Ok(())
}

/// List every known node: explicit rows with their attributes, plus
/// observed-only names with defaults, sorted by name.
pub async fn list_nodes(pool: &SqlitePool) -> Result<Vec<Node>> {
    txn::run_txn(
        pool,
        Isolation::Deferred,
        txn::DEFAULT_TXN_ATTEMPTS,
        |conn| {
            Box::pin(async move {
                let mut explicit: BTreeMap<String, Node> =
                    node_repository::list_explicit(conn)
                        .await?
                        .into_iter()
                        .map(|node| (node.name.clone(), node))
                        .collect();

                let nodes = node_repository::known_names(conn)
                    .await?
                    .into_iter()
                    .map(|name| {
                        explicit
                            .remove(&name)
                            .unwrap_or_else(|| Node::observed(name))
                    })
                    .collect();
                Ok(nodes)
            })
        },
    )
    .await
}

/// Jobs whose targets reference this node, newest first, optionally scoped
/// to one run
pub async fn jobs_for_node(
    pool: &SqlitePool,
    name: &str,
    run_name: Option<String>,
) -> Result<Vec<Job>> {
    let owned = name.to_string();
    txn::run_txn(
        pool,
        Isolation::Deferred,
        txn::DEFAULT_TXN_ATTEMPTS,
        move |conn| {
            let name = owned.clone();
            let run_name = run_name.clone();
            Box::pin(async move {
                require_known(conn, &name).await?;
                let run_id = resolve_run_scope(conn, run_name.as_deref()).await?;
                let rows = job_repository::list_for_node(conn, &name, run_id).await?;
                Ok(rows.into_iter().map(Job::from).collect())
            })
        },
    )
    .await
}

/// Per-status job counts for this node, optionally scoped to one run.
/// Buckets with no jobs report zero.
pub async fn node_job_stats(
    pool: &SqlitePool,
    name: &str,
    run_name: Option<String>,
) -> Result<JobStats> {
    let owned = name.to_string();
    txn::run_txn(
        pool,
        Isolation::Deferred,
        txn::DEFAULT_TXN_ATTEMPTS,
        move |conn| {
            let name = owned.clone();
            let run_name = run_name.clone();
            Box::pin(async move {
                require_known(conn, &name).await?;
                let run_id = resolve_run_scope(conn, run_name.as_deref()).await?;
                let rows = job_repository::status_counts_for_node(conn, &name, run_id).await?;

                let mut stats = JobStats::default();
                for (status, count) in rows {
                    let status = status.parse().unwrap_or(JobStatus::Unknown);
                    stats.record_n(status, count as u64);
                }
                Ok(stats)
            })
        },
    )
    .await
}

/// Job counts per node and status across every observed node. Only
/// non-zero buckets appear, keyed by node name.
pub async fn job_stats_by_node(
    pool: &SqlitePool,
) -> Result<BTreeMap<String, BTreeMap<String, u64>>> {
    txn::run_txn(
        pool,
        Isolation::Deferred,
        txn::DEFAULT_TXN_ATTEMPTS,
        |conn| {
            Box::pin(async move {
                let rows = job_repository::status_counts_by_node(conn).await?;

                let mut stats: BTreeMap<String, BTreeMap<String, u64>> = BTreeMap::new();
                for (node, status, count) in rows {
                    stats
                        .entry(node)
                        .or_default()
                        .insert(status, count as u64);
                }
                Ok(stats)
            })
        },
    )
    .await
}

/// Not-found unless the name has an explicit row or appears in job targets
async fn require_known(conn: &mut SqliteConnection, name: &str) -> Result<()> {
    if node_repository::find_by_name(&mut *conn, name).await?.is_some()
        || node_repository::is_observed(&mut *conn, name).await?
    {
        return Ok(());
    }
    Err(Error::NotFound(format!("node {name:?}")))
}

/// Resolve an optional run-name scope to its internal id
async fn resolve_run_scope(
    conn: &mut SqliteConnection,
    run_name: Option<&str>,
) -> Result<Option<i64>> {
    match run_name {
        Some(run_name) => {
            let run = run_repository::find_ref(conn, run_name)
                .await?
                .ok_or_else(|| Error::NotFound(format!("run {run_name:?}")))?;
            Ok(Some(run.id))
        }
        None => Ok(None),
    }
}
