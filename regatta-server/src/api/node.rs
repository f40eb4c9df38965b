//! Node API Handlers
//!
//! HTTP endpoints for node CRUD and the job/node association queries.

use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use regatta_core::domain::job::Job;
use regatta_core::domain::node::Node;
use regatta_core::dto::node::{CreateNode, UpdateNode};
use regatta_core::status::JobStats;
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::api::error::ApiResult;
use crate::service::node_service;

/// GET /nodes
/// List every known node: explicit rows plus names observed in job targets
pub async fn list_nodes(State(pool): State<SqlitePool>) -> ApiResult<Json<Vec<Node>>> {
    let nodes = node_service::list_nodes(&pool).await?;
    Ok(Json(nodes))
}

/// POST /nodes
/// Register a node explicitly
pub async fn create_node(
    State(pool): State<SqlitePool>,
    Json(req): Json<CreateNode>,
) -> ApiResult<Json<Node>> {
    let node = node_service::create_node(&pool, req).await?;
    Ok(Json(node))
}

/// GET /nodes/{name}
/// Get a node by name; observed-only names resolve with default attributes
pub async fn get_node(
    State(pool): State<SqlitePool>,
    Path(name): Path<String>,
) -> ApiResult<Json<Node>> {
    let node = node_service::get_node(&pool, &name).await?;
    Ok(Json(node))
}

/// PUT /nodes/{name}
/// Patch an explicit node's attributes
pub async fn update_node(
    State(pool): State<SqlitePool>,
    Path(name): Path<String>,
    Json(patch): Json<UpdateNode>,
) -> ApiResult<Json<Node>> {
    let node = node_service::update_node(&pool, &name, patch).await?;
    Ok(Json(node))
}

/// DELETE /nodes/{name}
/// Delete an explicit node row
pub async fn delete_node(
    State(pool): State<SqlitePool>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    node_service::delete_node(&pool, &name).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct NodeScopeQuery {
    pub run: Option<String>,
}

/// GET /nodes/{name}/jobs
/// Jobs whose targets reference this node, optionally scoped to one run
pub async fn jobs_for_node(
    State(pool): State<SqlitePool>,
    Path(name): Path<String>,
    Query(params): Query<NodeScopeQuery>,
) -> ApiResult<Json<Vec<Job>>> {
    let jobs = node_service::jobs_for_node(&pool, &name, params.run).await?;
    Ok(Json(jobs))
}

/// GET /nodes/{name}/job_stats
/// Per-status job counts for this node, zeros included
pub async fn node_job_stats(
    State(pool): State<SqlitePool>,
    Path(name): Path<String>,
    Query(params): Query<NodeScopeQuery>,
) -> ApiResult<Json<JobStats>> {
    let stats = node_service::node_job_stats(&pool, &name, params.run).await?;
    Ok(Json(stats))
}

/// GET /nodes/job_stats
/// Non-zero job counts per node and status, across every observed node
pub async fn job_stats_by_node(
    State(pool): State<SqlitePool>,
) -> ApiResult<Json<BTreeMap<String, BTreeMap<String, u64>>>> {
    let stats = node_service::job_stats_by_node(&pool).await?;
    Ok(Json(stats))
}
