//! Run API Handlers
//!
//! HTTP endpoints for run lifecycle and derived status.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use regatta_core::domain::run::Run;
use regatta_core::dto::run::CreateRun;
use sqlx::SqlitePool;

use crate::api::error::ApiResult;
use crate::service::run_service;

/// GET /runs
/// List all runs, most recently posted first
pub async fn list_runs(State(pool): State<SqlitePool>) -> ApiResult<Json<Vec<Run>>> {
    let runs = run_service::list_runs(&pool).await?;
    Ok(Json(runs))
}

/// POST /runs
/// Create a run explicitly
pub async fn create_run(
    State(pool): State<SqlitePool>,
    Json(req): Json<CreateRun>,
) -> ApiResult<Json<Run>> {
    let run = run_service::create_run(&pool, req).await?;
    Ok(Json(run))
}

/// GET /runs/{name}
/// Get a run with its derived status
pub async fn get_run(
    State(pool): State<SqlitePool>,
    Path(name): Path<String>,
) -> ApiResult<Json<Run>> {
    let run = run_service::get_run(&pool, &name).await?;
    Ok(Json(run))
}

/// GET /runs/{name}/status
/// Just the derived status
pub async fn get_run_status(
    State(pool): State<SqlitePool>,
    Path(name): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let status = run_service::get_run_status(&pool, &name).await?;
    Ok(Json(serde_json::json!({ "status": status })))
}

/// DELETE /runs/{name}
/// Delete a run and all of its jobs
pub async fn delete_run(
    State(pool): State<SqlitePool>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    run_service::delete_run(&pool, &name).await?;
    Ok(StatusCode::NO_CONTENT)
}
