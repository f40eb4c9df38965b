//! Job API Handlers
//!
//! HTTP endpoints for the job lifecycle within a run.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use regatta_core::domain::job::{Job, JobStatus};
use regatta_core::dto::job::{CreateJob, UpdateJob};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::api::error::{ApiError, ApiResult};
use crate::service::job_service;

/// POST /runs/{name}/jobs
/// Create a job within a run, creating the run on first reference
pub async fn create_job(
    State(pool): State<SqlitePool>,
    Path(name): Path<String>,
    Json(req): Json<CreateJob>,
) -> ApiResult<Json<Job>> {
    let job = job_service::create_job(&pool, &name, req).await?;
    Ok(Json(job))
}

/// GET /runs/{name}/jobs
/// List a run's jobs, newest first
///
/// Query parameters:
/// - `status` (optional): narrow to one job status
/// - `fields` (optional): comma-separated field projection
pub async fn list_jobs(
    State(pool): State<SqlitePool>,
    Path(name): Path<String>,
    Query(params): Query<ListJobsQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let jobs = job_service::list_jobs(&pool, &name, params.status).await?;

    let body = match params.fields.as_deref() {
        Some(fields) => serde_json::to_value(job_service::slice_jobs(&jobs, fields)?),
        None => serde_json::to_value(&jobs),
    }
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<JobStatus>,
    pub fields: Option<String>,
}

/// GET /runs/{name}/jobs/{job_id}
/// Get one job
pub async fn get_job(
    State(pool): State<SqlitePool>,
    Path((name, job_id)): Path<(String, String)>,
) -> ApiResult<Json<Job>> {
    let job = job_service::get_job(&pool, &name, &job_id).await?;
    Ok(Json(job))
}

/// PUT /runs/{name}/jobs/{job_id}
/// Merge a patch onto an existing job
pub async fn update_job(
    State(pool): State<SqlitePool>,
    Path((name, job_id)): Path<(String, String)>,
    Json(patch): Json<UpdateJob>,
) -> ApiResult<Json<Job>> {
    let job = job_service::update_job(&pool, &name, &job_id, patch).await?;
    Ok(Json(job))
}

/// DELETE /runs/{name}/jobs/{job_id}
/// Delete a job and re-aggregate its run
pub async fn delete_job(
    State(pool): State<SqlitePool>,
    Path((name, job_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    job_service::delete_job(&pool, &name, &job_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
