//! API Module
//!
//! HTTP API layer for the server.
//! Each submodule handles endpoints for a specific domain; handlers parse
//! the request and delegate to the service layer.

pub mod error;
pub mod health;
pub mod job;
pub mod node;
pub mod run;

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;

/// Create the main API router with all endpoints
pub fn create_router(pool: SqlitePool) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Run endpoints
        .route("/runs", get(run::list_runs))
        .route("/runs", post(run::create_run))
        .route("/runs/{name}", get(run::get_run))
        .route("/runs/{name}", delete(run::delete_run))
        .route("/runs/{name}/status", get(run::get_run_status))
        // Job endpoints
        .route("/runs/{name}/jobs", post(job::create_job))
        .route("/runs/{name}/jobs", get(job::list_jobs))
        .route("/runs/{name}/jobs/{job_id}", get(job::get_job))
        .route("/runs/{name}/jobs/{job_id}", put(job::update_job))
        .route("/runs/{name}/jobs/{job_id}", delete(job::delete_job))
        // Node endpoints
        .route("/nodes", get(node::list_nodes))
        .route("/nodes", post(node::create_node))
        .route("/nodes/job_stats", get(node::job_stats_by_node))
        .route("/nodes/{name}", get(node::get_node))
        .route("/nodes/{name}", put(node::update_node))
        .route("/nodes/{name}", delete(node::delete_node))
        .route("/nodes/{name}/jobs", get(node::jobs_for_node))
        .route("/nodes/{name}/job_stats", get(node::node_job_stats))
        // Add state and middleware
        .with_state(pool)
        .layer(TraceLayer::new_for_http())
}
