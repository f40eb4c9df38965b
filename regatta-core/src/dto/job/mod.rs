//! Job DTOs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::job::JobStatus;

/// Request to create a job within a run.
///
/// `job_id` is accepted as a JSON string or number and normalized to its
/// canonical string form by the server. Fields beyond the modeled ones ride
/// along in `extra` and are stored as opaque metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateJob {
    #[serde(default)]
    pub job_id: Option<serde_json::Value>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub targets: Option<BTreeMap<String, String>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Field-level merge applied to an existing job.
///
/// Absent fields are left untouched; unknown fields are merged into the
/// job's opaque metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateJob {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub targets: Option<BTreeMap<String, String>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
