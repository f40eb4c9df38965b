//! Run DTOs

use serde::{Deserialize, Serialize};

/// Request to create a run explicitly.
///
/// Runs are also created implicitly by the first job posted against an
/// unseen run name; this payload is for callers that want the run row to
/// exist up front. A missing or empty name is rejected by the server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateRun {
    #[serde(default)]
    pub name: Option<String>,
}
