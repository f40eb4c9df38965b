//! Run domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named batch of test jobs.
///
/// A run's status is never written directly; it is recomputed from the
/// statuses of its jobs after every job mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub name: String,
    pub status: RunStatus,
    pub posted: DateTime<Utc>,
}

/// Overall status of a run, derived from its jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Queued,
    Running,
    Pass,
    Fail,
    Dead,
    Unknown,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Pass => "pass",
            RunStatus::Fail => "fail",
            RunStatus::Dead => "dead",
            RunStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(RunStatus::Queued),
            "running" => Ok(RunStatus::Running),
            "pass" => Ok(RunStatus::Pass),
            "fail" => Ok(RunStatus::Fail),
            "dead" => Ok(RunStatus::Dead),
            "unknown" => Ok(RunStatus::Unknown),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A status string outside the fixed enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl std::fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown status: {:?}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}
