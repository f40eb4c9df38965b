//! Job domain types

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::domain::run::UnknownStatus;

/// One unit of work within a run.
///
/// Identity is the pair `(run, job_id)`; `job_id` is caller-supplied and
/// unique only within its run. Fields the server does not model explicitly
/// are carried in `metadata` and re-exposed flattened on read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub run: String,
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub status: JobStatus,
    pub posted: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    #[serde(default)]
    pub targets: BTreeMap<String, String>,
    #[serde(flatten)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Job {
    /// Project a subset of the job's exposed fields by name.
    ///
    /// Metadata keys are addressable alongside the fixed fields. An unknown
    /// name is an error, never a silently-empty result.
    pub fn slice(
        &self,
        fields: &[&str],
    ) -> Result<serde_json::Map<String, serde_json::Value>, UnknownField> {
        let mut out = serde_json::Map::new();
        for &field in fields {
            let value = match field {
                "run" => json!(self.run),
                "job_id" => json!(self.job_id),
                "name" => json!(self.name),
                "status" => json!(self.status),
                "posted" => json!(self.posted),
                "updated" => json!(self.updated),
                "targets" => json!(self.targets),
                other => match self.metadata.get(other) {
                    Some(value) => value.clone(),
                    None => return Err(UnknownField(other.to_string())),
                },
            };
            out.insert(field.to_string(), value);
        }
        Ok(out)
    }
}

/// Status of a single job, as reported by workers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Queued,
    Running,
    Pass,
    Fail,
    Dead,
    Unknown,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Pass => "pass",
            JobStatus::Fail => "fail",
            JobStatus::Dead => "dead",
            JobStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "pass" => Ok(JobStatus::Pass),
            "fail" => Ok(JobStatus::Fail),
            "dead" => Ok(JobStatus::Dead),
            "unknown" => Ok(JobStatus::Unknown),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Error returned by [`Job::slice`] for a field name that does not exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownField(pub String);

impl std::fmt::Display for UnknownField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown job field: {:?}", self.0)
    }
}

impl std::error::Error for UnknownField {}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job() -> Job {
        let mut metadata = serde_json::Map::new();
        metadata.insert("description".to_string(), json!("rados suite"));
        Job {
            run: "r1".to_string(),
            job_id: "42".to_string(),
            name: Some("rados".to_string()),
            status: JobStatus::Running,
            posted: Utc::now(),
            updated: Utc::now(),
            targets: BTreeMap::from([("u@t1".to_string(), "client.0".to_string())]),
            metadata,
        }
    }

    #[test]
    fn slice_selects_fixed_fields() {
        let job = sample_job();
        let sliced = job.slice(&["job_id", "status"]).unwrap();
        assert_eq!(sliced.len(), 2);
        assert_eq!(sliced["job_id"], json!("42"));
        assert_eq!(sliced["status"], json!("running"));
    }

    #[test]
    fn slice_selects_metadata_keys() {
        let job = sample_job();
        let sliced = job.slice(&["description"]).unwrap();
        assert_eq!(sliced["description"], json!("rados suite"));
    }

    #[test]
    fn slice_rejects_unknown_field() {
        let job = sample_job();
        let err = job.slice(&["name", "bogus"]).unwrap_err();
        assert_eq!(err, UnknownField("bogus".to_string()));
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            JobStatus::Queued,
            JobStatus::Running,
            JobStatus::Pass,
            JobStatus::Fail,
            JobStatus::Dead,
            JobStatus::Unknown,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("finished".parse::<JobStatus>().is_err());
    }
}
