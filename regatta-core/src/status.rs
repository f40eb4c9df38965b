//! Run status aggregation
//!
//! Derives a run's overall status from the multiset of its jobs' statuses,
//! and counts jobs per status bucket for run- and node-scoped statistics.
//! Everything here is a pure function of its inputs; the server calls it
//! inside the same transaction as the mutation that changed the multiset.

use serde::{Deserialize, Serialize};

use crate::domain::job::JobStatus;
use crate::domain::run::RunStatus;

/// Exact per-bucket job counts for a queried scope.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    pub running: u64,
    pub pass: u64,
    pub fail: u64,
    pub dead: u64,
    pub unknown: u64,
    pub queued: u64,
}

impl JobStats {
    /// Count one job in the given status bucket.
    pub fn record(&mut self, status: JobStatus) {
        self.record_n(status, 1);
    }

    /// Count `n` jobs in the given status bucket (for pre-grouped rows).
    pub fn record_n(&mut self, status: JobStatus, n: u64) {
        match status {
            JobStatus::Running => self.running += n,
            JobStatus::Pass => self.pass += n,
            JobStatus::Fail => self.fail += n,
            JobStatus::Dead => self.dead += n,
            JobStatus::Unknown => self.unknown += n,
            JobStatus::Queued => self.queued += n,
        }
    }

    pub fn total(&self) -> u64 {
        self.running + self.pass + self.fail + self.dead + self.unknown + self.queued
    }
}

impl FromIterator<JobStatus> for JobStats {
    fn from_iter<I: IntoIterator<Item = JobStatus>>(iter: I) -> Self {
        let mut stats = JobStats::default();
        for status in iter {
            stats.record(status);
        }
        stats
    }
}

/// Derive a run's status from its jobs' status counts.
///
/// Precedence, highest first: any running job makes the run `running`; else
/// any failure makes it `fail`; else any dead job makes it `dead`; else a
/// non-empty all-pass set is `pass`; else any queued job makes it `queued`.
/// Anything left over, including a run with no jobs, is `unknown`.
pub fn aggregate(stats: &JobStats) -> RunStatus {
    if stats.running > 0 {
        RunStatus::Running
    } else if stats.fail > 0 {
        RunStatus::Fail
    } else if stats.dead > 0 {
        RunStatus::Dead
    } else if stats.total() > 0 && stats.pass == stats.total() {
        RunStatus::Pass
    } else if stats.queued > 0 {
        RunStatus::Queued
    } else {
        RunStatus::Unknown
    }
}

/// Convenience form of [`aggregate`] over raw statuses.
pub fn aggregate_statuses<I>(statuses: I) -> RunStatus
where
    I: IntoIterator<Item = JobStatus>,
{
    aggregate(&statuses.into_iter().collect())
}
