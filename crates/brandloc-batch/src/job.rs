//! Batch job state machine
//!
//! ```text
//! PENDING -> IN_PROGRESS -> COMPLETED
//!                        -> FAILED
//! ```
//!
//! Completed and failed are terminal. A job is never re-run automatically.

use brandloc_core::{now_utc, LocalizerError, Result, Timestamp};
use brandloc_localize::RegionRequest;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a batch job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Pending,
        JobStatus::InProgress,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    /// Whether `self -> to` is a legal transition
    pub fn can_transition_to(self, to: JobStatus) -> bool {
        matches!(
            (self, to),
            (JobStatus::Pending, JobStatus::InProgress)
                | (JobStatus::InProgress, JobStatus::Completed)
                | (JobStatus::InProgress, JobStatus::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "PENDING"),
            JobStatus::InProgress => write!(f, "IN_PROGRESS"),
            JobStatus::Completed => write!(f, "COMPLETED"),
            JobStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// One region's request tracked through the job state machine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchJob<T> {
    /// Unique job ID (`job_<region>_<uuid>`)
    pub job_id: String,
    pub region_id: String,
    pub request: RegionRequest,
    status: JobStatus,
    /// Output of a completed job
    #[serde(default)]
    pub result: Option<T>,
    /// Error message of a failed job
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub started_at: Option<Timestamp>,
    #[serde(default)]
    pub completed_at: Option<Timestamp>,
}

impl<T> BatchJob<T> {
    /// Create a pending job for a request
    pub fn new(request: RegionRequest) -> Self {
        let region_id = request.region_id().to_string();
        Self {
            job_id: format!("job_{}_{}", region_id, uuid::Uuid::new_v4().simple()),
            region_id,
            request,
            status: JobStatus::Pending,
            result: None,
            error: None,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Move to `to`, stamping start/completion times
    pub fn transition(&mut self, to: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(LocalizerError::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        match to {
            JobStatus::InProgress => self.started_at = Some(now_utc()),
            JobStatus::Completed | JobStatus::Failed => self.completed_at = Some(now_utc()),
            JobStatus::Pending => {}
        }
        self.status = to;
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        self.transition(JobStatus::InProgress)
    }

    pub fn complete(&mut self, result: T) -> Result<()> {
        self.transition(JobStatus::Completed)?;
        self.result = Some(result);
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<()> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    /// Wall time between start and completion, if both are known
    pub fn duration_secs(&self) -> Option<f64> {
        let started = self.started_at?;
        let completed = self.completed_at?;
        Some((completed - started).num_microseconds()? as f64 / 1_000_000.0)
    }
}
