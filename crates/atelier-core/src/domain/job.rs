//! Job entity and its status machine.
//!
//! A job only ever moves `pending -> processing -> {completed | pending | failed}`.
//! The Postgres store expresses these rules as conditional updates; the
//! methods here are the same rules for in-process stores.

use crate::{AtelierError, AtelierResult, JobId, ProjectId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;

/// Kind of work a job carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    /// Produce one image artifact for a project.
    GenerateArtifact,
    /// Fan out a project into artifact jobs.
    GenerateCompositePack,
    /// Produce the structured content artifact for a project.
    GenerateStructuredContent,
}

impl JobType {
    /// Wire and storage name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::GenerateArtifact => "generate-artifact",
            Self::GenerateCompositePack => "generate-composite-pack",
            Self::GenerateStructuredContent => "generate-structured-content",
        }
    }

    /// All job types.
    #[must_use]
    pub const fn all() -> [Self; 3] {
        [
            Self::GenerateArtifact,
            Self::GenerateCompositePack,
            Self::GenerateStructuredContent,
        ]
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = AtelierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| AtelierError::validation(format!("unknown job type: {}", s)))
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting to be claimed.
    #[default]
    Pending,
    /// Claimed by a worker.
    Processing,
    /// Finished successfully.
    Completed,
    /// Gave up.
    Failed,
}

impl JobStatus {
    /// Storage name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Completed and failed jobs never change again.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = AtelierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(AtelierError::validation(format!("unknown job status: {}", other))),
        }
    }
}

/// How a failed execution should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// Go back to pending while retries remain.
    Retriable,
    /// Fail permanently.
    Terminal,
}

impl FailureKind {
    /// Storage name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Retriable => "retriable",
            Self::Terminal => "terminal",
        }
    }
}

/// Result of a completion or failure mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MarkOutcome {
    /// The job moved to completed.
    Completed,
    /// The job was already completed; nothing changed.
    AlreadyCompleted,
    /// The job went back to pending.
    Retrying { retry_count: i32 },
    /// The job moved to failed.
    Failed,
}

/// A unit of queued work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub job_type: JobType,
    pub payload: JsonValue,
    pub status: JobStatus,
    pub retry_count: i32,
    pub max_retries: i32,
    pub error_message: Option<String>,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    /// Set on every claim.
    pub processed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Project named in the payload, if any.
    #[must_use]
    pub fn project_id(&self) -> Option<ProjectId> {
        self.payload.get("project_id")?.as_str()?.parse().ok()
    }

    /// Builds a pending job from an enqueue request.
    #[must_use]
    pub fn from_new(new_job: NewJob) -> Self {
        Self {
            id: JobId::new(),
            job_type: new_job.job_type,
            payload: new_job.payload,
            status: JobStatus::Pending,
            retry_count: 0,
            max_retries: new_job.max_retries,
            error_message: None,
            user_id: new_job.user_id,
            created_at: Utc::now(),
            processed_at: None,
            completed_at: None,
        }
    }

    /// Whether another retriable failure would send the job back to pending.
    #[must_use]
    pub const fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// `pending -> processing`.
    pub fn claim(&mut self, now: DateTime<Utc>) -> AtelierResult<()> {
        if self.status != JobStatus::Pending {
            return Err(self.transition_error(JobStatus::Processing));
        }
        self.status = JobStatus::Processing;
        self.processed_at = Some(now);
        Ok(())
    }

    /// `processing -> completed`; a no-op on an already completed job.
    pub fn complete(&mut self, now: DateTime<Utc>) -> AtelierResult<MarkOutcome> {
        match self.status {
            JobStatus::Processing => {
                self.status = JobStatus::Completed;
                self.completed_at = Some(now);
                Ok(MarkOutcome::Completed)
            }
            JobStatus::Completed => Ok(MarkOutcome::AlreadyCompleted),
            JobStatus::Pending | JobStatus::Failed => {
                Err(self.transition_error(JobStatus::Completed))
            }
        }
    }

    /// `processing -> pending` (retry) or `processing -> failed`.
    pub fn fail(&mut self, message: impl Into<String>, kind: FailureKind) -> AtelierResult<MarkOutcome> {
        if self.status != JobStatus::Processing {
            return Err(self.transition_error(JobStatus::Failed));
        }
        self.error_message = Some(message.into());
        if kind == FailureKind::Retriable && self.can_retry() {
            self.retry_count += 1;
            self.status = JobStatus::Pending;
            Ok(MarkOutcome::Retrying {
                retry_count: self.retry_count,
            })
        } else {
            self.status = JobStatus::Failed;
            Ok(MarkOutcome::Failed)
        }
    }

    fn transition_error(&self, to: JobStatus) -> AtelierError {
        AtelierError::invalid_transition("job", self.id, self.status, to)
    }
}

/// Enqueue request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewJob {
    pub job_type: JobType,
    pub payload: JsonValue,
    pub user_id: UserId,
    pub max_retries: i32,
}

impl NewJob {
    #[must_use]
    pub fn new(job_type: JobType, payload: JsonValue, user_id: UserId, max_retries: i32) -> Self {
        Self {
            job_type,
            payload,
            user_id,
            max_retries: max_retries.max(0),
        }
    }
}

/// Filter for listing jobs. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub user_id: Option<UserId>,
    pub job_type: Option<JobType>,
    pub project_id: Option<ProjectId>,
}

impl JobFilter {
    #[must_use]
    pub fn matches(&self, job: &Job) -> bool {
        self.status.map_or(true, |s| job.status == s)
            && self.user_id.map_or(true, |u| job.user_id == u)
            && self.job_type.map_or(true, |t| job.job_type == t)
            && self.project_id.map_or(true, |p| job.project_id() == Some(p))
    }
}

/// Job counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
}

impl QueueStats {
    /// Adds `count` to the bucket for `status`.
    pub fn record(&mut self, status: JobStatus, count: u64) {
        match status {
            JobStatus::Pending => self.pending += count,
            JobStatus::Processing => self.processing += count,
            JobStatus::Completed => self.completed += count,
            JobStatus::Failed => self.failed += count,
        }
    }

    #[must_use]
    pub const fn total(&self) -> u64 {
        self.pending + self.processing + self.completed + self.failed
    }
}
