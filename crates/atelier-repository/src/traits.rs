//! Store trait definitions.
//!
//! `JobStore` is the only component allowed to mutate job rows.

use atelier_core::{
    Artifact, ArtifactKind, AtelierError, AtelierResult, FailureKind, Interface, Job, JobFilter,
    JobId, JobType, MarkOutcome, NewArtifact, NewJob, Project, ProjectId, QueueStats, UserId,
};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Durable job queue.
#[async_trait]
pub trait JobStore: Interface + Send + Sync {
    /// Appends a pending job.
    async fn create_job(&self, new_job: NewJob) -> AtelierResult<Job>;

    /// Atomically moves the oldest pending job (optionally of one type) to
    /// processing and returns it. Concurrent callers never get the same job.
    async fn claim_next(&self, job_type: Option<JobType>) -> AtelierResult<Option<Job>>;

    /// `processing -> completed`. Idempotent on completed jobs.
    async fn mark_completed(&self, id: JobId) -> AtelierResult<MarkOutcome>;

    /// `processing -> pending` while retries remain for retriable failures,
    /// otherwise `processing -> failed`.
    async fn mark_failed(
        &self,
        id: JobId,
        message: &str,
        kind: FailureKind,
    ) -> AtelierResult<MarkOutcome>;

    /// Finds a job by ID.
    async fn get_job(&self, id: JobId) -> AtelierResult<Option<Job>>;

    /// Lists jobs newest first.
    async fn list_jobs(&self, filter: &JobFilter, limit: u32) -> AtelierResult<Vec<Job>>;

    /// Deletes every job owned by `user_id`. Returns the number deleted.
    async fn delete_jobs_for_user(&self, user_id: UserId) -> AtelierResult<u64>;

    /// Counts jobs per status.
    async fn count_by_status(&self) -> AtelierResult<QueueStats>;

    /// Applies the retriable failure path to jobs processing for longer than
    /// `lease`. Returns the number of jobs touched.
    async fn requeue_stale(&self, lease: Duration) -> AtelierResult<u64>;
}

/// Project aggregate storage.
#[async_trait]
pub trait ProjectStore: Interface + Send + Sync {
    /// Inserts a project.
    async fn create_project(&self, project: &Project) -> AtelierResult<Project>;

    /// Finds a project by ID.
    async fn get_project(&self, id: ProjectId) -> AtelierResult<Option<Project>>;

    /// Moves a non-completed project to processing and records the kinds it
    /// expects. A completed project is returned unchanged.
    async fn begin_processing(
        &self,
        id: ProjectId,
        expected: &[ArtifactKind],
    ) -> AtelierResult<Project>;

    /// `processing -> completed` as one conditional update. Returns whether
    /// this call made the transition.
    async fn complete_if_processing(&self, id: ProjectId) -> AtelierResult<bool>;
}

/// Artifact storage, unique per `(project_id, kind)`.
#[async_trait]
pub trait ArtifactStore: Interface + Send + Sync {
    /// Inserts the artifact unless one of the same kind exists, and returns
    /// whichever is stored.
    async fn upsert_artifact(&self, artifact: NewArtifact) -> AtelierResult<Artifact>;

    /// Finds the artifact of `kind` for a project.
    async fn find_artifact(
        &self,
        project_id: ProjectId,
        kind: ArtifactKind,
    ) -> AtelierResult<Option<Artifact>>;

    /// Lists every artifact of a project.
    async fn list_for_project(&self, project_id: ProjectId) -> AtelierResult<Vec<Artifact>>;

    /// Distinct kinds produced for a project.
    async fn produced_kinds(&self, project_id: ProjectId) -> AtelierResult<Vec<ArtifactKind>>;
}

/// Ledger failures.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("insufficient credits: required {required}, available {available}")]
    InsufficientCredits { required: i64, available: i64 },

    #[error("no credit account for user {0}")]
    AccountNotFound(UserId),

    #[error("invalid amount: {0}")]
    InvalidAmount(i64),

    #[error(transparent)]
    Store(#[from] AtelierError),
}

impl From<LedgerError> for AtelierError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientCredits {
                required,
                available,
            } => Self::InsufficientCredits {
                required,
                available,
            },
            LedgerError::AccountNotFound(user_id) => Self::not_found("credit_account", user_id),
            LedgerError::InvalidAmount(amount) => {
                Self::validation(format!("invalid credit amount: {}", amount))
            }
            LedgerError::Store(e) => e,
        }
    }
}

/// Credit balance check and debit.
#[async_trait]
pub trait Ledger: Interface + Send + Sync {
    /// Current balance.
    async fn balance(&self, user_id: UserId) -> Result<i64, LedgerError>;

    /// Debits `amount` if the balance covers it. Returns the new balance.
    async fn debit(&self, user_id: UserId, amount: i64) -> Result<i64, LedgerError>;

    /// Credits `amount` back. Returns the new balance.
    async fn refund(&self, user_id: UserId, amount: i64) -> Result<i64, LedgerError>;
}
