//! Submission and status queries.
//!
//! Submitting a job goes ownership check, rate limit, ledger debit, then
//! enqueue. The debit is not transactional with the insert; if the insert
//! fails the credits are refunded.

use crate::metrics as job_metrics;
use crate::payload::JobPayload;
use crate::rate_limit::RateLimiter;
use atelier_config::JobsConfig;
use atelier_core::{
    Artifact, AtelierError, AtelierResult, Interface, Job, JobFilter, JobId, Project, ProjectId,
    QueueStats, UserId,
};
use atelier_repository::{ArtifactStore, JobStore, Ledger, ProjectStore};
use async_trait::async_trait;
use serde::Serialize;
use shaku::Component;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default page size for job listings.
pub const DEFAULT_LIST_LIMIT: u32 = 50;
/// Largest page size for job listings.
pub const MAX_LIST_LIMIT: u32 = 500;

/// An accepted submission.
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub job: Job,
    pub credits_charged: i64,
    pub balance: i64,
}

/// A project with the artifacts produced so far.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectOverview {
    pub project: Project,
    pub artifacts: Vec<Artifact>,
    pub produced: usize,
    pub expected: usize,
}

#[async_trait]
pub trait JobService: Interface + Send + Sync {
    /// Creates a project owned by `user_id`.
    async fn create_project(
        &self,
        user_id: UserId,
        name: &str,
        source_images: Vec<String>,
    ) -> AtelierResult<Project>;

    /// Rate-limits, debits and enqueues a job for `user_id`. The payload's
    /// project must exist and belong to `user_id`.
    async fn submit(&self, user_id: UserId, payload: JobPayload) -> AtelierResult<Submission>;

    async fn get_job(&self, id: JobId) -> AtelierResult<Job>;

    /// Lists jobs newest first. `limit` defaults to [`DEFAULT_LIST_LIMIT`].
    async fn list_jobs(&self, filter: &JobFilter, limit: Option<u32>) -> AtelierResult<Vec<Job>>;

    /// Removes every job of a user.
    async fn delete_jobs_for_user(&self, user_id: UserId) -> AtelierResult<u64>;

    async fn queue_stats(&self) -> AtelierResult<QueueStats>;

    async fn project_overview(&self, id: ProjectId) -> AtelierResult<ProjectOverview>;

    /// Sends jobs stuck in processing for longer than `lease` through the
    /// retriable failure path.
    async fn requeue_stale(&self, lease: Duration) -> AtelierResult<u64>;
}

#[derive(Component)]
#[shaku(interface = JobService)]
pub struct JobServiceComponent {
    #[shaku(inject)]
    jobs: Arc<dyn JobStore>,
    #[shaku(inject)]
    projects: Arc<dyn ProjectStore>,
    #[shaku(inject)]
    artifacts: Arc<dyn ArtifactStore>,
    #[shaku(inject)]
    ledger: Arc<dyn Ledger>,
    #[shaku(inject)]
    rate_limiter: Arc<dyn RateLimiter>,
    config: JobsConfig,
}

impl JobServiceComponent {
    #[must_use]
    pub fn new(
        jobs: Arc<dyn JobStore>,
        projects: Arc<dyn ProjectStore>,
        artifacts: Arc<dyn ArtifactStore>,
        ledger: Arc<dyn Ledger>,
        rate_limiter: Arc<dyn RateLimiter>,
        config: JobsConfig,
    ) -> Self {
        Self {
            jobs,
            projects,
            artifacts,
            ledger,
            rate_limiter,
            config,
        }
    }

    async fn ensure_owner(&self, user_id: UserId, project_id: ProjectId) -> AtelierResult<()> {
        let project = self
            .projects
            .get_project(project_id)
            .await?
            .ok_or_else(|| AtelierError::not_found("project", project_id))?;
        if project.user_id != user_id {
            job_metrics::record_submission_rejected("forbidden");
            warn!(user_id = %user_id, project_id = %project_id, "Submission for foreign project");
            return Err(AtelierError::Forbidden(format!(
                "project {project_id} belongs to another user"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl JobService for JobServiceComponent {
    async fn create_project(
        &self,
        user_id: UserId,
        name: &str,
        source_images: Vec<String>,
    ) -> AtelierResult<Project> {
        let name = name.trim();
        if name.is_empty() || name.len() > 200 {
            return Err(AtelierError::validation(
                "project name must be 1 to 200 characters",
            ));
        }
        if source_images.iter().any(|uri| uri.trim().is_empty()) {
            return Err(AtelierError::validation("source image URIs must not be blank"));
        }

        let project = self
            .projects
            .create_project(&Project::new(user_id, name, source_images))
            .await?;
        info!(project_id = %project.id, user_id = %user_id, "Project created");
        Ok(project)
    }

    async fn submit(&self, user_id: UserId, payload: JobPayload) -> AtelierResult<Submission> {
        let job_type = payload.job_type();
        payload
            .validate()
            .map_err(|e| AtelierError::validation(e.to_string()))?;
        self.ensure_owner(user_id, payload.project_id()).await?;

        let decision = self.rate_limiter.check(user_id).await;
        if !decision.allowed {
            job_metrics::record_submission_rejected("rate_limited");
            warn!(
                user_id = %user_id,
                job_type = %job_type,
                reset_after_secs = decision.reset_after_secs,
                "Submission rate limited"
            );
            return Err(AtelierError::RateLimitExceeded);
        }

        let cost = self.config.credit_cost(job_type);
        let balance = self.ledger.debit(user_id, cost).await.map_err(|e| {
            job_metrics::record_submission_rejected("ledger");
            AtelierError::from(e)
        })?;
        debug!(user_id = %user_id, cost, balance, "Credits debited");

        let new_job = payload
            .into_new_job(user_id, self.config.max_retries(job_type))
            .map_err(|e| AtelierError::validation(e.to_string()))?;

        match self.jobs.create_job(new_job).await {
            Ok(job) => {
                job_metrics::record_enqueued(job_type);
                info!(job_id = %job.id, job_type = %job_type, user_id = %user_id, "Job submitted");
                Ok(Submission {
                    job,
                    credits_charged: cost,
                    balance,
                })
            }
            Err(e) => {
                error!(user_id = %user_id, error = %e, "Enqueue failed, refunding credits");
                if let Err(refund_err) = self.ledger.refund(user_id, cost).await {
                    error!(user_id = %user_id, cost, error = %refund_err, "Refund failed");
                }
                Err(e)
            }
        }
    }

    async fn get_job(&self, id: JobId) -> AtelierResult<Job> {
        self.jobs
            .get_job(id)
            .await?
            .ok_or_else(|| AtelierError::not_found("job", id))
    }

    async fn list_jobs(&self, filter: &JobFilter, limit: Option<u32>) -> AtelierResult<Vec<Job>> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
        self.jobs.list_jobs(filter, limit).await
    }

    async fn delete_jobs_for_user(&self, user_id: UserId) -> AtelierResult<u64> {
        let deleted = self.jobs.delete_jobs_for_user(user_id).await?;
        info!(user_id = %user_id, deleted, "Deleted user jobs");
        Ok(deleted)
    }

    async fn queue_stats(&self) -> AtelierResult<QueueStats> {
        let stats = self.jobs.count_by_status().await?;
        job_metrics::update_queue_depth(&stats);
        Ok(stats)
    }

    async fn project_overview(&self, id: ProjectId) -> AtelierResult<ProjectOverview> {
        let project = self
            .projects
            .get_project(id)
            .await?
            .ok_or_else(|| AtelierError::not_found("project", id))?;
        let artifacts = self.artifacts.list_for_project(id).await?;
        let produced_kinds: Vec<_> = artifacts.iter().map(|a| a.kind).collect();

        let mut expected = project.expected_artifacts.clone();
        expected.sort();
        expected.dedup();

        Ok(ProjectOverview {
            produced: project.covered_count(&produced_kinds),
            expected: expected.len(),
            project,
            artifacts,
        })
    }

    async fn requeue_stale(&self, lease: Duration) -> AtelierResult<u64> {
        let touched = self.jobs.requeue_stale(lease).await?;
        if touched > 0 {
            warn!(touched, lease_secs = lease.as_secs(), "Requeued stale jobs");
            job_metrics::record_requeued_stale(touched);
        }
        Ok(touched)
    }
}
