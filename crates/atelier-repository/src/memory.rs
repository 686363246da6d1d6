//! In-memory stores.
//!
//! Same contracts as the Postgres stores, backed by a mutex. Used by unit
//! tests across the workspace and for running the worker without a database.

use crate::traits::{ArtifactStore, JobStore, Ledger, LedgerError, ProjectStore};
use atelier_core::{
    Artifact, ArtifactKind, AtelierError, AtelierResult, FailureKind, Job, JobFilter, JobId,
    JobStatus, JobType, MarkOutcome, NewArtifact, NewJob, Project, ProjectId, ProjectStatus,
    QueueStats, UserId,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

/// In-memory [`JobStore`].
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a job as-is, bypassing enqueue.
    pub fn insert(&self, job: Job) {
        self.jobs.lock().insert(job.id, job);
    }

    /// Snapshot of every stored job.
    #[must_use]
    pub fn all(&self) -> Vec<Job> {
        self.jobs.lock().values().cloned().collect()
    }

    fn with_job<T>(
        &self,
        id: JobId,
        f: impl FnOnce(&mut Job) -> AtelierResult<T>,
    ) -> AtelierResult<T> {
        let mut jobs = self.jobs.lock();
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| AtelierError::not_found("job", id))?;
        f(job).map_err(|e| {
            warn!(job_id = %id, error = %e, "Rejected job transition");
            e
        })
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create_job(&self, new_job: NewJob) -> AtelierResult<Job> {
        let job = Job::from_new(new_job);
        self.jobs.lock().insert(job.id, job.clone());
        Ok(job)
    }

    async fn claim_next(&self, job_type: Option<JobType>) -> AtelierResult<Option<Job>> {
        let mut jobs = self.jobs.lock();
        let next = jobs
            .values_mut()
            .filter(|j| j.status == JobStatus::Pending)
            .filter(|j| job_type.map_or(true, |t| j.job_type == t))
            .min_by_key(|j| (j.created_at, j.id));

        match next {
            Some(job) => {
                job.claim(Utc::now())?;
                Ok(Some(job.clone()))
            }
            None => Ok(None),
        }
    }

    async fn mark_completed(&self, id: JobId) -> AtelierResult<MarkOutcome> {
        self.with_job(id, |job| job.complete(Utc::now()))
    }

    async fn mark_failed(
        &self,
        id: JobId,
        message: &str,
        kind: FailureKind,
    ) -> AtelierResult<MarkOutcome> {
        self.with_job(id, |job| job.fail(message, kind))
    }

    async fn get_job(&self, id: JobId) -> AtelierResult<Option<Job>> {
        Ok(self.jobs.lock().get(&id).cloned())
    }

    async fn list_jobs(&self, filter: &JobFilter, limit: u32) -> AtelierResult<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .jobs
            .lock()
            .values()
            .filter(|j| filter.matches(j))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        jobs.truncate(limit as usize);
        Ok(jobs)
    }

    async fn delete_jobs_for_user(&self, user_id: UserId) -> AtelierResult<u64> {
        let mut jobs = self.jobs.lock();
        let before = jobs.len();
        jobs.retain(|_, j| j.user_id != user_id);
        Ok((before - jobs.len()) as u64)
    }

    async fn count_by_status(&self) -> AtelierResult<QueueStats> {
        let mut stats = QueueStats::default();
        for job in self.jobs.lock().values() {
            stats.record(job.status, 1);
        }
        Ok(stats)
    }

    async fn requeue_stale(&self, lease: Duration) -> AtelierResult<u64> {
        let lease = chrono::Duration::from_std(lease)
            .map_err(|e| AtelierError::validation(format!("invalid lease: {}", e)))?;
        let cutoff = Utc::now() - lease;
        let mut touched = 0;
        for job in self.jobs.lock().values_mut() {
            let stale = job.status == JobStatus::Processing
                && job.processed_at.is_some_and(|at| at < cutoff);
            if stale {
                job.fail("processing lease expired", FailureKind::Retriable)?;
                touched += 1;
            }
        }
        Ok(touched)
    }
}

/// In-memory [`ProjectStore`].
#[derive(Debug, Default)]
pub struct InMemoryProjectStore {
    projects: Mutex<HashMap<ProjectId, Project>>,
}

impl InMemoryProjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectStore for InMemoryProjectStore {
    async fn create_project(&self, project: &Project) -> AtelierResult<Project> {
        let mut projects = self.projects.lock();
        if projects.contains_key(&project.id) {
            return Err(AtelierError::conflict(format!("project {} exists", project.id)));
        }
        projects.insert(project.id, project.clone());
        Ok(project.clone())
    }

    async fn get_project(&self, id: ProjectId) -> AtelierResult<Option<Project>> {
        Ok(self.projects.lock().get(&id).cloned())
    }

    async fn begin_processing(
        &self,
        id: ProjectId,
        expected: &[ArtifactKind],
    ) -> AtelierResult<Project> {
        let mut projects = self.projects.lock();
        let project = projects
            .get_mut(&id)
            .ok_or_else(|| AtelierError::not_found("project", id))?;
        if project.status != ProjectStatus::Completed {
            project.status = ProjectStatus::Processing;
            project.expected_artifacts = expected.to_vec();
            project.updated_at = Utc::now();
        }
        Ok(project.clone())
    }

    async fn complete_if_processing(&self, id: ProjectId) -> AtelierResult<bool> {
        let mut projects = self.projects.lock();
        match projects.get_mut(&id) {
            Some(project) if project.status == ProjectStatus::Processing => {
                project.status = ProjectStatus::Completed;
                project.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// In-memory [`ArtifactStore`].
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    artifacts: Mutex<HashMap<(ProjectId, ArtifactKind), Artifact>>,
}

impl InMemoryArtifactStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn upsert_artifact(&self, artifact: NewArtifact) -> AtelierResult<Artifact> {
        let key = (artifact.project_id, artifact.kind);
        Ok(self
            .artifacts
            .lock()
            .entry(key)
            .or_insert_with(|| artifact.into_artifact())
            .clone())
    }

    async fn find_artifact(
        &self,
        project_id: ProjectId,
        kind: ArtifactKind,
    ) -> AtelierResult<Option<Artifact>> {
        Ok(self.artifacts.lock().get(&(project_id, kind)).cloned())
    }

    async fn list_for_project(&self, project_id: ProjectId) -> AtelierResult<Vec<Artifact>> {
        let mut artifacts: Vec<Artifact> = self
            .artifacts
            .lock()
            .values()
            .filter(|a| a.project_id == project_id)
            .cloned()
            .collect();
        artifacts.sort_by_key(|a| (a.created_at, a.kind));
        Ok(artifacts)
    }

    async fn produced_kinds(&self, project_id: ProjectId) -> AtelierResult<Vec<ArtifactKind>> {
        Ok(self
            .artifacts
            .lock()
            .keys()
            .filter(|(p, _)| *p == project_id)
            .map(|(_, kind)| *kind)
            .collect())
    }
}

/// In-memory [`Ledger`].
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    balances: Mutex<HashMap<UserId, i64>>,
}

impl InMemoryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a user's balance.
    pub fn set_balance(&self, user_id: UserId, balance: i64) {
        self.balances.lock().insert(user_id, balance);
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn balance(&self, user_id: UserId) -> Result<i64, LedgerError> {
        self.balances
            .lock()
            .get(&user_id)
            .copied()
            .ok_or(LedgerError::AccountNotFound(user_id))
    }

    async fn debit(&self, user_id: UserId, amount: i64) -> Result<i64, LedgerError> {
        if amount < 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let mut balances = self.balances.lock();
        let balance = balances
            .get_mut(&user_id)
            .ok_or(LedgerError::AccountNotFound(user_id))?;
        if *balance < amount {
            return Err(LedgerError::InsufficientCredits {
                required: amount,
                available: *balance,
            });
        }
        *balance -= amount;
        Ok(*balance)
    }

    async fn refund(&self, user_id: UserId, amount: i64) -> Result<i64, LedgerError> {
        if amount < 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let mut balances = self.balances.lock();
        let balance = balances
            .get_mut(&user_id)
            .ok_or(LedgerError::AccountNotFound(user_id))?;
        *balance += amount;
        Ok(*balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn new_job(max_retries: i32) -> NewJob {
        NewJob::new(
            JobType::GenerateArtifact,
            json!({"project_id": ProjectId::new()}),
            UserId::new(),
            max_retries,
        )
    }

    #[tokio::test]
    async fn test_claim_returns_oldest_first() {
        let store = InMemoryJobStore::new();
        let first = store.create_job(new_job(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        let second = store.create_job(new_job(1)).await.unwrap();

        assert_eq!(store.claim_next(None).await.unwrap().unwrap().id, first.id);
        assert_eq!(store.claim_next(None).await.unwrap().unwrap().id, second.id);
        assert!(store.claim_next(None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_filters_by_type() {
        let store = InMemoryJobStore::new();
        store.create_job(new_job(1)).await.unwrap();

        let claimed = store
            .claim_next(Some(JobType::GenerateCompositePack))
            .await
            .unwrap();
        assert!(claimed.is_none());
        assert!(store
            .claim_next(Some(JobType::GenerateArtifact))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_concurrent_claims_are_exclusive() {
        let store = Arc::new(InMemoryJobStore::new());
        store.create_job(new_job(0)).await.unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.claim_next(None).await.unwrap() })
            })
            .collect();

        let mut claimed = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                claimed += 1;
            }
        }
        assert_eq!(claimed, 1);
    }

    #[tokio::test]
    async fn test_retry_keeps_queue_position() {
        let store = InMemoryJobStore::new();
        let first = store.create_job(new_job(2)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        store.create_job(new_job(2)).await.unwrap();

        store.claim_next(None).await.unwrap();
        let outcome = store
            .mark_failed(first.id, "timeout", FailureKind::Retriable)
            .await
            .unwrap();
        assert_eq!(outcome, MarkOutcome::Retrying { retry_count: 1 });

        let next = store.claim_next(None).await.unwrap().unwrap();
        assert_eq!(next.id, first.id);
        assert_eq!(next.created_at, first.created_at);
    }

    #[tokio::test]
    async fn test_mark_unknown_job_is_not_found() {
        let store = InMemoryJobStore::new();
        let err = store.mark_completed(JobId::new()).await.unwrap_err();
        assert!(matches!(err, AtelierError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_jobs_for_user() {
        let store = InMemoryJobStore::new();
        let job = store.create_job(new_job(1)).await.unwrap();
        store.create_job(new_job(1)).await.unwrap();

        assert_eq!(store.delete_jobs_for_user(job.user_id).await.unwrap(), 1);
        assert!(store.get_job(job.id).await.unwrap().is_none());
        assert_eq!(store.count_by_status().await.unwrap().total(), 1);
    }

    #[tokio::test]
    async fn test_requeue_stale_respects_max_retries() {
        let store = InMemoryJobStore::new();
        let retryable = store.create_job(new_job(1)).await.unwrap();
        let exhausted = store.create_job(new_job(0)).await.unwrap();
        store.claim_next(None).await.unwrap();
        store.claim_next(None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(store.requeue_stale(Duration::ZERO).await.unwrap(), 2);
        let retryable = store.get_job(retryable.id).await.unwrap().unwrap();
        let exhausted = store.get_job(exhausted.id).await.unwrap().unwrap();
        assert_eq!(retryable.status, JobStatus::Pending);
        assert_eq!(retryable.retry_count, 1);
        assert_eq!(exhausted.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_requeue_stale_skips_fresh_jobs() {
        let store = InMemoryJobStore::new();
        store.create_job(new_job(1)).await.unwrap();
        store.claim_next(None).await.unwrap();

        assert_eq!(store.requeue_stale(Duration::from_secs(600)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upsert_artifact_keeps_first() {
        let store = InMemoryArtifactStore::new();
        let project_id = ProjectId::new();
        let first = store
            .upsert_artifact(NewArtifact::image(project_id, ArtifactKind::Main, "s3://a.png"))
            .await
            .unwrap();
        let second = store
            .upsert_artifact(NewArtifact::image(project_id, ArtifactKind::Main, "s3://b.png"))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.uri.as_deref(), Some("s3://a.png"));
        assert_eq!(store.produced_kinds(project_id).await.unwrap(), vec![ArtifactKind::Main]);
    }

    #[tokio::test]
    async fn test_project_completes_once() {
        let store = InMemoryProjectStore::new();
        let project = Project::new(UserId::new(), "Lamp", vec!["s3://lamp.png".into()]);
        store.create_project(&project).await.unwrap();

        assert!(!store.complete_if_processing(project.id).await.unwrap());
        store
            .begin_processing(project.id, &ArtifactKind::IMAGE_KINDS)
            .await
            .unwrap();
        assert!(store.complete_if_processing(project.id).await.unwrap());
        assert!(!store.complete_if_processing(project.id).await.unwrap());

        let reopened = store
            .begin_processing(project.id, &[ArtifactKind::Main])
            .await
            .unwrap();
        assert_eq!(reopened.status, ProjectStatus::Completed);
    }

    #[tokio::test]
    async fn test_ledger_debit() {
        let ledger = InMemoryLedger::new();
        let user = UserId::new();
        ledger.set_balance(user, 5);

        assert_eq!(ledger.debit(user, 3).await.unwrap(), 2);
        assert!(matches!(
            ledger.debit(user, 3).await,
            Err(LedgerError::InsufficientCredits { required: 3, available: 2 })
        ));
        assert_eq!(ledger.refund(user, 3).await.unwrap(), 5);
        assert!(matches!(
            ledger.balance(UserId::new()).await,
            Err(LedgerError::AccountNotFound(_))
        ));
    }
}
