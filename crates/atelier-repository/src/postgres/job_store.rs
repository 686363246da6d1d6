//! Postgres job queue.
//!
//! Every state change is one conditional `UPDATE`; no transaction spans
//! handler execution.

use crate::{traits::JobStore, DatabasePoolInterface};
use atelier_core::{
    AtelierError, AtelierResult, FailureKind, Job, JobFilter, JobId, JobStatus, JobType,
    MarkOutcome, NewJob, QueueStats, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use shaku::Component;
use sqlx::FromRow;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

const JOB_COLUMNS: &str = "id, job_type, payload, status, retry_count, max_retries, \
                           error_message, user_id, created_at, processed_at, completed_at";

/// Postgres-backed [`JobStore`].
#[derive(Component, Clone)]
#[shaku(interface = JobStore)]
pub struct PgJobStore {
    #[shaku(inject)]
    pool: Arc<dyn DatabasePoolInterface>,
}

impl PgJobStore {
    /// Creates a new Postgres job store.
    #[must_use]
    pub fn new(pool: Arc<dyn DatabasePoolInterface>) -> Self {
        Self { pool }
    }

    /// Explains why a conditional update matched no row.
    async fn unmatched(&self, id: JobId, to: JobStatus) -> AtelierResult<MarkOutcome> {
        let status: Option<String> = sqlx::query_scalar("SELECT status FROM jobs WHERE id = $1")
            .bind(id.into_inner())
            .fetch_optional(self.pool.inner())
            .await?;

        let Some(status) = status else {
            return Err(AtelierError::not_found("job", id));
        };
        let status: JobStatus = status.parse()?;

        if status == JobStatus::Completed && to == JobStatus::Completed {
            return Ok(MarkOutcome::AlreadyCompleted);
        }

        warn!(job_id = %id, from = %status, to = %to, "Rejected job transition");
        Err(AtelierError::invalid_transition("job", id, status, to))
    }
}

#[derive(Debug, FromRow)]
struct JobRow {
    id: Uuid,
    job_type: String,
    payload: JsonValue,
    status: String,
    retry_count: i32,
    max_retries: i32,
    error_message: Option<String>,
    user_id: Uuid,
    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<JobRow> for Job {
    type Error = AtelierError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Job {
            id: JobId::from_uuid(row.id),
            job_type: row.job_type.parse()?,
            payload: row.payload,
            status: row.status.parse()?,
            retry_count: row.retry_count,
            max_retries: row.max_retries,
            error_message: row.error_message,
            user_id: UserId::from_uuid(row.user_id),
            created_at: row.created_at,
            processed_at: row.processed_at,
            completed_at: row.completed_at,
        })
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create_job(&self, new_job: NewJob) -> AtelierResult<Job> {
        let job = Job::from_new(new_job);
        debug!(job_id = %job.id, job_type = %job.job_type, "Creating job");

        let row = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            INSERT INTO jobs (id, job_type, payload, status, retry_count, max_retries, user_id, created_at)
            VALUES ($1, $2, $3, 'pending', 0, $4, $5, $6)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(job.id.into_inner())
        .bind(job.job_type.as_str())
        .bind(&job.payload)
        .bind(job.max_retries)
        .bind(job.user_id.into_inner())
        .bind(job.created_at)
        .fetch_one(self.pool.inner())
        .await?;

        row.try_into()
    }

    async fn claim_next(&self, job_type: Option<JobType>) -> AtelierResult<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            UPDATE jobs
            SET status = 'processing', processed_at = NOW()
            WHERE id = (
                SELECT id
                FROM jobs
                WHERE status = 'pending'
                  AND ($1::text IS NULL OR job_type = $1)
                ORDER BY created_at, id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            AND status = 'pending'
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(job_type.map(|t| t.as_str()))
        .fetch_optional(self.pool.inner())
        .await?;

        let job = row.map(Job::try_from).transpose()?;
        if let Some(job) = &job {
            debug!(job_id = %job.id, job_type = %job.job_type, retry_count = job.retry_count, "Claimed job");
        }
        Ok(job)
    }

    async fn mark_completed(&self, id: JobId) -> AtelierResult<MarkOutcome> {
        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'completed', completed_at = NOW()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id.into_inner())
        .execute(self.pool.inner())
        .await?
        .rows_affected();

        if updated == 1 {
            Ok(MarkOutcome::Completed)
        } else {
            self.unmatched(id, JobStatus::Completed).await
        }
    }

    async fn mark_failed(
        &self,
        id: JobId,
        message: &str,
        kind: FailureKind,
    ) -> AtelierResult<MarkOutcome> {
        let row: Option<(String, i32)> = sqlx::query_as(
            r#"
            UPDATE jobs
            SET status = CASE
                    WHEN $3 = 'retriable' AND retry_count < max_retries THEN 'pending'
                    ELSE 'failed'
                END,
                retry_count = CASE
                    WHEN $3 = 'retriable' AND retry_count < max_retries THEN retry_count + 1
                    ELSE retry_count
                END,
                error_message = $2
            WHERE id = $1 AND status = 'processing'
            RETURNING status, retry_count
            "#,
        )
        .bind(id.into_inner())
        .bind(message)
        .bind(kind.as_str())
        .fetch_optional(self.pool.inner())
        .await?;

        match row {
            Some((status, retry_count)) => match status.parse::<JobStatus>()? {
                JobStatus::Pending => Ok(MarkOutcome::Retrying { retry_count }),
                _ => Ok(MarkOutcome::Failed),
            },
            None => self.unmatched(id, JobStatus::Failed).await,
        }
    }

    async fn get_job(&self, id: JobId) -> AtelierResult<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"
        ))
        .bind(id.into_inner())
        .fetch_optional(self.pool.inner())
        .await?;

        row.map(Job::try_from).transpose()
    }

    async fn list_jobs(&self, filter: &JobFilter, limit: u32) -> AtelierResult<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM jobs
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR user_id = $2)
              AND ($3::text IS NULL OR job_type = $3)
              AND ($4::text IS NULL OR payload->>'project_id' = $4)
            ORDER BY created_at DESC, id DESC
            LIMIT $5
            "#
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.user_id.map(UserId::into_inner))
        .bind(filter.job_type.map(|t| t.as_str()))
        .bind(filter.project_id.map(|p| p.to_string()))
        .bind(i64::from(limit))
        .fetch_all(self.pool.inner())
        .await?;

        rows.into_iter().map(Job::try_from).collect()
    }

    async fn delete_jobs_for_user(&self, user_id: UserId) -> AtelierResult<u64> {
        let deleted = sqlx::query("DELETE FROM jobs WHERE user_id = $1")
            .bind(user_id.into_inner())
            .execute(self.pool.inner())
            .await?
            .rows_affected();

        debug!(user_id = %user_id, deleted, "Deleted jobs for user");
        Ok(deleted)
    }

    async fn count_by_status(&self) -> AtelierResult<QueueStats> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM jobs GROUP BY status")
                .fetch_all(self.pool.inner())
                .await?;

        let mut stats = QueueStats::default();
        for (status, count) in rows {
            stats.record(status.parse()?, u64::try_from(count).unwrap_or(0));
        }
        Ok(stats)
    }

    async fn requeue_stale(&self, lease: Duration) -> AtelierResult<u64> {
        let touched = sqlx::query(
            r#"
            UPDATE jobs
            SET status = CASE WHEN retry_count < max_retries THEN 'pending' ELSE 'failed' END,
                retry_count = CASE WHEN retry_count < max_retries THEN retry_count + 1 ELSE retry_count END,
                error_message = 'processing lease expired'
            WHERE status = 'processing'
              AND processed_at < NOW() - make_interval(secs => $1)
            "#,
        )
        .bind(lease.as_secs_f64())
        .execute(self.pool.inner())
        .await?
        .rows_affected();

        if touched > 0 {
            warn!(touched, lease_secs = lease.as_secs(), "Requeued stale jobs");
        }
        Ok(touched)
    }
}
