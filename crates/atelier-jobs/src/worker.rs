//! Claims and executes jobs.
//!
//! A worker holds no queue state. Each [`Worker::tick`] claims at most one
//! job, runs its handler under a timeout and records the result through the
//! store's mark operations. Any number of workers, in any number of
//! processes, can tick against the same store.

use crate::error::{JobError, JobResult};
use crate::handler::{HandlerRegistry, JobContext};
use crate::metrics as job_metrics;
use crate::payload::JobPayload;
use atelier_config::WorkerConfig;
use atelier_core::{AtelierResult, FailureKind, Job, JobId, JobType, MarkOutcome};
use atelier_repository::JobStore;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// Worker settings.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Upper bound on a single handler run.
    pub job_timeout: Duration,
    /// Jobs per drain.
    pub batch_size: usize,
    /// Only claim jobs of this type.
    pub job_type: Option<JobType>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from(&WorkerConfig::default())
    }
}

impl From<&WorkerConfig> for WorkerSettings {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            job_timeout: config.job_timeout(),
            batch_size: config.batch_size,
            job_type: None,
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TickOutcome {
    /// No pending job.
    Idle,
    Completed {
        job_id: JobId,
        job_type: JobType,
    },
    /// Failed and went back to pending.
    Retrying {
        job_id: JobId,
        job_type: JobType,
        retry_count: i32,
        error: String,
    },
    /// Failed for good.
    Failed {
        job_id: JobId,
        job_type: JobType,
        error: String,
    },
}

/// Totals of one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub processed: usize,
    pub completed: usize,
    pub retried: usize,
    pub failed: usize,
    /// Ticks that ended in a store error.
    pub errors: usize,
}

impl DrainReport {
    pub fn record(&mut self, outcome: &TickOutcome) {
        match outcome {
            TickOutcome::Idle => return,
            TickOutcome::Completed { .. } => self.completed += 1,
            TickOutcome::Retrying { .. } => self.retried += 1,
            TickOutcome::Failed { .. } => self.failed += 1,
        }
        self.processed += 1;
    }

    pub fn merge(&mut self, other: &Self) {
        self.processed += other.processed;
        self.completed += other.completed;
        self.retried += other.retried;
        self.failed += other.failed;
        self.errors += other.errors;
    }
}

/// Stateless job worker.
#[derive(Clone)]
pub struct Worker {
    id: String,
    jobs: Arc<dyn JobStore>,
    handlers: Arc<HandlerRegistry>,
    settings: WorkerSettings,
}

impl Worker {
    #[must_use]
    pub fn new(
        jobs: Arc<dyn JobStore>,
        handlers: Arc<HandlerRegistry>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            id: format!("worker-{}", Uuid::new_v4()),
            jobs,
            handlers,
            settings,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    /// Claims and processes at most one job.
    pub async fn tick(&self) -> AtelierResult<TickOutcome> {
        let Some(job) = self.jobs.claim_next(self.settings.job_type).await? else {
            return Ok(TickOutcome::Idle);
        };

        let wait = (Utc::now() - job.created_at).to_std().unwrap_or_default();
        job_metrics::record_claimed(job.job_type, wait);

        let span = tracing::info_span!(
            "worker_tick",
            worker_id = %self.id,
            job_id = %job.id,
            job_type = %job.job_type,
            attempt = job.retry_count + 1,
        );
        self.process(job).instrument(span).await
    }

    /// Ticks until the queue is empty or `max` jobs were processed.
    pub async fn drain(&self, max: usize) -> DrainReport {
        let mut report = DrainReport::default();
        while report.processed < max {
            match self.tick().await {
                Ok(TickOutcome::Idle) => break,
                Ok(outcome) => report.record(&outcome),
                Err(e) => {
                    error!(worker_id = %self.id, error = %e, "Worker tick failed");
                    report.errors += 1;
                    break;
                }
            }
        }
        debug!(
            worker_id = %self.id,
            processed = report.processed,
            failed = report.failed,
            "Drain finished"
        );
        report
    }

    /// Drains up to the configured batch size.
    pub async fn drain_batch(&self) -> DrainReport {
        self.drain(self.settings.batch_size).await
    }

    async fn process(&self, job: Job) -> AtelierResult<TickOutcome> {
        let started = Instant::now();
        let job_id = job.id;
        let job_type = job.job_type;

        match self.execute(&job).await {
            Ok(()) => {
                let outcome = self.jobs.mark_completed(job_id).await?;
                if outcome == MarkOutcome::AlreadyCompleted {
                    warn!("Job was already completed");
                }
                job_metrics::record_completed(job_type, started.elapsed());
                info!(elapsed_ms = started.elapsed().as_millis(), "Job completed");
                Ok(TickOutcome::Completed { job_id, job_type })
            }
            Err(err) => {
                let kind = err.failure_kind();
                let message = err.to_string();
                if matches!(err, JobError::Timeout(_)) {
                    job_metrics::record_timed_out(job_type);
                }

                match self.jobs.mark_failed(job_id, &message, kind).await? {
                    MarkOutcome::Retrying { retry_count } => {
                        warn!(error = %message, retry_count, "Job failed, will retry");
                        job_metrics::record_retried(job_type, err.label());
                        Ok(TickOutcome::Retrying {
                            job_id,
                            job_type,
                            retry_count,
                            error: message,
                        })
                    }
                    _ => {
                        if kind == FailureKind::Terminal {
                            warn!(error = %message, "Job failed terminally");
                        } else {
                            warn!(error = %message, "Job failed, retries exhausted");
                        }
                        job_metrics::record_failed(job_type, err.label());
                        Ok(TickOutcome::Failed {
                            job_id,
                            job_type,
                            error: message,
                        })
                    }
                }
            }
        }
    }

    async fn execute(&self, job: &Job) -> JobResult<()> {
        let handler = self
            .handlers
            .get(job.job_type)
            .ok_or(JobError::NoHandler(job.job_type))?;
        let payload = JobPayload::decode(job.job_type, &job.payload)?;
        let ctx = JobContext::from_job(job);

        match timeout(self.settings.job_timeout, handler.handle(payload, &ctx)).await {
            Ok(result) => result,
            Err(_) => Err(JobError::Timeout(self.settings.job_timeout.as_secs())),
        }
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("handlers", &self.handlers)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
