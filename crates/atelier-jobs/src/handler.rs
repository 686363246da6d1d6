//! Handler trait and registry.

use crate::error::JobResult;
use crate::payload::JobPayload;
use atelier_core::{Job, JobId, JobType, UserId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Metadata of the job being handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobContext {
    pub job_id: JobId,
    pub user_id: UserId,
    /// Retries already used. Zero on the first attempt.
    pub retry_count: i32,
    pub max_retries: i32,
}

impl JobContext {
    #[must_use]
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id,
            user_id: job.user_id,
            retry_count: job.retry_count,
            max_retries: job.max_retries,
        }
    }

    /// 1-based attempt number.
    #[must_use]
    pub const fn attempt(&self) -> i32 {
        self.retry_count + 1
    }
}

/// Executes one job type.
///
/// A handler may run more than once for the same job (retries, a worker
/// dying after the side effect but before the job is marked), so every
/// handler must be safe to re-invoke.
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn job_type(&self) -> JobType;

    async fn handle(&self, payload: JobPayload, ctx: &JobContext) -> JobResult<()>;
}

/// Handlers keyed by job type.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler, replacing any previous one for the same type.
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        let job_type = handler.job_type();
        info!(job_type = %job_type, "Registered job handler");
        self.handlers.insert(job_type, handler);
    }

    #[must_use]
    pub fn with(mut self, handler: Arc<dyn JobHandler>) -> Self {
        self.register(handler);
        self
    }

    #[must_use]
    pub fn get(&self, job_type: JobType) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(&job_type).cloned()
    }

    #[must_use]
    pub fn job_types(&self) -> Vec<JobType> {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort_by_key(JobType::as_str);
        types
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("job_types", &self.job_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop(JobType);

    #[async_trait]
    impl JobHandler for Noop {
        fn job_type(&self) -> JobType {
            self.0
        }

        async fn handle(&self, _payload: JobPayload, _ctx: &JobContext) -> JobResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_registry_lookup() {
        let registry = HandlerRegistry::new()
            .with(Arc::new(Noop(JobType::GenerateStructuredContent)))
            .with(Arc::new(Noop(JobType::GenerateArtifact)));

        assert_eq!(registry.len(), 2);
        assert!(registry.get(JobType::GenerateArtifact).is_some());
        assert!(registry.get(JobType::GenerateCompositePack).is_none());
        assert_eq!(
            registry.job_types(),
            vec![JobType::GenerateArtifact, JobType::GenerateStructuredContent]
        );
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(Noop(JobType::GenerateArtifact)));
        registry.register(Arc::new(Noop(JobType::GenerateArtifact)));
        assert_eq!(registry.len(), 1);
    }
}
