//! Fakes and a wired-up harness for unit tests.

use crate::collaborators::{
    ContentAnalyzer, ContentRequest, GeneratedImage, ImageGenerator, ImageRequest,
};
use crate::error::GenerationError;
use crate::handler::{HandlerRegistry, JobContext};
use crate::handlers::{ArtifactHandler, CompositePackHandler, StructuredContentHandler};
use crate::payload::JobPayload;
use crate::worker::{Worker, WorkerSettings};
use atelier_config::JobsConfig;
use atelier_core::{
    ArtifactKind, AtelierResult, Job, JobId, JobType, NewJob, Project, ProjectId, UserId,
};
use atelier_repository::memory::{
    InMemoryArtifactStore, InMemoryJobStore, InMemoryLedger, InMemoryProjectStore,
};
use atelier_repository::{JobStore, ProjectStore};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value as JsonValue};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
pub struct FakeImages {
    calls: AtomicUsize,
    failures: Mutex<VecDeque<GenerationError>>,
    rejected: Mutex<HashSet<ArtifactKind>>,
}

impl FakeImages {
    pub fn fail_next(&self, err: GenerationError) {
        self.failures.lock().push_back(err);
    }

    pub fn reject_kind(&self, kind: ArtifactKind) {
        self.rejected.lock().insert(kind);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageGenerator for FakeImages {
    async fn generate(&self, request: &ImageRequest) -> Result<GeneratedImage, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failures.lock().pop_front() {
            return Err(err);
        }
        if self.rejected.lock().contains(&request.kind) {
            return Err(GenerationError::Rejected {
                service: "image-service",
                status: 422,
                message: format!("cannot render {}", request.kind),
            });
        }
        Ok(GeneratedImage {
            uri: format!("s3://generated/{}/{}.png", request.project_id, request.kind),
        })
    }
}

#[derive(Default)]
pub struct FakeContent {
    failures: Mutex<VecDeque<GenerationError>>,
}

impl FakeContent {
    pub fn fail_next(&self, err: GenerationError) {
        self.failures.lock().push_back(err);
    }
}

#[async_trait]
impl ContentAnalyzer for FakeContent {
    async fn analyze(&self, request: &ContentRequest) -> Result<JsonValue, GenerationError> {
        if let Some(err) = self.failures.lock().pop_front() {
            return Err(err);
        }
        Ok(json!({
            "title": "Generated title",
            "bullets": ["One", "Two"],
            "locale": request.locale,
        }))
    }
}

/// Project store that counts how many times a project was completed.
#[derive(Default)]
pub struct TrackingProjectStore {
    inner: InMemoryProjectStore,
    completions: AtomicUsize,
}

impl TrackingProjectStore {
    pub fn completions(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProjectStore for TrackingProjectStore {
    async fn create_project(&self, project: &Project) -> AtelierResult<Project> {
        self.inner.create_project(project).await
    }

    async fn get_project(&self, id: ProjectId) -> AtelierResult<Option<Project>> {
        self.inner.get_project(id).await
    }

    async fn begin_processing(
        &self,
        id: ProjectId,
        expected: &[ArtifactKind],
    ) -> AtelierResult<Project> {
        self.inner.begin_processing(id, expected).await
    }

    async fn complete_if_processing(&self, id: ProjectId) -> AtelierResult<bool> {
        let completed = self.inner.complete_if_processing(id).await?;
        if completed {
            self.completions.fetch_add(1, Ordering::SeqCst);
        }
        Ok(completed)
    }
}

pub struct Harness {
    pub jobs: Arc<InMemoryJobStore>,
    pub projects: Arc<TrackingProjectStore>,
    pub artifacts: Arc<InMemoryArtifactStore>,
    pub ledger: Arc<InMemoryLedger>,
    pub images: Arc<FakeImages>,
    pub content: Arc<FakeContent>,
    pub jobs_config: JobsConfig,
    user_id: UserId,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(InMemoryJobStore::new()),
            projects: Arc::new(TrackingProjectStore::default()),
            artifacts: Arc::new(InMemoryArtifactStore::new()),
            ledger: Arc::new(InMemoryLedger::new()),
            images: Arc::new(FakeImages::default()),
            content: Arc::new(FakeContent::default()),
            jobs_config: JobsConfig::default(),
            user_id: UserId::new(),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn ctx(&self) -> JobContext {
        JobContext {
            job_id: JobId::new(),
            user_id: self.user_id,
            retry_count: 0,
            max_retries: 3,
        }
    }

    pub fn artifact_handler(&self) -> ArtifactHandler {
        ArtifactHandler::new(
            self.projects.clone(),
            self.artifacts.clone(),
            self.images.clone(),
        )
    }

    pub fn content_handler(&self) -> StructuredContentHandler {
        StructuredContentHandler::new(
            self.projects.clone(),
            self.artifacts.clone(),
            self.content.clone(),
        )
    }

    pub fn composite_handler(&self) -> CompositePackHandler {
        CompositePackHandler::new(
            self.jobs.clone(),
            self.projects.clone(),
            self.artifacts.clone(),
            self.jobs_config.clone(),
        )
    }

    pub fn registry(&self) -> HandlerRegistry {
        HandlerRegistry::new()
            .with(Arc::new(self.artifact_handler()))
            .with(Arc::new(self.content_handler()))
            .with(Arc::new(self.composite_handler()))
    }

    pub fn worker(&self) -> Worker {
        Worker::new(
            self.jobs.clone(),
            Arc::new(self.registry()),
            WorkerSettings::default(),
        )
    }

    pub async fn project(&self, source_images: &[&str]) -> Project {
        let project = Project::new(
            self.user_id,
            "Test product",
            source_images.iter().map(ToString::to_string).collect(),
        );
        self.projects.create_project(&project).await.unwrap()
    }

    pub async fn enqueue(&self, payload: JobPayload, max_retries: i32) -> Job {
        let new_job = payload.into_new_job(self.user_id, max_retries).unwrap();
        self.jobs.create_job(new_job).await.unwrap()
    }

    pub async fn enqueue_raw(&self, job_type: JobType, payload: JsonValue, max_retries: i32) -> Job {
        self.jobs
            .create_job(NewJob::new(job_type, payload, self.user_id, max_retries))
            .await
            .unwrap()
    }

    pub async fn job(&self, id: JobId) -> Job {
        self.jobs.get_job(id).await.unwrap().expect("job missing")
    }
}
