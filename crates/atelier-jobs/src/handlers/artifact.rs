//! `generate-artifact`: one image for one project.

use super::{require_project, unexpected_payload};
use crate::collaborators::{ImageGenerator, ImageRequest};
use crate::error::JobResult;
use crate::handler::{JobContext, JobHandler};
use crate::metrics as job_metrics;
use crate::payload::JobPayload;
use crate::reconciler::StatusReconciler;
use atelier_core::{JobType, NewArtifact};
use atelier_repository::{ArtifactStore, ProjectStore};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

pub struct ArtifactHandler {
    projects: Arc<dyn ProjectStore>,
    artifacts: Arc<dyn ArtifactStore>,
    images: Arc<dyn ImageGenerator>,
    reconciler: StatusReconciler,
}

impl ArtifactHandler {
    #[must_use]
    pub fn new(
        projects: Arc<dyn ProjectStore>,
        artifacts: Arc<dyn ArtifactStore>,
        images: Arc<dyn ImageGenerator>,
    ) -> Self {
        let reconciler = StatusReconciler::new(projects.clone(), artifacts.clone());
        Self {
            projects,
            artifacts,
            images,
            reconciler,
        }
    }
}

#[async_trait]
impl JobHandler for ArtifactHandler {
    fn job_type(&self) -> JobType {
        JobType::GenerateArtifact
    }

    async fn handle(&self, payload: JobPayload, ctx: &JobContext) -> JobResult<()> {
        let JobPayload::GenerateArtifact(payload) = payload else {
            return Err(unexpected_payload(self.job_type(), &payload));
        };
        let project = require_project(self.projects.as_ref(), payload.project_id).await?;

        let existing = self
            .artifacts
            .find_artifact(project.id, payload.kind)
            .await?;

        if existing.is_some() {
            debug!(
                job_id = %ctx.job_id,
                project_id = %project.id,
                kind = %payload.kind,
                "Artifact already exists, skipping generation"
            );
        } else {
            let request = ImageRequest {
                project_id: project.id,
                kind: payload.kind,
                source_images: project.source_images.clone(),
                style: payload.style,
            };
            let image = self.images.generate(&request).await?;
            job_metrics::record_generation("image");

            self.artifacts
                .upsert_artifact(NewArtifact::image(project.id, payload.kind, image.uri))
                .await?;
            info!(
                job_id = %ctx.job_id,
                project_id = %project.id,
                kind = %payload.kind,
                attempt = ctx.attempt(),
                "Artifact generated"
            );
        }

        self.reconciler.reconcile(project.id).await?;
        Ok(())
    }
}
