//! `generate-structured-content`: listing copy derived from the source images.

use super::{require_project, unexpected_payload};
use crate::collaborators::{ContentAnalyzer, ContentRequest};
use crate::error::JobResult;
use crate::handler::{JobContext, JobHandler};
use crate::metrics as job_metrics;
use crate::payload::JobPayload;
use crate::reconciler::StatusReconciler;
use atelier_core::{ArtifactKind, JobType, NewArtifact};
use atelier_repository::{ArtifactStore, ProjectStore};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

pub struct StructuredContentHandler {
    projects: Arc<dyn ProjectStore>,
    artifacts: Arc<dyn ArtifactStore>,
    analyzer: Arc<dyn ContentAnalyzer>,
    reconciler: StatusReconciler,
}

impl StructuredContentHandler {
    #[must_use]
    pub fn new(
        projects: Arc<dyn ProjectStore>,
        artifacts: Arc<dyn ArtifactStore>,
        analyzer: Arc<dyn ContentAnalyzer>,
    ) -> Self {
        let reconciler = StatusReconciler::new(projects.clone(), artifacts.clone());
        Self {
            projects,
            artifacts,
            analyzer,
            reconciler,
        }
    }
}

#[async_trait]
impl JobHandler for StructuredContentHandler {
    fn job_type(&self) -> JobType {
        JobType::GenerateStructuredContent
    }

    async fn handle(&self, payload: JobPayload, ctx: &JobContext) -> JobResult<()> {
        let JobPayload::GenerateStructuredContent(payload) = payload else {
            return Err(unexpected_payload(self.job_type(), &payload));
        };
        let project = require_project(self.projects.as_ref(), payload.project_id).await?;

        let existing = self
            .artifacts
            .find_artifact(project.id, ArtifactKind::StructuredContent)
            .await?;

        if existing.is_none() {
            let request = ContentRequest {
                project_id: project.id,
                source_images: project.source_images.clone(),
                locale: payload.locale,
                tone: payload.tone,
            };
            let content = self.analyzer.analyze(&request).await?;
            job_metrics::record_generation("content");

            self.artifacts
                .upsert_artifact(NewArtifact::structured_content(project.id, content))
                .await?;
            info!(job_id = %ctx.job_id, project_id = %project.id, "Structured content generated");
        } else {
            debug!(job_id = %ctx.job_id, project_id = %project.id, "Structured content exists");
        }

        self.reconciler.reconcile(project.id).await?;
        Ok(())
    }
}
