//! `generate-composite-pack`: fans a pack out into one job per artifact.
//!
//! The pack job records what the project expects, enqueues the children and
//! completes straight away. Children run independently; whichever one
//! produces the last expected artifact completes the project through the
//! reconciler. A child failing for good leaves the project in `processing`.
//! Re-running a pack skips kinds that are already produced or still queued.

use super::{require_project, unexpected_payload};
use crate::error::JobResult;
use crate::handler::{JobContext, JobHandler};
use crate::metrics as job_metrics;
use crate::payload::{ArtifactPayload, JobPayload, StructuredContentPayload};
use crate::reconciler::StatusReconciler;
use atelier_config::JobsConfig;
use atelier_core::{ArtifactKind, JobFilter, JobStatus, JobType, ProjectId, ProjectStatus};
use atelier_repository::{ArtifactStore, JobStore, ProjectStore};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// Upper bound on live jobs inspected per project when deduplicating children.
const QUEUED_SCAN_LIMIT: u32 = 1000;

pub struct CompositePackHandler {
    jobs: Arc<dyn JobStore>,
    projects: Arc<dyn ProjectStore>,
    artifacts: Arc<dyn ArtifactStore>,
    reconciler: StatusReconciler,
    config: JobsConfig,
}

impl CompositePackHandler {
    #[must_use]
    pub fn new(
        jobs: Arc<dyn JobStore>,
        projects: Arc<dyn ProjectStore>,
        artifacts: Arc<dyn ArtifactStore>,
        config: JobsConfig,
    ) -> Self {
        let reconciler = StatusReconciler::new(projects.clone(), artifacts.clone());
        Self {
            jobs,
            projects,
            artifacts,
            reconciler,
            config,
        }
    }

    /// Image kinds plus structured content when requested.
    #[must_use]
    pub fn expected_kinds(include_content: bool) -> Vec<ArtifactKind> {
        let mut kinds = ArtifactKind::IMAGE_KINDS.to_vec();
        if include_content {
            kinds.push(ArtifactKind::StructuredContent);
        }
        kinds
    }

    /// Kinds with a pending or processing child job for the project.
    async fn queued_kinds(&self, project_id: ProjectId) -> JobResult<HashSet<ArtifactKind>> {
        let mut kinds = HashSet::new();
        for status in [JobStatus::Pending, JobStatus::Processing] {
            let filter = JobFilter {
                status: Some(status),
                project_id: Some(project_id),
                ..JobFilter::default()
            };
            for job in self.jobs.list_jobs(&filter, QUEUED_SCAN_LIMIT).await? {
                match JobPayload::decode(job.job_type, &job.payload) {
                    Ok(JobPayload::GenerateArtifact(child)) => {
                        kinds.insert(child.kind);
                    }
                    Ok(JobPayload::GenerateStructuredContent(_)) => {
                        kinds.insert(ArtifactKind::StructuredContent);
                    }
                    Ok(JobPayload::GenerateCompositePack(_)) | Err(_) => {}
                }
            }
        }
        Ok(kinds)
    }
}

#[async_trait]
impl JobHandler for CompositePackHandler {
    fn job_type(&self) -> JobType {
        JobType::GenerateCompositePack
    }

    async fn handle(&self, payload: JobPayload, ctx: &JobContext) -> JobResult<()> {
        let JobPayload::GenerateCompositePack(payload) = payload else {
            return Err(unexpected_payload(self.job_type(), &payload));
        };
        require_project(self.projects.as_ref(), payload.project_id).await?;

        let expected = Self::expected_kinds(payload.include_content);
        let project = self
            .projects
            .begin_processing(payload.project_id, &expected)
            .await?;
        if project.status == ProjectStatus::Completed {
            info!(project_id = %project.id, "Project already completed, nothing to fan out");
            return Ok(());
        }

        let existing = self.artifacts.produced_kinds(project.id).await?;
        let queued = self.queued_kinds(project.id).await?;
        let mut children = Vec::new();

        for kind in expected
            .iter()
            .copied()
            .filter(|k| !existing.contains(k) && !queued.contains(k))
        {
            let child = if kind.is_image() {
                JobPayload::GenerateArtifact(ArtifactPayload {
                    project_id: project.id,
                    kind,
                    style: payload.style.clone(),
                })
            } else {
                JobPayload::GenerateStructuredContent(StructuredContentPayload {
                    project_id: project.id,
                    locale: None,
                    tone: None,
                })
            };
            let max_retries = self.config.max_retries(child.job_type());
            let job = self
                .jobs
                .create_job(child.into_new_job(ctx.user_id, max_retries)?)
                .await?;
            job_metrics::record_enqueued(job.job_type);
            children.push(job.id);
        }

        info!(
            job_id = %ctx.job_id,
            project_id = %project.id,
            expected = expected.len(),
            children = children.len(),
            already_queued = queued.len(),
            "Fanned out composite pack"
        );

        // Nothing produced or queued means no child will reconcile.
        if children.is_empty() && queued.is_empty() {
            self.reconciler.reconcile(project.id).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::CompositePackPayload;
    use crate::testing::Harness;
    use atelier_core::{JobFilter, NewArtifact, ProjectId};

    fn pack(project_id: ProjectId, include_content: bool) -> JobPayload {
        JobPayload::GenerateCompositePack(CompositePackPayload {
            project_id,
            include_content,
            style: Some("minimal".into()),
        })
    }

    #[tokio::test]
    async fn test_fans_out_one_child_per_kind() {
        let harness = Harness::new();
        let project = harness.project(&["s3://in/bag.png"]).await;
        let ctx = harness.ctx();

        harness
            .composite_handler()
            .handle(pack(project.id, true), &ctx)
            .await
            .unwrap();

        let children = harness
            .jobs
            .list_jobs(&JobFilter::default(), 100)
            .await
            .unwrap();
        assert_eq!(children.len(), 7);
        assert!(children.iter().all(|j| j.user_id == ctx.user_id));
        assert_eq!(
            children
                .iter()
                .filter(|j| j.job_type == JobType::GenerateArtifact)
                .count(),
            6
        );
        let artifact_child = children
            .iter()
            .find(|j| j.job_type == JobType::GenerateArtifact)
            .unwrap();
        assert_eq!(artifact_child.payload["style"], "minimal");
        assert_eq!(artifact_child.max_retries, 3);

        let project = harness.projects.get_project(project.id).await.unwrap().unwrap();
        assert_eq!(project.status, ProjectStatus::Processing);
        assert_eq!(project.expected_artifacts.len(), 7);
    }

    #[tokio::test]
    async fn test_skips_existing_artifacts() {
        let harness = Harness::new();
        let project = harness.project(&["s3://in/bag.png"]).await;
        harness
            .artifacts
            .upsert_artifact(NewArtifact::image(project.id, ArtifactKind::Main, "s3://out/main.png"))
            .await
            .unwrap();

        harness
            .composite_handler()
            .handle(pack(project.id, false), &harness.ctx())
            .await
            .unwrap();

        let children = harness.jobs.list_jobs(&JobFilter::default(), 100).await.unwrap();
        assert_eq!(children.len(), 5);
        assert!(children.iter().all(|j| j.payload["kind"] != "main"));
    }

    #[tokio::test]
    async fn test_rerun_skips_queued_children() {
        let harness = Harness::new();
        let project = harness.project(&["s3://in/bag.png"]).await;
        harness
            .enqueue(
                JobPayload::GenerateArtifact(ArtifactPayload {
                    project_id: project.id,
                    kind: ArtifactKind::Main,
                    style: None,
                }),
                3,
            )
            .await;

        let handler = harness.composite_handler();
        handler
            .handle(pack(project.id, true), &harness.ctx())
            .await
            .unwrap();
        assert_eq!(harness.jobs.all().len(), 7);

        handler
            .handle(pack(project.id, true), &harness.ctx())
            .await
            .unwrap();
        let jobs = harness.jobs.all();
        assert_eq!(jobs.len(), 7);
        assert_eq!(
            jobs.iter().filter(|j| j.payload["kind"] == "main").count(),
            1
        );
        assert_eq!(
            jobs.iter()
                .filter(|j| j.job_type == JobType::GenerateStructuredContent)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_children_of_other_projects_do_not_block_fan_out() {
        let harness = Harness::new();
        let project = harness.project(&["s3://in/bag.png"]).await;
        let sibling = harness.project(&["s3://in/hat.png"]).await;
        harness
            .composite_handler()
            .handle(pack(sibling.id, false), &harness.ctx())
            .await
            .unwrap();

        harness
            .composite_handler()
            .handle(pack(project.id, false), &harness.ctx())
            .await
            .unwrap();
        let ours = harness
            .jobs
            .list_jobs(
                &JobFilter {
                    project_id: Some(project.id),
                    ..JobFilter::default()
                },
                100,
            )
            .await
            .unwrap();
        assert_eq!(ours.len(), 6);
    }

    #[tokio::test]
    async fn test_fully_produced_project_completes_without_children() {
        let harness = Harness::new();
        let project = harness.project(&["s3://in/bag.png"]).await;
        for kind in ArtifactKind::IMAGE_KINDS {
            harness
                .artifacts
                .upsert_artifact(NewArtifact::image(project.id, kind, format!("s3://out/{kind}.png")))
                .await
                .unwrap();
        }

        harness
            .composite_handler()
            .handle(pack(project.id, false), &harness.ctx())
            .await
            .unwrap();

        assert!(harness.jobs.all().is_empty());
        let project = harness.projects.get_project(project.id).await.unwrap().unwrap();
        assert_eq!(project.status, ProjectStatus::Completed);
    }

    #[test]
    fn test_expected_kinds() {
        assert_eq!(CompositePackHandler::expected_kinds(false).len(), 6);
        assert_eq!(
            CompositePackHandler::expected_kinds(true).last(),
            Some(&ArtifactKind::StructuredContent)
        );
    }
}
