//! Derives a project's status from the artifacts it has.
//!
//! The reconciler never looks at jobs. It compares the distinct artifact
//! kinds present for a project against the kinds recorded at fan-out time,
//! and completes the project with a conditional update once they are all
//! there. Duplicate and concurrent calls are harmless: only one of them
//! makes the transition.

use crate::metrics as job_metrics;
use atelier_core::{AtelierError, AtelierResult, ProjectId, ProjectStatus};
use atelier_repository::{ArtifactStore, ProjectStore};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Result of one reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// Still waiting on some kinds.
    InProgress { produced: usize, expected: usize },
    /// This call moved the project to completed.
    Completed,
    /// The project was already completed.
    AlreadyCompleted,
    /// The project is not being processed (draft or failed).
    NotProcessing { status: ProjectStatus },
}

#[derive(Clone)]
pub struct StatusReconciler {
    projects: Arc<dyn ProjectStore>,
    artifacts: Arc<dyn ArtifactStore>,
}

impl StatusReconciler {
    #[must_use]
    pub fn new(projects: Arc<dyn ProjectStore>, artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self {
            projects,
            artifacts,
        }
    }

    pub async fn reconcile(&self, project_id: ProjectId) -> AtelierResult<ReconcileOutcome> {
        let project = self
            .projects
            .get_project(project_id)
            .await?
            .ok_or_else(|| AtelierError::not_found("project", project_id))?;

        match project.status {
            ProjectStatus::Completed => return Ok(ReconcileOutcome::AlreadyCompleted),
            ProjectStatus::Processing => {}
            status @ (ProjectStatus::Draft | ProjectStatus::Failed) => {
                return Ok(ReconcileOutcome::NotProcessing { status })
            }
        }

        let produced_kinds = self.artifacts.produced_kinds(project_id).await?;
        if !project.is_covered_by(&produced_kinds) {
            let produced = project.covered_count(&produced_kinds);
            let mut expected = project.expected_artifacts.clone();
            expected.sort();
            expected.dedup();
            debug!(
                project_id = %project_id,
                produced,
                expected = expected.len(),
                "Project still in progress"
            );
            return Ok(ReconcileOutcome::InProgress {
                produced,
                expected: expected.len(),
            });
        }

        if self.projects.complete_if_processing(project_id).await? {
            info!(project_id = %project_id, "All expected artifacts present, project completed");
            job_metrics::record_project_completed();
            Ok(ReconcileOutcome::Completed)
        } else {
            Ok(ReconcileOutcome::AlreadyCompleted)
        }
    }
}
