//! Built-in job handlers.

mod artifact;
mod composite;
mod structured_content;

pub use artifact::ArtifactHandler;
pub use composite::CompositePackHandler;
pub use structured_content::StructuredContentHandler;

use crate::error::{JobError, JobResult};
use crate::payload::JobPayload;
use atelier_core::{JobType, Project, ProjectId};
use atelier_repository::ProjectStore;

/// Loads the project a job works on and checks it has input images.
async fn require_project(projects: &dyn ProjectStore, id: ProjectId) -> JobResult<Project> {
    let project = projects
        .get_project(id)
        .await?
        .ok_or_else(|| JobError::missing(format!("project {id} does not exist")))?;

    if !project.has_source_images() {
        return Err(JobError::missing(format!("project {id} has no source images")));
    }
    Ok(project)
}

fn unexpected_payload(expected: JobType, payload: &JobPayload) -> JobError {
    JobError::validation(format!(
        "handler for {expected} received a {} payload",
        payload.job_type()
    ))
}
