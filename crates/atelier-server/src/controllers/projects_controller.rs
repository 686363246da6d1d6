//! Parent project creation and status.

use crate::{
    extractors::CallerId,
    responses::{created, ok, ApiResponse, ApiResult, AppError},
    state::AppState,
};
use atelier_core::{AtelierError, Project, ProjectId};
use atelier_jobs::ProjectOverview;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

/// Creates the projects router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/projects", post(create_project))
        .route("/projects/:project_id", get(get_project))
}

/// Body of `POST /api/v1/projects`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub source_images: Vec<String>,
}

async fn create_project(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    body: Result<Json<CreateProjectRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<Project>>), AppError> {
    let Json(request) = body.map_err(|e| AtelierError::validation(e.body_text()))?;
    let project = state
        .job_service
        .create_project(user_id, &request.name, request.source_images)
        .await?;
    Ok(created(project))
}

async fn get_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiResult<ProjectOverview> {
    let id = ProjectId::parse(&project_id)
        .map_err(|_| AtelierError::validation(format!("Invalid project id: {project_id}")))?;
    ok(state.job_service.project_overview(id).await?)
}
