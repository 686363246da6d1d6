//! Job submission and status endpoints.

use crate::{
    extractors::CallerId,
    responses::{created, ok, ApiResponse, ApiResult, AppError},
    state::AppState,
};
use atelier_core::{
    AtelierError, Job, JobFilter, JobId, JobStatus, JobType, ProjectId, QueueStats, UserId,
};
use atelier_jobs::{JobPayload, Submission};
use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Creates the jobs router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs", post(submit_job).get(list_jobs))
        .route("/jobs/:job_id", get(get_job))
        .route("/users/:user_id/jobs", delete(delete_user_jobs))
        .route("/queue/stats", get(queue_stats))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Body of `POST /api/v1/jobs`.
#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    pub job_type: JobType,
    pub payload: JsonValue,
}

/// Query parameters for job listing.
#[derive(Debug, Default, Deserialize)]
pub struct ListJobsParams {
    pub status: Option<JobStatus>,
    pub user_id: Option<UserId>,
    pub job_type: Option<JobType>,
    pub project_id: Option<ProjectId>,
    pub limit: Option<u32>,
}

impl ListJobsParams {
    fn filter(&self) -> JobFilter {
        JobFilter {
            status: self.status,
            user_id: self.user_id,
            job_type: self.job_type,
            project_id: self.project_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeletedJobsResponse {
    pub user_id: UserId,
    pub deleted: u64,
}

// ============================================================================
// Handlers
// ============================================================================

async fn submit_job(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    body: Result<Json<SubmitJobRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<Submission>>), AppError> {
    let Json(request) = body.map_err(|e| AtelierError::validation(e.body_text()))?;

    let payload = JobPayload::decode(request.job_type, &request.payload)
        .map_err(|e| AtelierError::validation(e.to_string()))?;

    let submission = state.job_service.submit(user_id, payload).await?;
    Ok(created(submission))
}

async fn get_job(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiResult<Job> {
    let id = JobId::parse(&job_id)
        .map_err(|_| AtelierError::validation(format!("Invalid job id: {job_id}")))?;
    ok(state.job_service.get_job(id).await?)
}

async fn list_jobs(
    State(state): State<AppState>,
    params: Result<Query<ListJobsParams>, QueryRejection>,
) -> ApiResult<Vec<Job>> {
    let Query(params) = params.map_err(|e| AtelierError::validation(e.body_text()))?;
    ok(state
        .job_service
        .list_jobs(&params.filter(), params.limit)
        .await?)
}

async fn delete_user_jobs(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<DeletedJobsResponse> {
    let user_id = UserId::parse(&user_id)
        .map_err(|_| AtelierError::validation(format!("Invalid user id: {user_id}")))?;
    let deleted = state.job_service.delete_jobs_for_user(user_id).await?;
    ok(DeletedJobsResponse { user_id, deleted })
}

async fn queue_stats(State(state): State<AppState>) -> ApiResult<QueueStats> {
    ok(state.job_service.queue_stats().await?)
}
