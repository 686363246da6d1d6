//! Worker trigger for an external scheduler.

use crate::{
    responses::{ok, ApiResult},
    state::AppState,
};
use atelier_jobs::DrainReport;
use axum::{extract::State, routing::post, Router};
use serde::Serialize;
use tracing::info;

/// Creates the internal worker router. Callers add authentication.
pub fn router() -> Router<AppState> {
    Router::new().route("/worker/tick", post(tick))
}

/// Result of one externally triggered tick.
#[derive(Debug, Serialize)]
pub struct TickResponse {
    #[serde(flatten)]
    pub report: DrainReport,
    /// Jobs returned to the queue by the stale-lease reaper.
    pub requeued_stale: u64,
}

async fn tick(State(state): State<AppState>) -> ApiResult<TickResponse> {
    let requeued_stale = state.dispatcher.reap().await?;
    let report = state.dispatcher.tick().await;
    info!(
        processed = report.processed,
        requeued_stale, "Worker tick triggered over HTTP"
    );
    ok(TickResponse {
        report,
        requeued_stale,
    })
}
