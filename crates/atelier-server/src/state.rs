//! Application state for Axum handlers.

use atelier_jobs::{Dispatcher, JobService};
use atelier_repository::DatabasePoolInterface;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub job_service: Arc<dyn JobService>,
    /// Runs worker ticks for `POST /internal/worker/tick`.
    pub dispatcher: Arc<Dispatcher>,
    /// Bearer secret of the tick endpoint.
    pub worker_secret: Arc<str>,
    /// Probed by `/ready`. Absent when running on in-memory stores.
    pub database: Option<Arc<dyn DatabasePoolInterface>>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(
        job_service: Arc<dyn JobService>,
        dispatcher: Arc<Dispatcher>,
        worker_secret: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            job_service,
            dispatcher,
            worker_secret: worker_secret.into(),
            database: None,
            metrics: None,
        }
    }

    #[must_use]
    pub fn with_database(mut self, database: Arc<dyn DatabasePoolInterface>) -> Self {
        self.database = Some(database);
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
