//! Assembly of the worker side: handlers, worker and dispatcher.

use atelier_config::AppConfig;
use atelier_jobs::{
    ArtifactHandler, CompositePackHandler, ContentAnalyzer, Dispatcher, DispatcherSettings,
    HandlerRegistry, ImageGenerator, StructuredContentHandler, Worker, WorkerSettings,
};
use atelier_repository::{ArtifactStore, JobStore, ProjectStore};
use std::sync::Arc;
use tracing::info;

/// Stores and collaborators the handlers run against.
#[derive(Clone)]
pub struct Collaborators {
    pub jobs: Arc<dyn JobStore>,
    pub projects: Arc<dyn ProjectStore>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub images: Arc<dyn ImageGenerator>,
    pub content: Arc<dyn ContentAnalyzer>,
}

/// Registers the three built-in handlers.
#[must_use]
pub fn build_registry(deps: &Collaborators, config: &AppConfig) -> HandlerRegistry {
    let registry = HandlerRegistry::new()
        .with(Arc::new(ArtifactHandler::new(
            deps.projects.clone(),
            deps.artifacts.clone(),
            deps.images.clone(),
        )))
        .with(Arc::new(StructuredContentHandler::new(
            deps.projects.clone(),
            deps.artifacts.clone(),
            deps.content.clone(),
        )))
        .with(Arc::new(CompositePackHandler::new(
            deps.jobs.clone(),
            deps.projects.clone(),
            deps.artifacts.clone(),
            config.jobs.clone(),
        )));

    info!(handlers = ?registry.job_types(), "Job handlers registered");
    registry
}

/// Builds the dispatcher shared by the poll loop and the tick endpoint.
#[must_use]
pub fn build_dispatcher(deps: &Collaborators, config: &AppConfig) -> Arc<Dispatcher> {
    let worker = Worker::new(
        deps.jobs.clone(),
        Arc::new(build_registry(deps, config)),
        WorkerSettings::from(&config.worker),
    );
    info!(worker_id = worker.id(), "Worker created");

    Arc::new(Dispatcher::new(
        worker,
        deps.jobs.clone(),
        DispatcherSettings::from_config(&config.dispatcher, &config.reaper),
    ))
}
