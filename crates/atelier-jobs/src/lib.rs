//! # Atelier Jobs
//!
//! Execution side of the Atelier job queue: workers, the dispatcher, the
//! built-in handlers and the submission service.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   rate limit    ┌──────────────┐   debit   ┌──────────┐
//! │  JobService  │ ──────────────► │ RateLimiter  │           │  Ledger  │
//! │   submit()   │ ───────────────────────────────────────►   │          │
//! └──────┬───────┘                 └──────────────┘           └──────────┘
//!        │ create_job
//!        ▼
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                         JobStore (Postgres)                          │
//! │  pending ─claim─► processing ─mark─► completed | pending | failed    │
//! └──────────────────────────────────────────────────────────────────────┘
//!        ▲ claim_next / mark_*                         ▲ create_job (children)
//!        │                                             │
//! ┌──────┴───────┐  tick  ┌──────────────┐  handle  ┌──┴───────────────────┐
//! │  Dispatcher  │ ─────► │    Worker    │ ───────► │ JobHandler           │
//! │ poll / HTTP  │        │ tick, drain  │          │  artifact            │
//! └──────────────┘        └──────────────┘          │  structured content  │
//!                                                   │  composite (fan-out) │
//!                                                   └──────────┬───────────┘
//!                                                              │ reconcile
//!                                                   ┌──────────▼───────────┐
//!                                                   │   StatusReconciler   │
//!                                                   └──────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use atelier_jobs::prelude::*;
//!
//! let registry = HandlerRegistry::new()
//!     .with(Arc::new(ArtifactHandler::new(projects.clone(), artifacts.clone(), images)))
//!     .with(Arc::new(StructuredContentHandler::new(projects.clone(), artifacts.clone(), analyzer)))
//!     .with(Arc::new(CompositePackHandler::new(jobs.clone(), projects, artifacts, config.jobs)));
//!
//! let worker = Worker::new(jobs.clone(), Arc::new(registry), WorkerSettings::from(&config.worker));
//! let dispatcher = Dispatcher::new(worker, jobs, DispatcherSettings::default());
//! dispatcher.run().await?;
//! ```

pub mod collaborators;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod handlers;
pub mod metrics;
pub mod payload;
pub mod rate_limit;
pub mod reconciler;
pub mod service;
pub mod worker;

#[cfg(test)]
mod testing;

pub use collaborators::{
    ContentAnalyzer, ContentRequest, GeneratedImage, HttpContentAnalyzer, HttpImageGenerator,
    ImageGenerator, ImageRequest, Ledger, LedgerError,
};
pub use dispatcher::{Dispatcher, DispatcherSettings, ReaperSettings};
pub use error::{GenerationError, JobError, JobResult};
pub use handler::{HandlerRegistry, JobContext, JobHandler};
pub use handlers::{ArtifactHandler, CompositePackHandler, StructuredContentHandler};
pub use payload::{ArtifactPayload, CompositePackPayload, JobPayload, StructuredContentPayload};
pub use rate_limit::{RateDecision, RateLimitError, RateLimiter, RedisRateLimiter};
pub use reconciler::{ReconcileOutcome, StatusReconciler};
pub use service::{JobService, JobServiceComponent, ProjectOverview, Submission};
pub use worker::{DrainReport, TickOutcome, Worker, WorkerSettings};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::dispatcher::{Dispatcher, DispatcherSettings};
    pub use crate::error::{JobError, JobResult};
    pub use crate::handler::{HandlerRegistry, JobContext, JobHandler};
    pub use crate::handlers::{ArtifactHandler, CompositePackHandler, StructuredContentHandler};
    pub use crate::payload::JobPayload;
    pub use crate::service::JobService;
    pub use crate::worker::{TickOutcome, Worker, WorkerSettings};
    pub use std::sync::Arc;
}
