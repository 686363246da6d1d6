//! # Atelier Server
//!
//! HTTP surface and process wiring for the job queue.
//!
//! ```text
//! POST /api/v1/jobs ─────────┐
//! GET  /api/v1/jobs[/:id]    │  JobService ─► RateLimiter, Ledger, JobStore
//! GET  /api/v1/projects/:id ─┘
//! POST /internal/worker/tick ─► Dispatcher::tick ─► Worker ─► handlers
//! GET  /health /ready /live /metrics
//! ```

pub mod app;
pub mod controllers;
pub mod di;
pub mod extractors;
pub mod middleware;
pub mod responses;
pub mod router;
pub mod state;
pub mod startup;

pub use router::create_router;
pub use state::AppState;
