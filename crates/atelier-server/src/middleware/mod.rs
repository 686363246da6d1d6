//! Router middleware.

mod worker_auth;

pub use worker_auth::worker_auth_middleware;
