//! REST controllers.

pub mod health_controller;
pub mod jobs_controller;
pub mod projects_controller;
pub mod worker_controller;
