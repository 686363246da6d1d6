//! # Atelier Domain
//!
//! Jobs, projects, and artifacts. The job status machine lives on [`Job`].

pub mod artifact;
pub mod job;
pub mod project;

pub use artifact::*;
pub use job::*;
pub use project::*;
