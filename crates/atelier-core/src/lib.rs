//! # Atelier Core
//!
//! Core types, domain model, and error definitions for the Atelier job queue.
//! Every other crate in the workspace builds on these.

pub mod domain;
pub mod error;
pub mod id;
pub mod result;
pub mod telemetry;

pub use domain::*;
pub use error::*;
pub use id::*;
pub use result::*;

// Re-export shaku for dependency injection
pub use shaku::Interface;
