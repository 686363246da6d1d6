//! # Atelier Repository
//!
//! Storage for the job queue and the fan-out aggregates.
//!
//! ```text
//! Worker / handlers
//!   ↓  Arc<dyn JobStore>, Arc<dyn ProjectStore>, Arc<dyn ArtifactStore>, Arc<dyn Ledger>
//! PgJobStore, PgProjectStore, PgArtifactStore, PgLedger   (Postgres / SQLx)
//!   ↓  Arc<dyn DatabasePoolInterface>
//! Postgres
//! ```
//!
//! The [`memory`] module implements the same traits without a database.

pub mod memory;
pub mod pool;
pub mod postgres;
pub mod traits;

pub use pool::*;
pub use postgres::*;
pub use traits::*;
