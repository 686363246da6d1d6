//! Postgres store implementations.

mod artifact_store;
mod job_store;
mod ledger;
mod project_store;

pub use artifact_store::PgArtifactStore;
pub use job_store::PgJobStore;
pub use ledger::PgLedger;
pub use project_store::PgProjectStore;
