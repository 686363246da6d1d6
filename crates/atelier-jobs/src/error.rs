//! Job error types.

use atelier_core::{AtelierError, FailureKind, JobType};
use thiserror::Error;

/// Result type for job operations.
pub type JobResult<T> = Result<T, JobError>;

/// Errors a handler run can end with. Each one maps onto a [`FailureKind`],
/// which decides whether the job goes back to `pending`.
#[derive(Debug, Error)]
pub enum JobError {
    /// Payload failed to decode or validate.
    #[error("Invalid payload: {0}")]
    Validation(String),

    /// Something the job needs does not exist (project, source images).
    #[error("Missing precondition: {0}")]
    MissingPrecondition(String),

    /// Temporary failure of a dependency.
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Handler exceeded its time budget.
    #[error("Job timed out after {0} seconds")]
    Timeout(u64),

    /// Storage failure while handling the job.
    #[error("Store error: {0}")]
    Store(#[source] AtelierError),

    /// Generation service failure.
    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// No handler is registered for the job type.
    #[error("No handler registered for job type {0}")]
    NoHandler(JobType),
}

impl JobError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn missing(message: impl Into<String>) -> Self {
        Self::MissingPrecondition(message.into())
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    /// Whether the failed job should be retried.
    #[must_use]
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Transient(_) | Self::Timeout(_) | Self::Store(_) => FailureKind::Retriable,
            Self::Generation(e) if e.is_transient() => FailureKind::Retriable,
            Self::Validation(_)
            | Self::MissingPrecondition(_)
            | Self::Generation(_)
            | Self::NoHandler(_) => FailureKind::Terminal,
        }
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.failure_kind() == FailureKind::Retriable
    }

    /// Short label used in metrics and logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::MissingPrecondition(_) => "missing_precondition",
            Self::Transient(_) => "transient",
            Self::Timeout(_) => "timeout",
            Self::Store(_) => "store",
            Self::Generation(_) => "generation",
            Self::NoHandler(_) => "no_handler",
        }
    }
}

impl From<AtelierError> for JobError {
    fn from(err: AtelierError) -> Self {
        match err {
            AtelierError::Validation(message) => Self::Validation(message),
            other => Self::Store(other),
        }
    }
}

impl From<serde_json::Error> for JobError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Failures reported by the image and content generation services.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Service unreachable or answered 408, 429 or 5xx.
    #[error("{service} unavailable: {message}")]
    Unavailable {
        service: &'static str,
        status: Option<u16>,
        message: String,
    },

    /// Request did not finish in time.
    #[error("{service} request timed out")]
    Timeout { service: &'static str },

    /// Service refused the request (other 4xx).
    #[error("{service} rejected the request ({status}): {message}")]
    Rejected {
        service: &'static str,
        status: u16,
        message: String,
    },

    /// Service answered with a body we could not use.
    #[error("{service} returned an invalid response: {message}")]
    InvalidResponse {
        service: &'static str,
        message: String,
    },
}

impl GenerationError {
    /// Classifies a non-success HTTP status.
    #[must_use]
    pub fn from_status(service: &'static str, status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status == 408 || status == 429 || status >= 500 {
            Self::Unavailable {
                service,
                status: Some(status),
                message,
            }
        } else {
            Self::Rejected {
                service,
                status,
                message,
            }
        }
    }

    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_errors() {
        assert_eq!(JobError::validation("bad").failure_kind(), FailureKind::Terminal);
        assert_eq!(JobError::missing("no project").failure_kind(), FailureKind::Terminal);
        assert_eq!(
            JobError::NoHandler(JobType::GenerateArtifact).failure_kind(),
            FailureKind::Terminal
        );
    }

    #[test]
    fn test_retriable_errors() {
        assert!(JobError::transient("503").is_retryable());
        assert!(JobError::Timeout(30).is_retryable());
        assert!(JobError::from(AtelierError::Database("connection reset".into())).is_retryable());
    }

    #[test]
    fn test_store_validation_is_terminal() {
        let err = JobError::from(AtelierError::validation("unknown kind"));
        assert!(matches!(err, JobError::Validation(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_generation_status_classification() {
        for status in [408, 429, 500, 502, 503] {
            let err = GenerationError::from_status("image", status, "busy");
            assert!(err.is_transient(), "status {status}");
            assert!(JobError::from(err).is_retryable());
        }
        for status in [400, 401, 404, 422] {
            let err = GenerationError::from_status("image", status, "nope");
            assert!(!err.is_transient(), "status {status}");
            assert!(!JobError::from(err).is_retryable());
        }
    }

    #[test]
    fn test_timeout_message() {
        assert_eq!(JobError::Timeout(300).to_string(), "Job timed out after 300 seconds");
        assert_eq!(JobError::Timeout(300).label(), "timeout");
    }
}
