//! Result type aliases for Atelier.

use crate::AtelierError;

/// A specialized `Result` type for Atelier operations.
pub type AtelierResult<T> = Result<T, AtelierError>;
