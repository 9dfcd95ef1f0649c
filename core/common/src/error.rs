//! Common error types for cloudshelf.

use thiserror::Error;

/// Top-level error type for storage operations.
///
/// Every backend translates its transport and API failures into one of
/// these variants at its boundary, so callers can map them onto a response
/// without knowing which backend is active.
#[derive(Debug, Error)]
pub enum Error {
    /// The addressed key, folder or remote item does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transport failure, rate limiting or a non-2xx API response.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Every credential refresh candidate was rejected.
    #[error("Authentication unrecoverable: {0}")]
    AuthUnrecoverable(String),

    /// Required settings are absent or malformed.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A write-type operation failed without a finer-grained reason.
    #[error("Operation failed: {0}")]
    OperationFailed(String),

    /// Caller supplied a malformed key or argument.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Local I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error means the resource is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
