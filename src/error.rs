//! Error types for Sift.
//!
//! Every fallible operation in the crate returns [`Result`], whose error side
//! is [`SiftError`]. Only validation errors (at submit time) and query errors
//! (at search time) ever reach a caller synchronously; mutation and refresh
//! failures are logged by the background task that hit them.

use thiserror::Error;

/// Main error type for Sift operations.
#[derive(Error, Debug)]
pub enum SiftError {
    /// Input rejected before it was queued or indexed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The writer or the snapshot is not available.
    #[error("Engine unavailable: {0}")]
    EngineUnavailable(String),

    /// A single mutation job could not be applied to the index.
    #[error("Failed to apply mutation for document {id}: {reason}")]
    MutationApply { id: String, reason: String },

    /// Malformed query string or query execution failure.
    #[error("Query error: {0}")]
    Query(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

/// Result type alias for Sift operations.
pub type Result<T> = std::result::Result<T, SiftError>;

impl SiftError {
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        SiftError::Validation(msg.into())
    }

    pub fn engine_unavailable<S: Into<String>>(msg: S) -> Self {
        SiftError::EngineUnavailable(msg.into())
    }

    pub fn mutation_apply<I: Into<String>, S: Into<String>>(id: I, reason: S) -> Self {
        SiftError::MutationApply {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn query<S: Into<String>>(msg: S) -> Self {
        SiftError::Query(msg.into())
    }

    pub fn storage<S: Into<String>>(msg: S) -> Self {
        SiftError::Storage(msg.into())
    }

    pub fn index<S: Into<String>>(msg: S) -> Self {
        SiftError::Index(msg.into())
    }

    pub fn invalid_operation<S: Into<String>>(msg: S) -> Self {
        SiftError::InvalidOperation(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SiftError::mutation_apply("a1.42", "disk full");
        assert_eq!(
            err.to_string(),
            "Failed to apply mutation for document a1.42: disk full"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: SiftError = io.into();
        assert!(matches!(err, SiftError::Io(_)));
    }
}
