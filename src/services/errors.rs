use crate::services::markdown_import::ValidationError;
use crate::store::StoreError;

/// Failure taxonomy of the exam core. Messages are user-facing and are meant
/// to be surfaced verbatim by the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Structural problem in imported markdown; the caller fixes the input.
    #[error("{0}")]
    Validation(#[from] ValidationError),
    /// Referenced exam, attempt, question, or answer does not exist.
    #[error("{0}")]
    NotFound(String),
    /// Caller lacks ownership or role for the requested operation.
    #[error("{0}")]
    Forbidden(String),
    /// Operation violates a lifecycle invariant; the caller must re-fetch
    /// state before retrying.
    #[error("{0}")]
    Conflict(String),
    /// Malformed or out-of-range input; correct and resubmit.
    #[error("{0}")]
    InvalidInput(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(message) => ServiceError::Conflict(message),
            StoreError::Backend(message) => {
                tracing::error!(error = %message, "storage backend failure");
                ServiceError::Storage(message)
            }
        }
    }
}
