//! Rotation error types.

use thiserror::Error;

use credvault_credentials::CredentialError;
use credvault_storage::StorageError;

/// Errors that abort a rotation pass.
///
/// Failures of a single version never show up here; they are reported as
/// [`crate::RecordOutcome::Skipped`].
#[derive(Debug, Error)]
pub enum RotationError {
    /// Page size must be at least one.
    #[error("invalid batch size: {0}")]
    InvalidBatchSize(usize),

    /// A page could not be read or mapped.
    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    /// Canary pruning failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<StorageError> for RotationError {
    fn from(e: StorageError) -> Self {
        RotationError::Storage(e.to_string())
    }
}
