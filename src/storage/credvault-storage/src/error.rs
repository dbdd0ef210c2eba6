//! Storage error types.

use thiserror::Error;

/// Failures reported by a canary or credential store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The addressed row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The database could not be opened or migrated.
    #[error("database unavailable: {0}")]
    Connection(String),

    /// A statement failed to execute.
    #[error("query failed: {0}")]
    Query(String),

    /// A stored row could not be decoded.
    #[error("corrupt row: {0}")]
    Serialization(String),

    /// Begin or commit failed.
    #[error("transaction failed: {0}")]
    Transaction(String),

    /// A new version's type differs from the versions already stored under
    /// its name.
    #[error("type mismatch: credential is {existing}, requested {requested}")]
    TypeMismatch {
        /// Type tag of the stored versions.
        existing: String,
        /// Type tag of the rejected version.
        requested: String,
    },

    /// The caller passed something the store cannot accept.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}
