//! Key ring error types.

use thiserror::Error;
use uuid::Uuid;

/// Errors raised while loading the key ring or using its keys.
#[derive(Debug, Error)]
pub enum KeyRingError {
    /// Configuration does not mark exactly one key source active.
    #[error("exactly one encryption key must be active, found {count}")]
    MultipleOrZeroActiveKeys {
        /// Number of sources marked active.
        count: usize,
    },

    /// Key source configuration is malformed.
    #[error("invalid key configuration: {0}")]
    InvalidConfig(String),

    /// No configured key has this canary id.
    #[error("encryption key not found: {0}")]
    KeyNotFound(Uuid),

    /// Ciphertext failed to authenticate under the key it claims.
    #[error("authentication failed for data sealed under key {0}")]
    AuthenticationFailure(Uuid),

    /// Concurrent writers kept changing the canary set.
    #[error("could not create key canary after {attempts} attempts")]
    CanaryConflict {
        /// Attempts made before giving up.
        attempts: usize,
    },

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Cryptographic error.
    #[error("crypto error: {0}")]
    Crypto(String),
}

impl From<credvault_crypto::CryptoError> for KeyRingError {
    fn from(e: credvault_crypto::CryptoError) -> Self {
        KeyRingError::Crypto(e.to_string())
    }
}

impl From<credvault_storage::StorageError> for KeyRingError {
    fn from(e: credvault_storage::StorageError) -> Self {
        KeyRingError::Storage(e.to_string())
    }
}
