//! Credential error types.

use thiserror::Error;
use uuid::Uuid;

use credvault_keyring::KeyRingError;
use credvault_storage::StorageError;

use crate::types::CredentialType;

/// Errors that can occur while building, reading or storing credentials.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// A new version's type differs from the existing versions of the name.
    #[error("type mismatch: credential is {existing}, requested {requested}")]
    TypeMismatch {
        /// Type of the stored versions.
        existing: CredentialType,
        /// Type of the attempted write.
        requested: CredentialType,
    },

    /// An accessor was called on a variant that does not carry the field.
    #[error("{accessor} is not available on {actual} credentials")]
    WrongType {
        /// Accessor that was called.
        accessor: &'static str,
        /// Actual type of the version.
        actual: CredentialType,
    },

    /// The value payload does not fit the credential type.
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// Invalid credential name.
    #[error("invalid credential name: {0}")]
    InvalidName(String),

    /// Credential not found.
    #[error("credential not found: {0}")]
    NotFound(String),

    /// No certificate credential exists under the CA name.
    #[error("certificate authority not found: {0}")]
    CaNotFound(String),

    /// The CA credential lacks the certificate or private key needed to sign.
    #[error("credential is not a usable certificate authority: {0}")]
    NotCertificateAuthority(String),

    /// The credential was set statically or has a type that cannot be
    /// regenerated.
    #[error("credential cannot be regenerated: {0}")]
    NotRegeneratable(String),

    /// Stored generation parameters could not be opened.
    #[error("generation parameters could not be decrypted: {0}")]
    GenerationParametersUndecryptable(String),

    /// Ciphertext refers to a key this instance is not configured with.
    #[error("encryption key not found: {0}")]
    KeyNotFound(Uuid),

    /// Ciphertext failed to authenticate under its key.
    #[error("authentication failed for data sealed under key {0}")]
    AuthenticationFailure(Uuid),

    /// Invalid generation parameters.
    #[error("invalid generation parameters: {0}")]
    InvalidParameters(String),

    /// A stored row or JSON document could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Cryptographic error.
    #[error("crypto error: {0}")]
    Crypto(String),
}

impl From<KeyRingError> for CredentialError {
    fn from(e: KeyRingError) -> Self {
        match e {
            KeyRingError::KeyNotFound(id) => CredentialError::KeyNotFound(id),
            KeyRingError::AuthenticationFailure(id) => CredentialError::AuthenticationFailure(id),
            other => CredentialError::Crypto(other.to_string()),
        }
    }
}

impl From<StorageError> for CredentialError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::TypeMismatch {
                existing,
                requested,
            } => match (
                existing.parse::<CredentialType>(),
                requested.parse::<CredentialType>(),
            ) {
                (Ok(existing), Ok(requested)) => CredentialError::TypeMismatch {
                    existing,
                    requested,
                },
                _ => CredentialError::Storage(format!(
                    "type mismatch: credential is {existing}, requested {requested}"
                )),
            },
            other => CredentialError::Storage(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for CredentialError {
    fn from(e: serde_json::Error) -> Self {
        CredentialError::Serialization(e.to_string())
    }
}
