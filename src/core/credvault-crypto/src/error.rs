//! Errors from the cipher and key derivation layer.

use thiserror::Error;

/// Cipher and key derivation failures.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The cipher refused to seal the input.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// The ciphertext did not authenticate under the given key and nonce.
    ///
    /// Returned for a wrong key, a wrong nonce and tampered data alike.
    #[error("ciphertext failed authentication")]
    AuthenticationFailed,

    /// HKDF or Argon2 rejected its inputs.
    #[error("could not derive key: {0}")]
    KeyDerivationFailed(String),

    /// Key bytes of the wrong size.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Malformed nonce, ciphertext or salt.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}
