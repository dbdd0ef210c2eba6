//! AES-256-GCM authenticated encryption.
//!
//! Every credential value, generation-parameter blob and key canary is
//! sealed with this module. The nonce is returned separately from the
//! ciphertext; the store keeps each in its own column.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::random::generate_nonce;

/// Size of an AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;

/// Size of a GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Output of [`encrypt`]: the ciphertext (with its trailing tag) and the
/// nonce it was produced under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    /// `ciphertext || tag (16 bytes)`.
    pub ciphertext: Vec<u8>,
    /// Fresh random nonce used for this ciphertext.
    pub nonce: [u8; NONCE_SIZE],
}

fn cipher_for(key: &[u8]) -> Result<Aes256Gcm, CryptoError> {
    if key.len() != KEY_SIZE {
        return Err(CryptoError::InvalidKey(format!(
            "expected {} bytes, got {}",
            KEY_SIZE,
            key.len()
        )));
    }

    Aes256Gcm::new_from_slice(key).map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

/// Encrypts plaintext using AES-256-GCM.
///
/// The nonce is generated from the OS CSPRNG on every call and can never be
/// supplied by the caller.
///
/// # Arguments
///
/// * `key` - 32-byte encryption key
/// * `plaintext` - Data to encrypt
/// * `associated_data` - Optional additional data to authenticate (not encrypted)
pub fn encrypt(
    key: &[u8],
    plaintext: &[u8],
    associated_data: Option<&[u8]>,
) -> Result<Sealed, CryptoError> {
    let cipher = cipher_for(key)?;

    let nonce_bytes = generate_nonce();
    let nonce = Nonce::from_slice(&nonce_bytes);

    let payload = Payload {
        msg: plaintext,
        aad: associated_data.unwrap_or_default(),
    };

    let ciphertext = cipher
        .encrypt(nonce, payload)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    Ok(Sealed {
        ciphertext,
        nonce: nonce_bytes,
    })
}

/// Decrypts ciphertext using AES-256-GCM.
///
/// # Arguments
///
/// * `key` - 32-byte encryption key
/// * `ciphertext` - Data to decrypt (`ciphertext || tag`)
/// * `nonce` - The 12-byte nonce returned by [`encrypt`]
/// * `associated_data` - Optional additional data that was authenticated
///
/// # Errors
///
/// Returns [`CryptoError::AuthenticationFailed`] if the key, nonce or data
/// do not match. Partial plaintext is never returned.
pub fn decrypt(
    key: &[u8],
    ciphertext: &[u8],
    nonce: &[u8],
    associated_data: Option<&[u8]>,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let cipher = cipher_for(key)?;

    if nonce.len() != NONCE_SIZE {
        return Err(CryptoError::InvalidInput(format!(
            "nonce must be {} bytes, got {}",
            NONCE_SIZE,
            nonce.len()
        )));
    }

    if ciphertext.len() < TAG_SIZE {
        return Err(CryptoError::InvalidInput(
            "ciphertext too short".to_string(),
        ));
    }

    let payload = Payload {
        msg: ciphertext,
        aad: associated_data.unwrap_or_default(),
    };

    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), payload)
        .map_err(|_| CryptoError::AuthenticationFailed)?;

    Ok(Zeroizing::new(plaintext))
}
