//! Key derivation functions.
//!
//! Two derivations are provided:
//! - HKDF-SHA256 (RFC 5869), used to expand externally supplied key material
//!   into a domain-separated encryption key.
//! - Argon2id, used to stretch an operator passphrase with a per-canary salt.

use argon2::{Algorithm, Argon2, Params, Version};
use hkdf::Hkdf;
use serde::Deserialize;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::aead::KEY_SIZE;
use crate::error::CryptoError;
use crate::keys::SymmetricKey;

/// Minimum salt length accepted by Argon2.
pub const MIN_SALT_SIZE: usize = 8;

/// Cost parameters for Argon2id passphrase derivation.
///
/// Defaults follow the OWASP baseline (19 MiB, 2 passes, 1 lane).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Argon2Params {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of passes.
    pub iterations: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// Derives a key using HKDF-SHA256.
///
/// # Arguments
///
/// * `ikm` - Input key material (the secret to derive from)
/// * `salt` - Optional salt value
/// * `info` - Context and application-specific information
/// * `length` - Desired output key length in bytes
pub fn derive_key(
    ikm: &[u8],
    salt: Option<&[u8]>,
    info: &[u8],
    length: usize,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if length == 0 {
        return Err(CryptoError::InvalidInput(
            "output length must be > 0".to_string(),
        ));
    }

    if length > 255 * 32 {
        return Err(CryptoError::InvalidInput(
            "output length too large for HKDF-SHA256".to_string(),
        ));
    }

    let hkdf = Hkdf::<Sha256>::new(salt, ikm);

    let mut okm = Zeroizing::new(vec![0u8; length]);
    hkdf.expand(info, &mut okm)
        .map_err(|_| CryptoError::KeyDerivationFailed("HKDF expansion failed".to_string()))?;

    Ok(okm)
}

/// Derives an AES-256 encryption key using HKDF-SHA256.
///
/// # Arguments
///
/// * `key_material` - The secret to derive from
/// * `context` - Unique context string for this key derivation
pub fn derive_encryption_key(
    key_material: &[u8],
    context: &[u8],
) -> Result<SymmetricKey, CryptoError> {
    let derived = derive_key(key_material, None, context, KEY_SIZE)?;
    SymmetricKey::from_bytes(&derived)
}

/// Derives an AES-256 key from a passphrase with Argon2id.
///
/// The derivation is deliberately expensive. It runs once per key source
/// when the key ring loads, never per request.
///
/// # Errors
///
/// Fails for an empty passphrase, a salt shorter than [`MIN_SALT_SIZE`] or
/// cost parameters Argon2 rejects.
pub fn derive_from_passphrase(
    passphrase: &str,
    salt: &[u8],
    params: &Argon2Params,
) -> Result<SymmetricKey, CryptoError> {
    if passphrase.is_empty() {
        return Err(CryptoError::InvalidInput(
            "passphrase cannot be empty".to_string(),
        ));
    }

    if salt.len() < MIN_SALT_SIZE {
        return Err(CryptoError::InvalidInput(format!(
            "salt must be at least {MIN_SALT_SIZE} bytes"
        )));
    }

    let argon_params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(KEY_SIZE),
    )
    .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut out = Zeroizing::new([0u8; KEY_SIZE]);
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, &mut *out)
        .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;

    SymmetricKey::from_bytes(&*out)
}
