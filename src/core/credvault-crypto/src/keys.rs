//! In-memory encryption keys.

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::aead::KEY_SIZE;
use crate::error::CryptoError;
use crate::random::generate_key;

/// A 256-bit AES key.
///
/// One exists per configured key source after the key ring loads. The
/// bytes are wiped when a copy is dropped and never appear in `Debug`.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey {
    bytes: [u8; KEY_SIZE],
}

impl SymmetricKey {
    /// A random key, used for keys that are not derived from configuration.
    pub fn generate() -> Self {
        Self {
            bytes: *generate_key(),
        }
    }

    /// Wraps exactly [`KEY_SIZE`] bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!("need {KEY_SIZE} key bytes, have {}", bytes.len()))
        })?;
        Ok(Self { bytes })
    }

    /// Raw key bytes for the cipher. Callers must not copy them out.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}
