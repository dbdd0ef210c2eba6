//! Encryptor façade over the key ring.

use std::sync::Arc;

use uuid::Uuid;
use zeroize::Zeroizing;

use credvault_crypto::{aead, CryptoError};

use crate::error::KeyRingError;
use crate::keyring::KeyRing;

/// A sealed value and the id of the key that sealed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encryption {
    /// Canary id of the sealing key.
    pub key_id: Uuid,
    /// Ciphertext with its trailing tag.
    pub ciphertext: Vec<u8>,
    /// Nonce the ciphertext was produced under.
    pub nonce: Vec<u8>,
}

/// Seals plaintext under the active key and opens ciphertext under
/// whichever known key produced it.
#[derive(Debug, Clone)]
pub struct Encryptor {
    keyring: Arc<KeyRing>,
}

impl Encryptor {
    /// Creates an encryptor over a loaded key ring.
    pub fn new(keyring: Arc<KeyRing>) -> Self {
        Self { keyring }
    }

    /// The key ring this encryptor resolves keys from.
    pub fn keyring(&self) -> &KeyRing {
        &self.keyring
    }

    /// Id of the key new ciphertext is sealed under.
    pub fn active_key_id(&self) -> Uuid {
        self.keyring.active_key_id()
    }

    /// Encrypts `plaintext` under the active key.
    pub fn encrypt(&self, plaintext: &str) -> Result<Encryption, KeyRingError> {
        let sealed = aead::encrypt(
            self.keyring.active_key().as_bytes(),
            plaintext.as_bytes(),
            None,
        )?;

        Ok(Encryption {
            key_id: self.keyring.active_key_id(),
            ciphertext: sealed.ciphertext,
            nonce: sealed.nonce.to_vec(),
        })
    }

    /// Decrypts a sealed value.
    ///
    /// # Errors
    ///
    /// - [`KeyRingError::KeyNotFound`] when `key_id` is not a configured key
    /// - [`KeyRingError::AuthenticationFailure`] when the data does not
    ///   authenticate under that key
    pub fn decrypt(&self, encryption: &Encryption) -> Result<Zeroizing<String>, KeyRingError> {
        self.decrypt_parts(encryption.key_id, &encryption.ciphertext, &encryption.nonce)
    }

    /// Same as [`Encryptor::decrypt`] over borrowed parts.
    pub fn decrypt_parts(
        &self,
        key_id: Uuid,
        ciphertext: &[u8],
        nonce: &[u8],
    ) -> Result<Zeroizing<String>, KeyRingError> {
        let key = self.keyring.key_for_id(key_id)?;

        let plaintext = aead::decrypt(key.as_bytes(), ciphertext, nonce, None).map_err(|e| {
            match e {
                CryptoError::AuthenticationFailed => KeyRingError::AuthenticationFailure(key_id),
                other => KeyRingError::Crypto(other.to_string()),
            }
        })?;

        let text = std::str::from_utf8(&plaintext)
            .map_err(|_| KeyRingError::Crypto("decrypted value is not UTF-8".to_string()))?;

        Ok(Zeroizing::new(text.to_owned()))
    }
}
