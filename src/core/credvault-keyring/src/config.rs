//! Encryption key source configuration.
//!
//! Read from the `[encryption]` section of the service configuration:
//!
//! ```toml
//! [[encryption.keys]]
//! label = "2024"
//! passphrase = "correct horse battery staple"
//!
//! [[encryption.keys]]
//! label = "2025"
//! key = "base64 key material"
//! active = true
//! ```

use std::collections::HashSet;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use zeroize::Zeroizing;

use credvault_crypto::Argon2Params;

use crate::error::KeyRingError;

/// Minimum length of raw key material after base64 decoding.
pub const MIN_KEY_MATERIAL_SIZE: usize = 16;

/// Top-level key ring configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct KeyRingConfig {
    /// Every key the instance may decrypt with.
    pub keys: Vec<KeySourceConfig>,
    /// Cost parameters for new passphrase canaries. Existing canaries keep
    /// the cost they were created with.
    #[serde(default)]
    pub argon2: Argon2Params,
}

/// One configured encryption key.
#[derive(Clone, Deserialize)]
pub struct KeySourceConfig {
    /// Operator-facing name, used only in logs.
    pub label: String,
    /// Where the key comes from.
    #[serde(flatten)]
    pub source: KeySource,
    /// Whether new ciphertext is produced with this key.
    #[serde(default)]
    pub active: bool,
}

/// Origin of the key material.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySource {
    /// Passphrase stretched with Argon2id and the canary's salt.
    Passphrase(String),
    /// Externally managed key material, base64 encoded.
    Key(String),
}

impl KeySource {
    /// Returns the decoded material of a `key` source.
    pub(crate) fn key_material(&self) -> Result<Option<Zeroizing<Vec<u8>>>, KeyRingError> {
        match self {
            KeySource::Passphrase(_) => Ok(None),
            KeySource::Key(encoded) => {
                let decoded = STANDARD
                    .decode(encoded.trim())
                    .map_err(|e| KeyRingError::InvalidConfig(format!("key is not base64: {e}")))?;
                Ok(Some(Zeroizing::new(decoded)))
            },
        }
    }
}

impl std::fmt::Debug for KeySourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.source {
            KeySource::Passphrase(_) => "passphrase",
            KeySource::Key(_) => "key",
        };
        f.debug_struct("KeySourceConfig")
            .field("label", &self.label)
            .field("source", &kind)
            .field("active", &self.active)
            .finish()
    }
}

impl KeyRingConfig {
    /// Checks the configuration before any key is derived.
    ///
    /// # Errors
    ///
    /// - [`KeyRingError::MultipleOrZeroActiveKeys`] unless exactly one source is active
    /// - [`KeyRingError::InvalidConfig`] for empty or duplicate labels, empty
    ///   passphrases and undecodable or short key material
    pub fn validate(&self) -> Result<(), KeyRingError> {
        let active = self.keys.iter().filter(|k| k.active).count();
        if active != 1 {
            return Err(KeyRingError::MultipleOrZeroActiveKeys { count: active });
        }

        let mut labels = HashSet::new();
        for key in &self.keys {
            if key.label.trim().is_empty() {
                return Err(KeyRingError::InvalidConfig(
                    "key label cannot be empty".into(),
                ));
            }
            if !labels.insert(key.label.as_str()) {
                return Err(KeyRingError::InvalidConfig(format!(
                    "duplicate key label: {}",
                    key.label
                )));
            }

            match &key.source {
                KeySource::Passphrase(p) if p.is_empty() => {
                    return Err(KeyRingError::InvalidConfig(format!(
                        "key {}: passphrase cannot be empty",
                        key.label
                    )));
                },
                KeySource::Passphrase(_) => {},
                KeySource::Key(_) => {
                    let len = key.source.key_material()?.map(|m| m.len()).unwrap_or(0);
                    if len < MIN_KEY_MATERIAL_SIZE {
                        return Err(KeyRingError::InvalidConfig(format!(
                            "key {}: key material must be at least {} bytes",
                            key.label, MIN_KEY_MATERIAL_SIZE
                        )));
                    }
                },
            }
        }

        Ok(())
    }
}
