//! Rows exchanged with a storage backend.
//!
//! These are flat, type-agnostic shapes: the credential model maps its
//! typed variants onto [`CredentialRecord`] and back.

use uuid::Uuid;

/// A persisted encryption key canary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanaryRecord {
    /// Canary id. Every ciphertext records the id of the canary whose key
    /// produced it.
    pub uuid: Uuid,
    /// The canary constant sealed under the key.
    pub encrypted_value: Vec<u8>,
    /// Nonce of `encrypted_value`.
    pub nonce: Vec<u8>,
    /// Argon2 salt for passphrase keys. Empty for raw key material.
    pub salt: Vec<u8>,
    /// Argon2 cost the key was derived with. `None` for raw key material.
    pub kdf_params: Option<KdfParams>,
    /// Creation time, Unix milliseconds.
    pub created_at: i64,
}

/// Argon2 cost recorded with a passphrase canary.
///
/// A passphrase only matches its canary when derived with the same cost, so
/// the cost is stored rather than read from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of passes.
    pub iterations: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

/// A credential name with the creation time of its newest version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameSummary {
    /// Stored credential name.
    pub name: String,
    /// `version_created_at` of the newest version.
    pub version_created_at: i64,
}

/// One credential version as stored.
///
/// Type-specific columns are `None` for variants that do not use them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    /// Version id.
    pub uuid: Uuid,
    /// Id of the credential name this version belongs to.
    pub name_uuid: Uuid,
    /// Normalized credential name.
    pub name: String,
    /// Type tag (`password`, `certificate`, ...).
    pub credential_type: String,
    /// Creation time, Unix milliseconds. `None` until first saved.
    pub version_created_at: Option<i64>,
    /// Canary id of the key every ciphertext of this version is sealed under.
    pub encryption_key_uuid: Uuid,
    /// Sealed primary secret.
    pub encrypted_value: Option<Vec<u8>>,
    /// Nonce of `encrypted_value`.
    pub nonce: Option<Vec<u8>>,
    /// Sealed generation parameters JSON.
    pub encrypted_generation_parameters: Option<Vec<u8>>,
    /// Nonce of `encrypted_generation_parameters`.
    pub generation_parameters_nonce: Option<Vec<u8>>,
    /// Certificate authority PEM.
    pub ca: Option<String>,
    /// Certificate PEM.
    pub certificate: Option<String>,
    /// Name of the signing CA credential.
    pub ca_name: Option<String>,
    /// RSA / SSH public key.
    pub public_key: Option<String>,
    /// User credential username.
    pub username: Option<String>,
    /// User credential password salt.
    pub salt: Option<String>,
}

impl CredentialRecord {
    /// Creates an unsaved record with every optional column empty.
    pub fn new(
        uuid: Uuid,
        name_uuid: Uuid,
        name: impl Into<String>,
        credential_type: impl Into<String>,
        encryption_key_uuid: Uuid,
    ) -> Self {
        Self {
            uuid,
            name_uuid,
            name: name.into(),
            credential_type: credential_type.into(),
            version_created_at: None,
            encryption_key_uuid,
            encrypted_value: None,
            nonce: None,
            encrypted_generation_parameters: None,
            generation_parameters_nonce: None,
            ca: None,
            certificate: None,
            ca_name: None,
            public_key: None,
            username: None,
            salt: None,
        }
    }
}
