//! The credential version envelope.
//!
//! Every version carries the same envelope: id, name identity, creation
//! time, the id of the key its ciphertexts are sealed under, and up to two
//! ciphertexts (the primary secret and the generation parameters). The
//! type-specific cleartext lives in [`CredentialKind`].
//!
//! Nothing is decrypted when a version is loaded. Accessors that need
//! plaintext take the [`Encryptor`] and open the ciphertext on each call.

use serde_json::{Map, Value as JsonValue};
use tracing::debug;
use uuid::Uuid;
use zeroize::Zeroizing;

use credvault_keyring::{Encryption, Encryptor, KeyRingError};

use crate::error::CredentialError;
use crate::name::CredentialName;
use crate::params::StringGenerationParameters;
use crate::types::CredentialType;

/// A ciphertext and its nonce. The key id lives on the version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedField {
    /// Ciphertext with its trailing tag.
    pub ciphertext: Vec<u8>,
    /// Nonce of the ciphertext.
    pub nonce: Vec<u8>,
}

impl From<Encryption> for EncryptedField {
    fn from(e: Encryption) -> Self {
        Self {
            ciphertext: e.ciphertext,
            nonce: e.nonce,
        }
    }
}

/// Type-specific cleartext of a version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialKind {
    /// Opaque string; the string is the encrypted value.
    Value,
    /// JSON object; the serialized object is the encrypted value.
    Json,
    /// Password; the password is the encrypted value.
    Password,
    /// Username and password; the password is the encrypted value.
    User {
        /// Cleartext username.
        username: Option<String>,
        /// Cleartext salt.
        salt: String,
    },
    /// Certificate; the optional private key is the encrypted value.
    Certificate {
        /// CA certificate PEM.
        ca: Option<String>,
        /// Certificate PEM.
        certificate: Option<String>,
        /// Name of the signing CA credential, with a leading `/`.
        ca_name: Option<String>,
    },
    /// RSA keypair; the private key is the encrypted value.
    Rsa {
        /// Public key PEM.
        public_key: Option<String>,
    },
    /// SSH keypair; the private key is the encrypted value.
    Ssh {
        /// Public key in `authorized_keys` format.
        public_key: Option<String>,
    },
}

impl CredentialKind {
    /// Type tag of this variant.
    pub fn credential_type(&self) -> CredentialType {
        match self {
            CredentialKind::Value => CredentialType::Value,
            CredentialKind::Json => CredentialType::Json,
            CredentialKind::Password => CredentialType::Password,
            CredentialKind::User { .. } => CredentialType::User,
            CredentialKind::Certificate { .. } => CredentialType::Certificate,
            CredentialKind::Rsa { .. } => CredentialType::Rsa,
            CredentialKind::Ssh { .. } => CredentialType::Ssh,
        }
    }
}

/// One immutable version of a credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialVersion {
    pub(crate) uuid: Uuid,
    pub(crate) name: CredentialName,
    pub(crate) version_created_at: Option<i64>,
    pub(crate) encryption_key_id: Uuid,
    pub(crate) encrypted_value: Option<EncryptedField>,
    pub(crate) encrypted_generation_parameters: Option<EncryptedField>,
    pub(crate) kind: CredentialKind,
}

impl CredentialVersion {
    /// Builds a new, unsaved version, sealing `secret` and
    /// `generation_parameters` under the active key.
    pub(crate) fn seal(
        name: CredentialName,
        kind: CredentialKind,
        secret: Option<&str>,
        generation_parameters: Option<&str>,
        encryptor: &Encryptor,
    ) -> Result<Self, CredentialError> {
        let encrypted_value = secret
            .map(|s| encryptor.encrypt(s).map(EncryptedField::from))
            .transpose()?;
        let encrypted_generation_parameters = generation_parameters
            .map(|p| encryptor.encrypt(p).map(EncryptedField::from))
            .transpose()?;

        Ok(Self {
            uuid: Uuid::new_v4(),
            name,
            version_created_at: None,
            encryption_key_id: encryptor.active_key_id(),
            encrypted_value,
            encrypted_generation_parameters,
            kind,
        })
    }

    /// Version id.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Name identity shared with the other versions.
    pub fn name(&self) -> &CredentialName {
        &self.name
    }

    /// Creation time in Unix milliseconds, once saved.
    pub fn version_created_at(&self) -> Option<i64> {
        self.version_created_at
    }

    /// Id of the key every ciphertext of this version is sealed under.
    pub fn encryption_key_id(&self) -> Uuid {
        self.encryption_key_id
    }

    /// Type-specific cleartext.
    pub fn kind(&self) -> &CredentialKind {
        &self.kind
    }

    /// Type tag. Constant for the lifetime of the name.
    pub fn credential_type(&self) -> CredentialType {
        self.kind.credential_type()
    }

    /// Sealed primary secret, if any.
    pub fn encrypted_value(&self) -> Option<&EncryptedField> {
        self.encrypted_value.as_ref()
    }

    /// Sealed generation parameters, if any.
    pub fn encrypted_generation_parameters(&self) -> Option<&EncryptedField> {
        self.encrypted_generation_parameters.as_ref()
    }

    fn wrong_type(&self, accessor: &'static str) -> CredentialError {
        CredentialError::WrongType {
            accessor,
            actual: self.credential_type(),
        }
    }

    fn open(
        &self,
        field: Option<&EncryptedField>,
        encryptor: &Encryptor,
    ) -> Result<Option<Zeroizing<String>>, KeyRingError> {
        field
            .map(|f| encryptor.decrypt_parts(self.encryption_key_id, &f.ciphertext, &f.nonce))
            .transpose()
    }

    fn open_required(&self, encryptor: &Encryptor) -> Result<Zeroizing<String>, CredentialError> {
        self.open(self.encrypted_value.as_ref(), encryptor)?
            .ok_or_else(|| {
                CredentialError::Serialization(format!(
                    "{} version {} has no encrypted value",
                    self.credential_type(),
                    self.uuid
                ))
            })
    }

    /// Decrypts the string of a `value` credential.
    pub fn value(&self, encryptor: &Encryptor) -> Result<Zeroizing<String>, CredentialError> {
        match self.kind {
            CredentialKind::Value => self.open_required(encryptor),
            _ => Err(self.wrong_type("value")),
        }
    }

    /// Decrypts and parses the object of a `json` credential.
    pub fn json_value(
        &self,
        encryptor: &Encryptor,
    ) -> Result<Map<String, JsonValue>, CredentialError> {
        match self.kind {
            CredentialKind::Json => {
                let raw = self.open_required(encryptor)?;
                Ok(serde_json::from_str(&raw)?)
            },
            _ => Err(self.wrong_type("json_value")),
        }
    }

    /// Decrypts the password of a `password` or `user` credential.
    pub fn password(&self, encryptor: &Encryptor) -> Result<Zeroizing<String>, CredentialError> {
        match self.kind {
            CredentialKind::Password | CredentialKind::User { .. } => {
                self.open_required(encryptor)
            },
            _ => Err(self.wrong_type("password")),
        }
    }

    /// Decrypts the private key of a `certificate`, `rsa` or `ssh`
    /// credential. `None` when the version was stored without one.
    pub fn private_key(
        &self,
        encryptor: &Encryptor,
    ) -> Result<Option<Zeroizing<String>>, CredentialError> {
        match self.kind {
            CredentialKind::Certificate { .. }
            | CredentialKind::Rsa { .. }
            | CredentialKind::Ssh { .. } => Ok(self.open(self.encrypted_value.as_ref(), encryptor)?),
            _ => Err(self.wrong_type("private_key")),
        }
    }

    /// Decrypts the parameters a `password` or `user` credential was
    /// generated with. `None` means the password was set statically.
    ///
    /// The returned length is the length of the stored password.
    pub fn generation_parameters(
        &self,
        encryptor: &Encryptor,
    ) -> Result<Option<StringGenerationParameters>, CredentialError> {
        if !self.credential_type().is_generatable() {
            return Err(self.wrong_type("generation_parameters"));
        }

        let Some(field) = self.encrypted_generation_parameters.as_ref() else {
            return Ok(None);
        };

        let json = encryptor
            .decrypt_parts(self.encryption_key_id, &field.ciphertext, &field.nonce)
            .map_err(|e| match e {
                KeyRingError::KeyNotFound(id) => CredentialError::KeyNotFound(id),
                other => CredentialError::GenerationParametersUndecryptable(other.to_string()),
            })?;

        let mut params = StringGenerationParameters::from_json(&json)?;
        params.length = Some(self.password(encryptor)?.chars().count());

        Ok(Some(params))
    }

    /// Cleartext username of a `user` credential.
    pub fn username(&self) -> Option<&str> {
        match &self.kind {
            CredentialKind::User { username, .. } => username.as_deref(),
            _ => None,
        }
    }

    /// Cleartext salt of a `user` credential.
    pub fn salt(&self) -> Option<&str> {
        match &self.kind {
            CredentialKind::User { salt, .. } => Some(salt),
            _ => None,
        }
    }

    /// CA PEM of a certificate. Read without decryption.
    pub fn ca(&self) -> Option<&str> {
        match &self.kind {
            CredentialKind::Certificate { ca, .. } => ca.as_deref(),
            _ => None,
        }
    }

    /// Certificate PEM. Read without decryption.
    pub fn certificate(&self) -> Option<&str> {
        match &self.kind {
            CredentialKind::Certificate { certificate, .. } => certificate.as_deref(),
            _ => None,
        }
    }

    /// Name of the CA credential that signed this certificate.
    pub fn ca_name(&self) -> Option<&str> {
        match &self.kind {
            CredentialKind::Certificate { ca_name, .. } => ca_name.as_deref(),
            _ => None,
        }
    }

    /// Public key of an `rsa` or `ssh` credential.
    pub fn public_key(&self) -> Option<&str> {
        match &self.kind {
            CredentialKind::Rsa { public_key } | CredentialKind::Ssh { public_key } => {
                public_key.as_deref()
            },
            _ => None,
        }
    }

    /// Comment field of an SSH public key (`type key comment`).
    pub fn ssh_comment(&self) -> Option<&str> {
        match &self.kind {
            CredentialKind::Ssh {
                public_key: Some(key),
            } => key
                .trim()
                .splitn(3, char::is_whitespace)
                .nth(2)
                .map(str::trim)
                .filter(|c| !c.is_empty()),
            _ => None,
        }
    }

    /// Re-encrypts every ciphertext of this version under the active key.
    ///
    /// All plaintext is recovered before anything is replaced, so a failure
    /// leaves the version untouched. Generation parameters are carried
    /// through as the exact stored JSON.
    pub fn rotate(&mut self, encryptor: &Encryptor) -> Result<(), CredentialError> {
        let value = self.open(self.encrypted_value.as_ref(), encryptor)?;
        let params = self.open(self.encrypted_generation_parameters.as_ref(), encryptor)?;

        let encrypted_value = value
            .as_deref()
            .map(|v| encryptor.encrypt(v).map(EncryptedField::from))
            .transpose()?;
        let encrypted_generation_parameters = params
            .as_deref()
            .map(|p| encryptor.encrypt(p).map(EncryptedField::from))
            .transpose()?;

        debug!(
            uuid = %self.uuid,
            from = %self.encryption_key_id,
            to = %encryptor.active_key_id(),
            "Re-encrypting credential version"
        );

        self.encrypted_value = encrypted_value;
        self.encrypted_generation_parameters = encrypted_generation_parameters;
        self.encryption_key_id = encryptor.active_key_id();

        Ok(())
    }
}
