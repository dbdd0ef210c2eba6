//! Credential factory.
//!
//! The only place new versions (and so new write-path ciphertext) are
//! created.

use credvault_keyring::Encryptor;

use crate::error::CredentialError;
use crate::generator;
use crate::name::{self, CredentialName};
use crate::params::StringGenerationParameters;
use crate::types::CredentialType;
use crate::value::CredentialValue;
use crate::version::{CredentialKind, CredentialVersion};

/// Builds new credential versions sealed under the active key.
#[derive(Debug, Clone)]
pub struct CredentialFactory {
    encryptor: Encryptor,
}

impl CredentialFactory {
    /// Creates a factory over `encryptor`.
    pub fn new(encryptor: Encryptor) -> Self {
        Self { encryptor }
    }

    /// The encryptor new versions are sealed with.
    pub fn encryptor(&self) -> &Encryptor {
        &self.encryptor
    }

    /// Builds a new, unsaved version of `name`.
    ///
    /// With `existing`, the new version joins the existing name identity.
    /// Without, a new identity is created.
    ///
    /// # Errors
    ///
    /// - [`CredentialError::TypeMismatch`] if `existing` has another type;
    ///   nothing is encrypted in that case
    /// - [`CredentialError::InvalidValue`] if `value` does not fit `credential_type`
    /// - [`CredentialError::InvalidParameters`] if parameters are given for a
    ///   type that cannot be generated
    pub fn make_new_version(
        &self,
        credential_type: CredentialType,
        name: &str,
        value: &CredentialValue,
        existing: Option<&CredentialVersion>,
        generation_parameters: Option<&StringGenerationParameters>,
    ) -> Result<CredentialVersion, CredentialError> {
        if let Some(existing) = existing {
            if existing.credential_type() != credential_type {
                return Err(CredentialError::TypeMismatch {
                    existing: existing.credential_type(),
                    requested: credential_type,
                });
            }
        }

        if value.credential_type() != credential_type {
            return Err(CredentialError::InvalidValue(format!(
                "{} value supplied for a {} credential",
                value.credential_type(),
                credential_type
            )));
        }

        if generation_parameters.is_some() && !credential_type.is_generatable() {
            return Err(CredentialError::InvalidParameters(format!(
                "{credential_type} credentials cannot carry generation parameters"
            )));
        }

        let credential_name = match existing {
            Some(existing) => existing.name().clone(),
            None => CredentialName::new(name)?,
        };

        let params_json = generation_parameters
            .map(StringGenerationParameters::to_json)
            .transpose()?;

        let (kind, secret): (CredentialKind, Option<String>) = match value {
            CredentialValue::Value(v) => (CredentialKind::Value, Some(v.clone())),
            CredentialValue::Json(v) => {
                if !v.is_object() {
                    return Err(CredentialError::InvalidValue(
                        "json credentials must be objects".into(),
                    ));
                }
                (CredentialKind::Json, Some(serde_json::to_string(v)?))
            },
            CredentialValue::Password(p) => {
                if p.is_empty() {
                    return Err(CredentialError::InvalidValue(
                        "password cannot be empty".into(),
                    ));
                }
                (CredentialKind::Password, Some(p.clone()))
            },
            CredentialValue::User { username, password } => {
                if password.is_empty() {
                    return Err(CredentialError::InvalidValue(
                        "password cannot be empty".into(),
                    ));
                }
                (
                    CredentialKind::User {
                        username: username.clone(),
                        salt: generator::generate_salt(),
                    },
                    Some(password.clone()),
                )
            },
            CredentialValue::Certificate {
                ca,
                certificate,
                private_key,
                ca_name,
            } => (
                CredentialKind::Certificate {
                    ca: ca.clone(),
                    certificate: certificate.clone(),
                    ca_name: ca_name.as_deref().map(name::normalize),
                },
                private_key.clone(),
            ),
            CredentialValue::Rsa {
                public_key,
                private_key,
            } => (
                CredentialKind::Rsa {
                    public_key: public_key.clone(),
                },
                private_key.clone(),
            ),
            CredentialValue::Ssh {
                public_key,
                private_key,
            } => (
                CredentialKind::Ssh {
                    public_key: public_key.clone(),
                },
                private_key.clone(),
            ),
        };

        let secret = secret.map(zeroize::Zeroizing::new);

        CredentialVersion::seal(
            credential_name,
            kind,
            secret.as_deref().map(String::as_str),
            params_json.as_deref(),
            &self.encryptor,
        )
    }
}
