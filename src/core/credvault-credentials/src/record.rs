//! Mapping between [`CredentialVersion`] and the storage row.

use credvault_storage::CredentialRecord;

use crate::error::CredentialError;
use crate::name::CredentialName;
use crate::types::CredentialType;
use crate::version::{CredentialKind, CredentialVersion, EncryptedField};

fn pair(
    ciphertext: Option<Vec<u8>>,
    nonce: Option<Vec<u8>>,
    column: &str,
) -> Result<Option<EncryptedField>, CredentialError> {
    match (ciphertext, nonce) {
        (Some(ciphertext), Some(nonce)) => Ok(Some(EncryptedField { ciphertext, nonce })),
        (None, None) => Ok(None),
        _ => Err(CredentialError::Serialization(format!(
            "{column} and its nonce must be stored together"
        ))),
    }
}

impl CredentialVersion {
    pub(crate) fn to_record(&self) -> CredentialRecord {
        let mut record = CredentialRecord::new(
            self.uuid,
            self.name.uuid(),
            self.name.name(),
            self.credential_type().as_str(),
            self.encryption_key_id,
        );
        record.version_created_at = self.version_created_at;

        if let Some(field) = &self.encrypted_value {
            record.encrypted_value = Some(field.ciphertext.clone());
            record.nonce = Some(field.nonce.clone());
        }
        if let Some(field) = &self.encrypted_generation_parameters {
            record.encrypted_generation_parameters = Some(field.ciphertext.clone());
            record.generation_parameters_nonce = Some(field.nonce.clone());
        }

        match &self.kind {
            CredentialKind::Value | CredentialKind::Json | CredentialKind::Password => {},
            CredentialKind::User { username, salt } => {
                record.username = username.clone();
                record.salt = Some(salt.clone());
            },
            CredentialKind::Certificate {
                ca,
                certificate,
                ca_name,
            } => {
                record.ca = ca.clone();
                record.certificate = certificate.clone();
                record.ca_name = ca_name.clone();
            },
            CredentialKind::Rsa { public_key } | CredentialKind::Ssh { public_key } => {
                record.public_key = public_key.clone();
            },
        }

        record
    }

    pub(crate) fn from_record(record: CredentialRecord) -> Result<Self, CredentialError> {
        let credential_type: CredentialType = record
            .credential_type
            .parse()
            .map_err(|_| {
                CredentialError::Serialization(format!(
                    "unknown stored credential type: {}",
                    record.credential_type
                ))
            })?;

        let kind = match credential_type {
            CredentialType::Value => CredentialKind::Value,
            CredentialType::Json => CredentialKind::Json,
            CredentialType::Password => CredentialKind::Password,
            CredentialType::User => CredentialKind::User {
                username: record.username,
                salt: record.salt.unwrap_or_default(),
            },
            CredentialType::Certificate => CredentialKind::Certificate {
                ca: record.ca,
                certificate: record.certificate,
                ca_name: record.ca_name,
            },
            CredentialType::Rsa => CredentialKind::Rsa {
                public_key: record.public_key,
            },
            CredentialType::Ssh => CredentialKind::Ssh {
                public_key: record.public_key,
            },
        };

        Ok(Self {
            uuid: record.uuid,
            name: CredentialName::from_parts(record.name_uuid, record.name),
            version_created_at: record.version_created_at,
            encryption_key_id: record.encryption_key_uuid,
            encrypted_value: pair(record.encrypted_value, record.nonce, "encrypted_value")?,
            encrypted_generation_parameters: pair(
                record.encrypted_generation_parameters,
                record.generation_parameters_nonce,
                "encrypted_generation_parameters",
            )?,
            kind,
        })
    }
}
