//! Credential write and read flows.
//!
//! These are the operations an API layer delegates to: set, generate,
//! regenerate, get and delete. Authorization and request parsing happen
//! before these are called.

use tracing::info;
use uuid::Uuid;
use zeroize::Zeroizing;

use credvault_keyring::Encryptor;

use crate::data_service::CredentialDataService;
use crate::error::CredentialError;
use crate::factory::CredentialFactory;
use crate::generator;
use crate::keypair;
use crate::params::StringGenerationParameters;
use crate::types::CredentialType;
use crate::value::CredentialValue;
use crate::version::CredentialVersion;

/// Signing material of a certificate authority credential.
pub struct CertificateAuthority {
    /// Name of the CA credential.
    pub name: String,
    /// CA certificate PEM.
    pub certificate: String,
    /// Decrypted CA private key PEM.
    pub private_key: Zeroizing<String>,
}

impl std::fmt::Debug for CertificateAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateAuthority")
            .field("name", &self.name)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// Orchestrates the factory and the data service.
#[derive(Clone)]
pub struct CredentialService {
    data: CredentialDataService,
    factory: CredentialFactory,
}

impl CredentialService {
    /// Creates the service.
    pub fn new(data: CredentialDataService, encryptor: Encryptor) -> Self {
        Self {
            data,
            factory: CredentialFactory::new(encryptor),
        }
    }

    /// Encryptor for reading the secrets of returned versions.
    pub fn encryptor(&self) -> &Encryptor {
        self.factory.encryptor()
    }

    /// The underlying data service.
    pub fn data(&self) -> &CredentialDataService {
        &self.data
    }

    /// Stores `value` under `name`.
    ///
    /// When the name already exists and `overwrite` is false, the existing
    /// version is returned unchanged.
    pub async fn set(
        &self,
        name: &str,
        value: CredentialValue,
        overwrite: bool,
    ) -> Result<CredentialVersion, CredentialError> {
        self.set_with_parameters(name, value, None, overwrite).await
    }

    /// Like [`CredentialService::set`], recording the parameters a generated
    /// value was produced with.
    pub async fn set_with_parameters(
        &self,
        name: &str,
        value: CredentialValue,
        generation_parameters: Option<StringGenerationParameters>,
        overwrite: bool,
    ) -> Result<CredentialVersion, CredentialError> {
        let credential_type = value.credential_type();
        let existing = self.data.find_most_recent(name).await?;

        if let Some(existing) = &existing {
            if existing.credential_type() != credential_type {
                return Err(CredentialError::TypeMismatch {
                    existing: existing.credential_type(),
                    requested: credential_type,
                });
            }
            if !overwrite {
                info!(name = %existing.name(), "Credential exists, not overwriting");
                return Ok(existing.clone());
            }
        }

        let version = self.factory.make_new_version(
            credential_type,
            name,
            &value,
            existing.as_ref(),
            generation_parameters.as_ref(),
        )?;

        let saved = self.data.save(&version).await?;
        info!(
            name = %saved.name(),
            uuid = %saved.uuid(),
            credential_type = %credential_type,
            "Credential version created"
        );

        Ok(saved)
    }

    /// Generates a password and stores it with its parameters.
    pub async fn generate_password(
        &self,
        name: &str,
        params: StringGenerationParameters,
        overwrite: bool,
    ) -> Result<CredentialVersion, CredentialError> {
        let password = generator::generate_password(&params)?;
        self.set_with_parameters(
            name,
            CredentialValue::Password(password.to_string()),
            Some(params),
            overwrite,
        )
        .await
    }

    /// Generates a user password and stores it with its parameters.
    pub async fn generate_user(
        &self,
        name: &str,
        username: Option<String>,
        params: StringGenerationParameters,
        overwrite: bool,
    ) -> Result<CredentialVersion, CredentialError> {
        let password = generator::generate_password(&params)?;
        self.set_with_parameters(
            name,
            CredentialValue::User {
                username,
                password: password.to_string(),
            },
            Some(params),
            overwrite,
        )
        .await
    }

    /// Generates an RSA keypair. `key_length` defaults to 2048 bits.
    pub async fn generate_rsa(
        &self,
        name: &str,
        key_length: Option<usize>,
        overwrite: bool,
    ) -> Result<CredentialVersion, CredentialError> {
        let pair = keypair::generate_rsa(key_length)?;
        self.set(
            name,
            CredentialValue::Rsa {
                public_key: Some(pair.public_key),
                private_key: Some(pair.private_key.to_string()),
            },
            overwrite,
        )
        .await
    }

    /// Generates an SSH keypair with an optional public key comment.
    pub async fn generate_ssh(
        &self,
        name: &str,
        key_length: Option<usize>,
        comment: Option<&str>,
        overwrite: bool,
    ) -> Result<CredentialVersion, CredentialError> {
        let pair = keypair::generate_ssh(key_length, comment)?;
        self.set(
            name,
            CredentialValue::Ssh {
                public_key: Some(pair.public_key),
                private_key: Some(pair.private_key.to_string()),
            },
            overwrite,
        )
        .await
    }

    /// Writes a freshly generated version of `name`.
    ///
    /// Passwords and users are regenerated with the parameters of the
    /// current version and keep their username. RSA and SSH keypairs keep
    /// their key length, and SSH keys their comment.
    ///
    /// # Errors
    ///
    /// - [`CredentialError::NotFound`] when `name` does not exist
    /// - [`CredentialError::NotRegeneratable`] for statically set passwords
    ///   and for value, json and certificate credentials
    pub async fn regenerate(&self, name: &str) -> Result<CredentialVersion, CredentialError> {
        let existing = self
            .data
            .find_most_recent(name)
            .await?
            .ok_or_else(|| CredentialError::NotFound(name.to_string()))?;

        let credential_type = existing.credential_type();
        let (value, params) = match credential_type {
            CredentialType::Password | CredentialType::User => {
                let params = existing
                    .generation_parameters(self.encryptor())?
                    .ok_or_else(|| {
                        CredentialError::NotRegeneratable(format!(
                            "{}: password was set, not generated",
                            existing.name()
                        ))
                    })?;

                let password = generator::generate_password(&params)?.to_string();
                let value = match credential_type {
                    CredentialType::User => CredentialValue::User {
                        username: existing.username().map(str::to_string),
                        password,
                    },
                    _ => CredentialValue::Password(password),
                };
                (value, Some(params))
            },
            CredentialType::Rsa => {
                let key_length = existing.public_key().and_then(keypair::rsa_key_length);
                let pair = keypair::generate_rsa(key_length)?;
                let value = CredentialValue::Rsa {
                    public_key: Some(pair.public_key),
                    private_key: Some(pair.private_key.to_string()),
                };
                (value, None)
            },
            CredentialType::Ssh => {
                let key_length = existing.public_key().and_then(keypair::ssh_key_length);
                let pair = keypair::generate_ssh(key_length, existing.ssh_comment())?;
                let value = CredentialValue::Ssh {
                    public_key: Some(pair.public_key),
                    private_key: Some(pair.private_key.to_string()),
                };
                (value, None)
            },
            _ => {
                return Err(CredentialError::NotRegeneratable(format!(
                    "{}: {} credentials are not generated",
                    existing.name(),
                    credential_type
                )))
            },
        };

        let version = self.factory.make_new_version(
            credential_type,
            name,
            &value,
            Some(&existing),
            params.as_ref(),
        )?;

        let saved = self.data.save(&version).await?;
        info!(name = %saved.name(), uuid = %saved.uuid(), "Credential regenerated");

        Ok(saved)
    }

    /// Newest version of `name`.
    pub async fn get(&self, name: &str) -> Result<CredentialVersion, CredentialError> {
        self.data
            .find_most_recent(name)
            .await?
            .ok_or_else(|| CredentialError::NotFound(name.to_string()))
    }

    /// Every version of `name`, newest first.
    pub async fn get_all(&self, name: &str) -> Result<Vec<CredentialVersion>, CredentialError> {
        let versions = self.data.find_all_by_name(name).await?;
        if versions.is_empty() {
            return Err(CredentialError::NotFound(name.to_string()));
        }
        Ok(versions)
    }

    /// The `versions` newest versions of `name`, or all of them when
    /// `versions` is `None`.
    ///
    /// Asking for zero versions is a [`CredentialError::NotFound`], like a
    /// missing name.
    pub async fn get_n_versions(
        &self,
        name: &str,
        versions: Option<usize>,
    ) -> Result<Vec<CredentialVersion>, CredentialError> {
        let found = match versions {
            Some(n) => self.data.find_n_by_name(name, n).await?,
            None => self.data.find_all_by_name(name).await?,
        };
        if found.is_empty() {
            return Err(CredentialError::NotFound(name.to_string()));
        }
        Ok(found)
    }

    /// Certificate and decrypted private key of the newest version of the
    /// CA credential `ca_name`.
    ///
    /// # Errors
    ///
    /// - [`CredentialError::CaNotFound`] when `ca_name` does not exist or is
    ///   not a certificate
    /// - [`CredentialError::NotCertificateAuthority`] when it has no
    ///   certificate or no private key
    pub async fn find_certificate_authority(
        &self,
        ca_name: &str,
    ) -> Result<CertificateAuthority, CredentialError> {
        let ca = self
            .data
            .find_most_recent(ca_name)
            .await?
            .filter(|v| v.credential_type() == CredentialType::Certificate)
            .ok_or_else(|| CredentialError::CaNotFound(ca_name.to_string()))?;

        let name = ca.name().name().to_string();
        let certificate = ca
            .certificate()
            .map(str::to_string)
            .ok_or_else(|| CredentialError::NotCertificateAuthority(name.clone()))?;
        let private_key = ca
            .private_key(self.encryptor())?
            .ok_or_else(|| CredentialError::NotCertificateAuthority(name.clone()))?;

        Ok(CertificateAuthority {
            name,
            certificate,
            private_key,
        })
    }

    /// Whether the CA that signed `version` has since been replaced, i.e.
    /// the newest certificate of its `ca_name` differs from the `ca` stored
    /// with `version`. `false` for certificates without a CA name.
    pub async fn signing_ca_replaced(
        &self,
        version: &CredentialVersion,
    ) -> Result<bool, CredentialError> {
        let Some(ca_name) = version.ca_name() else {
            return Ok(false);
        };

        let current = self
            .data
            .find_most_recent(ca_name)
            .await?
            .filter(|v| v.credential_type() == CredentialType::Certificate)
            .ok_or_else(|| CredentialError::CaNotFound(ca_name.to_string()))?;

        let stored = version.ca().map(str::trim);
        Ok(current.certificate().map(str::trim) != stored)
    }

    /// A single version by id.
    pub async fn get_by_uuid(&self, uuid: Uuid) -> Result<CredentialVersion, CredentialError> {
        self.data
            .find_by_uuid(uuid)
            .await?
            .ok_or_else(|| CredentialError::NotFound(uuid.to_string()))
    }

    /// Deletes `name` and all its versions.
    pub async fn delete(&self, name: &str) -> Result<(), CredentialError> {
        if !self.data.delete(name).await? {
            return Err(CredentialError::NotFound(name.to_string()));
        }
        info!(name = %name, "Credential deleted");
        Ok(())
    }
}
