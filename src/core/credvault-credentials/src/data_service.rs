//! Typed access to the credential store.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use credvault_keyring::KeyRing;
use credvault_storage::{CredentialStore, NameSummary};

use crate::error::CredentialError;
use crate::name;
use crate::version::CredentialVersion;

/// Maps store rows to [`CredentialVersion`]s and applies key ring filters.
#[derive(Clone)]
pub struct CredentialDataService {
    store: Arc<dyn CredentialStore>,
    keyring: Arc<KeyRing>,
}

impl CredentialDataService {
    /// Creates a data service over `store`.
    pub fn new(store: Arc<dyn CredentialStore>, keyring: Arc<KeyRing>) -> Self {
        Self { store, keyring }
    }

    /// The key ring used for key filters.
    pub fn keyring(&self) -> &Arc<KeyRing> {
        &self.keyring
    }

    /// Newest version of `name`, matched case-insensitively.
    pub async fn find_most_recent(
        &self,
        name: &str,
    ) -> Result<Option<CredentialVersion>, CredentialError> {
        self.store
            .find_most_recent(&name::normalize(name))
            .await?
            .map(CredentialVersion::from_record)
            .transpose()
    }

    /// A single version by id.
    pub async fn find_by_uuid(
        &self,
        uuid: Uuid,
    ) -> Result<Option<CredentialVersion>, CredentialError> {
        self.store
            .find_by_uuid(uuid)
            .await?
            .map(CredentialVersion::from_record)
            .transpose()
    }

    /// Every version of `name`, newest first.
    pub async fn find_all_by_name(
        &self,
        name: &str,
    ) -> Result<Vec<CredentialVersion>, CredentialError> {
        self.store
            .find_all_by_name(&name::normalize(name))
            .await?
            .into_iter()
            .map(CredentialVersion::from_record)
            .collect()
    }

    /// The `limit` newest versions of `name`, newest first.
    pub async fn find_n_by_name(
        &self,
        name: &str,
        limit: usize,
    ) -> Result<Vec<CredentialVersion>, CredentialError> {
        self.store
            .find_recent_by_name(&name::normalize(name), limit)
            .await?
            .into_iter()
            .map(CredentialVersion::from_record)
            .collect()
    }

    /// Persists `version` and returns it as stored.
    ///
    /// New versions get their creation time and, if the name already
    /// existed, the stored name identity.
    pub async fn save(
        &self,
        version: &CredentialVersion,
    ) -> Result<CredentialVersion, CredentialError> {
        let stored = self.store.save(&version.to_record()).await?;
        debug!(uuid = %stored.uuid, name = %stored.name, "Credential version saved");
        CredentialVersion::from_record(stored)
    }

    /// Stores the re-encrypted ciphertexts of an already saved version.
    ///
    /// Returns `false`, writing nothing, when the version has been deleted
    /// since it was read.
    pub async fn update_encryption(
        &self,
        version: &CredentialVersion,
    ) -> Result<bool, CredentialError> {
        Ok(self.store.update_encryption(&version.to_record()).await?)
    }

    /// Deletes `name` and all its versions. Returns whether it existed.
    pub async fn delete(&self, name: &str) -> Result<bool, CredentialError> {
        Ok(self.store.delete(&name::normalize(name)).await?)
    }

    /// Every folder path that holds at least one credential, e.g. `/`,
    /// `/app/`, `/app/db/` for `/app/db/password`.
    pub async fn find_all_paths(&self) -> Result<Vec<String>, CredentialError> {
        let names = self.store.find_all_names().await?;

        let mut paths = BTreeSet::new();
        for name in &names {
            for (i, c) in name.char_indices() {
                if c == '/' {
                    paths.insert(name[..=i].to_string());
                }
            }
        }

        Ok(paths.into_iter().collect())
    }

    /// Names containing `fragment`, case-insensitively, with the creation
    /// time of their newest version. Newest first.
    pub async fn find_containing_name(
        &self,
        fragment: &str,
    ) -> Result<Vec<NameSummary>, CredentialError> {
        Ok(self.store.find_names_containing(fragment).await?)
    }

    /// Names under the folder `path`. `app` and `/app/` both mean `/app/`.
    pub async fn find_starting_with_path(
        &self,
        path: &str,
    ) -> Result<Vec<NameSummary>, CredentialError> {
        let mut prefix = name::normalize(path);
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        Ok(self.store.find_names_starting_with(&prefix).await?)
    }

    /// Names of certificates signed by the CA credential `ca_name`.
    pub async fn find_all_certificate_names_by_ca_name(
        &self,
        ca_name: &str,
    ) -> Result<Vec<String>, CredentialError> {
        Ok(self
            .store
            .find_certificate_names_by_ca_name(&name::normalize(ca_name))
            .await?)
    }

    /// Up to `limit` versions sealed under a configured key other than the
    /// active one, ordered by id and strictly after `after`.
    ///
    /// Versions under unknown keys are never returned.
    pub async fn find_encrypted_with_available_inactive_key(
        &self,
        after: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<CredentialVersion>, CredentialError> {
        let inactive = self.keyring.inactive_known_key_ids();
        if inactive.is_empty() {
            return Ok(Vec::new());
        }

        self.store
            .find_encrypted_with_key_ids(&inactive, after, limit)
            .await?
            .into_iter()
            .map(CredentialVersion::from_record)
            .collect()
    }

    /// Number of versions not yet sealed under the active key, including
    /// versions under unknown keys.
    pub async fn count_not_encrypted_by_active_key(&self) -> Result<u64, CredentialError> {
        Ok(self
            .store
            .count_not_encrypted_by_key(self.keyring.active_key_id())
            .await?)
    }

    /// Number of versions sealed under one of `key_ids`.
    pub async fn count_encrypted_with_key_ids(
        &self,
        key_ids: &[Uuid],
    ) -> Result<u64, CredentialError> {
        Ok(self.store.count_encrypted_with_key_ids(key_ids).await?)
    }
}
