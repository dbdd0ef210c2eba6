//! Storage backend trait definitions.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StorageError;
use crate::record::{CanaryRecord, CredentialRecord, NameSummary};

/// Persistence for encryption key canaries.
#[async_trait]
pub trait CanaryStore: Send + Sync {
    /// Lists every canary, oldest first.
    async fn list_canaries(&self) -> Result<Vec<CanaryRecord>, StorageError>;

    /// Inserts `canary` only if the store still holds exactly
    /// `expected_count` canaries.
    ///
    /// Returns `false` when another writer changed the canary set since it
    /// was listed. The caller must re-list before retrying.
    async fn insert_canary_if_unchanged(
        &self,
        canary: &CanaryRecord,
        expected_count: usize,
    ) -> Result<bool, StorageError>;

    /// Deletes a canary unless a credential version is still sealed under
    /// it. The check and the delete are one atomic statement.
    ///
    /// Returns whether the canary was deleted.
    async fn delete_canary_if_unused(&self, uuid: Uuid) -> Result<bool, StorageError>;
}

/// Persistence for credential names and their versions.
///
/// Name lookups are case-insensitive.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Returns the newest version of `name`.
    async fn find_most_recent(&self, name: &str)
        -> Result<Option<CredentialRecord>, StorageError>;

    /// Returns a single version by its id.
    async fn find_by_uuid(&self, uuid: Uuid) -> Result<Option<CredentialRecord>, StorageError>;

    /// Returns every version of `name`, newest first.
    async fn find_all_by_name(&self, name: &str) -> Result<Vec<CredentialRecord>, StorageError>;

    /// Returns the `limit` newest versions of `name`, newest first.
    async fn find_recent_by_name(
        &self,
        name: &str,
        limit: usize,
    ) -> Result<Vec<CredentialRecord>, StorageError>;

    /// Saves a version.
    ///
    /// A record whose `uuid` is not stored yet is inserted as a new version:
    /// its name is created when missing and `version_created_at` is assigned
    /// so it sorts after every existing version of the name. A record whose
    /// `uuid` already exists only has its key id, ciphertexts and nonces
    /// replaced. Either way the write is atomic.
    ///
    /// # Errors
    ///
    /// [`StorageError::TypeMismatch`] when the name already holds versions
    /// of another type. The type is checked inside the write transaction.
    async fn save(&self, record: &CredentialRecord) -> Result<CredentialRecord, StorageError>;

    /// Replaces the key id, ciphertexts and nonces of an existing version.
    ///
    /// Never inserts. Returns `false` when the version no longer exists,
    /// e.g. because its name was deleted after the version was read.
    async fn update_encryption(&self, record: &CredentialRecord) -> Result<bool, StorageError>;

    /// Deletes a name and every one of its versions. Returns whether the
    /// name existed.
    async fn delete(&self, name: &str) -> Result<bool, StorageError>;

    /// Lists every stored credential name.
    async fn find_all_names(&self) -> Result<Vec<String>, StorageError>;

    /// Names containing `fragment`, case-insensitively, newest first.
    async fn find_names_containing(&self, fragment: &str)
        -> Result<Vec<NameSummary>, StorageError>;

    /// Names starting with `prefix`, case-insensitively, newest first.
    async fn find_names_starting_with(
        &self,
        prefix: &str,
    ) -> Result<Vec<NameSummary>, StorageError>;

    /// Distinct names of certificates any version of which was signed by
    /// the CA credential `ca_name`.
    async fn find_certificate_names_by_ca_name(
        &self,
        ca_name: &str,
    ) -> Result<Vec<String>, StorageError>;

    /// Returns up to `limit` versions sealed under one of `key_ids`, ordered
    /// by version id, starting strictly after `after`.
    async fn find_encrypted_with_key_ids(
        &self,
        key_ids: &[Uuid],
        after: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<CredentialRecord>, StorageError>;

    /// Counts versions not sealed under `key_id`.
    async fn count_not_encrypted_by_key(&self, key_id: Uuid) -> Result<u64, StorageError>;

    /// Counts versions sealed under one of `key_ids`.
    async fn count_encrypted_with_key_ids(&self, key_ids: &[Uuid]) -> Result<u64, StorageError>;
}
