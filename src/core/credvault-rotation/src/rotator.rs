//! The rotation pass.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use credvault_credentials::{CredentialDataService, CredentialError, CredentialVersion};
use credvault_keyring::Encryptor;
use credvault_storage::CanaryStore;

use crate::error::RotationError;
use crate::report::{RecordOutcome, RotationReport, SkipReason};

/// Versions fetched per page unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Moves credential versions from known-inactive keys to the active key.
#[derive(Clone)]
pub struct KeyRotator {
    data: CredentialDataService,
    encryptor: Encryptor,
    batch_size: usize,
    canary_store: Option<Arc<dyn CanaryStore>>,
}

impl KeyRotator {
    /// Creates a rotator over the key ring of `data`.
    pub fn new(data: CredentialDataService) -> Self {
        let encryptor = Encryptor::new(Arc::clone(data.keyring()));
        Self {
            data,
            encryptor,
            batch_size: DEFAULT_BATCH_SIZE,
            canary_store: None,
        }
    }

    /// Sets the page size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Result<Self, RotationError> {
        if batch_size == 0 {
            return Err(RotationError::InvalidBatchSize(batch_size));
        }
        self.batch_size = batch_size;
        Ok(self)
    }

    /// Deletes canaries of inactive keys that no version uses any more once
    /// a pass completes.
    pub fn with_canary_pruning(mut self, store: Arc<dyn CanaryStore>) -> Self {
        self.canary_store = Some(store);
        self
    }

    /// Page size in use.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Runs one pass.
    ///
    /// `cancel` is checked before every page; once it reads `true` the pass
    /// stops and the report is marked cancelled. Versions saved so far stay
    /// rotated, so a later pass picks up where this one left off.
    ///
    /// # Errors
    ///
    /// Only failures to read a page or to prune canaries. A version that
    /// cannot be rotated is counted as skipped.
    pub async fn rotate(
        &self,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<RotationReport, RotationError> {
        let started = Instant::now();
        let keyring = self.data.keyring();
        let mut report = RotationReport::default();

        info!(
            active_key_id = %keyring.active_key_id(),
            inactive_keys = keyring.inactive_known_key_ids().len(),
            unknown_keys = keyring.unknown_key_ids().len(),
            batch_size = self.batch_size,
            "Started encryption key rotation"
        );

        let mut cursor: Option<Uuid> = None;
        loop {
            if cancel.as_ref().is_some_and(|rx| *rx.borrow()) {
                info!("Encryption key rotation cancelled");
                report.cancelled = true;
                break;
            }

            let page = self
                .data
                .find_encrypted_with_available_inactive_key(cursor, self.batch_size)
                .await?;
            let Some(last) = page.last().map(CredentialVersion::uuid) else {
                break;
            };
            debug!(count = page.len(), after = ?cursor, "Fetched rotation page");

            for version in page {
                match self.rotate_record(version).await {
                    RecordOutcome::Rotated => report.rotated += 1,
                    RecordOutcome::Skipped { .. } => report.skipped += 1,
                }
            }

            cursor = Some(last);
        }

        if !report.cancelled {
            if let Some(store) = &self.canary_store {
                report.pruned_canaries = self.prune_canaries(store.as_ref()).await?;
            }
        }

        report.remaining = self.data.count_not_encrypted_by_active_key().await?;
        report.duration = started.elapsed();

        if report.rotated == 0 && report.skipped == 0 {
            info!("Found no records in need of encryption key rotation.");
        } else {
            info!(rotated = report.rotated, "Successfully rotated {} item(s)", report.rotated);
            if report.skipped > 0 {
                warn!(
                    skipped = report.skipped,
                    "Skipped {} item(s) that could not be re-encrypted.", report.skipped
                );
            }
        }
        info!(
            remaining = report.remaining,
            duration_ms = report.duration.as_millis() as u64,
            "Finished encryption key rotation"
        );

        Ok(report)
    }

    /// Re-encrypts and stores one version.
    ///
    /// Only the encryption columns of the stored version are replaced. A
    /// version deleted after it was read stays deleted. On any failure the
    /// stored version is left as it was.
    pub async fn rotate_record(&self, mut version: CredentialVersion) -> RecordOutcome {
        let uuid = version.uuid();
        let old_key_id = version.encryption_key_id();

        let reason = match version.rotate(&self.encryptor) {
            Ok(()) => match self.data.update_encryption(&version).await {
                Ok(true) => {
                    debug!(%uuid, from = %old_key_id, "Rotated credential version");
                    return RecordOutcome::Rotated;
                },
                Ok(false) => SkipReason::Deleted(uuid),
                Err(e) => SkipReason::Storage(e.to_string()),
            },
            Err(CredentialError::KeyNotFound(id)) => SkipReason::KeyNotFound(id),
            Err(CredentialError::AuthenticationFailure(id)) => SkipReason::AuthenticationFailure(id),
            Err(e) => SkipReason::Encryption(e.to_string()),
        };

        warn!(
            %uuid,
            name = %version.name(),
            key_id = %old_key_id,
            %reason,
            "Skipped credential version during rotation"
        );
        RecordOutcome::Skipped { reason }
    }

    async fn prune_canaries(&self, store: &dyn CanaryStore) -> Result<u64, RotationError> {
        let keyring = self.data.keyring();
        let mut pruned = 0;

        for key_id in keyring.inactive_known_key_ids() {
            if store.delete_canary_if_unused(key_id).await? {
                warn!(
                    %key_id,
                    label = keyring.label_for_id(key_id).unwrap_or_default(),
                    "Deleted canary of unused inactive key"
                );
                pruned += 1;
            } else {
                debug!(%key_id, "Inactive key still in use, keeping canary");
            }
        }

        Ok(pruned)
    }
}
