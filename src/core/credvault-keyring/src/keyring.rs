//! Key canary mapper.
//!
//! Built once at startup from configuration and the persisted canaries,
//! then shared read-only behind an `Arc`. Reloading configuration means
//! building a new [`KeyRing`].

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};
use uuid::Uuid;

use credvault_crypto::{aead, kdf, random, Argon2Params, CryptoError, SymmetricKey};
use credvault_storage::{CanaryRecord, CanaryStore, KdfParams};

use crate::config::{KeyRingConfig, KeySource, KeySourceConfig};
use crate::error::KeyRingError;

/// Constant sealed into every canary.
pub const CANARY_VALUE: &str = "credvault encryption key canary v1";

/// HKDF context for expanding raw key material.
const KEY_CONTEXT: &[u8] = b"credvault-encryption-key-v1";

/// Attempts at creating missing canaries before giving up on a busy store.
const MAX_CANARY_ATTEMPTS: usize = 5;

struct KeyEntry {
    label: String,
    key: SymmetricKey,
}

/// Every key this instance can use, indexed by canary id.
pub struct KeyRing {
    active_key_id: Uuid,
    active_key: SymmetricKey,
    keys: HashMap<Uuid, KeyEntry>,
    unknown_key_ids: Vec<Uuid>,
}

impl std::fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRing")
            .field("active_key_id", &self.active_key_id)
            .field("known_keys", &self.keys.len())
            .field("unknown_key_ids", &self.unknown_key_ids)
            .finish()
    }
}

impl KeyRing {
    /// Loads the key ring, creating canaries for configured keys that have
    /// none yet.
    ///
    /// # Errors
    ///
    /// Configuration errors are returned before the store is touched. A
    /// store that keeps changing under concurrent canary creation yields
    /// [`KeyRingError::CanaryConflict`].
    pub async fn load(
        config: &KeyRingConfig,
        store: &dyn CanaryStore,
    ) -> Result<Self, KeyRingError> {
        config.validate()?;

        let raw_keys = config
            .keys
            .iter()
            .map(|source| match source.source.key_material()? {
                Some(material) => Ok(Some(kdf::derive_encryption_key(&material, KEY_CONTEXT)?)),
                None => Ok(None),
            })
            .collect::<Result<Vec<_>, KeyRingError>>()?;

        for attempt in 1..=MAX_CANARY_ATTEMPTS {
            let canaries = store.list_canaries().await?;
            debug!(canaries = canaries.len(), attempt, "Matching key canaries");

            let mut matched: Vec<Option<(Uuid, SymmetricKey)>> = vec![None; config.keys.len()];
            let mut claimed = HashSet::new();

            for (i, source) in config.keys.iter().enumerate() {
                for canary in canaries.iter().filter(|c| !claimed.contains(&c.uuid)) {
                    if let Some(key) =
                        try_canary(source, raw_keys[i].as_ref(), canary, &config.argon2)?
                    {
                        claimed.insert(canary.uuid);
                        matched[i] = Some((canary.uuid, key));
                        break;
                    }
                }
            }

            let mut expected = canaries.len();
            let mut conflict = false;

            for (i, source) in config.keys.iter().enumerate() {
                if matched[i].is_some() {
                    continue;
                }

                let (record, key) = new_canary(source, raw_keys[i].as_ref(), &config.argon2)?;
                if store.insert_canary_if_unchanged(&record, expected).await? {
                    info!(label = %source.label, key_id = %record.uuid, "Created encryption key canary");
                    expected += 1;
                    matched[i] = Some((record.uuid, key));
                } else {
                    warn!(attempt, "Key canaries changed concurrently, reloading");
                    conflict = true;
                    break;
                }
            }

            if conflict {
                continue;
            }

            let mut keys = HashMap::with_capacity(config.keys.len());
            let mut active = None;

            for (source, entry) in config.keys.iter().zip(matched) {
                let Some((id, key)) = entry else {
                    continue;
                };
                if source.active {
                    active = Some((id, key.clone()));
                }
                keys.insert(
                    id,
                    KeyEntry {
                        label: source.label.clone(),
                        key,
                    },
                );
            }

            let (active_key_id, active_key) =
                active.ok_or(KeyRingError::MultipleOrZeroActiveKeys { count: 0 })?;

            let unknown_key_ids: Vec<Uuid> = canaries
                .iter()
                .map(|c| c.uuid)
                .filter(|id| !keys.contains_key(id))
                .collect();

            for id in &unknown_key_ids {
                warn!(key_id = %id, "Key canary does not match any configured key");
            }

            info!(
                active_key_id = %active_key_id,
                known = keys.len(),
                unknown = unknown_key_ids.len(),
                "Key ring loaded"
            );

            return Ok(Self {
                active_key_id,
                active_key,
                keys,
                unknown_key_ids,
            });
        }

        Err(KeyRingError::CanaryConflict {
            attempts: MAX_CANARY_ATTEMPTS,
        })
    }

    /// Id of the key all new ciphertext is sealed under.
    pub fn active_key_id(&self) -> Uuid {
        self.active_key_id
    }

    /// The active key.
    pub fn active_key(&self) -> &SymmetricKey {
        &self.active_key
    }

    /// Resolves a known key by id.
    pub fn key_for_id(&self, id: Uuid) -> Result<&SymmetricKey, KeyRingError> {
        self.keys
            .get(&id)
            .map(|entry| &entry.key)
            .ok_or(KeyRingError::KeyNotFound(id))
    }

    /// Ids of configured keys other than the active one, sorted.
    pub fn inactive_known_key_ids(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self
            .keys
            .keys()
            .copied()
            .filter(|id| *id != self.active_key_id)
            .collect();
        ids.sort();
        ids
    }

    /// Ids of every configured key, sorted.
    pub fn known_key_ids(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self.keys.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Ids of canaries no configured key can decrypt.
    pub fn unknown_key_ids(&self) -> &[Uuid] {
        &self.unknown_key_ids
    }

    /// Configured label of a known key.
    pub fn label_for_id(&self, id: Uuid) -> Option<&str> {
        self.keys.get(&id).map(|entry| entry.label.as_str())
    }
}

fn to_kdf_params(params: &Argon2Params) -> KdfParams {
    KdfParams {
        memory_kib: params.memory_kib,
        iterations: params.iterations,
        parallelism: params.parallelism,
    }
}

fn from_kdf_params(params: KdfParams) -> Argon2Params {
    Argon2Params {
        memory_kib: params.memory_kib,
        iterations: params.iterations,
        parallelism: params.parallelism,
    }
}

/// Returns the key of `source` if it opens `canary`.
///
/// Passphrases are derived with the cost stored on the canary. `params`
/// only applies to canaries written before the cost was recorded.
fn try_canary(
    source: &KeySourceConfig,
    raw_key: Option<&SymmetricKey>,
    canary: &CanaryRecord,
    params: &Argon2Params,
) -> Result<Option<SymmetricKey>, KeyRingError> {
    let key = match (&source.source, raw_key) {
        (KeySource::Key(_), Some(key)) => key.clone(),
        (KeySource::Passphrase(passphrase), _) => {
            if canary.salt.len() < kdf::MIN_SALT_SIZE {
                return Ok(None);
            }
            let cost = canary.kdf_params.map(from_kdf_params);
            kdf::derive_from_passphrase(passphrase, &canary.salt, cost.as_ref().unwrap_or(params))?
        },
        (KeySource::Key(_), None) => {
            return Err(KeyRingError::InvalidConfig(format!(
                "key {}: missing key material",
                source.label
            )))
        },
    };

    match aead::decrypt(key.as_bytes(), &canary.encrypted_value, &canary.nonce, None) {
        Ok(plaintext) if plaintext.as_slice() == CANARY_VALUE.as_bytes() => Ok(Some(key)),
        Ok(_) => {
            warn!(key_id = %canary.uuid, label = %source.label, "Key canary holds an unexpected value");
            Ok(None)
        },
        Err(CryptoError::AuthenticationFailed) => Ok(None),
        Err(e) => {
            warn!(key_id = %canary.uuid, error = %e, "Key canary is malformed");
            Ok(None)
        },
    }
}

/// Builds a fresh canary for `source`.
fn new_canary(
    source: &KeySourceConfig,
    raw_key: Option<&SymmetricKey>,
    params: &Argon2Params,
) -> Result<(CanaryRecord, SymmetricKey), KeyRingError> {
    let (key, salt, kdf_params) = match (&source.source, raw_key) {
        (KeySource::Key(_), Some(key)) => (key.clone(), Vec::new(), None),
        (KeySource::Passphrase(passphrase), _) => {
            let salt = random::generate_salt().to_vec();
            let key = kdf::derive_from_passphrase(passphrase, &salt, params)?;
            (key, salt, Some(to_kdf_params(params)))
        },
        (KeySource::Key(_), None) => {
            return Err(KeyRingError::InvalidConfig(format!(
                "key {}: missing key material",
                source.label
            )))
        },
    };

    let sealed = aead::encrypt(key.as_bytes(), CANARY_VALUE.as_bytes(), None)?;

    let record = CanaryRecord {
        uuid: Uuid::new_v4(),
        encrypted_value: sealed.ciphertext,
        nonce: sealed.nonce.to_vec(),
        salt,
        kdf_params,
        created_at: now_millis(),
    };

    Ok((record, key))
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
