//! Integration tests for Credvault.
//!
//! These tests run the key ring, credential services and rotation engine
//! against a real SQLite database, restarting with different key
//! configurations the way an operator would during a key rotation.

// Allow unwrap() in tests - panics are acceptable for test assertions
#![allow(clippy::disallowed_methods)]

use std::sync::Arc;

use anyhow::{Context, Result};
use tempfile::TempDir;

use credvault_credentials::{CredentialDataService, CredentialService};
use credvault_crypto::Argon2Params;
use credvault_keyring::{Encryptor, KeyRing, KeyRingConfig, KeySource, KeySourceConfig};
use credvault_rotation::KeyRotator;
use credvault_storage_sqlite::SqliteBackend;

// ============================================================================
// Key Sources
// ============================================================================

pub const KEY_A: &str = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=";
pub const KEY_B: &str = "ISIjJCUmJygpKissLS4vMDEyMzQ1Njc4OTo7PD0+P0A=";
pub const KEY_LOST: &str = "QkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkI=";

/// A base64 key source.
pub fn raw_key(label: &str, material: &str, active: bool) -> KeySourceConfig {
    KeySourceConfig {
        label: label.into(),
        source: KeySource::Key(material.into()),
        active,
    }
}

/// A passphrase key source.
pub fn passphrase(label: &str, phrase: &str, active: bool) -> KeySourceConfig {
    KeySourceConfig {
        label: label.into(),
        source: KeySource::Passphrase(phrase.into()),
        active,
    }
}

/// Argon2 costs low enough for tests.
pub fn fast_argon2() -> Argon2Params {
    Argon2Params {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    }
}

// ============================================================================
// Test Vault
// ============================================================================

/// A database that outlives the instances booted on it.
pub struct TestVault {
    store: SqliteBackend,
    _data_dir: TempDir,
}

impl TestVault {
    /// Creates an empty database in a temporary directory.
    pub async fn create() -> Result<Self> {
        let data_dir = TempDir::new().context("Failed to create temp dir")?;
        let store = SqliteBackend::open(data_dir.path(), "credvault")
            .await
            .context("Failed to open database")?;
        Ok(Self {
            store,
            _data_dir: data_dir,
        })
    }

    /// The raw store, for inspecting rows.
    pub fn store(&self) -> &SqliteBackend {
        &self.store
    }

    /// Starts an instance configured with `keys`.
    pub async fn boot(&self, keys: Vec<KeySourceConfig>) -> Result<Instance> {
        self.boot_with_argon2(keys, fast_argon2()).await
    }

    /// Starts an instance whose new passphrase canaries use `argon2`.
    pub async fn boot_with_argon2(
        &self,
        keys: Vec<KeySourceConfig>,
        argon2: Argon2Params,
    ) -> Result<Instance> {
        let config = KeyRingConfig { keys, argon2 };
        let keyring = KeyRing::load(&config, &self.store)
            .await
            .context("Failed to load key ring")?;
        Ok(Instance {
            store: self.store.clone(),
            keyring: Arc::new(keyring),
        })
    }
}

/// One running instance: a loaded key ring over the shared store.
pub struct Instance {
    store: SqliteBackend,
    keyring: Arc<KeyRing>,
}

impl Instance {
    pub fn keyring(&self) -> &Arc<KeyRing> {
        &self.keyring
    }

    pub fn encryptor(&self) -> Encryptor {
        Encryptor::new(Arc::clone(&self.keyring))
    }

    pub fn data(&self) -> CredentialDataService {
        CredentialDataService::new(Arc::new(self.store.clone()), Arc::clone(&self.keyring))
    }

    pub fn service(&self) -> CredentialService {
        CredentialService::new(self.data(), self.encryptor())
    }

    pub fn rotator(&self, batch_size: usize) -> Result<KeyRotator> {
        Ok(KeyRotator::new(self.data()).with_batch_size(batch_size)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use credvault_credentials::{
        CredentialError, CredentialValue, CredentialType, StringGenerationParameters,
    };
    use credvault_storage::{CanaryStore, CredentialStore};
    use serde_json::json;

    async fn write_passwords(instance: &Instance, names: &[String]) {
        let service = instance.service();
        for name in names {
            service
                .set(name, CredentialValue::Password(format!("pw-{name}")), false)
                .await
                .unwrap();
        }
    }

    fn names(prefix: &str, count: usize) -> Vec<String> {
        (0..count).map(|i| format!("{prefix}/{i}")).collect()
    }

    #[tokio::test]
    async fn test_password_moves_from_a_to_b() {
        let vault = TestVault::create().await.unwrap();

        let first = vault
            .boot(vec![passphrase("a", "the old passphrase", true)])
            .await
            .unwrap();
        let key_a = first.keyring().active_key_id();
        first
            .service()
            .set("/db/password", CredentialValue::Password("hunter2".into()), false)
            .await
            .unwrap();

        let second = vault
            .boot(vec![
                passphrase("a", "the old passphrase", false),
                raw_key("b", KEY_B, true),
            ])
            .await
            .unwrap();
        let key_b = second.keyring().active_key_id();
        assert_eq!(second.keyring().inactive_known_key_ids(), vec![key_a]);

        // Readable before rotation through the inactive key.
        let before = second.service().get("/db/password").await.unwrap();
        assert_eq!(before.encryption_key_id(), key_a);
        assert_eq!(&*before.password(&second.encryptor()).unwrap(), "hunter2");

        let report = second.rotator(50).unwrap().rotate(None).await.unwrap();
        assert_eq!(report.rotated, 1);
        assert_eq!(report.remaining, 0);

        let after = second.service().get("/db/password").await.unwrap();
        assert_eq!(after.uuid(), before.uuid());
        assert_eq!(after.version_created_at(), before.version_created_at());
        assert_eq!(after.encryption_key_id(), key_b);
        assert_eq!(&*after.password(&second.encryptor()).unwrap(), "hunter2");
    }

    #[tokio::test]
    async fn test_rotation_converges_and_unknown_keys_are_untouched() {
        let vault = TestVault::create().await.unwrap();

        let lost = vault.boot(vec![raw_key("lost", KEY_LOST, true)]).await.unwrap();
        write_passwords(&lost, &names("/lost", 3)).await;

        let old = vault.boot(vec![raw_key("a", KEY_A, true)]).await.unwrap();
        write_passwords(&old, &names("/a", 7)).await;

        let current = vault
            .boot(vec![raw_key("a", KEY_A, false), raw_key("b", KEY_B, true)])
            .await
            .unwrap();
        assert_eq!(current.keyring().unknown_key_ids().len(), 1);

        let mut unknown_before = Vec::new();
        for name in names("/lost", 3) {
            unknown_before.push(vault.store().find_most_recent(&name).await.unwrap().unwrap());
        }

        let rotator = current.rotator(3).unwrap();
        let report = rotator.rotate(None).await.unwrap();
        assert_eq!(report.rotated, 7);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.remaining, 3);

        for before in &unknown_before {
            let after = vault.store().find_by_uuid(before.uuid).await.unwrap().unwrap();
            assert_eq!(&after, before);
        }

        let encryptor = current.encryptor();
        for name in names("/a", 7) {
            let version = current.service().get(&name).await.unwrap();
            assert_eq!(version.encryption_key_id(), current.keyring().active_key_id());
            assert_eq!(&*version.password(&encryptor).unwrap(), &format!("pw-{name}"));
        }

        let again = rotator.rotate(None).await.unwrap();
        assert_eq!(again.rotated, 0);
        assert_eq!(again.remaining, 3);
    }

    #[tokio::test]
    async fn test_interrupted_rotation_resumes_to_same_state() {
        let vault = TestVault::create().await.unwrap();

        let old = vault.boot(vec![raw_key("a", KEY_A, true)]).await.unwrap();
        write_passwords(&old, &names("/svc", 5)).await;

        let current = vault
            .boot(vec![raw_key("a", KEY_A, false), raw_key("b", KEY_B, true)])
            .await
            .unwrap();
        let rotator = current.rotator(2).unwrap();

        // A pass that dies after saving the first two records.
        let partial = current
            .data()
            .find_encrypted_with_available_inactive_key(None, 2)
            .await
            .unwrap();
        for version in partial {
            rotator.rotate_record(version).await;
        }
        assert_eq!(
            current.data().count_not_encrypted_by_active_key().await.unwrap(),
            3
        );

        let report = rotator.rotate(None).await.unwrap();
        assert_eq!(report.rotated, 3);
        assert_eq!(report.remaining, 0);

        let encryptor = current.encryptor();
        for name in names("/svc", 5) {
            let version = current.service().get(&name).await.unwrap();
            assert_eq!(&*version.password(&encryptor).unwrap(), &format!("pw-{name}"));
        }
    }

    #[tokio::test]
    async fn test_certificate_without_private_key() {
        let vault = TestVault::create().await.unwrap();

        let old = vault.boot(vec![raw_key("a", KEY_A, true)]).await.unwrap();
        let written = old
            .service()
            .set(
                "/tls/leaf",
                CredentialValue::Certificate {
                    ca: Some("CA PEM".into()),
                    certificate: Some("CERT PEM".into()),
                    private_key: None,
                    ca_name: None,
                },
                false,
            )
            .await
            .unwrap();
        assert!(written.encrypted_value().is_none());
        assert_eq!(written.ca(), Some("CA PEM"));
        assert_eq!(written.certificate(), Some("CERT PEM"));
        assert!(written.private_key(&old.encryptor()).unwrap().is_none());

        let current = vault
            .boot(vec![raw_key("a", KEY_A, false), raw_key("b", KEY_B, true)])
            .await
            .unwrap();
        let report = current.rotator(10).unwrap().rotate(None).await.unwrap();
        assert_eq!(report.rotated, 1);
        assert_eq!(report.remaining, 0);

        let rotated = current.service().get("/tls/leaf").await.unwrap();
        assert_eq!(rotated.encryption_key_id(), current.keyring().active_key_id());
        assert_eq!(rotated.certificate(), Some("CERT PEM"));
        assert!(rotated.private_key(&current.encryptor()).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_name_continuity_across_versions_and_rotation() {
        let vault = TestVault::create().await.unwrap();

        let old = vault.boot(vec![raw_key("a", KEY_A, true)]).await.unwrap();
        let service = old.service();
        for (i, port) in [5432, 5433, 5434].into_iter().enumerate() {
            service
                .set(
                    "/app/db",
                    CredentialValue::Json(json!({"port": port})),
                    i > 0,
                )
                .await
                .unwrap();
        }

        let current = vault
            .boot(vec![raw_key("a", KEY_A, false), raw_key("b", KEY_B, true)])
            .await
            .unwrap();
        current.rotator(2).unwrap().rotate(None).await.unwrap();

        let versions = current.service().get_all("/APP/db").await.unwrap();
        assert_eq!(versions.len(), 3);

        let name_uuid = versions[0].name().uuid();
        assert!(versions.iter().all(|v| v.name().uuid() == name_uuid));
        assert!(versions
            .windows(2)
            .all(|w| w[0].version_created_at() > w[1].version_created_at()));

        let encryptor = current.encryptor();
        let ports: Vec<_> = versions
            .iter()
            .map(|v| v.json_value(&encryptor).unwrap()["port"].clone())
            .collect();
        assert_eq!(ports, vec![json!(5434), json!(5433), json!(5432)]);
    }

    #[tokio::test]
    async fn test_type_is_immutable() {
        let vault = TestVault::create().await.unwrap();
        let instance = vault.boot(vec![raw_key("a", KEY_A, true)]).await.unwrap();
        let service = instance.service();

        let original = service
            .set("/x", CredentialValue::Value("plain".into()), false)
            .await
            .unwrap();

        let result = service
            .set("/x", CredentialValue::Password("secret".into()), true)
            .await;
        assert!(matches!(
            result,
            Err(CredentialError::TypeMismatch {
                existing: CredentialType::Value,
                requested: CredentialType::Password,
            })
        ));

        let versions = service.get_all("/x").await.unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].uuid(), original.uuid());
    }

    #[tokio::test]
    async fn test_regenerate_after_rotation_keeps_parameters() {
        let vault = TestVault::create().await.unwrap();

        let old = vault.boot(vec![raw_key("a", KEY_A, true)]).await.unwrap();
        old.service()
            .generate_password(
                "/gen",
                StringGenerationParameters {
                    length: Some(24),
                    exclude_upper: true,
                    include_special: true,
                    ..Default::default()
                },
                false,
            )
            .await
            .unwrap();

        let current = vault
            .boot(vec![raw_key("a", KEY_A, false), raw_key("b", KEY_B, true)])
            .await
            .unwrap();
        current.rotator(10).unwrap().rotate(None).await.unwrap();

        let regenerated = current.service().regenerate("/gen").await.unwrap();
        let encryptor = current.encryptor();
        let params = regenerated.generation_parameters(&encryptor).unwrap().unwrap();
        assert!(params.exclude_upper);
        assert!(params.include_special);

        let password = regenerated.password(&encryptor).unwrap();
        assert_eq!(password.chars().count(), 24);
        assert!(!password.chars().any(|c| c.is_ascii_uppercase()));
    }

    #[tokio::test]
    async fn test_restart_reuses_canaries_and_prunes_retired_key() {
        let vault = TestVault::create().await.unwrap();

        let keys = || vec![raw_key("a", KEY_A, false), raw_key("b", KEY_B, true)];
        vault.boot(vec![raw_key("a", KEY_A, true)]).await.unwrap();
        let first = vault.boot(keys()).await.unwrap();
        let second = vault.boot(keys()).await.unwrap();

        assert_eq!(
            first.keyring().active_key_id(),
            second.keyring().active_key_id()
        );
        assert_eq!(vault.store().list_canaries().await.unwrap().len(), 2);

        let report = KeyRotator::new(second.data())
            .with_canary_pruning(Arc::new(vault.store().clone()))
            .rotate(None)
            .await
            .unwrap();
        assert_eq!(report.pruned_canaries, 1);

        let canaries = vault.store().list_canaries().await.unwrap();
        assert_eq!(canaries.len(), 1);
        assert_eq!(canaries[0].uuid, second.keyring().active_key_id());
    }

    #[tokio::test]
    async fn test_boot_without_active_key_fails() {
        let vault = TestVault::create().await.unwrap();

        let result = vault
            .boot(vec![raw_key("a", KEY_A, false), raw_key("b", KEY_B, false)])
            .await;
        assert!(result.is_err());
        assert!(vault.store().list_canaries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_passphrase_data_survives_argon2_cost_change() {
        let vault = TestVault::create().await.unwrap();
        let keys = || vec![passphrase("ops", "correct horse battery staple", true)];

        let before = vault.boot(keys()).await.unwrap();
        before
            .service()
            .set("/db/password", CredentialValue::Password("s3cret".into()), false)
            .await
            .unwrap();

        let mut stronger = fast_argon2();
        stronger.iterations = 2;
        stronger.memory_kib = 2048;
        let after = vault.boot_with_argon2(keys(), stronger).await.unwrap();

        assert_eq!(after.keyring().active_key_id(), before.keyring().active_key_id());
        assert!(after.keyring().unknown_key_ids().is_empty());
        assert_eq!(vault.store().list_canaries().await.unwrap().len(), 1);

        let version = after.service().get("/db/password").await.unwrap();
        assert_eq!(&*version.password(&after.encryptor()).unwrap(), "s3cret");
    }

    #[tokio::test]
    async fn test_ssh_key_rotates_and_regenerates() {
        let vault = TestVault::create().await.unwrap();

        let old = vault.boot(vec![raw_key("a", KEY_A, true)]).await.unwrap();
        let generated = old
            .service()
            .generate_ssh("/deploy/key", None, Some("deploy@ci"), false)
            .await
            .unwrap();
        let private_key = generated
            .private_key(&old.encryptor())
            .unwrap()
            .unwrap()
            .to_string();

        let new = vault
            .boot(vec![raw_key("a", KEY_A, false), raw_key("b", KEY_B, true)])
            .await
            .unwrap();
        let report = new.rotator(10).unwrap().rotate(None).await.unwrap();
        assert_eq!(report.rotated, 1);

        let service = new.service();
        let rotated = service.get("/deploy/key").await.unwrap();
        assert_eq!(rotated.uuid(), generated.uuid());
        assert_eq!(rotated.encryption_key_id(), new.keyring().active_key_id());
        assert_eq!(rotated.public_key(), generated.public_key());
        assert_eq!(
            rotated.private_key(service.encryptor()).unwrap().as_deref().map(String::as_str),
            Some(private_key.as_str())
        );

        let regenerated = service.regenerate("/deploy/key").await.unwrap();
        assert_ne!(regenerated.public_key(), generated.public_key());
        assert_eq!(regenerated.ssh_comment(), Some("deploy@ci"));
        assert_eq!(regenerated.name().uuid(), generated.name().uuid());
    }

    #[tokio::test]
    async fn test_find_by_path_and_fragment() {
        let vault = TestVault::create().await.unwrap();
        let instance = vault.boot(vec![raw_key("a", KEY_A, true)]).await.unwrap();
        let service = instance.service();

        for name in ["/team/db/password", "/team/api-token", "/teamwork/db"] {
            service
                .set(name, CredentialValue::Value("x".into()), false)
                .await
                .unwrap();
        }

        let mut under_team: Vec<String> = instance
            .data()
            .find_starting_with_path("team")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        under_team.sort();
        assert_eq!(under_team, vec!["/team/api-token", "/team/db/password"]);

        let with_db = instance.data().find_containing_name("/DB").await.unwrap();
        assert_eq!(with_db.len(), 2);
    }
}
