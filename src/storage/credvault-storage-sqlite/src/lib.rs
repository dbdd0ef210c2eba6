//! # Credvault Storage - SQLite Backend
//!
//! SQLite implementation of the canary and credential stores.
//!
//! Credential names are unique case-insensitively (`COLLATE NOCASE`). Every
//! version write runs in a single transaction so readers never see a
//! half-written or half-rotated version.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Executor, QueryBuilder, Row, Sqlite};
use tracing::{debug, info};
use uuid::Uuid;

use credvault_storage::{
    CanaryRecord, CanaryStore, CredentialRecord, CredentialStore, KdfParams, NameSummary,
    StorageError,
};

/// SQL schema for canaries, names and versions.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS encryption_key_canaries (
    uuid            TEXT PRIMARY KEY,
    encrypted_value BLOB NOT NULL,
    nonce           BLOB NOT NULL,
    salt            BLOB NOT NULL,
    kdf_memory_kib  INTEGER,
    kdf_iterations  INTEGER,
    kdf_parallelism INTEGER,
    created_at      INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS credential_names (
    uuid        TEXT PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE COLLATE NOCASE,
    created_at  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS credential_versions (
    uuid                            TEXT PRIMARY KEY,
    name_uuid                       TEXT NOT NULL REFERENCES credential_names (uuid),
    type                            TEXT NOT NULL,
    version_created_at              INTEGER NOT NULL,
    encryption_key_uuid             TEXT NOT NULL,
    encrypted_value                 BLOB,
    nonce                           BLOB,
    encrypted_generation_parameters BLOB,
    generation_parameters_nonce     BLOB,
    ca                              TEXT,
    certificate                     TEXT,
    ca_name                         TEXT,
    public_key                      TEXT,
    username                        TEXT,
    salt                            TEXT
);

CREATE INDEX IF NOT EXISTS idx_versions_name ON credential_versions (name_uuid, version_created_at);
CREATE INDEX IF NOT EXISTS idx_versions_key ON credential_versions (encryption_key_uuid);
CREATE INDEX IF NOT EXISTS idx_versions_ca_name ON credential_versions (ca_name);
"#;

const SELECT_CANARY: &str = r#"
SELECT uuid, encrypted_value, nonce, salt, kdf_memory_kib, kdf_iterations, kdf_parallelism,
       created_at
FROM encryption_key_canaries
"#;

const SELECT_NAME_SUMMARY: &str = r#"
SELECT n.name, MAX(v.version_created_at) AS version_created_at
FROM credential_names n
JOIN credential_versions v ON v.name_uuid = n.uuid
WHERE n.name LIKE ? ESCAPE '\'
GROUP BY n.uuid, n.name
ORDER BY version_created_at DESC, n.name
"#;

const SELECT_VERSION: &str = r#"
SELECT v.uuid, v.name_uuid, n.name, v.type, v.version_created_at, v.encryption_key_uuid,
       v.encrypted_value, v.nonce, v.encrypted_generation_parameters,
       v.generation_parameters_nonce, v.ca, v.certificate, v.ca_name, v.public_key,
       v.username, v.salt
FROM credential_versions v
JOIN credential_names n ON n.uuid = v.name_uuid
"#;

/// SQLite storage backend.
///
/// The database lives at `{base_path}/{database}.db`.
#[derive(Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl SqliteBackend {
    /// Opens or creates a SQLite database and applies the schema.
    ///
    /// # Arguments
    ///
    /// * `base_path` - Directory where the database file is stored
    /// * `database` - Database name (must match `[a-z0-9_-]+`)
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Database name is invalid
    /// - Directory cannot be created
    /// - Database connection fails
    pub async fn open(base_path: impl AsRef<Path>, database: &str) -> Result<Self, StorageError> {
        Self::validate_database_name(database)?;

        let base = base_path.as_ref();
        std::fs::create_dir_all(base)
            .map_err(|e| StorageError::Connection(format!("failed to create directory: {e}")))?;

        let db_path = base.join(format!("{database}.db"));
        let db_url = format!("sqlite:{}", db_path.display());

        debug!(database = %database, path = %db_path.display(), "Opening SQLite database");

        let options = SqliteConnectOptions::from_str(&db_url)
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let backend = Self { pool, db_path };

        backend.migrate().await?;

        info!(database = %database, "SQLite backend ready");

        Ok(backend)
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Validates that a database name is safe to use as a file name.
    ///
    /// Only allows: lowercase letters, digits, underscore, hyphen.
    fn validate_database_name(database: &str) -> Result<(), StorageError> {
        if database.is_empty() {
            return Err(StorageError::InvalidInput(
                "database name cannot be empty".into(),
            ));
        }

        if database.len() > 64 {
            return Err(StorageError::InvalidInput("database name too long".into()));
        }

        let valid = database
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');

        if !valid {
            return Err(StorageError::InvalidInput(
                "database name must match [a-z0-9_-]+".into(),
            ));
        }

        Ok(())
    }

    /// Runs database migrations.
    async fn migrate(&self) -> Result<(), StorageError> {
        debug!("Running database migrations");

        for statement in SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
            sqlx::query(statement.trim())
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Connection(format!("migration failed: {e}")))?;
        }

        debug!("Migrations complete");

        Ok(())
    }

    /// Returns the current Unix timestamp in milliseconds.
    fn now_millis() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default()
    }
}

fn query_error(e: sqlx::Error) -> StorageError {
    StorageError::Query(e.to_string())
}

fn transaction_error(e: sqlx::Error) -> StorageError {
    StorageError::Transaction(e.to_string())
}

fn parse_uuid(value: &str) -> Result<Uuid, StorageError> {
    Uuid::parse_str(value)
        .map_err(|e| StorageError::Serialization(format!("invalid uuid {value:?}: {e}")))
}

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, StorageError>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name)
        .map_err(|e| StorageError::Serialization(format!("column {name}: {e}")))
}

fn kdf_cost(row: &SqliteRow, name: &str) -> Result<Option<u32>, StorageError> {
    column::<Option<i64>>(row, name)?
        .map(|v| {
            u32::try_from(v)
                .map_err(|_| StorageError::Serialization(format!("column {name}: {v} out of range")))
        })
        .transpose()
}

fn canary_from_row(row: &SqliteRow) -> Result<CanaryRecord, StorageError> {
    let kdf_params = match (
        kdf_cost(row, "kdf_memory_kib")?,
        kdf_cost(row, "kdf_iterations")?,
        kdf_cost(row, "kdf_parallelism")?,
    ) {
        (Some(memory_kib), Some(iterations), Some(parallelism)) => Some(KdfParams {
            memory_kib,
            iterations,
            parallelism,
        }),
        _ => None,
    };

    Ok(CanaryRecord {
        uuid: parse_uuid(&column::<String>(row, "uuid")?)?,
        encrypted_value: column(row, "encrypted_value")?,
        nonce: column(row, "nonce")?,
        salt: column(row, "salt")?,
        kdf_params,
        created_at: column(row, "created_at")?,
    })
}

fn summary_from_row(row: &SqliteRow) -> Result<NameSummary, StorageError> {
    Ok(NameSummary {
        name: column(row, "name")?,
        version_created_at: column(row, "version_created_at")?,
    })
}

/// Escapes `LIKE` wildcards so `value` matches literally.
fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Replaces the encryption columns of the version `record.uuid`.
async fn update_encryption_columns<'c, E>(
    executor: E,
    record: &CredentialRecord,
) -> Result<u64, StorageError>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE credential_versions
        SET encryption_key_uuid = ?,
            encrypted_value = ?,
            nonce = ?,
            encrypted_generation_parameters = ?,
            generation_parameters_nonce = ?
        WHERE uuid = ?
        "#,
    )
    .bind(record.encryption_key_uuid.to_string())
    .bind(record.encrypted_value.as_deref())
    .bind(record.nonce.as_deref())
    .bind(record.encrypted_generation_parameters.as_deref())
    .bind(record.generation_parameters_nonce.as_deref())
    .bind(record.uuid.to_string())
    .execute(executor)
    .await
    .map_err(query_error)?;

    Ok(result.rows_affected())
}

fn record_from_row(row: &SqliteRow) -> Result<CredentialRecord, StorageError> {
    Ok(CredentialRecord {
        uuid: parse_uuid(&column::<String>(row, "uuid")?)?,
        name_uuid: parse_uuid(&column::<String>(row, "name_uuid")?)?,
        name: column(row, "name")?,
        credential_type: column(row, "type")?,
        version_created_at: Some(column(row, "version_created_at")?),
        encryption_key_uuid: parse_uuid(&column::<String>(row, "encryption_key_uuid")?)?,
        encrypted_value: column(row, "encrypted_value")?,
        nonce: column(row, "nonce")?,
        encrypted_generation_parameters: column(row, "encrypted_generation_parameters")?,
        generation_parameters_nonce: column(row, "generation_parameters_nonce")?,
        ca: column(row, "ca")?,
        certificate: column(row, "certificate")?,
        ca_name: column(row, "ca_name")?,
        public_key: column(row, "public_key")?,
        username: column(row, "username")?,
        salt: column(row, "salt")?,
    })
}

/// Appends `col IN (?, ?, ...)` binding every key id.
fn push_key_filter(builder: &mut QueryBuilder<'_, Sqlite>, column: &str, key_ids: &[Uuid]) {
    builder.push(column);
    builder.push(" IN (");
    let mut separated = builder.separated(", ");
    for id in key_ids {
        separated.push_bind(id.to_string());
    }
    separated.push_unseparated(")");
}

#[async_trait]
impl CanaryStore for SqliteBackend {
    async fn list_canaries(&self) -> Result<Vec<CanaryRecord>, StorageError> {
        let sql = format!("{SELECT_CANARY} ORDER BY created_at, uuid");

        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        rows.iter().map(canary_from_row).collect()
    }

    async fn insert_canary_if_unchanged(
        &self,
        canary: &CanaryRecord,
        expected_count: usize,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            r#"
            INSERT INTO encryption_key_canaries (
                uuid, encrypted_value, nonce, salt,
                kdf_memory_kib, kdf_iterations, kdf_parallelism, created_at
            )
            SELECT ?, ?, ?, ?, ?, ?, ?, ?
            WHERE (SELECT COUNT(*) FROM encryption_key_canaries) = ?
            "#,
        )
        .bind(canary.uuid.to_string())
        .bind(&canary.encrypted_value)
        .bind(&canary.nonce)
        .bind(&canary.salt)
        .bind(canary.kdf_params.map(|p| i64::from(p.memory_kib)))
        .bind(canary.kdf_params.map(|p| i64::from(p.iterations)))
        .bind(canary.kdf_params.map(|p| i64::from(p.parallelism)))
        .bind(canary.created_at)
        .bind(expected_count as i64)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        let inserted = result.rows_affected() == 1;
        debug!(uuid = %canary.uuid, inserted, "Conditional canary insert");

        Ok(inserted)
    }

    async fn delete_canary_if_unused(&self, uuid: Uuid) -> Result<bool, StorageError> {
        let id = uuid.to_string();
        let result = sqlx::query(
            r#"
            DELETE FROM encryption_key_canaries
            WHERE uuid = ?
              AND NOT EXISTS (
                  SELECT 1 FROM credential_versions WHERE encryption_key_uuid = ?
              )
            "#,
        )
        .bind(&id)
        .bind(&id)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl CredentialStore for SqliteBackend {
    async fn find_most_recent(
        &self,
        name: &str,
    ) -> Result<Option<CredentialRecord>, StorageError> {
        let sql = format!(
            "{SELECT_VERSION} WHERE n.name = ? ORDER BY v.version_created_at DESC LIMIT 1"
        );

        let row = sqlx::query(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn find_by_uuid(&self, uuid: Uuid) -> Result<Option<CredentialRecord>, StorageError> {
        let sql = format!("{SELECT_VERSION} WHERE v.uuid = ?");

        let row = sqlx::query(&sql)
            .bind(uuid.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn find_all_by_name(&self, name: &str) -> Result<Vec<CredentialRecord>, StorageError> {
        let sql = format!("{SELECT_VERSION} WHERE n.name = ? ORDER BY v.version_created_at DESC");

        let rows = sqlx::query(&sql)
            .bind(name)
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;

        rows.iter().map(record_from_row).collect()
    }

    async fn find_recent_by_name(
        &self,
        name: &str,
        limit: usize,
    ) -> Result<Vec<CredentialRecord>, StorageError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let sql = format!(
            "{SELECT_VERSION} WHERE n.name = ? ORDER BY v.version_created_at DESC LIMIT ?"
        );

        let rows = sqlx::query(&sql)
            .bind(name)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;

        rows.iter().map(record_from_row).collect()
    }

    async fn save(&self, record: &CredentialRecord) -> Result<CredentialRecord, StorageError> {
        let mut tx = self.pool.begin().await.map_err(transaction_error)?;

        // An existing version may only have its encryption columns replaced.
        if update_encryption_columns(&mut *tx, record).await? == 1 {
            let sql = format!("{SELECT_VERSION} WHERE v.uuid = ?");
            let row = sqlx::query(&sql)
                .bind(record.uuid.to_string())
                .fetch_one(&mut *tx)
                .await
                .map_err(query_error)?;
            let stored = record_from_row(&row)?;

            tx.commit().await.map_err(transaction_error)?;

            debug!(uuid = %record.uuid, key_id = %record.encryption_key_uuid, "Credential version re-encrypted");
            return Ok(stored);
        }

        let now = Self::now_millis();

        sqlx::query(
            "INSERT INTO credential_names (uuid, name, created_at) VALUES (?, ?, ?) ON CONFLICT (name) DO NOTHING",
        )
        .bind(record.name_uuid.to_string())
        .bind(&record.name)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        let name_row = sqlx::query("SELECT uuid, name FROM credential_names WHERE name = ?")
            .bind(&record.name)
            .fetch_one(&mut *tx)
            .await
            .map_err(query_error)?;
        let name_uuid = parse_uuid(&column::<String>(&name_row, "uuid")?)?;
        let name: String = column(&name_row, "name")?;

        // Read under the write lock taken by the name insert, so a racing
        // writer of another type cannot slip in between check and insert.
        let existing_type: Option<String> = sqlx::query_scalar(
            "SELECT type FROM credential_versions WHERE name_uuid = ? LIMIT 1",
        )
        .bind(name_uuid.to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(query_error)?;

        if let Some(existing) = existing_type {
            if existing != record.credential_type {
                debug!(name = %name, %existing, requested = %record.credential_type, "Rejected version of another type");
                return Err(StorageError::TypeMismatch {
                    existing,
                    requested: record.credential_type.clone(),
                });
            }
        }

        let latest: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(version_created_at) FROM credential_versions WHERE name_uuid = ?",
        )
        .bind(name_uuid.to_string())
        .fetch_one(&mut *tx)
        .await
        .map_err(query_error)?;

        let requested = record.version_created_at.unwrap_or(now);
        let version_created_at = match latest {
            Some(latest) => requested.max(latest + 1),
            None => requested,
        };

        sqlx::query(
            r#"
            INSERT INTO credential_versions (
                uuid, name_uuid, type, version_created_at, encryption_key_uuid,
                encrypted_value, nonce, encrypted_generation_parameters,
                generation_parameters_nonce, ca, certificate, ca_name, public_key,
                username, salt
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.uuid.to_string())
        .bind(name_uuid.to_string())
        .bind(&record.credential_type)
        .bind(version_created_at)
        .bind(record.encryption_key_uuid.to_string())
        .bind(record.encrypted_value.as_deref())
        .bind(record.nonce.as_deref())
        .bind(record.encrypted_generation_parameters.as_deref())
        .bind(record.generation_parameters_nonce.as_deref())
        .bind(record.ca.as_deref())
        .bind(record.certificate.as_deref())
        .bind(record.ca_name.as_deref())
        .bind(record.public_key.as_deref())
        .bind(record.username.as_deref())
        .bind(record.salt.as_deref())
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        tx.commit().await.map_err(transaction_error)?;

        debug!(uuid = %record.uuid, name = %name, "Credential version stored");

        Ok(CredentialRecord {
            name_uuid,
            name,
            version_created_at: Some(version_created_at),
            ..record.clone()
        })
    }

    async fn update_encryption(&self, record: &CredentialRecord) -> Result<bool, StorageError> {
        let updated = update_encryption_columns(&self.pool, record).await? == 1;
        debug!(uuid = %record.uuid, key_id = %record.encryption_key_uuid, updated, "Credential version re-encrypted");
        Ok(updated)
    }

    async fn delete(&self, name: &str) -> Result<bool, StorageError> {
        let mut tx = self.pool.begin().await.map_err(transaction_error)?;

        sqlx::query(
            "DELETE FROM credential_versions WHERE name_uuid IN (SELECT uuid FROM credential_names WHERE name = ?)",
        )
        .bind(name)
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        let result = sqlx::query("DELETE FROM credential_names WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;

        tx.commit().await.map_err(transaction_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_all_names(&self) -> Result<Vec<String>, StorageError> {
        sqlx::query_scalar("SELECT name FROM credential_names ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)
    }

    async fn find_names_containing(
        &self,
        fragment: &str,
    ) -> Result<Vec<NameSummary>, StorageError> {
        let rows = sqlx::query(SELECT_NAME_SUMMARY)
            .bind(format!("%{}%", escape_like(fragment)))
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;

        rows.iter().map(summary_from_row).collect()
    }

    async fn find_names_starting_with(
        &self,
        prefix: &str,
    ) -> Result<Vec<NameSummary>, StorageError> {
        let rows = sqlx::query(SELECT_NAME_SUMMARY)
            .bind(format!("{}%", escape_like(prefix)))
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;

        rows.iter().map(summary_from_row).collect()
    }

    async fn find_certificate_names_by_ca_name(
        &self,
        ca_name: &str,
    ) -> Result<Vec<String>, StorageError> {
        sqlx::query_scalar(
            r#"
            SELECT DISTINCT n.name
            FROM credential_versions v
            JOIN credential_names n ON n.uuid = v.name_uuid
            WHERE v.type = 'certificate' AND v.ca_name = ? COLLATE NOCASE
            ORDER BY n.name
            "#,
        )
        .bind(ca_name)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)
    }

    async fn find_encrypted_with_key_ids(
        &self,
        key_ids: &[Uuid],
        after: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<CredentialRecord>, StorageError> {
        if key_ids.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(SELECT_VERSION);
        builder.push(" WHERE ");
        push_key_filter(&mut builder, "v.encryption_key_uuid", key_ids);

        if let Some(after) = after {
            builder.push(" AND v.uuid > ");
            builder.push_bind(after.to_string());
        }

        builder.push(" ORDER BY v.uuid LIMIT ");
        builder.push_bind(limit as i64);

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;

        rows.iter().map(record_from_row).collect()
    }

    async fn count_not_encrypted_by_key(&self, key_id: Uuid) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM credential_versions WHERE encryption_key_uuid != ?",
        )
        .bind(key_id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(count as u64)
    }

    async fn count_encrypted_with_key_ids(&self, key_ids: &[Uuid]) -> Result<u64, StorageError> {
        if key_ids.is_empty() {
            return Ok(0);
        }

        let mut builder =
            QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM credential_versions WHERE ");
        push_key_filter(&mut builder, "encryption_key_uuid", key_ids);

        let count: i64 = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(query_error)?;

        Ok(count as u64)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, SqliteBackend) {
        let tmp = TempDir::new().unwrap();
        let backend = SqliteBackend::open(tmp.path(), "credvault").await.unwrap();
        (tmp, backend)
    }

    fn canary(created_at: i64) -> CanaryRecord {
        CanaryRecord {
            uuid: Uuid::new_v4(),
            encrypted_value: vec![1, 2, 3],
            nonce: vec![0; 12],
            salt: vec![9; 16],
            kdf_params: Some(KdfParams {
                memory_kib: 64,
                iterations: 3,
                parallelism: 1,
            }),
            created_at,
        }
    }

    fn value_record(name: &str, key: Uuid) -> CredentialRecord {
        let mut record = CredentialRecord::new(Uuid::new_v4(), Uuid::new_v4(), name, "value", key);
        record.encrypted_value = Some(vec![0xAA; 20]);
        record.nonce = Some(vec![0x01; 12]);
        record
    }

    #[tokio::test]
    async fn test_open_creates_db() {
        let tmp = TempDir::new().unwrap();
        let backend = SqliteBackend::open(tmp.path(), "my-store").await.unwrap();

        assert_eq!(backend.path(), tmp.path().join("my-store.db"));
        assert!(backend.path().exists());
    }

    #[tokio::test]
    async fn test_database_name_validation() {
        let tmp = TempDir::new().unwrap();

        for name in ["", "Store", "my store", "../escape", "store.db"] {
            let result = SqliteBackend::open(tmp.path(), name).await;
            assert!(
                matches!(result, Err(StorageError::InvalidInput(_))),
                "should reject database name: {name}"
            );
        }
    }

    #[tokio::test]
    async fn test_reopen_keeps_data() {
        let tmp = TempDir::new().unwrap();
        let key = Uuid::new_v4();

        {
            let backend = SqliteBackend::open(tmp.path(), "credvault").await.unwrap();
            backend.save(&value_record("/persisted", key)).await.unwrap();
        }

        let backend = SqliteBackend::open(tmp.path(), "credvault").await.unwrap();
        assert!(backend.find_most_recent("/persisted").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_conditional_canary_insert() {
        let (_tmp, backend) = setup().await;

        assert!(backend.insert_canary_if_unchanged(&canary(1), 0).await.unwrap());

        // A second writer that listed the empty set loses.
        assert!(!backend.insert_canary_if_unchanged(&canary(2), 0).await.unwrap());
        assert!(backend.insert_canary_if_unchanged(&canary(3), 1).await.unwrap());

        let canaries = backend.list_canaries().await.unwrap();
        assert_eq!(canaries.len(), 2);
        assert_eq!(canaries[0].created_at, 1);
        assert_eq!(canaries[0].salt, vec![9; 16]);
        assert_eq!(canaries[0].kdf_params.map(|p| p.iterations), Some(3));
    }

    #[tokio::test]
    async fn test_raw_key_canary_has_no_kdf_params() {
        let (_tmp, backend) = setup().await;
        let mut c = canary(1);
        c.salt = Vec::new();
        c.kdf_params = None;
        backend.insert_canary_if_unchanged(&c, 0).await.unwrap();

        assert_eq!(backend.list_canaries().await.unwrap(), vec![c]);
    }

    #[tokio::test]
    async fn test_delete_unused_canary() {
        let (_tmp, backend) = setup().await;
        let c = canary(1);
        backend.insert_canary_if_unchanged(&c, 0).await.unwrap();

        assert!(backend.delete_canary_if_unused(c.uuid).await.unwrap());
        assert!(!backend.delete_canary_if_unused(c.uuid).await.unwrap());
        assert!(backend.list_canaries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_canary_in_use_is_not_deleted() {
        let (_tmp, backend) = setup().await;
        let c = canary(1);
        backend.insert_canary_if_unchanged(&c, 0).await.unwrap();
        backend.save(&value_record("/sealed", c.uuid)).await.unwrap();

        assert!(!backend.delete_canary_if_unused(c.uuid).await.unwrap());
        assert_eq!(backend.list_canaries().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_save_and_find_most_recent() {
        let (_tmp, backend) = setup().await;
        let key = Uuid::new_v4();

        let first = backend.save(&value_record("/app/db", key)).await.unwrap();
        let mut second = value_record("/app/db", key);
        second.name_uuid = first.name_uuid;
        let second = backend.save(&second).await.unwrap();

        assert!(second.version_created_at > first.version_created_at);

        let latest = backend.find_most_recent("/app/db").await.unwrap().unwrap();
        assert_eq!(latest.uuid, second.uuid);
        assert_eq!(latest.encrypted_value, Some(vec![0xAA; 20]));
    }

    #[tokio::test]
    async fn test_name_lookup_is_case_insensitive() {
        let (_tmp, backend) = setup().await;
        let key = Uuid::new_v4();

        let first = backend.save(&value_record("/App/Db", key)).await.unwrap();
        let second = backend.save(&value_record("/app/db", key)).await.unwrap();

        // The second save reuses the stored name and its original casing.
        assert_eq!(second.name_uuid, first.name_uuid);
        assert_eq!(second.name, "/App/Db");

        let found = backend.find_most_recent("/APP/DB").await.unwrap().unwrap();
        assert_eq!(found.uuid, second.uuid);
        assert_eq!(backend.find_all_names().await.unwrap(), vec!["/App/Db"]);
    }

    #[tokio::test]
    async fn test_find_all_by_name_newest_first() {
        let (_tmp, backend) = setup().await;
        let key = Uuid::new_v4();

        let mut saved = Vec::new();
        for _ in 0..3 {
            saved.push(backend.save(&value_record("/multi", key)).await.unwrap().uuid);
        }

        let versions: Vec<Uuid> = backend
            .find_all_by_name("/multi")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.uuid)
            .collect();

        saved.reverse();
        assert_eq!(versions, saved);
    }

    #[tokio::test]
    async fn test_resave_only_replaces_encryption_columns() {
        let (_tmp, backend) = setup().await;
        let old_key = Uuid::new_v4();
        let new_key = Uuid::new_v4();

        let mut record = value_record("/rotating", old_key);
        record.username = Some("alice".into());
        let stored = backend.save(&record).await.unwrap();

        let mut rotated = stored.clone();
        rotated.encryption_key_uuid = new_key;
        rotated.encrypted_value = Some(vec![0xBB; 20]);
        rotated.nonce = Some(vec![0x02; 12]);
        rotated.username = Some("mallory".into());
        rotated.version_created_at = Some(0);

        let resaved = backend.save(&rotated).await.unwrap();

        assert_eq!(resaved.encryption_key_uuid, new_key);
        assert_eq!(resaved.encrypted_value, Some(vec![0xBB; 20]));
        assert_eq!(resaved.username.as_deref(), Some("alice"));
        assert_eq!(resaved.version_created_at, stored.version_created_at);
        assert_eq!(backend.find_all_by_name("/rotating").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_encryption_never_recreates_deleted_version() {
        let (_tmp, backend) = setup().await;
        let old_key = Uuid::new_v4();
        let new_key = Uuid::new_v4();

        let stored = backend.save(&value_record("/doomed", old_key)).await.unwrap();
        assert!(backend.delete("/doomed").await.unwrap());

        let mut rotated = stored.clone();
        rotated.encryption_key_uuid = new_key;
        rotated.encrypted_value = Some(vec![0xBB; 20]);

        assert!(!backend.update_encryption(&rotated).await.unwrap());
        assert!(backend.find_by_uuid(stored.uuid).await.unwrap().is_none());
        assert!(backend.find_most_recent("/doomed").await.unwrap().is_none());
        assert!(backend.find_all_names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_encryption_replaces_only_encryption_columns() {
        let (_tmp, backend) = setup().await;
        let new_key = Uuid::new_v4();

        let stored = backend
            .save(&value_record("/rotating", Uuid::new_v4()))
            .await
            .unwrap();

        let mut rotated = stored.clone();
        rotated.encryption_key_uuid = new_key;
        rotated.nonce = Some(vec![0x03; 12]);
        rotated.ca = Some("ignored".into());

        assert!(backend.update_encryption(&rotated).await.unwrap());

        let reread = backend.find_by_uuid(stored.uuid).await.unwrap().unwrap();
        assert_eq!(reread.encryption_key_uuid, new_key);
        assert_eq!(reread.nonce, Some(vec![0x03; 12]));
        assert_eq!(reread.ca, None);
        assert_eq!(reread.version_created_at, stored.version_created_at);
    }

    #[tokio::test]
    async fn test_save_rejects_type_change_under_existing_name() {
        let (_tmp, backend) = setup().await;
        let key = Uuid::new_v4();

        let first = backend.save(&value_record("/race", key)).await.unwrap();

        // A writer that never saw the first version brings its own name id.
        let mut other = value_record("/race", key);
        other.credential_type = "password".into();

        let result = backend.save(&other).await;
        assert!(matches!(
            result,
            Err(StorageError::TypeMismatch { ref existing, ref requested })
                if existing == "value" && requested == "password"
        ));

        let versions = backend.find_all_by_name("/race").await.unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].uuid, first.uuid);
        assert!(backend.find_by_uuid(other.uuid).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejected_type_change_leaves_no_name_behind() {
        let (_tmp, backend) = setup().await;
        let key = Uuid::new_v4();

        backend.save(&value_record("/kept", key)).await.unwrap();
        let mut other = value_record("/KEPT", key);
        other.credential_type = "json".into();
        assert!(backend.save(&other).await.is_err());

        assert_eq!(backend.find_all_names().await.unwrap(), vec!["/kept"]);
    }

    #[tokio::test]
    async fn test_find_recent_by_name_limits() {
        let (_tmp, backend) = setup().await;
        let key = Uuid::new_v4();

        let mut saved = Vec::new();
        for _ in 0..4 {
            saved.push(backend.save(&value_record("/many", key)).await.unwrap().uuid);
        }

        let recent: Vec<Uuid> = backend
            .find_recent_by_name("/MANY", 2)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.uuid)
            .collect();
        assert_eq!(recent, vec![saved[3], saved[2]]);
        assert!(backend.find_recent_by_name("/many", 0).await.unwrap().is_empty());
        assert_eq!(backend.find_recent_by_name("/many", 10).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_name_search() {
        let (_tmp, backend) = setup().await;
        let key = Uuid::new_v4();

        for (at, name) in ["/app/db/password", "/app/api_key", "/other/DB", "/appliance"]
            .into_iter()
            .enumerate()
        {
            let mut record = value_record(name, key);
            record.version_created_at = Some(1_000 * (at as i64 + 1));
            backend.save(&record).await.unwrap();
        }

        let containing: Vec<String> = backend
            .find_names_containing("db")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(containing, vec!["/other/DB", "/app/db/password"]);

        let under_app: Vec<String> = backend
            .find_names_starting_with("/APP/")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(under_app, vec!["/app/api_key", "/app/db/password"]);

        // Wildcards in the search text match literally.
        let underscore = backend.find_names_containing("_").await.unwrap();
        assert_eq!(underscore.len(), 1);
        assert_eq!(underscore[0].name, "/app/api_key");
        assert!(backend.find_names_containing("%").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_name_search_reports_newest_version() {
        let (_tmp, backend) = setup().await;
        let key = Uuid::new_v4();

        backend.save(&value_record("/svc/a", key)).await.unwrap();
        let latest = backend.save(&value_record("/svc/a", key)).await.unwrap();

        let found = backend.find_names_starting_with("/svc/").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(Some(found[0].version_created_at), latest.version_created_at);
    }

    #[tokio::test]
    async fn test_certificate_names_by_ca_name() {
        let (_tmp, backend) = setup().await;
        let key = Uuid::new_v4();

        let cert = |name: &str, ca_name: &str| {
            let mut record =
                CredentialRecord::new(Uuid::new_v4(), Uuid::new_v4(), name, "certificate", key);
            record.ca_name = Some(ca_name.into());
            record.certificate = Some("-----BEGIN CERTIFICATE-----".into());
            record
        };

        backend.save(&cert("/leaf/1", "/root-ca")).await.unwrap();
        backend.save(&cert("/leaf/1", "/root-ca")).await.unwrap();
        backend.save(&cert("/leaf/2", "/ROOT-CA")).await.unwrap();
        backend.save(&cert("/leaf/3", "/other-ca")).await.unwrap();

        assert_eq!(
            backend.find_certificate_names_by_ca_name("/root-ca").await.unwrap(),
            vec!["/leaf/1", "/leaf/2"]
        );
        assert!(backend
            .find_certificate_names_by_ca_name("/missing")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_all_versions() {
        let (_tmp, backend) = setup().await;
        let key = Uuid::new_v4();

        let first = backend.save(&value_record("/gone", key)).await.unwrap();
        backend.save(&value_record("/gone", key)).await.unwrap();
        backend.save(&value_record("/kept", key)).await.unwrap();

        assert!(backend.delete("/GONE").await.unwrap());
        assert!(!backend.delete("/gone").await.unwrap());

        assert!(backend.find_most_recent("/gone").await.unwrap().is_none());
        assert!(backend.find_by_uuid(first.uuid).await.unwrap().is_none());
        assert!(backend.find_most_recent("/kept").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_find_encrypted_with_key_ids_pages_by_uuid() {
        let (_tmp, backend) = setup().await;
        let inactive = Uuid::new_v4();
        let active = Uuid::new_v4();

        for i in 0..5 {
            backend
                .save(&value_record(&format!("/old/{i}"), inactive))
                .await
                .unwrap();
        }
        backend.save(&value_record("/new", active)).await.unwrap();

        let first = backend
            .find_encrypted_with_key_ids(&[inactive], None, 3)
            .await
            .unwrap();
        assert_eq!(first.len(), 3);
        assert!(first.windows(2).all(|w| w[0].uuid < w[1].uuid));

        let cursor = first.last().map(|r| r.uuid);
        let second = backend
            .find_encrypted_with_key_ids(&[inactive], cursor, 3)
            .await
            .unwrap();
        assert_eq!(second.len(), 2);
        assert!(second.iter().all(|r| r.encryption_key_uuid == inactive));
        assert!(second[0].uuid > first[2].uuid);

        assert!(backend
            .find_encrypted_with_key_ids(&[], None, 3)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_counts_by_key() {
        let (_tmp, backend) = setup().await;
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        backend.save(&value_record("/a1", a)).await.unwrap();
        backend.save(&value_record("/a2", a)).await.unwrap();
        backend.save(&value_record("/b1", b)).await.unwrap();
        backend.save(&value_record("/c1", c)).await.unwrap();

        assert_eq!(backend.count_not_encrypted_by_key(c).await.unwrap(), 3);
        assert_eq!(backend.count_encrypted_with_key_ids(&[a, b]).await.unwrap(), 3);
        assert_eq!(backend.count_encrypted_with_key_ids(&[]).await.unwrap(), 0);
    }
}
