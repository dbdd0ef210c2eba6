//! Credvault CLI - Inspect the key ring, rotate keys and manage credentials.

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use credvault_credentials::{
    CredentialDataService, CredentialService, CredentialType, CredentialValue, CredentialVersion,
    StringGenerationParameters,
};
use credvault_keyring::{Encryptor, KeyRing};
use credvault_rotation::KeyRotator;
use credvault_storage_sqlite::SqliteBackend;

use crate::config::Config;

// ============================================================================
// CLI Structure
// ============================================================================

#[derive(Parser)]
#[command(name = "credvault")]
#[command(about = "Credvault - Encrypted, versioned credential store")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/credvault.toml", env = "CREDVAULT_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show active, inactive and unknown encryption keys
    Keys,
    /// Re-encrypt credentials under the active key
    Rotate {
        /// Credentials fetched per page
        #[arg(long)]
        batch_size: Option<usize>,
        /// Delete canaries of inactive keys no credential uses any more
        #[arg(long)]
        prune_canaries: bool,
    },
    /// Show a credential
    Get {
        /// Credential name
        name: String,
        /// Show every version, newest first
        #[arg(long, conflicts_with = "versions")]
        all: bool,
        /// Show the N newest versions
        #[arg(long)]
        versions: Option<usize>,
    },
    /// Store a credential
    Set {
        /// Credential name
        name: String,
        /// Credential type (value, password, json)
        #[arg(long = "type", default_value = "value")]
        credential_type: String,
        /// Credential value
        #[arg(long)]
        value: String,
        /// Write a new version if the credential exists
        #[arg(long)]
        overwrite: bool,
    },
    /// Generate a password, user, RSA or SSH credential
    Generate {
        /// Credential name
        name: String,
        /// Credential type (password, user, rsa, ssh)
        #[arg(long = "type", default_value = "password")]
        credential_type: String,
        /// Username of a user credential
        #[arg(long)]
        username: Option<String>,
        /// Password length
        #[arg(long)]
        length: Option<usize>,
        /// Leave out lowercase letters
        #[arg(long)]
        exclude_lower: bool,
        /// Leave out uppercase letters
        #[arg(long)]
        exclude_upper: bool,
        /// Leave out digits
        #[arg(long)]
        exclude_number: bool,
        /// Add special characters
        #[arg(long)]
        include_special: bool,
        /// RSA key length in bits (2048, 3072, 4096)
        #[arg(long)]
        key_length: Option<usize>,
        /// Comment appended to an SSH public key
        #[arg(long)]
        ssh_comment: Option<String>,
        /// Write a new version if the credential exists
        #[arg(long)]
        overwrite: bool,
    },
    /// Generate a new version with the stored parameters
    Regenerate {
        /// Credential name
        name: String,
    },
    /// List credential names, newest first
    Find {
        /// Names containing this fragment
        #[arg(long, conflicts_with = "path", required_unless_present = "path")]
        name_like: Option<String>,
        /// Names under this folder
        #[arg(long)]
        path: Option<String>,
    },
    /// Delete a credential and all its versions
    Delete {
        /// Credential name
        name: String,
    },
}

// ============================================================================
// Application Context
// ============================================================================

struct App {
    config: Config,
    store: SqliteBackend,
    keyring: Arc<KeyRing>,
}

impl App {
    async fn open(path: &Path) -> Result<Self> {
        let config = Config::load(path)?;

        let store = SqliteBackend::open(&config.storage.data_dir, &config.storage.database)
            .await
            .with_context(|| {
                format!(
                    "Failed to open database '{}' in {}",
                    config.storage.database,
                    config.storage.data_dir.display()
                )
            })?;
        tracing::debug!(path = %store.path().display(), "Database opened");

        let keyring = KeyRing::load(&config.encryption, &store)
            .await
            .context("Failed to load encryption keys")?;

        Ok(Self {
            config,
            store,
            keyring: Arc::new(keyring),
        })
    }

    fn data(&self) -> CredentialDataService {
        CredentialDataService::new(Arc::new(self.store.clone()), Arc::clone(&self.keyring))
    }

    fn service(&self) -> CredentialService {
        CredentialService::new(self.data(), Encryptor::new(Arc::clone(&self.keyring)))
    }
}

// ============================================================================
// Output
// ============================================================================

fn version_json(version: &CredentialVersion, encryptor: &Encryptor) -> Result<Value> {
    let value = match version.credential_type() {
        CredentialType::Value => json!(version.value(encryptor)?.as_str()),
        CredentialType::Json => Value::Object(version.json_value(encryptor)?),
        CredentialType::Password => json!(version.password(encryptor)?.as_str()),
        CredentialType::User => json!({
            "username": version.username(),
            "password": version.password(encryptor)?.as_str(),
            "password_salt": version.salt(),
        }),
        CredentialType::Certificate => json!({
            "ca": version.ca(),
            "certificate": version.certificate(),
            "private_key": version.private_key(encryptor)?.as_deref().map(String::as_str),
            "ca_name": version.ca_name(),
        }),
        CredentialType::Rsa => json!({
            "public_key": version.public_key(),
            "private_key": version.private_key(encryptor)?.as_deref().map(String::as_str),
        }),
        CredentialType::Ssh => json!({
            "public_key": version.public_key(),
            "private_key": version.private_key(encryptor)?.as_deref().map(String::as_str),
            "comment": version.ssh_comment(),
        }),
    };

    Ok(json!({
        "id": version.uuid().to_string(),
        "name": version.name().name(),
        "type": version.credential_type().as_str(),
        "version_created_at": version.version_created_at(),
        "value": value,
    }))
}

fn print_version(version: &CredentialVersion, encryptor: &Encryptor) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&version_json(version, encryptor)?)?);
    Ok(())
}

// ============================================================================
// Command Handlers
// ============================================================================

async fn cmd_keys(ctx: &App) -> Result<()> {
    let keyring = &ctx.keyring;

    let active = keyring.active_key_id();
    println!("Active key:");
    println!("  {} ({})", active, keyring.label_for_id(active).unwrap_or("?"));

    let inactive = keyring.inactive_known_key_ids();
    println!("Inactive keys:");
    if inactive.is_empty() {
        println!("  none");
    }
    for id in &inactive {
        println!("  {} ({})", id, keyring.label_for_id(*id).unwrap_or("?"));
    }

    println!("Unknown keys:");
    if keyring.unknown_key_ids().is_empty() {
        println!("  none");
    }
    for id in keyring.unknown_key_ids() {
        println!("  {}", id);
    }

    let pending = ctx.data().count_not_encrypted_by_active_key().await?;
    println!();
    println!("Credential versions not under the active key: {}", pending);

    Ok(())
}

async fn cmd_rotate(ctx: &App, batch_size: Option<usize>, prune: bool) -> Result<()> {
    let batch_size = batch_size.unwrap_or(ctx.config.rotation.batch_size);

    let mut rotator = KeyRotator::new(ctx.data()).with_batch_size(batch_size)?;
    if prune || ctx.config.rotation.prune_canaries {
        rotator = rotator.with_canary_pruning(Arc::new(ctx.store.clone()));
    }

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current page");
            let _ = cancel_tx.send(true);
        }
    });

    let report = rotator.rotate(Some(cancel_rx)).await?;

    println!("Rotated:          {}", report.rotated);
    println!("Skipped:          {}", report.skipped);
    println!("Remaining:        {}", report.remaining);
    println!("Pruned canaries:  {}", report.pruned_canaries);
    println!("Duration:         {:.2}s", report.duration.as_secs_f64());
    if report.cancelled {
        println!("Rotation was interrupted. Run it again to continue.");
    }

    Ok(())
}

async fn cmd_get(ctx: &App, name: &str, all: bool, versions: Option<usize>) -> Result<()> {
    let service = ctx.service();

    if all || versions.is_some() {
        let versions = service.get_n_versions(name, versions).await?;
        let out = versions
            .iter()
            .map(|v| version_json(v, service.encryptor()))
            .collect::<Result<Vec<_>>>()?;
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        let version = service.get(name).await?;
        print_version(&version, service.encryptor())?;
    }

    Ok(())
}

async fn cmd_set(
    ctx: &App,
    name: &str,
    credential_type: &str,
    value: String,
    overwrite: bool,
) -> Result<()> {
    let value = match credential_type.parse::<CredentialType>()? {
        CredentialType::Value => CredentialValue::Value(value),
        CredentialType::Password => CredentialValue::Password(value),
        CredentialType::Json => CredentialValue::Json(
            serde_json::from_str(&value).context("Value is not valid JSON")?,
        ),
        other => bail!("Unsupported type for set: {}. Use value, password or json", other),
    };

    let service = ctx.service();
    let version = service.set(name, value, overwrite).await?;
    print_version(&version, service.encryptor())
}

struct GenerateRequest {
    credential_type: CredentialType,
    username: Option<String>,
    params: StringGenerationParameters,
    key_length: Option<usize>,
    ssh_comment: Option<String>,
    overwrite: bool,
}

async fn cmd_generate(ctx: &App, name: &str, req: GenerateRequest) -> Result<()> {
    let service = ctx.service();
    let version = match req.credential_type {
        CredentialType::Password => {
            service
                .generate_password(name, req.params, req.overwrite)
                .await?
        },
        CredentialType::User => {
            service
                .generate_user(name, req.username, req.params, req.overwrite)
                .await?
        },
        CredentialType::Rsa => {
            service
                .generate_rsa(name, req.key_length, req.overwrite)
                .await?
        },
        CredentialType::Ssh => {
            service
                .generate_ssh(
                    name,
                    req.key_length,
                    req.ssh_comment.as_deref(),
                    req.overwrite,
                )
                .await?
        },
        other => bail!(
            "Unsupported type for generate: {}. Use password, user, rsa or ssh",
            other
        ),
    };
    print_version(&version, service.encryptor())
}

async fn cmd_regenerate(ctx: &App, name: &str) -> Result<()> {
    let service = ctx.service();
    let version = service.regenerate(name).await?;
    print_version(&version, service.encryptor())
}

async fn cmd_find(ctx: &App, name_like: Option<String>, path: Option<String>) -> Result<()> {
    let data = ctx.data();
    let found = match (name_like, path) {
        (Some(fragment), _) => data.find_containing_name(&fragment).await?,
        (None, Some(path)) => data.find_starting_with_path(&path).await?,
        (None, None) => bail!("Pass --name-like or --path"),
    };

    let out: Vec<Value> = found
        .iter()
        .map(|summary| {
            json!({
                "name": summary.name,
                "version_created_at": summary.version_created_at,
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

async fn cmd_delete(ctx: &App, name: &str) -> Result<()> {
    ctx.service().delete(name).await?;
    println!("Credential '{}' deleted", name);
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let ctx = App::open(&cli.config).await?;

    match cli.command {
        Commands::Keys => cmd_keys(&ctx).await,
        Commands::Rotate {
            batch_size,
            prune_canaries,
        } => cmd_rotate(&ctx, batch_size, prune_canaries).await,
        Commands::Get {
            name,
            all,
            versions,
        } => cmd_get(&ctx, &name, all, versions).await,
        Commands::Set {
            name,
            credential_type,
            value,
            overwrite,
        } => cmd_set(&ctx, &name, &credential_type, value, overwrite).await,
        Commands::Generate {
            name,
            credential_type,
            username,
            length,
            exclude_lower,
            exclude_upper,
            exclude_number,
            include_special,
            key_length,
            ssh_comment,
            overwrite,
        } => {
            let credential_type = credential_type.parse::<CredentialType>()?;
            // --username alone keeps selecting a user credential
            let credential_type = match (&credential_type, &username) {
                (CredentialType::Password, Some(_)) => CredentialType::User,
                _ => credential_type,
            };
            let req = GenerateRequest {
                credential_type,
                username,
                params: StringGenerationParameters {
                    length,
                    exclude_lower,
                    exclude_upper,
                    exclude_number,
                    include_special,
                },
                key_length,
                ssh_comment,
                overwrite,
            };
            cmd_generate(&ctx, &name, req).await
        },
        Commands::Regenerate { name } => cmd_regenerate(&ctx, &name).await,
        Commands::Find { name_like, path } => cmd_find(&ctx, name_like, path).await,
        Commands::Delete { name } => cmd_delete(&ctx, &name).await,
    }
}
