use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use credvault_keyring::KeyRingConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub rotation: RotationConfig,
    pub encryption: KeyRingConfig,
}

#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_database")]
    pub database: String,
}

#[derive(Debug, Deserialize)]
pub struct RotationConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub prune_canaries: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database: default_database(),
        }
    }
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            prune_canaries: false,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config
            .encryption
            .validate()
            .with_context(|| format!("Invalid encryption keys in {}", path.display()))?;
        Ok(config)
    }
}

// Default functions
fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_database() -> String {
    "credvault".to_string()
}

fn default_batch_size() -> usize {
    credvault_rotation::DEFAULT_BATCH_SIZE
}
