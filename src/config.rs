//! Configuration management for the incident ledger

use crate::error::{LedgerError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "ledger.toml";
pub const DEFAULT_DIFFICULTY: usize = 4;
pub const DEFAULT_KEY_BITS: usize = 2048;

/// A SHA-256 hex digest has 64 characters, so no hash can carry more zeros.
pub const MAX_DIFFICULTY: usize = 64;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub miner: MinerConfig,
    #[serde(default)]
    pub keys: KeyConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_chain_file")]
    pub chain_file: PathBuf,
    #[serde(default = "default_key_file")]
    pub key_file: PathBuf,
    #[serde(default = "default_backup_corrupt_chain")]
    pub backup_corrupt_chain: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MinerConfig {
    #[serde(default = "default_difficulty")]
    pub difficulty: usize,
    #[serde(default = "default_threads")]
    pub threads: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeyConfig {
    #[serde(default = "default_key_bits")]
    pub bits: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            chain_file: default_chain_file(),
            key_file: default_key_file(),
            backup_corrupt_chain: default_backup_corrupt_chain(),
        }
    }
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
            threads: default_threads(),
        }
    }
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            bits: default_key_bits(),
        }
    }
}

impl Config {
    /// Defaults rooted at `data_dir` instead of `./data`.
    pub fn in_dir(data_dir: &Path) -> Self {
        Self {
            storage: StorageConfig {
                chain_file: data_dir.join("blockchain.json"),
                key_file: data_dir.join("private_key.pem"),
                backup_corrupt_chain: default_backup_corrupt_chain(),
            },
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage.chain_file.as_os_str().is_empty() {
            return Err(LedgerError::InvalidConfig(
                "storage.chain_file must be set".to_string(),
            ));
        }
        if self.storage.key_file.as_os_str().is_empty() {
            return Err(LedgerError::InvalidConfig(
                "storage.key_file must be set".to_string(),
            ));
        }
        if self.miner.difficulty > MAX_DIFFICULTY {
            return Err(LedgerError::InvalidConfig(format!(
                "miner.difficulty must be at most {}, got {}",
                MAX_DIFFICULTY, self.miner.difficulty
            )));
        }
        if self.miner.threads == 0 {
            return Err(LedgerError::InvalidConfig(
                "miner.threads must be at least 1".to_string(),
            ));
        }
        if self.keys.bits < 1024 {
            return Err(LedgerError::InvalidConfig(format!(
                "keys.bits must be at least 1024, got {}",
                self.keys.bits
            )));
        }
        Ok(())
    }
}

/// Loads `path` (or `ledger.toml`), falling back to defaults when the file is absent.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    let config = match fs::read_to_string(path) {
        Ok(config_str) => parse_config(&config_str)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
        Err(e) => {
            return Err(LedgerError::InvalidConfig(format!(
                "failed to read {}: {}",
                path.display(),
                e
            )))
        }
    };

    config.validate()?;
    Ok(config)
}

pub fn parse_config(config_str: &str) -> Result<Config> {
    toml::from_str(config_str).map_err(|e| LedgerError::InvalidConfig(e.to_string()))
}

fn default_chain_file() -> PathBuf {
    PathBuf::from("./data/blockchain.json")
}

fn default_key_file() -> PathBuf {
    PathBuf::from("./data/private_key.pem")
}

fn default_backup_corrupt_chain() -> bool {
    true
}

fn default_difficulty() -> usize {
    DEFAULT_DIFFICULTY
}

fn default_threads() -> usize {
    1
}

fn default_key_bits() -> usize {
    DEFAULT_KEY_BITS
}
