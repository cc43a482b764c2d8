//! Signing key storage
//!
//! The private key lives in an unencrypted PKCS#1 PEM file. Every time the
//! store initializes, the public key is exported as `public_key.pem` in the
//! same directory so third parties can verify block signatures.

use crate::config::DEFAULT_KEY_BITS;
use crate::crypto::KeyPair;
use crate::error::{LedgerError, Result};
use crate::persistence::write_atomic;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const PUBLIC_KEY_FILE: &str = "public_key.pem";

#[derive(Debug, Clone)]
pub struct KeyStore {
    key_path: PathBuf,
    key_bits: usize,
}

impl KeyStore {
    pub fn new(key_path: impl Into<PathBuf>) -> Self {
        Self::with_key_bits(key_path, DEFAULT_KEY_BITS)
    }

    /// Size used only when a new key has to be generated.
    pub fn with_key_bits(key_path: impl Into<PathBuf>, key_bits: usize) -> Self {
        KeyStore {
            key_path: key_path.into(),
            key_bits,
        }
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    pub fn public_key_path(&self) -> PathBuf {
        match self.key_path.parent() {
            Some(parent) => parent.join(PUBLIC_KEY_FILE),
            None => PathBuf::from(PUBLIC_KEY_FILE),
        }
    }

    /// Loads the key file, or generates and saves a new key when it is absent.
    /// The public key is exported on both paths.
    pub fn load_or_create(&self) -> Result<KeyPair> {
        let keys = match fs::read_to_string(&self.key_path) {
            Ok(pem) => {
                let keys = KeyPair::from_pem(&pem)?;
                info!(path = %self.key_path.display(), bits = keys.bits(), "Loaded signing key");
                keys
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let keys = KeyPair::generate(self.key_bits)?;
                self.save_private_key(&keys)?;
                info!(path = %self.key_path.display(), bits = keys.bits(), "Generated new signing key");
                keys
            }
            Err(e) => {
                return Err(LedgerError::Key(format!(
                    "Failed to read {}: {}",
                    self.key_path.display(),
                    e
                )))
            }
        };

        self.export_public_key(&keys)?;
        Ok(keys)
    }

    fn save_private_key(&self, keys: &KeyPair) -> Result<()> {
        let pem = keys.private_key_pem()?;
        // Temp files are created owner-only, so the key is never world-readable.
        write_atomic(&self.key_path, pem.as_bytes()).map_err(|e| {
            LedgerError::Key(format!(
                "Failed to write {}: {}",
                self.key_path.display(),
                e
            ))
        })
    }

    pub fn export_public_key(&self, keys: &KeyPair) -> Result<PathBuf> {
        let pem = keys.public_key_pem()?;
        let path = self.public_key_path();
        write_atomic(&path, pem.as_bytes())
            .map_err(|e| LedgerError::Key(format!("Failed to export public key: {}", e)))?;
        make_world_readable(&path)?;
        info!(path = %path.display(), "Exported public key\n{}", pem);
        Ok(path)
    }
}

#[cfg(unix)]
fn make_world_readable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o644))
        .map_err(|e| LedgerError::Key(format!("Failed to set permissions on {}: {}", path.display(), e)))
}

#[cfg(not(unix))]
fn make_world_readable(_path: &Path) -> Result<()> {
    Ok(())
}
