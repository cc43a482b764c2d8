//! Chain persistence for the incident ledger

use crate::blockchain::Block;
use crate::error::{LedgerError, Result};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Abstraction for persistence backends. `save` always receives the whole
/// chain and must replace the stored copy atomically.
pub trait Persistence: Send + Sync {
    /// Returns `ChainNotFound` when nothing was stored yet and
    /// `CorruptChain` when stored data cannot be read back as a chain.
    fn load(&self) -> Result<Vec<Block>>;
    fn save(&self, chain: &[Block]) -> Result<()>;

    /// Sets unreadable data aside before it is overwritten.
    fn quarantine(&self) -> Result<Option<PathBuf>> {
        Ok(None)
    }

    fn describe(&self) -> String;
}

/// Writes `bytes` to a temporary sibling of `path`, syncs it, then renames it into place.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| {
        LedgerError::Io(format!("Failed to create directory {}: {}", dir.display(), e))
    })?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| {
        LedgerError::Io(format!("Failed to replace {}: {}", path.display(), e.error))
    })?;
    Ok(())
}

/// Pretty-printed JSON array, four-space indent.
pub fn encode_chain(chain: &[Block]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    chain.serialize(&mut ser)?;
    Ok(buf)
}

pub fn decode_chain(bytes: &[u8]) -> Result<Vec<Block>> {
    let chain: Vec<Block> =
        serde_json::from_slice(bytes).map_err(|e| LedgerError::CorruptChain(e.to_string()))?;
    if chain.is_empty() {
        return Err(LedgerError::CorruptChain("chain holds no blocks".to_string()));
    }
    Ok(chain)
}

/// The chain file backend.
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Persistence for JsonFilePersistence {
    fn load(&self) -> Result<Vec<Block>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LedgerError::ChainNotFound)
            }
            Err(e) => {
                return Err(LedgerError::Io(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };
        decode_chain(&bytes)
    }

    fn save(&self, chain: &[Block]) -> Result<()> {
        let bytes = encode_chain(chain)?;
        write_atomic(&self.path, &bytes)
    }

    fn quarantine(&self) -> Result<Option<PathBuf>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let stamp = chrono::Utc::now().timestamp();
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".corrupt-{}", stamp));
        let backup = self.path.with_file_name(name);
        fs::copy(&self.path, &backup).map_err(|e| {
            LedgerError::Io(format!(
                "Failed to back up {} to {}: {}",
                self.path.display(),
                backup.display(),
                e
            ))
        })?;
        Ok(Some(backup))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Simple in-memory persistence implementation useful for tests and ephemeral runs.
#[derive(Clone, Default)]
pub struct InMemoryPersistence {
    pub blocks: Arc<parking_lot::Mutex<Option<Vec<Block>>>>,
    fail_writes: Arc<AtomicBool>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chain(chain: Vec<Block>) -> Self {
        let store = Self::new();
        *store.blocks.lock() = Some(chain);
        store
    }

    /// Makes every following `save` fail until switched back.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn stored(&self) -> Option<Vec<Block>> {
        self.blocks.lock().clone()
    }
}

impl Persistence for InMemoryPersistence {
    fn load(&self) -> Result<Vec<Block>> {
        match self.blocks.lock().as_ref() {
            None => Err(LedgerError::ChainNotFound),
            Some(chain) if chain.is_empty() => {
                Err(LedgerError::CorruptChain("chain holds no blocks".to_string()))
            }
            Some(chain) => Ok(chain.clone()),
        }
    }

    fn save(&self, chain: &[Block]) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(LedgerError::Io("simulated write failure".to_string()));
        }
        *self.blocks.lock() = Some(chain.to_vec());
        Ok(())
    }

    fn describe(&self) -> String {
        "in-memory".to_string()
    }
}
