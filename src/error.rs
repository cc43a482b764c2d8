//! Error types for the incident ledger

use std::fmt;
use thiserror::Error;

/// Why a block failed chain verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockFault {
    IndexMismatch { expected: u64, found: u64 },
    GenesisSentinel(String),
    BrokenLink { expected: String, found: String },
    HashMismatch { computed: String, stored: String },
    InsufficientWork { difficulty: usize },
    BadSignature,
}

impl fmt::Display for BlockFault {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BlockFault::IndexMismatch { expected, found } => {
                write!(f, "index {} where {} was expected", found, expected)
            }
            BlockFault::GenesisSentinel(found) => {
                write!(f, "genesis previous_hash is {:?}, not \"0\"", found)
            }
            BlockFault::BrokenLink { expected, found } => write!(
                f,
                "previous_hash {} does not match preceding hash {}",
                found, expected
            ),
            BlockFault::HashMismatch { computed, stored } => {
                write!(f, "stored hash {} but content hashes to {}", stored, computed)
            }
            BlockFault::InsufficientWork { difficulty } => {
                write!(f, "hash lacks {} leading zero digits", difficulty)
            }
            BlockFault::BadSignature => write!(f, "signature does not verify"),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    /// The signing key could not be loaded, generated or exported.
    #[error("Key error: {0}")]
    Key(String),
    #[error("Signing error: {0}")]
    Signing(String),
    #[error("Chain file not found")]
    ChainNotFound,
    #[error("Corrupt chain file: {0}")]
    CorruptChain(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid block at index {index}: {fault}")]
    InvalidBlock { index: usize, fault: BlockFault },
}

impl LedgerError {
    /// Failures after which the ledger cannot produce valid blocks.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LedgerError::Key(_) | LedgerError::Signing(_) | LedgerError::InvalidConfig(_)
        )
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, LedgerError>;
