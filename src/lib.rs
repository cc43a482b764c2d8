//! Incident ledger - a tamper-evident record of detected incidents
//!
//! Every incident becomes a block: hash-linked to its predecessor, gated by
//! proof-of-work, and signed with the ledger's RSA key. The chain is kept in
//! memory and mirrored to a JSON file.
//!
//! # Architecture
//!
//! ## Core Ledger
//! - [`blockchain`] - Block types, canonical encoding, validation and the [`Ledger`]
//!
//! ## Consensus
//! - [`miner`] - Proof-of-work mining
//!
//! ## Cryptography
//! - [`crypto`] - RSA-PSS signatures and verification
//! - [`keystore`] - Loading, generating and exporting the signing key
//!
//! ## State Management
//! - [`persistence`] - Chain file storage
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types
//!
//! ```no_run
//! use incident_ledger::{Ledger, Payload};
//! use serde_json::json;
//!
//! let ledger = Ledger::initialize("data/blockchain.json", "data/private_key.pem")?;
//! let mut payload = Payload::new();
//! payload.insert("type".into(), json!("fire_accident"));
//! let block = ledger.record(payload)?;
//! assert_eq!(block.previous_hash, ledger.chain()[0].hash);
//! # Ok::<(), incident_ledger::LedgerError>(())
//! ```

#![forbid(unsafe_code)]

// ============================================================================
// Core Ledger
// ============================================================================
pub mod blockchain;

// ============================================================================
// Consensus & Mining
// ============================================================================
pub mod miner;

// ============================================================================
// Cryptography & Security
// ============================================================================
pub mod crypto;
pub mod keystore;

// ============================================================================
// State Management
// ============================================================================
pub mod persistence;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;

pub use blockchain::{Block, BlockSkeleton, Ledger, LedgerOptions, Payload};
pub use error::{BlockFault, LedgerError, Result};
