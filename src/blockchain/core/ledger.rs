use crate::blockchain::core::chain::{genesis_payload, Block, BlockSkeleton, Payload, GENESIS_PREVIOUS_HASH};
use crate::blockchain::core::validation;
use crate::config::Config;
use crate::crypto::KeyPair;
use crate::error::{LedgerError, Result};
use crate::keystore::KeyStore;
use crate::miner::Miner;
use crate::persistence::{JsonFilePersistence, Persistence};
use parking_lot::{Mutex, RwLock};
use rsa::RsaPublicKey;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct LedgerOptions {
    /// Copy an unreadable chain file aside before starting over from genesis.
    pub backup_corrupt_chain: bool,
}

impl Default for LedgerOptions {
    fn default() -> Self {
        Self {
            backup_corrupt_chain: true,
        }
    }
}

/// The append-only, signed, proof-of-work gated chain of incident records.
///
/// `record` is the only mutating operation. Writers are serialized for the
/// whole mine, sign, append and persist sequence; `chain` readers only wait
/// for the append itself.
pub struct Ledger {
    keys: KeyPair,
    public_key_path: Option<PathBuf>,
    miner: Miner,
    persistence: Box<dyn Persistence>,
    options: LedgerOptions,
    writer: Mutex<()>,
    chain: RwLock<Vec<Block>>,
    persist_error: Mutex<Option<String>>,
}

impl Ledger {
    /// Opens the ledger at `chain_path` with the key at `key_path` and default settings.
    pub fn initialize(chain_path: impl AsRef<Path>, key_path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Config::default();
        config.storage.chain_file = chain_path.as_ref().to_path_buf();
        config.storage.key_file = key_path.as_ref().to_path_buf();
        Self::open(&config)
    }

    pub fn open(config: &Config) -> Result<Self> {
        config.validate()?;

        let keystore = KeyStore::with_key_bits(&config.storage.key_file, config.keys.bits);
        let keys = keystore.load_or_create()?;
        let miner = Miner::new(config.miner.difficulty, config.miner.threads)?;
        let persistence = Box::new(JsonFilePersistence::new(&config.storage.chain_file));
        let options = LedgerOptions {
            backup_corrupt_chain: config.storage.backup_corrupt_chain,
        };

        let mut ledger = Self::with_persistence(keys, persistence, miner, options)?;
        ledger.public_key_path = Some(keystore.public_key_path());
        Ok(ledger)
    }

    /// Builds a ledger over any persistence backend, loading or creating the chain.
    pub fn with_persistence(
        keys: KeyPair,
        persistence: Box<dyn Persistence>,
        miner: Miner,
        options: LedgerOptions,
    ) -> Result<Self> {
        let ledger = Ledger {
            keys,
            public_key_path: None,
            miner,
            persistence,
            options,
            writer: Mutex::new(()),
            chain: RwLock::new(Vec::new()),
            persist_error: Mutex::new(None),
        };
        ledger.load_or_reset()?;
        Ok(ledger)
    }

    fn load_or_reset(&self) -> Result<()> {
        match self.persistence.load() {
            Ok(blocks) => {
                if let Err(e) = validation::verify_chain(&blocks, self.difficulty(), self.keys.public_key()) {
                    warn!(source = %self.persistence.describe(), "Loaded chain fails verification: {}", e);
                }
                info!(source = %self.persistence.describe(), blocks = blocks.len(), "Loaded chain");
                *self.chain.write() = blocks;
                Ok(())
            }
            Err(LedgerError::ChainNotFound) => {
                info!(source = %self.persistence.describe(), "No chain found, creating genesis block");
                self.reset_to_genesis()
            }
            Err(LedgerError::CorruptChain(reason)) => {
                warn!(source = %self.persistence.describe(), "Chain is unreadable ({}), starting over from genesis", reason);
                if self.options.backup_corrupt_chain {
                    if let Some(backup) = self.persistence.quarantine()? {
                        warn!(backup = %backup.display(), "Kept a copy of the unreadable chain");
                    }
                }
                self.reset_to_genesis()
            }
            Err(e) => Err(e),
        }
    }

    fn reset_to_genesis(&self) -> Result<()> {
        let genesis = self.genesis_block()?;
        info!(hash = %genesis.hash, nonce = genesis.nonce, "Created genesis block");
        *self.chain.write() = vec![genesis];
        self.persist_logged();
        Ok(())
    }

    fn forge(&self, skeleton: BlockSkeleton) -> Result<Block> {
        let mined = self.miner.mine(&skeleton);
        let signature = self.keys.sign(&mined.hash)?;
        Ok(skeleton.seal(mined.nonce, mined.hash, signature))
    }

    /// Mines and signs a fresh genesis block. Does not touch the chain.
    pub fn genesis_block(&self) -> Result<Block> {
        self.forge(BlockSkeleton::new(0, GENESIS_PREVIOUS_HASH, genesis_payload()))
    }

    /// Appends a block carrying `payload` and returns it.
    ///
    /// A signing failure aborts the call with nothing appended. A persist
    /// failure is logged and kept in `last_persist_error`; the block stays
    /// in memory and is returned.
    pub fn record(&self, payload: Payload) -> Result<Block> {
        let _writer = self.writer.lock();

        let (index, previous_hash) = {
            let chain = self.chain.read();
            let last = chain.last().ok_or_else(|| {
                LedgerError::CorruptChain("ledger holds no genesis block".to_string())
            })?;
            let index = last.index.checked_add(1).ok_or_else(|| {
                LedgerError::CorruptChain(format!("block index {} cannot be followed", last.index))
            })?;
            (index, last.hash.clone())
        };

        let block = self.forge(BlockSkeleton::new(index, previous_hash, payload))?;
        self.chain.write().push(block.clone());
        info!(index = block.index, hash = %block.hash, nonce = block.nonce, "Recorded block");

        self.persist_logged();
        Ok(block)
    }

    /// Snapshot of the whole chain.
    pub fn chain(&self) -> Vec<Block> {
        self.chain.read().clone()
    }

    pub fn len(&self) -> usize {
        self.chain.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.read().is_empty()
    }

    pub fn last_block(&self) -> Option<Block> {
        self.chain.read().last().cloned()
    }

    /// Rewrites the stored chain in full.
    pub fn persist(&self) -> Result<()> {
        let _writer = self.writer.lock();
        let result = self.persist_unlocked();
        *self.persist_error.lock() = result.as_ref().err().map(|e| e.to_string());
        result
    }

    fn persist_unlocked(&self) -> Result<()> {
        let chain = self.chain.read();
        self.persistence.save(&chain)
    }

    fn persist_logged(&self) {
        match self.persist_unlocked() {
            Ok(()) => *self.persist_error.lock() = None,
            Err(e) => {
                error!(store = %self.persistence.describe(), "Failed to persist chain: {}", e);
                *self.persist_error.lock() = Some(e.to_string());
            }
        }
    }

    /// Set while the stored chain lags behind memory.
    pub fn last_persist_error(&self) -> Option<String> {
        self.persist_error.lock().clone()
    }

    /// Re-checks links, hashes, work and signatures of every block.
    pub fn verify_chain(&self) -> Result<()> {
        let chain = self.chain.read();
        validation::verify_chain(&chain, self.difficulty(), self.keys.public_key())
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        self.keys.public_key()
    }

    pub fn public_key_pem(&self) -> Result<String> {
        self.keys.public_key_pem()
    }

    /// Where the public key was exported, when opened from files.
    pub fn public_key_path(&self) -> Option<&Path> {
        self.public_key_path.as_deref()
    }

    pub fn difficulty(&self) -> usize {
        self.miner.difficulty()
    }
}
