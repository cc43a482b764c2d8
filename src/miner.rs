//! Proof-of-work mining
//!
//! A block is acceptable once the hex SHA-256 of its canonical bytes starts
//! with `difficulty` `'0'` characters. The search starts at nonce 0 and is
//! unbounded; expect about `16^difficulty` attempts.

use crate::blockchain::core::chain::BlockSkeleton;
use crate::blockchain::core::codec::CanonicalTemplate;
use crate::config::MAX_DIFFICULTY;
use crate::error::{LedgerError, Result};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use sha2::{Digest, Sha256};
use std::time::Instant;
use tracing::debug;

/// Nonces handed to each worker per parallel round.
const BATCH_PER_THREAD: u64 = 1 << 14;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mined {
    pub nonce: u64,
    pub hash: String,
    /// Candidates up to and including the winning nonce.
    pub attempts: u64,
}

pub fn meets_difficulty(hash_hex: &str, difficulty: usize) -> bool {
    hash_hex.len() >= difficulty && hash_hex.bytes().take(difficulty).all(|b| b == b'0')
}

fn digest_meets_difficulty(digest: &[u8], difficulty: usize) -> bool {
    let full_bytes = difficulty / 2;
    if digest.len() < full_bytes + difficulty % 2 {
        return false;
    }
    if digest[..full_bytes].iter().any(|b| *b != 0) {
        return false;
    }
    difficulty % 2 == 0 || digest[full_bytes] >> 4 == 0
}

pub fn expected_attempts(difficulty: usize) -> f64 {
    16f64.powi(difficulty as i32)
}

fn digest_for(template: &CanonicalTemplate, base: &Sha256, nonce: u64) -> [u8; 32] {
    let mut hasher = base.clone();
    hasher.update(nonce.to_string().as_bytes());
    hasher.update(template.suffix());
    hasher.finalize().into()
}

/// Sequential search from nonce 0. The skeleton's own nonce is ignored.
pub fn mine(skeleton: &BlockSkeleton, difficulty: usize) -> Mined {
    let template = skeleton.template();
    let base = template.prefix_hasher();
    let mut nonce: u64 = 0;
    loop {
        let digest = digest_for(&template, &base, nonce);
        if digest_meets_difficulty(&digest, difficulty) {
            return Mined {
                nonce,
                hash: hex::encode(digest),
                attempts: nonce + 1,
            };
        }
        nonce += 1;
    }
}

/// Proof-of-work engine with a fixed difficulty and optional worker pool.
pub struct Miner {
    difficulty: usize,
    pool: Option<ThreadPool>,
}

impl Miner {
    pub fn new(difficulty: usize, threads: usize) -> Result<Self> {
        if difficulty > MAX_DIFFICULTY {
            return Err(LedgerError::InvalidConfig(format!(
                "difficulty {} can never be met by a 64-digit hash",
                difficulty
            )));
        }
        if threads == 0 {
            return Err(LedgerError::InvalidConfig(
                "miner needs at least one thread".to_string(),
            ));
        }

        let pool = if threads > 1 {
            let pool = ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("ledger-miner-{}", i))
                .build()
                .map_err(|e| {
                    LedgerError::InvalidConfig(format!("Failed to start mining pool: {}", e))
                })?;
            Some(pool)
        } else {
            None
        };

        Ok(Miner { difficulty, pool })
    }

    pub fn sequential(difficulty: usize) -> Result<Self> {
        Self::new(difficulty, 1)
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    pub fn threads(&self) -> usize {
        self.pool.as_ref().map_or(1, |pool| pool.current_num_threads())
    }

    /// Blocks until a nonce is found. Parallel and sequential runs return
    /// the same nonce.
    pub fn mine(&self, skeleton: &BlockSkeleton) -> Mined {
        let started = Instant::now();
        let mined = match &self.pool {
            Some(pool) => self.mine_parallel(pool, skeleton),
            None => mine(skeleton, self.difficulty),
        };
        debug!(
            index = skeleton.index,
            nonce = mined.nonce,
            attempts = mined.attempts,
            expected = expected_attempts(self.difficulty),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "mined block"
        );
        mined
    }

    fn mine_parallel(&self, pool: &ThreadPool, skeleton: &BlockSkeleton) -> Mined {
        let template = skeleton.template();
        let base = template.prefix_hasher();
        let difficulty = self.difficulty;
        let batch = BATCH_PER_THREAD * pool.current_num_threads() as u64;

        let mut start: u64 = 0;
        loop {
            let end = start.saturating_add(batch);
            // find_first keeps the lowest qualifying nonce of the batch.
            let found = pool.install(|| {
                (start..end).into_par_iter().find_first(|&nonce| {
                    digest_meets_difficulty(&digest_for(&template, &base, nonce), difficulty)
                })
            });
            if let Some(nonce) = found {
                let digest = digest_for(&template, &base, nonce);
                return Mined {
                    nonce,
                    hash: hex::encode(digest),
                    attempts: nonce + 1,
                };
            }
            start = end;
        }
    }
}

impl std::fmt::Debug for Miner {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Miner")
            .field("difficulty", &self.difficulty)
            .field("threads", &self.threads())
            .finish()
    }
}
