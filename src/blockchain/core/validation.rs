use crate::blockchain::core::chain::{Block, GENESIS_PREVIOUS_HASH};
use crate::crypto::verify_signature;
use crate::error::{BlockFault, LedgerError, Result};
use crate::miner::meets_difficulty;
use rsa::RsaPublicKey;

fn invalid(index: usize, fault: BlockFault) -> LedgerError {
    LedgerError::InvalidBlock { index, fault }
}

/// Checks one block at `position` against its predecessor.
pub fn verify_block(
    block: &Block,
    position: usize,
    previous: Option<&Block>,
    difficulty: usize,
    public_key: &RsaPublicKey,
) -> Result<()> {
    if block.index != position as u64 {
        return Err(invalid(
            position,
            BlockFault::IndexMismatch {
                expected: position as u64,
                found: block.index,
            },
        ));
    }

    match previous {
        None if block.previous_hash != GENESIS_PREVIOUS_HASH => {
            return Err(invalid(
                position,
                BlockFault::GenesisSentinel(block.previous_hash.clone()),
            ));
        }
        Some(prev) if block.previous_hash != prev.hash => {
            return Err(invalid(
                position,
                BlockFault::BrokenLink {
                    expected: prev.hash.clone(),
                    found: block.previous_hash.clone(),
                },
            ));
        }
        _ => {}
    }

    let computed = block.compute_hash();
    if computed != block.hash {
        return Err(invalid(
            position,
            BlockFault::HashMismatch {
                computed,
                stored: block.hash.clone(),
            },
        ));
    }

    if !meets_difficulty(&block.hash, difficulty) {
        return Err(invalid(position, BlockFault::InsufficientWork { difficulty }));
    }

    if !verify_signature(public_key, &block.hash, &block.signature) {
        return Err(invalid(position, BlockFault::BadSignature));
    }

    Ok(())
}

/// Walks the whole chain and reports the first block that fails a check.
pub fn verify_chain(blocks: &[Block], difficulty: usize, public_key: &RsaPublicKey) -> Result<()> {
    let mut previous: Option<&Block> = None;
    for (position, block) in blocks.iter().enumerate() {
        verify_block(block, position, previous, difficulty, public_key)?;
        previous = Some(block);
    }
    Ok(())
}
