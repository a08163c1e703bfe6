use crate::core::Block;
use crate::error::{ChainError, Result};
use log::{debug, info};

pub const DEFAULT_DIFFICULTY: usize = 4;
pub const DEFAULT_MAX_NONCE: u64 = 1 << 32;

/// Nonce search for a hash with `difficulty` leading `'0'` hex digits.
///
/// The search is bounded by `max_nonce`; running out is reported as
/// [`ChainError::Mining`] instead of spinning forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofOfWork {
    difficulty: usize,
    max_nonce: u64,
}

impl ProofOfWork {
    pub fn new(difficulty: usize, max_nonce: u64) -> ProofOfWork {
        ProofOfWork {
            difficulty,
            max_nonce,
        }
    }

    pub fn get_difficulty(&self) -> usize {
        self.difficulty
    }

    pub fn meets_target(hash: &str, difficulty: usize) -> bool {
        hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
    }

    /// Validate proof-of-work for a block: target met and hash not forged.
    pub fn validate(block: &Block, difficulty: usize) -> bool {
        Self::meets_target(block.get_hash(), difficulty) && block.is_self_consistent()
    }

    /// Mine `block`, returning a new block with the winning nonce and hash.
    pub fn run(&self, block: &Block) -> Result<Block> {
        info!(
            "Starting proof-of-work for block {} with difficulty {}",
            block.get_index(),
            self.difficulty
        );
        let template = block.hash_template()?;
        let mut nonce: u64 = 0;
        loop {
            let hash = template.hash_with_nonce(nonce);
            if Self::meets_target(&hash, self.difficulty) {
                info!("Proof-of-work completed for block {}: {hash} (nonce {nonce})", block.get_index());
                return Ok(block.sealed(nonce, hash));
            }
            if nonce >= self.max_nonce {
                break;
            }
            nonce += 1;
            if nonce % 1_000_000 == 0 {
                debug!("Proof-of-work for block {} at nonce {nonce}", block.get_index());
            }
        }
        Err(ChainError::Mining(format!(
            "No nonce up to {} satisfies difficulty {} for block {}",
            self.max_nonce,
            self.difficulty,
            block.get_index()
        )))
    }
}
