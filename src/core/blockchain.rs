// This is the core state machine of the ledger: a hash-linked list of blocks plus
// the pool of transactions waiting to be mined.
// The only legal transitions are add_transaction, mine, add_block and replace;
// validation and snapshots are read-only.

use crate::core::{Block, ProofOfWork, Transaction, DEFAULT_DIFFICULTY, DEFAULT_MAX_NONCE};
use crate::error::{ChainError, Result};
use crate::storage::MemoryPool;
use crate::utils::current_timestamp;
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// `previous_hash` of the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Leading `'0'` hex digits every block hash must carry.
    pub difficulty: usize,
    /// Upper bound of the nonce search.
    pub max_nonce: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        ChainConfig {
            difficulty: DEFAULT_DIFFICULTY,
            max_nonce: DEFAULT_MAX_NONCE,
        }
    }
}

/// Serializable view of a chain, the unit exchanged with peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainSnapshot {
    #[serde(alias = "chain")]
    pub blocks: Vec<Block>,
    pub length: usize,
    #[serde(default)]
    pub pending_transactions: Vec<Transaction>,
}

/// A transaction found by [`Blockchain::find_transactions`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocatedTransaction {
    #[serde(flatten)]
    pub transaction: Transaction,
    /// `None` while the transaction is still pending.
    pub block_index: Option<u64>,
}

/// A block that has been assembled from the pool but not yet mined.
///
/// Its transactions are no longer pending; hand it back through
/// [`Blockchain::commit_candidate`] or [`Blockchain::abandon_candidate`].
#[derive(Debug, Clone)]
pub struct Candidate {
    block: Block,
}

impl Candidate {
    pub fn block(&self) -> &Block {
        &self.block
    }
}

#[derive(Debug, Clone)]
pub struct Blockchain {
    blocks: Vec<Block>,
    pending: MemoryPool,
    config: ChainConfig,
}

impl Blockchain {
    /// A new chain with the default difficulty and a freshly mined genesis block.
    pub fn new() -> Result<Blockchain> {
        Self::with_config(ChainConfig::default())
    }

    pub fn with_config(config: ChainConfig) -> Result<Blockchain> {
        let pow = ProofOfWork::new(config.difficulty, config.max_nonce);
        let genesis = pow.run(&Block::new(0, Vec::new(), GENESIS_PREVIOUS_HASH)?)?;
        info!("Created genesis block {}", genesis.get_hash());
        Ok(Blockchain {
            blocks: vec![genesis],
            pending: MemoryPool::new(),
            config,
        })
    }

    /// Rebuild a chain from a snapshot, trusting the stated block hashes.
    ///
    /// Call [`Blockchain::validate`] afterwards to check what was restored.
    pub fn restore(snapshot: ChainSnapshot, config: ChainConfig) -> Result<Blockchain> {
        if snapshot.blocks.is_empty() {
            return Err(ChainError::InvalidBlock(
                "Snapshot contains no blocks".to_string(),
            ));
        }
        Ok(Blockchain {
            blocks: snapshot.blocks,
            pending: MemoryPool::from_transactions(snapshot.pending_transactions),
            config,
        })
    }

    pub fn config(&self) -> ChainConfig {
        self.config
    }

    pub fn proof_of_work(&self) -> ProofOfWork {
        ProofOfWork::new(self.config.difficulty, self.config.max_nonce)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    // A chain always holds its genesis block.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn blocks(&self) -> &[Block] {
        self.blocks.as_slice()
    }

    pub fn pending(&self) -> &[Transaction] {
        self.pending.get_all()
    }

    pub fn last_block(&self) -> &Block {
        // the constructors guarantee at least the genesis block
        &self.blocks[self.blocks.len() - 1]
    }

    /// Queue a transaction for the next block.
    ///
    /// Returns the index of the block it would land in if mined next. Nothing
    /// about the transaction is validated here.
    pub fn add_transaction(&mut self, transaction: Transaction) -> usize {
        self.pending.add(transaction);
        self.blocks.len()
    }

    /// Mine every pending transaction plus a reward for `miner_id` into a new block.
    pub fn mine(&mut self, miner_id: &str) -> Result<Block> {
        let candidate = self.prepare_candidate(miner_id)?;
        match self.proof_of_work().run(candidate.block()) {
            Ok(mined) => self.commit_candidate(mined),
            Err(e) => {
                self.abandon_candidate(candidate);
                Err(e)
            }
        }
    }

    /// Drain the pool into an unmined block extending the current tip.
    pub fn prepare_candidate(&mut self, miner_id: &str) -> Result<Candidate> {
        if self.pending.is_empty() {
            return Err(ChainError::NothingToMine);
        }
        let timestamp = current_timestamp()?;
        self.pending.add(Transaction::mining_reward(miner_id));
        let transactions = self.pending.drain();
        info!(
            "Mining block {} with {} transactions for {miner_id}",
            self.blocks.len(),
            transactions.len()
        );
        let block = Block::with_nonce_and_timestamp(
            self.blocks.len() as u64,
            transactions,
            self.last_block().get_hash(),
            0,
            timestamp,
        )?;
        Ok(Candidate { block })
    }

    /// Append a mined candidate if it still extends the tip.
    ///
    /// If the chain moved on while the nonce was being searched, the block is
    /// dropped, its user transactions go back to the front of the pool and
    /// [`ChainError::StaleCandidate`] is returned.
    pub fn commit_candidate(&mut self, mined: Block) -> Result<Block> {
        let tip = self.last_block().get_hash().to_string();
        if mined.get_previous_hash() != tip || mined.get_index() != self.blocks.len() as u64 {
            warn!(
                "Discarding mined block {}: chain tip moved to {tip}",
                mined.get_hash()
            );
            let expected = mined.get_previous_hash().to_string();
            self.restore_user_transactions(mined.into_transactions());
            return Err(ChainError::StaleCandidate {
                expected,
                actual: tip,
            });
        }
        info!(
            "Successfully mined block {}: {}",
            mined.get_index(),
            mined.get_hash()
        );
        self.blocks.push(mined.clone());
        Ok(mined)
    }

    pub fn abandon_candidate(&mut self, candidate: Candidate) {
        warn!(
            "Abandoning candidate block {}",
            candidate.block.get_index()
        );
        self.restore_user_transactions(candidate.block.into_transactions());
    }

    // The candidate's own reward is always its last transaction.
    fn restore_user_transactions(&mut self, mut transactions: Vec<Transaction>) {
        transactions.pop();
        self.pending.restore_front(transactions);
    }

    /// Accept a block mined elsewhere if it extends the tip with valid work.
    ///
    /// The pending pool is left alone.
    pub fn add_block(&mut self, block: Block) -> bool {
        if block.get_previous_hash() != self.last_block().get_hash() {
            warn!(
                "Rejected block {}: previous hash does not match tip",
                block.get_hash()
            );
            return false;
        }
        if !ProofOfWork::meets_target(block.get_hash(), self.config.difficulty) {
            warn!(
                "Rejected block {}: difficulty {} not met",
                block.get_hash(),
                self.config.difficulty
            );
            return false;
        }
        if !block.is_self_consistent() {
            warn!(
                "Rejected block {}: stated hash does not match contents",
                block.get_hash()
            );
            return false;
        }
        info!("Added block {}: {}", block.get_index(), block.get_hash());
        self.blocks.push(block);
        true
    }

    /// Check hashes, links and difficulty from block 1 onward.
    pub fn validate(&self) -> bool {
        Self::validate_blocks(&self.blocks, self.config.difficulty)
    }

    /// [`Blockchain::validate`] for an arbitrary block list. Genesis is trusted.
    pub fn validate_blocks(blocks: &[Block], difficulty: usize) -> bool {
        blocks.windows(2).all(|pair| {
            let (previous, current) = (&pair[0], &pair[1]);
            current.is_self_consistent()
                && current.get_previous_hash() == previous.get_hash()
                && ProofOfWork::meets_target(current.get_hash(), difficulty)
        })
    }

    /// Swap in `blocks` wholesale if it is strictly longer than the local chain.
    ///
    /// The length check is repeated here so a chain that grew while peers were
    /// being queried is never shortened. The pending pool is kept.
    pub fn replace(&mut self, blocks: Vec<Block>) -> bool {
        if blocks.len() <= self.blocks.len() {
            info!(
                "Keeping local chain: candidate length {} is not longer than {}",
                blocks.len(),
                self.blocks.len()
            );
            return false;
        }
        info!(
            "Replacing local chain of length {} with length {}",
            self.blocks.len(),
            blocks.len()
        );
        self.blocks = blocks;
        true
    }

    pub fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            blocks: self.blocks.clone(),
            length: self.blocks.len(),
            pending_transactions: self.pending.get_all().to_vec(),
        }
    }

    /// Mined transactions matching `predicate` in chain order, then pending ones.
    pub fn find_transactions<F>(&self, predicate: F) -> Vec<LocatedTransaction>
    where
        F: Fn(&Transaction) -> bool,
    {
        let mined = self.blocks.iter().flat_map(|block| {
            block
                .get_transactions()
                .iter()
                .map(move |tx| (Some(block.get_index()), tx))
        });
        let pending = self.pending.get_all().iter().map(|tx| (None, tx));
        mined
            .chain(pending)
            .filter(|(_, tx)| predicate(tx))
            .map(|(block_index, tx)| LocatedTransaction {
                transaction: tx.clone(),
                block_index,
            })
            .collect()
    }
}
