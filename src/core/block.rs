use crate::core::{ProofOfWork, Transaction};
use crate::error::Result;
use crate::utils::{canonical_json, current_timestamp, sha256_hex};
use data_encoding::HEXLOWER;
use ring::digest::{Context, SHA256};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A block is immutable once built.
///
/// There are no setters: proof-of-work produces a new value via [`Block::sealed`],
/// and deserialized blocks keep the hash they were sent with so that
/// validation can detect tampering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    index: u64,
    timestamp: f64,
    transactions: Vec<Transaction>,
    previous_hash: String,
    nonce: u64,
    hash: String,
}

impl Block {
    pub fn new(index: u64, transactions: Vec<Transaction>, previous_hash: &str) -> Result<Block> {
        Self::with_nonce_and_timestamp(index, transactions, previous_hash, 0, current_timestamp()?)
    }

    pub fn with_nonce_and_timestamp(
        index: u64,
        transactions: Vec<Transaction>,
        previous_hash: &str,
        nonce: u64,
        timestamp: f64,
    ) -> Result<Block> {
        let mut block = Block {
            index,
            timestamp,
            transactions,
            previous_hash: previous_hash.to_string(),
            nonce,
            hash: String::new(),
        };
        block.hash = block.compute_hash()?;
        Ok(block)
    }

    pub fn get_index(&self) -> u64 {
        self.index
    }

    pub fn get_timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    pub fn get_previous_hash(&self) -> &str {
        self.previous_hash.as_str()
    }

    pub fn get_nonce(&self) -> u64 {
        self.nonce
    }

    pub fn get_hash(&self) -> &str {
        self.hash.as_str()
    }

    /// SHA-256 over the canonical form of every field except `hash`.
    ///
    /// Transactions contribute their full serialized form, `tx_id` and
    /// `signature` included, so editing any of them invalidates the block.
    pub fn compute_hash(&self) -> Result<String> {
        let header = json!({
            "index": self.index,
            "timestamp": self.timestamp,
            "transactions": self.transactions_value()?,
            "previous_hash": self.previous_hash,
            "nonce": self.nonce,
        });
        Ok(sha256_hex(canonical_json(&header)?.as_bytes()))
    }

    /// `true` when the stored hash is the hash of the stored fields.
    pub fn is_self_consistent(&self) -> bool {
        matches!(self.compute_hash(), Ok(hash) if hash == self.hash)
    }

    pub fn meets_difficulty(&self, difficulty: usize) -> bool {
        ProofOfWork::meets_target(&self.hash, difficulty)
    }

    /// Same contents under another nonce, hash recomputed.
    pub fn with_nonce(&self, nonce: u64) -> Result<Block> {
        Self::with_nonce_and_timestamp(
            self.index,
            self.transactions.clone(),
            &self.previous_hash,
            nonce,
            self.timestamp,
        )
    }

    pub fn with_timestamp(&self, timestamp: f64) -> Result<Block> {
        Self::with_nonce_and_timestamp(
            self.index,
            self.transactions.clone(),
            &self.previous_hash,
            self.nonce,
            timestamp,
        )
    }

    pub fn into_transactions(self) -> Vec<Transaction> {
        self.transactions
    }

    /// Copy of this block carrying a mined nonce and its matching hash.
    pub(crate) fn sealed(&self, nonce: u64, hash: String) -> Block {
        Block {
            nonce,
            hash,
            ..self.clone()
        }
    }

    pub(crate) fn hash_template(&self) -> Result<HashTemplate> {
        // Canonical keys sort as index < nonce < previous_hash < timestamp <
        // transactions, so the nonce sits between two fixed byte strings.
        let tail = json!({
            "previous_hash": self.previous_hash,
            "timestamp": self.timestamp,
            "transactions": self.transactions_value()?,
        });
        let tail = canonical_json(&tail)?;
        Ok(HashTemplate {
            prefix: format!("{{\"index\": {}, \"nonce\": ", self.index),
            suffix: format!(", {}", &tail[1..]),
        })
    }

    fn transactions_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(&self.transactions)?)
    }
}

/// The canonical header split around the nonce.
pub(crate) struct HashTemplate {
    prefix: String,
    suffix: String,
}

impl HashTemplate {
    pub(crate) fn hash_with_nonce(&self, nonce: u64) -> String {
        let mut context = Context::new(&SHA256);
        context.update(self.prefix.as_bytes());
        context.update(nonce.to_string().as_bytes());
        context.update(self.suffix.as_bytes());
        HEXLOWER.encode(context.finish().as_ref())
    }
}
