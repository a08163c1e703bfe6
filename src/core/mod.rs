//! Core ledger functionality
//!
//! Transactions, blocks, proof-of-work and the chain that ties them together,
//! plus the contract book that anchors its lifecycle events on that chain.

pub mod block;
pub mod blockchain;
pub mod contract;
pub mod proof_of_work;
pub mod transaction;

pub use block::Block;
pub use blockchain::{
    Blockchain, Candidate, ChainConfig, ChainSnapshot, LocatedTransaction, GENESIS_PREVIOUS_HASH,
};
pub use contract::{Anchored, ContractBook, ContractStatus, NewContract, SmartContract};
pub use proof_of_work::{ProofOfWork, DEFAULT_DIFFICULTY, DEFAULT_MAX_NONCE};
pub use transaction::{Transaction, MINING_REWARD, NETWORK_ADDRESS};
