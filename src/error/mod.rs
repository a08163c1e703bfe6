//! Error handling for the ledger
//!
//! Every fallible operation in the crate returns [`ChainError`]. Integrity
//! failures (bad hashes, broken links) are not errors: they surface as `false`
//! from validation so callers can report them without unwinding.

use std::fmt;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, ChainError>;

#[derive(Debug, Clone, PartialEq)]
pub enum ChainError {
    /// Key handling or signature errors
    Crypto(String),
    /// Network communication errors
    Network(String),
    /// Malformed transaction input
    InvalidTransaction(String),
    /// Malformed block input
    InvalidBlock(String),
    /// Configuration errors
    Config(String),
    /// Serialization/deserialization errors
    Serialization(String),
    /// File I/O errors
    Io(String),
    /// Proof-of-work search exhausted its nonce budget
    Mining(String),
    /// Mining was requested with an empty pending pool
    NothingToMine,
    /// The chain tip moved while a candidate block was being mined
    StaleCandidate { expected: String, actual: String },
    /// A shared lock was poisoned by a panicking thread
    Lock(String),
    ContractNotFound(String),
    InvalidContractState(String),
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            ChainError::Network(msg) => write!(f, "Network error: {msg}"),
            ChainError::InvalidTransaction(msg) => write!(f, "Invalid transaction: {msg}"),
            ChainError::InvalidBlock(msg) => write!(f, "Invalid block: {msg}"),
            ChainError::Config(msg) => write!(f, "Configuration error: {msg}"),
            ChainError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            ChainError::Io(msg) => write!(f, "I/O error: {msg}"),
            ChainError::Mining(msg) => write!(f, "Mining error: {msg}"),
            ChainError::NothingToMine => write!(f, "No pending transactions to mine"),
            ChainError::StaleCandidate { expected, actual } => write!(
                f,
                "Chain tip moved while mining: candidate extends {expected}, tip is {actual}"
            ),
            ChainError::Lock(msg) => write!(f, "Lock poisoned: {msg}"),
            ChainError::ContractNotFound(id) => write!(f, "Contract not found: {id}"),
            ChainError::InvalidContractState(msg) => write!(f, "Invalid contract state: {msg}"),
        }
    }
}

impl std::error::Error for ChainError {}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for ChainError {
    fn from(err: toml::de::Error) -> Self {
        ChainError::Config(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for ChainError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        ChainError::Lock(err.to_string())
    }
}
