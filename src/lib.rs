//! # Socialchain - a small proof-of-work ledger for DID-signed records
//!
//! One node keeps a hash-linked chain of blocks and a pool of pending
//! transactions. Transactions carry arbitrary JSON and may be signed by a
//! secp256k1 identity addressed as `did:<namespace>:<pubkey>`. Nodes reconcile
//! with the longest-chain rule over a small JSON-over-TCP protocol.
//!
//! ## Layout
//! - `identity/`: key pairs, DIDs, signing and verification
//! - `core/`: transactions, blocks, proof-of-work, the chain, contracts
//! - `storage/`: the pending-transaction pool
//! - `network/`: request server, peer registry, broadcast, chain sync
//! - `state`: the shared node state the server and CLI drive
//! - `config/`: node settings from TOML and the environment
//! - `utils/`: SHA-256, timestamps, canonical JSON
//! - `cli/`: command-line parsing
//!
//! ## Hashing
//! Everything that is hashed goes through [`utils::canonical_json`]: sorted
//! keys, `", "` and `": "` separators, ASCII-only output. Two nodes that
//! agree on a value agree on its hash.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod identity;
pub mod network;
pub mod state;
pub mod storage;
pub mod utils;

pub use cli::{Command, Opt};
pub use config::NodeConfig;
pub use crate::core::{
    Block, Blockchain, ChainConfig, ChainSnapshot, ContractBook, ContractStatus,
    LocatedTransaction, NewContract, ProofOfWork, SmartContract, Transaction,
    GENESIS_PREVIOUS_HASH, MINING_REWARD, NETWORK_ADDRESS,
};
pub use error::{ChainError, Result};
pub use identity::{verify_did_signature, Identity, PublicIdentity};
pub use network::{
    process_request, send_request, ChainTransport, NetworkNode, NodeInfo, Peer, PeerRegistry,
    PeerSync, ReplacePolicy, Request, Response, Server, TcpTransport,
};
pub use state::AppState;
pub use storage::MemoryPool;
pub use utils::{canonical_json, current_timestamp, sha256_digest, sha256_hex};
