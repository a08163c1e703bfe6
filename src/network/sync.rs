//! Longest-chain reconciliation with peers
//!
//! Every registered peer is asked for its chain; the longest one that is
//! strictly longer than ours (and, under [`ReplacePolicy::ValidateFirst`],
//! actually valid) replaces the local block list.

use crate::core::{Block, Blockchain, ChainSnapshot, GENESIS_PREVIOUS_HASH};
use crate::error::{ChainError, Result};
use crate::network::server::{send_request, Request, Response};
use crate::network::Peer;
use log::{info, warn};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Duration;

/// Fetches a peer's chain. The TCP implementation is [`TcpTransport`].
pub trait ChainTransport: Send + Sync {
    fn fetch_chain(&self, address: &str, timeout: Duration) -> Result<ChainSnapshot>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

impl ChainTransport for TcpTransport {
    fn fetch_chain(&self, address: &str, timeout: Duration) -> Result<ChainSnapshot> {
        match send_request(address, &Request::GetChain, timeout)? {
            Response::Chain { snapshot } => Ok(snapshot),
            Response::Error { message } => Err(ChainError::Network(format!(
                "Peer {address} refused chain request: {message}"
            ))),
            other => Err(ChainError::Network(format!(
                "Unexpected response from {address}: {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplacePolicy {
    /// Adopt a peer chain only after checking its length, genesis and blocks.
    ValidateFirst,
    /// Adopt the reported chain as-is.
    TrustPeer,
}

pub struct PeerSync {
    transport: Arc<dyn ChainTransport>,
    policy: ReplacePolicy,
    timeout: Duration,
    workers: usize,
}

impl PeerSync {
    pub fn new(
        transport: Arc<dyn ChainTransport>,
        policy: ReplacePolicy,
        timeout: Duration,
        workers: usize,
    ) -> PeerSync {
        PeerSync {
            transport,
            policy,
            timeout,
            workers: workers.max(1),
        }
    }

    /// Query `peers` and adopt the longest acceptable chain.
    ///
    /// Returns `true` when the local chain was replaced. Unreachable peers
    /// and rejected chains are logged and skipped.
    pub fn sync(&self, chain: &RwLock<Blockchain>, peers: &[Peer]) -> Result<bool> {
        let (local_length, difficulty) = {
            let chain = chain.read()?;
            (chain.len(), chain.config().difficulty)
        };

        let mut best: Option<(usize, Vec<Block>, &Peer)> = None;
        for (peer, fetched) in peers.iter().zip(self.fetch_all(peers)) {
            let snapshot = match fetched {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!("Skipping peer {} ({}): {e}", peer.get_did(), peer.get_addr());
                    continue;
                }
            };
            if !self.acceptable(&snapshot, difficulty) {
                warn!(
                    "Rejected chain from peer {} ({}): failed validation",
                    peer.get_did(),
                    peer.get_addr()
                );
                continue;
            }
            let best_length = best.as_ref().map_or(local_length, |(length, _, _)| *length);
            if snapshot.length > best_length {
                best = Some((snapshot.length, snapshot.blocks, peer));
            }
        }

        match best {
            Some((length, blocks, peer)) => {
                info!(
                    "Peer {} has a longer chain ({length} > {local_length})",
                    peer.get_did()
                );
                Ok(chain.write()?.replace(blocks))
            }
            None => {
                info!("Local chain of length {local_length} is the longest known");
                Ok(false)
            }
        }
    }

    // Results come back in peer order whatever order the fetches finish in.
    fn fetch_all(&self, peers: &[Peer]) -> Vec<Result<ChainSnapshot>> {
        let mut results = Vec::with_capacity(peers.len());
        for batch in peers.chunks(self.workers) {
            thread::scope(|scope| {
                let handles: Vec<_> = batch
                    .iter()
                    .map(|peer| {
                        scope.spawn(move || {
                            self.transport.fetch_chain(peer.get_addr(), self.timeout)
                        })
                    })
                    .collect();
                for handle in handles {
                    results.push(handle.join().unwrap_or_else(|_| {
                        Err(ChainError::Network("Peer fetch thread panicked".to_string()))
                    }));
                }
            });
        }
        results
    }

    fn acceptable(&self, snapshot: &ChainSnapshot, difficulty: usize) -> bool {
        match self.policy {
            ReplacePolicy::TrustPeer => true,
            ReplacePolicy::ValidateFirst => {
                let genesis_ok = snapshot.blocks.first().is_some_and(|genesis| {
                    genesis.get_index() == 0
                        && genesis.get_previous_hash() == GENESIS_PREVIOUS_HASH
                });
                snapshot.blocks.len() == snapshot.length
                    && genesis_ok
                    && Blockchain::validate_blocks(&snapshot.blocks, difficulty)
            }
        }
    }
}
