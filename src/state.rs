//! Shared node state
//!
//! [`AppState`] is the one object the server and the CLI drive. It owns the
//! chain behind a single `RwLock` and is shared by `Arc`; there are no
//! process-wide globals.

use crate::config::NodeConfig;
use crate::core::{
    Anchored, Block, Blockchain, Candidate, ChainSnapshot, ContractBook, LocatedTransaction,
    NewContract, SmartContract, Transaction,
};
use crate::error::{ChainError, Result};
use crate::identity::Identity;
use crate::network::{
    ChainTransport, NetworkNode, NodeInfo, Peer, PeerSync, Request, TcpTransport,
};
use log::{info, warn};
use serde_json::Value;
use std::sync::{Arc, RwLock};
use std::thread;

pub struct AppState {
    config: NodeConfig,
    chain: RwLock<Blockchain>,
    node: NetworkNode,
    // Lock order: contracts before chain.
    contracts: RwLock<ContractBook>,
    sync: PeerSync,
}

impl AppState {
    pub fn new(config: NodeConfig) -> Result<AppState> {
        Self::with_transport(config, Arc::new(TcpTransport))
    }

    /// Build state with a custom way of fetching peer chains.
    pub fn with_transport(
        config: NodeConfig,
        transport: Arc<dyn ChainTransport>,
    ) -> Result<AppState> {
        config.validate()?;
        let (host, port) = config.host_port()?;
        let identity = Identity::generate_in(&config.did_namespace);
        let node = NetworkNode::new(&host, port, identity, config.peer_timeout());
        let chain = Blockchain::with_config(config.chain_config())?;
        let sync = PeerSync::new(
            transport,
            config.replace_policy(),
            config.peer_timeout(),
            config.sync_workers,
        );
        Ok(AppState {
            config,
            chain: RwLock::new(chain),
            node,
            contracts: RwLock::new(ContractBook::new()),
            sync,
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn node(&self) -> &NetworkNode {
        &self.node
    }

    pub fn chain_snapshot(&self) -> Result<ChainSnapshot> {
        Ok(self.chain.read()?.snapshot())
    }

    /// Queue a transaction; returns the index of the block it would land in.
    pub fn submit_transaction(&self, tx: Transaction) -> Result<usize> {
        let index = self.chain.write()?.add_transaction(tx);
        Ok(index)
    }

    /// Mine the pending pool, rewarding `miner_did` or this node.
    ///
    /// The chain lock is held only while the candidate is assembled and while
    /// it is committed; the nonce search runs on its own thread in between.
    pub fn mine_block(&self, miner_did: Option<&str>) -> Result<Block> {
        let miner = miner_did.unwrap_or_else(|| self.node.get_node_id()).to_string();
        let (candidate, pow) = {
            let mut chain = self.chain.write()?;
            (chain.prepare_candidate(&miner)?, chain.proof_of_work())
        };

        let unmined = candidate.block().clone();
        let mined = thread::Builder::new()
            .name("miner".to_string())
            .spawn(move || pow.run(&unmined))
            .map_err(ChainError::from)
            .and_then(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(ChainError::Mining("Miner thread panicked".to_string())))
            });
        let block = self.finish_mining(candidate, mined)?;

        if self.config.announce_blocks {
            self.announce(&block)?;
        }
        Ok(block)
    }

    /// Commit a mined candidate, or put its transactions back in the pool.
    fn finish_mining(&self, candidate: Candidate, mined: Result<Block>) -> Result<Block> {
        let mut chain = match self.chain.write() {
            Ok(chain) => chain,
            Err(poisoned) => {
                let message = poisoned.to_string();
                poisoned.into_inner().abandon_candidate(candidate);
                return Err(ChainError::Lock(message));
            }
        };
        match mined {
            Ok(block) => chain.commit_candidate(block),
            Err(e) => {
                chain.abandon_candidate(candidate);
                Err(e)
            }
        }
    }

    fn announce(&self, block: &Block) -> Result<()> {
        let outcomes = self.node.broadcast(&Request::AddBlock {
            block: block.clone(),
        })?;
        let delivered = outcomes.iter().filter(|o| o.result.is_ok()).count();
        info!(
            "Announced block {} to {delivered}/{} peers",
            block.get_index(),
            outcomes.len()
        );
        Ok(())
    }

    pub fn add_external_block(&self, block: Block) -> Result<bool> {
        Ok(self.chain.write()?.add_block(block))
    }

    pub fn validate_chain(&self) -> Result<bool> {
        let valid = self.chain.read()?.validate();
        if !valid {
            warn!("Local chain failed validation");
        }
        Ok(valid)
    }

    pub fn register_peer(&self, did: &str, address: &str) -> Result<()> {
        self.node.register_peer(did, address)
    }

    pub fn remove_peer(&self, did: &str) -> Result<bool> {
        self.node.remove_peer(did)
    }

    pub fn list_peers(&self) -> Result<Vec<Peer>> {
        self.node.peers()
    }

    pub fn sync_with_peers(&self) -> Result<bool> {
        let peers = self.node.peers()?;
        self.sync.sync(&self.chain, &peers)
    }

    pub fn node_info(&self) -> Result<NodeInfo> {
        self.node.info()
    }

    pub fn create_contract(&self, request: NewContract) -> Result<Anchored> {
        let mut contracts = self.contracts.write()?;
        let mut chain = self.chain.write()?;
        contracts.create(&mut chain, request)
    }

    pub fn complete_contract(
        &self,
        contract_id: &str,
        completer_did: Option<&str>,
        completion_data: Value,
    ) -> Result<Anchored> {
        let mut contracts = self.contracts.write()?;
        let mut chain = self.chain.write()?;
        contracts.complete(&mut chain, contract_id, completer_did, completion_data)
    }

    pub fn verify_contract(&self, contract_id: &str, verifier_did: Option<&str>) -> Result<Anchored> {
        let mut contracts = self.contracts.write()?;
        let mut chain = self.chain.write()?;
        contracts.verify(&mut chain, contract_id, verifier_did)
    }

    pub fn get_contract(&self, contract_id: &str) -> Result<SmartContract> {
        self.contracts
            .read()?
            .get(contract_id)
            .cloned()
            .ok_or_else(|| ChainError::ContractNotFound(contract_id.to_string()))
    }

    pub fn list_contracts(&self) -> Result<Vec<SmartContract>> {
        Ok(self.contracts.read()?.list().to_vec())
    }

    pub fn contract_transactions(&self, contract_id: &str) -> Result<Vec<LocatedTransaction>> {
        let contracts = self.contracts.read()?;
        let chain = self.chain.read()?;
        contracts.transactions(&chain, contract_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state() -> AppState {
        AppState::new(NodeConfig {
            difficulty: 1,
            ..NodeConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_mine_defaults_to_node_did() {
        let state = state();
        state
            .submit_transaction(Transaction::new("a", "b", json!({})))
            .unwrap();
        let block = state.mine_block(None).unwrap();
        let reward = &block.get_transactions()[1];
        assert!(reward.is_reward());
        assert_eq!(reward.get_recipient(), state.node().get_node_id());
        assert!(state.chain_snapshot().unwrap().pending_transactions.is_empty());
    }

    #[test]
    fn test_mine_empty_pool() {
        let state = state();
        assert_eq!(state.mine_block(Some("m")), Err(ChainError::NothingToMine));
    }

    #[test]
    fn test_failed_mining_keeps_transactions() {
        let state = state();
        state
            .submit_transaction(Transaction::new("a", "b", json!({})).with_id("t1"))
            .unwrap();
        // force the nonce search to run out
        let config = crate::core::ChainConfig {
            difficulty: 64,
            max_nonce: 3,
        };
        let snapshot = state.chain_snapshot().unwrap();
        *state.chain.write().unwrap() = Blockchain::restore(snapshot, config).unwrap();

        assert!(matches!(state.mine_block(Some("m")), Err(ChainError::Mining(_))));
        let pending = state.chain_snapshot().unwrap().pending_transactions;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].get_id(), "t1");
    }

    #[test]
    fn test_miner_error_returns_candidate_to_pool() {
        let state = state();
        state
            .submit_transaction(Transaction::new("a", "b", json!({})).with_id("t1"))
            .unwrap();
        let candidate = state.chain.write().unwrap().prepare_candidate("m").unwrap();
        assert!(state.chain_snapshot().unwrap().pending_transactions.is_empty());

        let failed = Err(ChainError::Io("could not spawn miner".to_string()));
        assert!(state.finish_mining(candidate, failed).is_err());
        let pending = state.chain_snapshot().unwrap().pending_transactions;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].get_id(), "t1");
        assert_eq!(state.chain_snapshot().unwrap().length, 1);
    }

    #[test]
    fn test_poisoned_lock_keeps_candidate_transactions() {
        let state = Arc::new(state());
        state
            .submit_transaction(Transaction::new("a", "b", json!({})).with_id("t1"))
            .unwrap();
        let candidate = state.chain.write().unwrap().prepare_candidate("m").unwrap();
        let mined = state.chain.read().unwrap().proof_of_work().run(candidate.block());

        let poisoner = Arc::clone(&state);
        let _ = thread::spawn(move || {
            let _guard = poisoner.chain.write().unwrap();
            panic!("poison the chain lock");
        })
        .join();

        assert!(matches!(
            state.finish_mining(candidate, mined),
            Err(ChainError::Lock(_))
        ));
        let chain = state.chain.read().unwrap_err().into_inner();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.pending()[0].get_id(), "t1");
    }

    #[test]
    fn test_node_identity_uses_namespace() {
        let state = AppState::new(NodeConfig {
            difficulty: 1,
            did_namespace: "testnet".to_string(),
            ..NodeConfig::default()
        })
        .unwrap();
        assert!(state.node_info().unwrap().node_id.starts_with("did:testnet:"));
    }

    #[test]
    fn test_contract_ops_anchor_on_chain() {
        let state = state();
        let anchored = state
            .create_contract(NewContract {
                creator_did: "did:socialchain:alice".to_string(),
                title: "Deliver report".to_string(),
                ..NewContract::default()
            })
            .unwrap();
        let id = anchored.contract.get_id().to_string();
        state.mine_block(Some("m")).unwrap();

        let txs = state.contract_transactions(&id).unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].block_index, Some(1));
        assert_eq!(state.list_contracts().unwrap().len(), 1);
        assert!(state.get_contract("nope").is_err());
    }
}
