//! Ledger integration tests
//!
//! End-to-end behaviour of the chain through the public API: the reference
//! mining scenario, determinism, tamper detection and signed transactions.

use serde_json::json;
use socialchain::core::{ChainConfig, DEFAULT_MAX_NONCE};
use socialchain::{
    AppState, Block, Blockchain, ChainError, Identity, NodeConfig, ProofOfWork, Transaction,
    GENESIS_PREVIOUS_HASH,
};

fn easy_chain() -> Blockchain {
    Blockchain::with_config(ChainConfig {
        difficulty: 2,
        max_nonce: DEFAULT_MAX_NONCE,
    })
    .unwrap()
}

#[test]
fn test_reference_mining_scenario() {
    let mut chain = Blockchain::new().unwrap();
    let genesis_hash = chain.last_block().get_hash().to_string();

    let t1 = Transaction::new("A", "B", json!({"amt": 10}));
    let t2 = Transaction::new("B", "A", json!({"amt": 3}));
    assert_eq!(chain.add_transaction(t1.clone()), 1);
    assert_eq!(chain.add_transaction(t2.clone()), 1);

    let block = chain.mine("M").unwrap();

    assert_eq!(block.get_index(), 1);
    assert_eq!(block.get_previous_hash(), genesis_hash);
    assert_eq!(block.get_transactions().len(), 3);
    assert_eq!(block.get_transactions()[0], t1);
    assert_eq!(block.get_transactions()[1], t2);
    let reward = &block.get_transactions()[2];
    assert_eq!(reward.get_sender(), "NETWORK");
    assert_eq!(reward.get_recipient(), "M");
    assert_eq!(reward.get_data(), &json!({"reward": 1, "type": "mining_reward"}));
    assert!(block.get_hash().starts_with("0000"));
    assert!(chain.pending().is_empty());
    assert!(chain.validate());
}

#[test]
fn test_genesis_block() {
    let chain = easy_chain();
    let genesis = &chain.blocks()[0];
    assert_eq!(genesis.get_index(), 0);
    assert_eq!(genesis.get_previous_hash(), GENESIS_PREVIOUS_HASH);
    assert!(genesis.get_transactions().is_empty());
    assert!(genesis.meets_difficulty(2));
}

#[test]
fn test_hashes_are_deterministic() {
    let tx = Transaction::new("A", "B", json!({"b": 1, "a": [1, 2.5, "x"]})).with_id("fixed");
    let a = Block::with_nonce_and_timestamp(3, vec![tx.clone()], "prev", 9, 1700000000.25).unwrap();
    let b = Block::with_nonce_and_timestamp(3, vec![tx], "prev", 9, 1700000000.25).unwrap();
    assert_eq!(a.get_hash(), b.get_hash());
    assert_eq!(a.compute_hash().unwrap(), a.get_hash());
}

#[test]
fn test_mining_grows_chain_by_one_each_time() {
    let mut chain = easy_chain();
    for round in 1..=3 {
        for n in 0..round {
            chain.add_transaction(Transaction::new("a", "b", json!({"n": n})));
        }
        let block = chain.mine("miner").unwrap();
        assert_eq!(chain.len(), round + 1);
        assert_eq!(block.get_transactions().len(), round + 1);
        assert!(ProofOfWork::validate(&block, 2));
        assert!(chain.pending().is_empty());
    }
    assert!(chain.validate());
}

#[test]
fn test_empty_pool_is_reported() {
    let mut chain = easy_chain();
    assert_eq!(chain.mine("miner"), Err(ChainError::NothingToMine));
}

#[test]
fn test_tampered_snapshot_fails_validation() {
    let mut chain = easy_chain();
    chain.add_transaction(Transaction::new("alice", "bob", json!({"amount": 10})));
    chain.mine("miner").unwrap();
    chain.add_transaction(Transaction::new("bob", "carol", json!({"amount": 4})));
    chain.mine("miner").unwrap();

    let mut value = serde_json::to_value(chain.snapshot()).unwrap();
    value["blocks"][1]["transactions"][0]["recipient"] = json!("mallory");
    let tampered = Blockchain::restore(serde_json::from_value(value).unwrap(), chain.config())
        .unwrap();
    assert!(!tampered.validate());

    let mut value = serde_json::to_value(chain.snapshot()).unwrap();
    value["blocks"][2]["previous_hash"] = json!("f".repeat(64));
    let relinked = Blockchain::restore(serde_json::from_value(value).unwrap(), chain.config())
        .unwrap();
    assert!(!relinked.validate());
}

#[test]
fn test_signed_transaction_survives_mining() {
    let alice = Identity::generate();
    let bob = Identity::generate();
    let tx = Transaction::signed(&alice, bob.did(), json!({"post": "hello"})).unwrap();
    assert!(tx.verify_signature());

    let mut chain = easy_chain();
    chain.add_transaction(tx);
    let block = chain.mine(bob.did()).unwrap();

    let mined = &block.get_transactions()[0];
    assert_eq!(mined.get_sender(), alice.did());
    assert!(mined.verify_signature());
    let forged = Transaction::new(alice.did(), bob.did(), json!({"post": "bye"}))
        .with_signature(mined.get_signature().unwrap());
    assert!(!forged.verify_signature());
}

#[test]
fn test_concurrent_submissions_through_state() {
    let state = std::sync::Arc::new(
        AppState::new(NodeConfig {
            difficulty: 1,
            ..NodeConfig::default()
        })
        .unwrap(),
    );
    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let state = std::sync::Arc::clone(&state);
            std::thread::spawn(move || {
                for n in 0..5 {
                    let tx = Transaction::new("a", "b", json!({"worker": worker, "n": n}));
                    state.submit_transaction(tx).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let block = state.mine_block(Some("m")).unwrap();
    assert_eq!(block.get_transactions().len(), 21);
    assert!(state.validate_chain().unwrap());
    assert!(state.chain_snapshot().unwrap().pending_transactions.is_empty());
}
