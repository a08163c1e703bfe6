//! Network integration tests
//!
//! Peer sync against an in-memory transport, and real loopback servers for
//! the TCP request path.

use serde_json::json;
use socialchain::core::{ChainConfig, DEFAULT_MAX_NONCE};
use socialchain::{
    send_request, AppState, Blockchain, ChainError, ChainSnapshot, ChainTransport, NodeConfig,
    Request, Response, Result, Server, TcpTransport, Transaction,
};
use std::collections::HashMap;
use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

/// Serves fixed snapshots by address; unknown addresses are unreachable.
struct MapTransport {
    chains: HashMap<String, ChainSnapshot>,
}

impl ChainTransport for MapTransport {
    fn fetch_chain(&self, address: &str, _timeout: Duration) -> Result<ChainSnapshot> {
        self.chains
            .get(address)
            .cloned()
            .ok_or_else(|| ChainError::Network(format!("connection to {address} refused")))
    }
}

fn test_config(validate_before_replace: bool) -> NodeConfig {
    NodeConfig {
        difficulty: 1,
        validate_before_replace,
        ..NodeConfig::default()
    }
}

fn chain_of(length: usize) -> Blockchain {
    let mut chain = Blockchain::with_config(ChainConfig {
        difficulty: 1,
        max_nonce: DEFAULT_MAX_NONCE,
    })
    .unwrap();
    while chain.len() < length {
        chain.add_transaction(Transaction::new("a", "b", json!({"height": chain.len()})));
        chain.mine("peer-miner").unwrap();
    }
    chain
}

fn forged_snapshot(length: usize) -> ChainSnapshot {
    let mut value = serde_json::to_value(chain_of(length).snapshot()).unwrap();
    value["blocks"][2]["transactions"][0]["data"] = json!({"height": 999});
    serde_json::from_value(value).unwrap()
}

fn state_with_peers(
    validate_before_replace: bool,
    peers: Vec<(&str, ChainSnapshot)>,
) -> AppState {
    let transport = MapTransport {
        chains: peers
            .iter()
            .map(|(addr, snapshot)| (addr.to_string(), snapshot.clone()))
            .collect(),
    };
    let state =
        AppState::with_transport(test_config(validate_before_replace), Arc::new(transport))
            .unwrap();
    for (addr, _) in &peers {
        state
            .register_peer(&format!("did:socialchain:{addr}"), addr)
            .unwrap();
    }
    state
}

fn grow(state: &AppState, length: usize) {
    while state.chain_snapshot().unwrap().length < length {
        state
            .submit_transaction(Transaction::new("x", "y", json!({})))
            .unwrap();
        state.mine_block(Some("local")).unwrap();
    }
}

#[test]
fn test_longer_peer_chain_replaces_local() {
    let peer = chain_of(5);
    let state = state_with_peers(true, vec![("peer-a", peer.snapshot())]);
    grow(&state, 3);
    state
        .submit_transaction(Transaction::new("x", "y", json!({"keep": true})))
        .unwrap();

    assert!(state.sync_with_peers().unwrap());
    let snapshot = state.chain_snapshot().unwrap();
    assert_eq!(snapshot.length, 5);
    assert_eq!(snapshot.blocks, peer.blocks());
    // the pending pool survives a replacement
    assert_eq!(snapshot.pending_transactions.len(), 1);
}

#[test]
fn test_equal_length_peer_is_ignored() {
    let state = state_with_peers(true, vec![("peer-a", chain_of(3).snapshot())]);
    grow(&state, 3);
    let before = state.chain_snapshot().unwrap();

    assert!(!state.sync_with_peers().unwrap());
    assert_eq!(state.chain_snapshot().unwrap().blocks, before.blocks);
}

#[test]
fn test_unreachable_peer_does_not_abort_sync() {
    let state = state_with_peers(true, vec![("peer-b", chain_of(4).snapshot())]);
    state.register_peer("did:socialchain:gone", "gone").unwrap();
    state.register_peer("did:socialchain:also-gone", "also-gone").unwrap();

    assert!(state.sync_with_peers().unwrap());
    assert_eq!(state.chain_snapshot().unwrap().length, 4);
}

#[test]
fn test_first_of_equally_long_peers_wins() {
    let first = chain_of(4);
    let second = chain_of(4);
    let state = state_with_peers(
        true,
        vec![("peer-a", first.snapshot()), ("peer-b", second.snapshot())],
    );

    assert!(state.sync_with_peers().unwrap());
    assert_eq!(state.chain_snapshot().unwrap().blocks, first.blocks());
}

#[test]
fn test_validate_first_rejects_forged_chain() {
    let state = state_with_peers(true, vec![("peer-a", forged_snapshot(5))]);
    assert!(!state.sync_with_peers().unwrap());
    assert_eq!(state.chain_snapshot().unwrap().length, 1);
    assert!(state.validate_chain().unwrap());
}

#[test]
fn test_trust_peer_adopts_forged_chain() {
    let state = state_with_peers(false, vec![("peer-a", forged_snapshot(5))]);
    assert!(state.sync_with_peers().unwrap());
    assert_eq!(state.chain_snapshot().unwrap().length, 5);
    assert!(!state.validate_chain().unwrap());
}

fn spawn_node(config: NodeConfig) -> (Arc<AppState>, String) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let state = Arc::new(
        AppState::new(NodeConfig {
            node_addr: addr.clone(),
            ..config
        })
        .unwrap(),
    );
    let server = Server::new(Arc::clone(&state));
    thread::spawn(move || server.serve(listener));
    (state, addr)
}

#[test]
fn test_tcp_get_chain_round_trip() {
    let (state, addr) = spawn_node(test_config(true));
    grow(&state, 2);

    let snapshot = TcpTransport.fetch_chain(&addr, TIMEOUT).unwrap();
    assert_eq!(snapshot, state.chain_snapshot().unwrap());
}

#[test]
fn test_tcp_submit_and_mine() {
    let (state, addr) = spawn_node(test_config(true));

    let response = send_request(
        &addr,
        &Request::SubmitTransaction {
            sender: "A".to_string(),
            recipient: "B".to_string(),
            data: json!({"amt": 10}),
            signature: None,
        },
        TIMEOUT,
    )
    .unwrap();
    assert!(matches!(response, Response::TransactionAccepted { block_index: 1, .. }));

    let response = send_request(&addr, &Request::MineBlock { miner_did: None }, TIMEOUT).unwrap();
    match response {
        Response::Mined { block } => {
            assert_eq!(block.get_transactions().len(), 2);
            assert_eq!(
                block.get_transactions()[1].get_recipient(),
                state.node().get_node_id()
            );
        }
        other => panic!("unexpected response {other:?}"),
    }

    let response = send_request(&addr, &Request::MineBlock { miner_did: None }, TIMEOUT).unwrap();
    assert_eq!(response, Response::NothingToMine);
}

#[test]
fn test_malformed_request_gets_error_reply() {
    let (_state, addr) = spawn_node(test_config(true));
    let mut stream = TcpStream::connect(&addr).unwrap();
    stream.set_read_timeout(Some(TIMEOUT)).unwrap();
    stream.write_all(b"{\"MineBlock\": 42}").unwrap();

    let reply = serde_json::Deserializer::from_reader(&stream)
        .into_iter::<Response>()
        .next()
        .unwrap()
        .unwrap();
    match reply {
        Response::Error { message } => assert!(message.starts_with("Invalid request")),
        other => panic!("unexpected response {other:?}"),
    }
}

#[test]
fn test_two_nodes_sync_over_tcp() {
    let (longer, longer_addr) = spawn_node(test_config(true));
    grow(&longer, 4);
    let (shorter, _) = spawn_node(test_config(true));
    shorter
        .register_peer(longer.node().get_node_id(), &longer_addr)
        .unwrap();

    assert!(shorter.sync_with_peers().unwrap());
    assert_eq!(
        shorter.chain_snapshot().unwrap().blocks,
        longer.chain_snapshot().unwrap().blocks
    );
}

#[test]
fn test_announced_block_reaches_peer() {
    let (miner, miner_addr) = spawn_node(NodeConfig {
        announce_blocks: true,
        ..test_config(true)
    });
    grow(&miner, 2);

    // the receiver adopts the miner's chain so both share a tip
    let (receiver, receiver_addr) = spawn_node(test_config(true));
    receiver
        .register_peer(miner.node().get_node_id(), &miner_addr)
        .unwrap();
    assert!(receiver.sync_with_peers().unwrap());

    miner
        .register_peer(receiver.node().get_node_id(), &receiver_addr)
        .unwrap();
    miner
        .submit_transaction(Transaction::new("a", "b", json!({})))
        .unwrap();
    let block = miner.mine_block(None).unwrap();

    let snapshot = receiver.chain_snapshot().unwrap();
    assert_eq!(snapshot.length, 3);
    assert_eq!(snapshot.blocks[2], block);
}
