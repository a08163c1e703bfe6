//! Peer-to-peer networking
//!
//! Nodes talk JSON over TCP: each connection carries a stream of
//! [`Request`] values, each answered by one [`Response`]. On top of that sit
//! the peer registry, broadcast, and longest-chain sync.

pub mod node;
pub mod registry;
pub mod server;
pub mod sync;

pub use node::{BroadcastOutcome, NetworkNode, NodeInfo};
pub use registry::{Peer, PeerRegistry};
pub use server::{process_request, send_request, Request, Response, Server};
pub use sync::{ChainTransport, PeerSync, ReplacePolicy, TcpTransport};
