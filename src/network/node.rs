use crate::error::Result;
use crate::identity::Identity;
use crate::network::server::{send_request, Request, Response};
use crate::network::{Peer, PeerRegistry};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::RwLock;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub node_id: String,
    pub host: String,
    pub port: u16,
    pub peers: BTreeMap<String, String>,
}

/// What happened when a request was sent to one peer.
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastOutcome {
    pub peer: Peer,
    pub result: std::result::Result<Response, String>,
}

/// This node's identity on the network plus the peers it knows about.
pub struct NetworkNode {
    identity: Identity,
    host: String,
    port: u16,
    registry: RwLock<PeerRegistry>,
    timeout: Duration,
}

impl NetworkNode {
    pub fn new(host: &str, port: u16, identity: Identity, timeout: Duration) -> NetworkNode {
        info!("Node {} at {host}:{port}", identity.did());
        NetworkNode {
            identity,
            host: host.to_string(),
            port,
            registry: RwLock::new(PeerRegistry::new()),
            timeout,
        }
    }

    pub fn get_node_id(&self) -> &str {
        self.identity.did()
    }

    pub fn get_identity(&self) -> &Identity {
        &self.identity
    }

    pub fn register_peer(&self, did: &str, address: &str) -> Result<()> {
        self.registry.write()?.add(did, address);
        info!("Registered peer {did} at {address}");
        Ok(())
    }

    pub fn remove_peer(&self, did: &str) -> Result<bool> {
        let removed = self.registry.write()?.remove(did);
        if removed {
            info!("Removed peer {did}");
        }
        Ok(removed)
    }

    pub fn peers(&self) -> Result<Vec<Peer>> {
        Ok(self.registry.read()?.list())
    }

    /// Send `request` to every peer. A failing peer never stops the others.
    pub fn broadcast(&self, request: &Request) -> Result<Vec<BroadcastOutcome>> {
        let peers = self.peers()?;
        let outcomes = peers
            .into_iter()
            .map(|peer| {
                let result = send_request(peer.get_addr(), request, self.timeout).map_err(|e| {
                    warn!("Broadcast to {} failed: {e}", peer.get_addr());
                    e.to_string()
                });
                BroadcastOutcome { peer, result }
            })
            .collect();
        Ok(outcomes)
    }

    pub fn info(&self) -> Result<NodeInfo> {
        Ok(NodeInfo {
            node_id: self.identity.did().to_string(),
            host: self.host.clone(),
            port: self.port,
            peers: self.registry.read()?.to_map(),
        })
    }
}
