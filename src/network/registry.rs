use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A known peer: its DID and the address its server listens on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    did: String,
    address: String,
}

impl Peer {
    pub fn new(did: &str, address: &str) -> Peer {
        Peer {
            did: did.to_string(),
            address: address.to_string(),
        }
    }

    pub fn get_did(&self) -> &str {
        self.did.as_str()
    }

    pub fn get_addr(&self) -> &str {
        self.address.as_str()
    }
}

/// Peers keyed by DID, kept in registration order.
///
/// Sync walks peers in this order, so the first of several equally long
/// chains is the one adopted.
#[derive(Debug, Clone, Default)]
pub struct PeerRegistry {
    inner: Vec<Peer>,
}

impl PeerRegistry {
    pub fn new() -> PeerRegistry {
        PeerRegistry { inner: vec![] }
    }

    /// Register a peer; a known DID keeps its position and gets the new address.
    pub fn add(&mut self, did: &str, address: &str) {
        match self.inner.iter_mut().find(|p| p.did == did) {
            Some(peer) => peer.address = address.to_string(),
            None => self.inner.push(Peer::new(did, address)),
        }
    }

    pub fn remove(&mut self, did: &str) -> bool {
        if let Some(idx) = self.inner.iter().position(|p| p.did == did) {
            self.inner.remove(idx);
            return true;
        }
        false
    }

    pub fn get(&self, did: &str) -> Option<&Peer> {
        self.inner.iter().find(|p| p.did == did)
    }

    pub fn list(&self) -> Vec<Peer> {
        self.inner.to_vec()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// DID to address, the shape reported by node info.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.inner
            .iter()
            .map(|p| (p.did.clone(), p.address.clone()))
            .collect()
    }
}
