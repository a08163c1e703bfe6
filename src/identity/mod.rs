//! Cryptographic identity
//!
//! secp256k1 keys, DID derivation and ECDSA signing. A DID doubles as the
//! signer's account address and as a node's id in the peer registry.

#[allow(clippy::module_inception)]
pub mod identity;

pub use identity::{
    parse_did, verify_did_signature, Identity, PublicIdentity, DEFAULT_NAMESPACE,
};
