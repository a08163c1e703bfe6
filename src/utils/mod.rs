//! Utility functions and helpers
//!
//! Digest and clock helpers plus the canonical JSON encoding every ledger
//! hash is computed over.

pub mod crypto;
pub mod serialization;

pub use crypto::{current_timestamp, sha256_digest, sha256_hex};

pub use serialization::canonical_json;
