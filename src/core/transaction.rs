// A transaction is an immutable record of who sent what to whom.
// The payload is arbitrary JSON; the ledger never interprets it beyond the
// mining reward and contract anchors, so there is no balance or fee logic here.

use crate::error::{ChainError, Result};
use crate::identity::{verify_did_signature, Identity};
use crate::utils::{canonical_json, sha256_hex};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// Sender/recipient used for system-generated transactions.
pub const NETWORK_ADDRESS: &str = "NETWORK";
pub const MINING_REWARD: u64 = 1;
const MINING_REWARD_TYPE: &str = "mining_reward";

fn new_tx_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default = "new_tx_id")]
    tx_id: String,
    sender: String,
    recipient: String,
    data: Value,
    #[serde(default)]
    signature: Option<String>, // hex DER, serialized as null when absent
}

impl Transaction {
    pub fn new(sender: &str, recipient: &str, data: Value) -> Transaction {
        Transaction {
            tx_id: new_tx_id(),
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            data,
            signature: None,
        }
    }

    pub fn with_id(mut self, tx_id: &str) -> Transaction {
        self.tx_id = tx_id.to_string();
        self
    }

    pub fn with_signature(mut self, signature: &str) -> Transaction {
        self.signature = Some(signature.to_string());
        self
    }

    /// Build a transaction from `identity` and sign its content hash.
    pub fn signed(identity: &Identity, recipient: &str, data: Value) -> Result<Transaction> {
        let tx = Transaction::new(identity.did(), recipient, data);
        let signature = identity.sign(tx.compute_hash()?.as_bytes());
        Ok(tx.with_signature(&signature))
    }

    /// The synthetic transaction that pays a miner for a block.
    pub fn mining_reward(miner_id: &str) -> Transaction {
        Transaction::new(
            NETWORK_ADDRESS,
            miner_id,
            json!({"reward": MINING_REWARD, "type": MINING_REWARD_TYPE}),
        )
    }

    pub fn get_id(&self) -> &str {
        self.tx_id.as_str()
    }

    pub fn get_sender(&self) -> &str {
        self.sender.as_str()
    }

    pub fn get_recipient(&self) -> &str {
        self.recipient.as_str()
    }

    pub fn get_data(&self) -> &Value {
        &self.data
    }

    pub fn get_signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    pub fn is_reward(&self) -> bool {
        self.sender == NETWORK_ADDRESS
            && self.data.get("type").and_then(Value::as_str) == Some(MINING_REWARD_TYPE)
    }

    /// SHA-256 over the canonical form of `{sender, recipient, data}`.
    ///
    /// `tx_id` and `signature` are excluded: this digest is what signers sign.
    pub fn compute_hash(&self) -> Result<String> {
        let content = json!({
            "sender": self.sender,
            "recipient": self.recipient,
            "data": self.data,
        });
        Ok(sha256_hex(canonical_json(&content)?.as_bytes()))
    }

    /// Checks the signature against the public key embedded in the sender DID.
    ///
    /// Unsigned transactions and non-DID senders (such as `NETWORK`) never verify.
    pub fn verify_signature(&self) -> bool {
        let Some(signature) = self.signature.as_deref() else {
            return false;
        };
        match self.compute_hash() {
            Ok(hash) => verify_did_signature(&self.sender, hash.as_bytes(), signature),
            Err(_) => false,
        }
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_value(value: Value) -> Result<Transaction> {
        serde_json::from_value(value)
            .map_err(|e| ChainError::InvalidTransaction(format!("Malformed transaction: {e}")))
    }
}
