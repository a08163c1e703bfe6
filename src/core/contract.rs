//! Contracts anchored on the ledger
//!
//! A contract is inert metadata: nothing here executes terms. Every lifecycle
//! transition is recorded on chain as a transaction from the acting DID to
//! `NETWORK`, so the chain is the audit trail of what happened to a contract.

use crate::core::{Blockchain, LocatedTransaction, Transaction, NETWORK_ADDRESS};
use crate::error::{ChainError, Result};
use crate::utils::{canonical_json, current_timestamp, sha256_hex};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContractStatus {
    Pending,
    Active,
    Completed,
    Verified,
    Failed,
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContractStatus::Pending => "PENDING",
            ContractStatus::Active => "ACTIVE",
            ContractStatus::Completed => "COMPLETED",
            ContractStatus::Verified => "VERIFIED",
            ContractStatus::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Input for [`ContractBook::create`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewContract {
    pub creator_did: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub terms: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmartContract {
    contract_id: String,
    creator_did: String,
    title: String,
    description: String,
    participants: Vec<String>,
    terms: Value,
    status: ContractStatus,
    created_at: f64,
    updated_at: f64,
    tx_ids: Vec<String>,
    completion_data: Option<Value>,
}

impl SmartContract {
    fn new(request: NewContract) -> Result<SmartContract> {
        let now = current_timestamp()?;
        let terms = match request.terms {
            Value::Null => json!({}),
            terms => terms,
        };
        Ok(SmartContract {
            contract_id: Uuid::new_v4().to_string(),
            creator_did: request.creator_did,
            title: request.title,
            description: request.description,
            participants: request.participants,
            terms,
            status: ContractStatus::Pending,
            created_at: now,
            updated_at: now,
            tx_ids: Vec::new(),
            completion_data: None,
        })
    }

    pub fn get_id(&self) -> &str {
        self.contract_id.as_str()
    }

    pub fn get_creator(&self) -> &str {
        self.creator_did.as_str()
    }

    pub fn get_title(&self) -> &str {
        self.title.as_str()
    }

    pub fn get_status(&self) -> ContractStatus {
        self.status
    }

    pub fn get_participants(&self) -> &[String] {
        self.participants.as_slice()
    }

    pub fn get_tx_ids(&self) -> &[String] {
        self.tx_ids.as_slice()
    }

    pub fn get_completion_data(&self) -> Option<&Value> {
        self.completion_data.as_ref()
    }

    /// Digest of the identifying fields; status and timestamps are excluded.
    pub fn compute_hash(&self) -> Result<String> {
        let identity = json!({
            "contract_id": self.contract_id,
            "creator_did": self.creator_did,
            "title": self.title,
            "terms": self.terms,
        });
        Ok(sha256_hex(canonical_json(&identity)?.as_bytes()))
    }

    /// Serialized form with the current `contract_hash` attached.
    pub fn to_value(&self) -> Result<Value> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            map.insert("contract_hash".to_string(), Value::String(self.compute_hash()?));
        }
        Ok(value)
    }
}

/// Result of a lifecycle call: the updated contract and its anchor transaction id.
#[derive(Debug, Clone, PartialEq)]
pub struct Anchored {
    pub contract: SmartContract,
    pub tx_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct ContractBook {
    contracts: Vec<SmartContract>,
}

impl ContractBook {
    pub fn new() -> ContractBook {
        ContractBook {
            contracts: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    pub fn get(&self, contract_id: &str) -> Option<&SmartContract> {
        self.contracts.iter().find(|c| c.contract_id == contract_id)
    }

    pub fn list(&self) -> &[SmartContract] {
        self.contracts.as_slice()
    }

    fn get_mut(&mut self, contract_id: &str) -> Result<&mut SmartContract> {
        self.contracts
            .iter_mut()
            .find(|c| c.contract_id == contract_id)
            .ok_or_else(|| ChainError::ContractNotFound(contract_id.to_string()))
    }

    pub fn create(&mut self, chain: &mut Blockchain, request: NewContract) -> Result<Anchored> {
        if request.creator_did.is_empty() || request.title.is_empty() {
            return Err(ChainError::InvalidTransaction(
                "Contract requires creator_did and title".to_string(),
            ));
        }
        let mut contract = SmartContract::new(request)?;
        let tx = Transaction::new(
            &contract.creator_did,
            NETWORK_ADDRESS,
            json!({
                "type": "contract_create",
                "contract_id": contract.contract_id,
                "title": contract.title,
                "participants": contract.participants,
                "contract_hash": contract.compute_hash()?,
                "timestamp": contract.created_at,
            }),
        );
        let tx_id = tx.get_id().to_string();
        chain.add_transaction(tx);
        contract.tx_ids.push(tx_id.clone());
        contract.status = ContractStatus::Active;
        info!("Created contract {} ({})", contract.contract_id, contract.title);

        self.contracts.push(contract.clone());
        Ok(Anchored { contract, tx_id })
    }

    /// Only active or pending contracts can be completed.
    pub fn complete(
        &mut self,
        chain: &mut Blockchain,
        contract_id: &str,
        completer_did: Option<&str>,
        completion_data: Value,
    ) -> Result<Anchored> {
        let contract = self.get_mut(contract_id)?;
        if !matches!(
            contract.status,
            ContractStatus::Active | ContractStatus::Pending
        ) {
            return Err(ChainError::InvalidContractState(format!(
                "Cannot complete contract with status {}",
                contract.status
            )));
        }
        let completion_data = match completion_data {
            Value::Null => json!({}),
            data => data,
        };
        contract.completion_data = Some(completion_data.clone());
        contract.status = ContractStatus::Completed;
        contract.updated_at = current_timestamp()?;

        let sender = completer_did.unwrap_or(&contract.creator_did).to_string();
        let tx = Transaction::new(
            &sender,
            NETWORK_ADDRESS,
            json!({
                "type": "contract_complete",
                "contract_id": contract.contract_id,
                "completion_data": completion_data,
                "timestamp": contract.updated_at,
            }),
        );
        let tx_id = tx.get_id().to_string();
        chain.add_transaction(tx);
        contract.tx_ids.push(tx_id.clone());
        info!("Completed contract {contract_id}");

        Ok(Anchored {
            contract: contract.clone(),
            tx_id,
        })
    }

    /// Only completed contracts can be verified.
    pub fn verify(
        &mut self,
        chain: &mut Blockchain,
        contract_id: &str,
        verifier_did: Option<&str>,
    ) -> Result<Anchored> {
        let contract = self.get_mut(contract_id)?;
        if contract.status != ContractStatus::Completed {
            return Err(ChainError::InvalidContractState(
                "Only completed contracts can be verified".to_string(),
            ));
        }
        contract.status = ContractStatus::Verified;
        contract.updated_at = current_timestamp()?;

        let sender = verifier_did.unwrap_or(&contract.creator_did).to_string();
        let tx = Transaction::new(
            &sender,
            NETWORK_ADDRESS,
            json!({
                "type": "contract_verify",
                "contract_id": contract.contract_id,
                "contract_hash": contract.compute_hash()?,
                "timestamp": contract.updated_at,
            }),
        );
        let tx_id = tx.get_id().to_string();
        chain.add_transaction(tx);
        contract.tx_ids.push(tx_id.clone());
        info!("Verified contract {contract_id}");

        Ok(Anchored {
            contract: contract.clone(),
            tx_id,
        })
    }

    /// Every anchor transaction of a contract, mined ones first.
    pub fn transactions(
        &self,
        chain: &Blockchain,
        contract_id: &str,
    ) -> Result<Vec<LocatedTransaction>> {
        if self.get(contract_id).is_none() {
            return Err(ChainError::ContractNotFound(contract_id.to_string()));
        }
        Ok(chain.find_transactions(|tx| {
            tx.get_data().get("contract_id").and_then(Value::as_str) == Some(contract_id)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ChainConfig, DEFAULT_MAX_NONCE};

    fn easy_chain() -> Blockchain {
        Blockchain::with_config(ChainConfig {
            difficulty: 1,
            max_nonce: DEFAULT_MAX_NONCE,
        })
        .unwrap()
    }

    fn request() -> NewContract {
        NewContract {
            creator_did: "did:socialchain:alice".to_string(),
            title: "Build a shed".to_string(),
            description: "Weekend project".to_string(),
            participants: vec!["did:socialchain:bob".to_string()],
            terms: json!({"deadline": "friday"}),
        }
    }

    #[test]
    fn test_create_anchors_transaction() {
        let mut chain = easy_chain();
        let mut book = ContractBook::new();
        let anchored = book.create(&mut chain, request()).unwrap();

        assert_eq!(anchored.contract.get_status(), ContractStatus::Active);
        assert_eq!(anchored.contract.get_creator(), "did:socialchain:alice");
        assert_eq!(anchored.contract.get_title(), "Build a shed");
        assert_eq!(
            anchored.contract.get_participants(),
            &["did:socialchain:bob".to_string()]
        );
        assert_eq!(anchored.contract.get_tx_ids(), &[anchored.tx_id.clone()]);
        assert_eq!(chain.pending().len(), 1);
        let tx = &chain.pending()[0];
        assert_eq!(tx.get_sender(), "did:socialchain:alice");
        assert_eq!(tx.get_recipient(), NETWORK_ADDRESS);
        assert_eq!(tx.get_data()["type"], "contract_create");
        assert_eq!(
            tx.get_data()["contract_hash"],
            json!(anchored.contract.compute_hash().unwrap())
        );
    }

    #[test]
    fn test_create_requires_creator_and_title() {
        let mut chain = easy_chain();
        let mut book = ContractBook::new();
        let result = book.create(
            &mut chain,
            NewContract {
                title: "untitled creator".to_string(),
                ..NewContract::default()
            },
        );
        assert!(matches!(result, Err(ChainError::InvalidTransaction(_))));
        assert!(book.is_empty());
    }

    #[test]
    fn test_full_lifecycle() {
        let mut chain = easy_chain();
        let mut book = ContractBook::new();
        let id = book.create(&mut chain, request()).unwrap().contract.get_id().to_string();

        let completed = book
            .complete(&mut chain, &id, Some("did:socialchain:bob"), json!({"photos": 3}))
            .unwrap();
        assert_eq!(completed.contract.get_status(), ContractStatus::Completed);
        assert_eq!(completed.contract.get_completion_data(), Some(&json!({"photos": 3})));

        chain.mine("miner").unwrap();

        let verified = book.verify(&mut chain, &id, None).unwrap();
        assert_eq!(verified.contract.get_status(), ContractStatus::Verified);
        assert_eq!(verified.contract.get_tx_ids().len(), 3);

        let txs = book.transactions(&chain, &id).unwrap();
        assert_eq!(txs.len(), 3);
        assert_eq!(txs[0].block_index, Some(1));
        assert_eq!(txs[1].block_index, Some(1));
        assert_eq!(txs[1].transaction.get_sender(), "did:socialchain:bob");
        assert_eq!(txs[2].block_index, None);
        assert_eq!(txs[2].transaction.get_sender(), "did:socialchain:alice");
    }

    #[test]
    fn test_invalid_transitions() {
        let mut chain = easy_chain();
        let mut book = ContractBook::new();
        let id = book.create(&mut chain, request()).unwrap().contract.get_id().to_string();

        assert!(matches!(
            book.verify(&mut chain, &id, None),
            Err(ChainError::InvalidContractState(_))
        ));
        book.complete(&mut chain, &id, None, Value::Null).unwrap();
        assert!(matches!(
            book.complete(&mut chain, &id, None, Value::Null),
            Err(ChainError::InvalidContractState(_))
        ));
    }

    #[test]
    fn test_unknown_contract() {
        let mut chain = easy_chain();
        let mut book = ContractBook::new();
        assert_eq!(
            book.verify(&mut chain, "missing", None),
            Err(ChainError::ContractNotFound("missing".to_string()))
        );
        assert!(book.transactions(&chain, "missing").is_err());
    }

    #[test]
    fn test_hash_ignores_status() {
        let mut chain = easy_chain();
        let mut book = ContractBook::new();
        let created = book.create(&mut chain, request()).unwrap().contract;
        let id = created.get_id().to_string();
        let completed = book.complete(&mut chain, &id, None, Value::Null).unwrap().contract;
        assert_eq!(created.compute_hash().unwrap(), completed.compute_hash().unwrap());

        let value = completed.to_value().unwrap();
        assert_eq!(value["status"], "COMPLETED");
        assert_eq!(value["contract_hash"], json!(completed.compute_hash().unwrap()));
    }
}
