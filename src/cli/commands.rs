use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use std::str::FromStr;

/// A JSON document given on the command line
#[derive(Debug, Clone)]
pub struct JsonArg(pub Value);

impl FromStr for JsonArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s)
            .map(JsonArg)
            .map_err(|e| format!("Invalid JSON '{s}': {e}"))
    }
}

/// A peer given as `DID=HOST:PORT`
#[derive(Debug, Clone, PartialEq)]
pub struct PeerArg {
    pub did: String,
    pub address: String,
}

impl FromStr for PeerArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((did, address)) if !did.is_empty() && !address.is_empty() => Ok(PeerArg {
                did: did.to_string(),
                address: address.to_string(),
            }),
            _ => Err(format!("Invalid peer: {s}. Expected DID=HOST:PORT")),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "socialchain")]
pub struct Opt {
    #[arg(long = "config", global = true, help = "Path to a TOML configuration file")]
    pub config: Option<PathBuf>,
    #[arg(
        long = "node",
        global = true,
        help = "Address of the node to talk to (defaults to the configured node address)"
    )]
    pub node: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "startnode", about = "Start a ledger node")]
    StartNode {
        #[arg(long = "peer", help = "Peer to register at startup, as DID=HOST:PORT")]
        peers: Vec<PeerArg>,
        #[arg(long = "sync", help = "Sync with the registered peers before serving")]
        sync: bool,
    },
    #[command(name = "createidentity", about = "Generate a new DID identity")]
    CreateIdentity {
        #[arg(long = "namespace", help = "DID namespace (defaults to the configured one)")]
        namespace: Option<String>,
    },
    #[command(name = "printchain", about = "Print all blocks of a node's chain")]
    Printchain,
    #[command(name = "submit", about = "Submit a transaction to the pending pool")]
    Submit {
        #[arg(help = "Sender DID")]
        sender: String,
        #[arg(help = "Recipient DID")]
        recipient: String,
        #[arg(help = "Transaction payload as JSON")]
        data: JsonArg,
        #[arg(long = "signature", help = "Hex-encoded signature over the transaction hash")]
        signature: Option<String>,
    },
    #[command(name = "mine", about = "Mine the pending transactions into a block")]
    Mine {
        #[arg(help = "DID to receive the mining reward (defaults to the node)")]
        miner: Option<String>,
    },
    #[command(name = "validate", about = "Validate a node's chain")]
    Validate,
    #[command(name = "addpeer", about = "Register a peer with a node")]
    AddPeer {
        #[arg(help = "Peer DID")]
        did: String,
        #[arg(help = "Peer address, HOST:PORT")]
        address: String,
    },
    #[command(name = "removepeer", about = "Remove a peer from a node")]
    RemovePeer {
        #[arg(help = "Peer DID")]
        did: String,
    },
    #[command(name = "listpeers", about = "List a node's peers")]
    ListPeers,
    #[command(name = "sync", about = "Adopt the longest valid chain among a node's peers")]
    Sync,
    #[command(name = "info", about = "Show a node's identity, address and peers")]
    Info,
    #[command(name = "createcontract", about = "Create a contract anchored on the chain")]
    CreateContract {
        #[arg(help = "Creator DID")]
        creator: String,
        #[arg(help = "Contract title")]
        title: String,
        #[arg(long = "description", default_value = "")]
        description: String,
        #[arg(long = "participant", help = "Participant DID, may be repeated")]
        participants: Vec<String>,
        #[arg(long = "terms", help = "Contract terms as JSON")]
        terms: Option<JsonArg>,
    },
    #[command(name = "completecontract", about = "Mark a contract completed")]
    CompleteContract {
        #[arg(help = "Contract id")]
        contract_id: String,
        #[arg(long = "by", help = "DID completing the contract (defaults to the creator)")]
        completer: Option<String>,
        #[arg(long = "data", help = "Completion data as JSON")]
        data: Option<JsonArg>,
    },
    #[command(name = "verifycontract", about = "Verify a completed contract")]
    VerifyContract {
        #[arg(help = "Contract id")]
        contract_id: String,
        #[arg(long = "by", help = "DID verifying the contract (defaults to the creator)")]
        verifier: Option<String>,
    },
    #[command(name = "getcontract", about = "Show one contract")]
    GetContract {
        #[arg(help = "Contract id")]
        contract_id: String,
    },
    #[command(name = "listcontracts", about = "List all contracts")]
    ListContracts,
    #[command(name = "contracttxs", about = "List the on-chain history of a contract")]
    ContractTxs {
        #[arg(help = "Contract id")]
        contract_id: String,
    },
}
