use crate::core::{Block, ChainSnapshot, LocatedTransaction, NewContract, Transaction};
use crate::error::{ChainError, Result};
use crate::network::{NodeInfo, Peer};
use crate::state::AppState;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Deserializer, Value};
use std::io::{self, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const CONNECTION_READ_TIMEOUT: u64 = 60;
// proof-of-work at a high difficulty can take far longer than a peer round trip
const MINE_RESPONSE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Requests a node accepts, one JSON value each on a connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    GetChain,
    SubmitTransaction {
        sender: String,
        recipient: String,
        data: Value,
        #[serde(default)]
        signature: Option<String>,
    },
    MineBlock {
        #[serde(default)]
        miner_did: Option<String>,
    },
    AddBlock {
        block: Block,
    },
    ValidateChain,
    RegisterPeer {
        did: String,
        address: String,
    },
    RemovePeer {
        did: String,
    },
    ListPeers,
    SyncWithPeers,
    NodeInfo,
    CreateContract {
        contract: NewContract,
    },
    CompleteContract {
        contract_id: String,
        #[serde(default)]
        completer_did: Option<String>,
        #[serde(default)]
        completion_data: Value,
    },
    VerifyContract {
        contract_id: String,
        #[serde(default)]
        verifier_did: Option<String>,
    },
    GetContract {
        contract_id: String,
    },
    ListContracts,
    ContractTransactions {
        contract_id: String,
    },
}

impl Request {
    /// How long a client should wait for the reply, given its usual timeout.
    pub fn response_timeout(&self, timeout: Duration) -> Duration {
        match self {
            Request::MineBlock { .. } => timeout.max(MINE_RESPONSE_TIMEOUT),
            _ => timeout,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    Chain { snapshot: ChainSnapshot },
    TransactionAccepted { tx_id: String, block_index: usize },
    Mined { block: Block },
    NothingToMine,
    BlockAdded { accepted: bool },
    Valid { valid: bool },
    PeerRegistered,
    PeerRemoved { removed: bool },
    Peers { peers: Vec<Peer> },
    Synced { replaced: bool },
    Info { info: NodeInfo },
    Contract { contract: Value },
    ContractAnchored { contract: Value, tx_id: String },
    Contracts { contracts: Vec<Value> },
    ContractTransactions { transactions: Vec<LocatedTransaction> },
    Error { message: String },
}

/// Thread-per-connection request server over a shared [`AppState`].
pub struct Server {
    state: Arc<AppState>,
}

impl Server {
    pub fn new(state: Arc<AppState>) -> Server {
        Server { state }
    }

    pub fn run(&self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .map_err(|e| ChainError::Network(format!("Failed to bind to {addr}: {e}")))?;
        info!("Server listening on {addr}");
        self.serve(listener)
    }

    /// Accept connections on an already bound listener until it fails.
    pub fn serve(&self, listener: TcpListener) -> Result<()> {
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let peer_addr = match stream.peer_addr() {
                        Ok(addr) => addr,
                        Err(e) => {
                            error!("Failed to get peer address: {e}");
                            continue;
                        }
                    };
                    let state = Arc::clone(&self.state);
                    thread::spawn(move || {
                        if let Err(e) = Self::handle_connection(&state, stream, peer_addr) {
                            error!("Error handling connection from {peer_addr}: {e}");
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {e}");
                }
            }
        }
        Ok(())
    }

    fn handle_connection(state: &AppState, stream: TcpStream, peer_addr: SocketAddr) -> Result<()> {
        stream
            .set_read_timeout(Some(Duration::from_secs(CONNECTION_READ_TIMEOUT)))
            .map_err(|e| ChainError::Network(format!("Failed to set read timeout: {e}")))?;

        let reader = BufReader::new(&stream);
        let requests = Deserializer::from_reader(reader).into_iter::<Request>();
        let mut writer = &stream;

        for request in requests {
            let request = match request {
                Ok(request) => request,
                Err(e) => {
                    let message = format!("Invalid request: {e}");
                    warn!("{message} from {peer_addr}");
                    // best effort; the stream is unusable after a parse error
                    let _ = serde_json::to_writer(&mut writer, &Response::Error { message })
                        .map_err(io::Error::from)
                        .and_then(|()| writer.flush());
                    return Err(ChainError::Network(format!(
                        "Failed to deserialize request: {e}"
                    )));
                }
            };
            info!("Received request from {peer_addr}: {request:?}");

            let response = process_request(state, request);
            serde_json::to_writer(&mut writer, &response)
                .map_err(|e| ChainError::Network(format!("Failed to send response: {e}")))?;
            writer.flush()?;
        }
        Ok(())
    }
}

/// Dispatch one request against the node state.
///
/// Failures become [`Response::Error`]; an empty pool when mining is the
/// ordinary [`Response::NothingToMine`].
pub fn process_request(state: &AppState, request: Request) -> Response {
    match dispatch(state, request) {
        Ok(response) => response,
        Err(ChainError::NothingToMine) => Response::NothingToMine,
        Err(e) => {
            warn!("Request failed: {e}");
            Response::Error {
                message: e.to_string(),
            }
        }
    }
}

fn dispatch(state: &AppState, request: Request) -> Result<Response> {
    let response = match request {
        Request::GetChain => Response::Chain {
            snapshot: state.chain_snapshot()?,
        },
        Request::SubmitTransaction {
            sender,
            recipient,
            data,
            signature,
        } => {
            let mut tx = Transaction::new(&sender, &recipient, data);
            if let Some(signature) = signature {
                tx = tx.with_signature(&signature);
            }
            let tx_id = tx.get_id().to_string();
            let block_index = state.submit_transaction(tx)?;
            Response::TransactionAccepted { tx_id, block_index }
        }
        Request::MineBlock { miner_did } => Response::Mined {
            block: state.mine_block(miner_did.as_deref())?,
        },
        Request::AddBlock { block } => Response::BlockAdded {
            accepted: state.add_external_block(block)?,
        },
        Request::ValidateChain => Response::Valid {
            valid: state.validate_chain()?,
        },
        Request::RegisterPeer { did, address } => {
            state.register_peer(&did, &address)?;
            Response::PeerRegistered
        }
        Request::RemovePeer { did } => Response::PeerRemoved {
            removed: state.remove_peer(&did)?,
        },
        Request::ListPeers => Response::Peers {
            peers: state.list_peers()?,
        },
        Request::SyncWithPeers => Response::Synced {
            replaced: state.sync_with_peers()?,
        },
        Request::NodeInfo => Response::Info {
            info: state.node_info()?,
        },
        Request::CreateContract { contract } => {
            let anchored = state.create_contract(contract)?;
            Response::ContractAnchored {
                contract: anchored.contract.to_value()?,
                tx_id: anchored.tx_id,
            }
        }
        Request::CompleteContract {
            contract_id,
            completer_did,
            completion_data,
        } => {
            let anchored = state.complete_contract(
                &contract_id,
                completer_did.as_deref(),
                completion_data,
            )?;
            Response::ContractAnchored {
                contract: anchored.contract.to_value()?,
                tx_id: anchored.tx_id,
            }
        }
        Request::VerifyContract {
            contract_id,
            verifier_did,
        } => {
            let anchored = state.verify_contract(&contract_id, verifier_did.as_deref())?;
            Response::ContractAnchored {
                contract: anchored.contract.to_value()?,
                tx_id: anchored.tx_id,
            }
        }
        Request::GetContract { contract_id } => Response::Contract {
            contract: state.get_contract(&contract_id)?.to_value()?,
        },
        Request::ListContracts => Response::Contracts {
            contracts: state
                .list_contracts()?
                .iter()
                .map(|c| c.to_value())
                .collect::<Result<Vec<Value>>>()?,
        },
        Request::ContractTransactions { contract_id } => Response::ContractTransactions {
            transactions: state.contract_transactions(&contract_id)?,
        },
    };
    Ok(response)
}

/// Send one request to `addr` and wait for its response.
pub fn send_request(addr: &str, request: &Request, timeout: Duration) -> Result<Response> {
    let socket_addr = addr
        .to_socket_addrs()
        .map_err(|e| ChainError::Network(format!("Failed to resolve {addr}: {e}")))?
        .next()
        .ok_or_else(|| ChainError::Network(format!("No address found for {addr}")))?;

    let stream = TcpStream::connect_timeout(&socket_addr, timeout)
        .map_err(|e| ChainError::Network(format!("Failed to connect to {addr}: {e}")))?;
    stream
        .set_write_timeout(Some(timeout))
        .map_err(|e| ChainError::Network(format!("Failed to set write timeout: {e}")))?;
    stream
        .set_read_timeout(Some(request.response_timeout(timeout)))
        .map_err(|e| ChainError::Network(format!("Failed to set read timeout: {e}")))?;

    let mut writer = &stream;
    serde_json::to_writer(&mut writer, request)
        .map_err(|e| ChainError::Network(format!("Failed to send request: {e}")))?;
    writer.flush()?;

    let reader = BufReader::new(&stream);
    match Deserializer::from_reader(reader).into_iter::<Response>().next() {
        Some(response) => response
            .map_err(|e| ChainError::Network(format!("Invalid response from {addr}: {e}"))),
        None => Err(ChainError::Network(format!(
            "Connection to {addr} closed without a response"
        ))),
    }
}
