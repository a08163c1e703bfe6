// Entry point for the socialchain CLI
// startnode runs a node here; the other commands talk to a running node over TCP
use clap::Parser;
use log::{error, info, LevelFilter};
use serde_json::{json, Value};
use socialchain::cli::PeerArg;
use socialchain::{
    send_request, AppState, Command, Identity, NewContract, NodeConfig, Opt, Request, Response,
    Server,
};
use std::process;
use std::sync::Arc;

fn main() {
    // Info by default, RUST_LOG still wins
    env_logger::builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let opt = Opt::parse();

    if let Err(e) = run(opt) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn run(opt: Opt) -> Result<(), Box<dyn std::error::Error>> {
    let config = NodeConfig::load(opt.config.as_deref())?;
    let node_addr = opt.node.clone().unwrap_or_else(|| config.node_addr.clone());

    match opt.command {
        Command::StartNode { peers, sync } => start_node(config, peers, sync)?,
        Command::CreateIdentity { namespace } => {
            let namespace = namespace.unwrap_or_else(|| config.did_namespace.clone());
            let identity = Identity::generate_in(&namespace);
            println!("{}", serde_json::to_string_pretty(&identity.to_public())?);
        }
        Command::Printchain => {
            let response = call(&config, &node_addr, Request::GetChain)?;
            if let Response::Chain { snapshot } = &response {
                for block in &snapshot.blocks {
                    println!("Block {}", block.get_index());
                    println!("Prev block hash: {}", block.get_previous_hash());
                    println!("Cur block hash: {}", block.get_hash());
                    println!("Timestamp: {}", block.get_timestamp());
                    println!("Nonce: {}", block.get_nonce());
                    for tx in block.get_transactions() {
                        println!(
                            "- Transaction {}: {} -> {} {}",
                            tx.get_id(),
                            tx.get_sender(),
                            tx.get_recipient(),
                            tx.get_data()
                        );
                    }
                    println!()
                }
                println!("Pending transactions: {}", snapshot.pending_transactions.len());
            } else {
                print_response(&response)?;
            }
        }
        Command::Submit {
            sender,
            recipient,
            data,
            signature,
        } => {
            let request = Request::SubmitTransaction {
                sender,
                recipient,
                data: data.0,
                signature,
            };
            print_response(&call(&config, &node_addr, request)?)?;
        }
        Command::Mine { miner } => {
            let request = Request::MineBlock { miner_did: miner };
            print_response(&call(&config, &node_addr, request)?)?;
        }
        Command::Validate => print_response(&call(&config, &node_addr, Request::ValidateChain)?)?,
        Command::AddPeer { did, address } => {
            let request = Request::RegisterPeer { did, address };
            print_response(&call(&config, &node_addr, request)?)?;
        }
        Command::RemovePeer { did } => {
            print_response(&call(&config, &node_addr, Request::RemovePeer { did })?)?;
        }
        Command::ListPeers => print_response(&call(&config, &node_addr, Request::ListPeers)?)?,
        Command::Sync => print_response(&call(&config, &node_addr, Request::SyncWithPeers)?)?,
        Command::Info => print_response(&call(&config, &node_addr, Request::NodeInfo)?)?,
        Command::CreateContract {
            creator,
            title,
            description,
            participants,
            terms,
        } => {
            let contract = NewContract {
                creator_did: creator,
                title,
                description,
                participants,
                terms: terms.map_or_else(|| json!({}), |t| t.0),
            };
            let request = Request::CreateContract { contract };
            print_response(&call(&config, &node_addr, request)?)?;
        }
        Command::CompleteContract {
            contract_id,
            completer,
            data,
        } => {
            let request = Request::CompleteContract {
                contract_id,
                completer_did: completer,
                completion_data: data.map_or(Value::Null, |d| d.0),
            };
            print_response(&call(&config, &node_addr, request)?)?;
        }
        Command::VerifyContract {
            contract_id,
            verifier,
        } => {
            let request = Request::VerifyContract {
                contract_id,
                verifier_did: verifier,
            };
            print_response(&call(&config, &node_addr, request)?)?;
        }
        Command::GetContract { contract_id } => {
            let request = Request::GetContract { contract_id };
            print_response(&call(&config, &node_addr, request)?)?;
        }
        Command::ListContracts => {
            print_response(&call(&config, &node_addr, Request::ListContracts)?)?
        }
        Command::ContractTxs { contract_id } => {
            let request = Request::ContractTransactions { contract_id };
            print_response(&call(&config, &node_addr, request)?)?;
        }
    }
    Ok(())
}

fn start_node(
    config: NodeConfig,
    peers: Vec<PeerArg>,
    sync: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config.node_addr.clone();
    let state = Arc::new(AppState::new(config)?);
    for peer in peers {
        state.register_peer(&peer.did, &peer.address)?;
    }
    if sync {
        let replaced = state.sync_with_peers()?;
        info!("Startup sync finished, chain replaced: {replaced}");
    }
    println!("Node {} listening on {addr}", state.node().get_node_id());
    Server::new(state).run(&addr)?;
    Ok(())
}

fn call(
    config: &NodeConfig,
    addr: &str,
    request: Request,
) -> Result<Response, Box<dyn std::error::Error>> {
    let response = send_request(addr, &request, config.peer_timeout())?;
    if let Response::Error { message } = &response {
        return Err(format!("Node {addr} returned an error: {message}").into());
    }
    Ok(response)
}

fn print_response(response: &Response) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(response)?);
    Ok(())
}
