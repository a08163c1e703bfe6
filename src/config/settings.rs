use crate::core::{ChainConfig, DEFAULT_DIFFICULTY, DEFAULT_MAX_NONCE};
use crate::error::{ChainError, Result};
use crate::identity::DEFAULT_NAMESPACE;
use crate::network::ReplacePolicy;
use log::info;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

static DEFAULT_NODE_ADDR: &str = "127.0.0.1:5000";

const NODE_ADDRESS_KEY: &str = "NODE_ADDRESS";
const DID_NAMESPACE_KEY: &str = "DID_NAMESPACE";
const MINING_DIFFICULTY_KEY: &str = "MINING_DIFFICULTY";
const VALIDATE_BEFORE_REPLACE_KEY: &str = "VALIDATE_BEFORE_REPLACE";
const PEER_TIMEOUT_MS_KEY: &str = "PEER_TIMEOUT_MS";

/// Everything a node reads at startup.
///
/// Values come from the defaults below, then an optional TOML file, then the
/// environment. Later sources win.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub node_addr: String,
    pub did_namespace: String,
    pub difficulty: usize,
    pub max_nonce: u64,
    pub validate_before_replace: bool,
    pub peer_timeout_ms: u64,
    pub sync_workers: usize,
    pub announce_blocks: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            node_addr: String::from(DEFAULT_NODE_ADDR),
            did_namespace: String::from(DEFAULT_NAMESPACE),
            difficulty: DEFAULT_DIFFICULTY,
            max_nonce: DEFAULT_MAX_NONCE,
            validate_before_replace: true,
            peer_timeout_ms: 5000,
            sync_workers: 8,
            announce_blocks: false,
        }
    }
}

impl NodeConfig {
    /// Load from `path` if given, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<NodeConfig> {
        let mut config = match path {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                Self::from_toml_str(&fs::read_to_string(path)?)?
            }
            None => NodeConfig::default(),
        };
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<NodeConfig> {
        Ok(toml::from_str(text)?)
    }

    /// Apply overrides from `lookup`, keyed by environment variable name.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup(NODE_ADDRESS_KEY) {
            self.node_addr = addr;
        }
        if let Some(namespace) = lookup(DID_NAMESPACE_KEY) {
            self.did_namespace = namespace;
        }
        if let Some(difficulty) = lookup(MINING_DIFFICULTY_KEY) {
            self.difficulty = parse_value(MINING_DIFFICULTY_KEY, &difficulty)?;
        }
        if let Some(validate) = lookup(VALIDATE_BEFORE_REPLACE_KEY) {
            self.validate_before_replace = parse_flag(VALIDATE_BEFORE_REPLACE_KEY, &validate)?;
        }
        if let Some(timeout) = lookup(PEER_TIMEOUT_MS_KEY) {
            self.peer_timeout_ms = parse_value(PEER_TIMEOUT_MS_KEY, &timeout)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        // a sha256 hex digest has 64 characters
        if self.difficulty > 64 {
            return Err(ChainError::Config(format!(
                "difficulty {} exceeds the 64 hex digits of a block hash",
                self.difficulty
            )));
        }
        if self.did_namespace.is_empty() || self.did_namespace.contains(':') {
            return Err(ChainError::Config(format!(
                "invalid DID namespace '{}'",
                self.did_namespace
            )));
        }
        if self.sync_workers == 0 {
            return Err(ChainError::Config("sync_workers must be at least 1".to_string()));
        }
        // std sockets reject a zero timeout
        if self.peer_timeout_ms == 0 {
            return Err(ChainError::Config("peer_timeout_ms must be positive".to_string()));
        }
        self.host_port().map(|_| ())
    }

    pub fn chain_config(&self) -> ChainConfig {
        ChainConfig {
            difficulty: self.difficulty,
            max_nonce: self.max_nonce,
        }
    }

    pub fn replace_policy(&self) -> ReplacePolicy {
        if self.validate_before_replace {
            ReplacePolicy::ValidateFirst
        } else {
            ReplacePolicy::TrustPeer
        }
    }

    pub fn peer_timeout(&self) -> Duration {
        Duration::from_millis(self.peer_timeout_ms)
    }

    /// Split `node_addr` into host and port.
    pub fn host_port(&self) -> Result<(String, u16)> {
        let (host, port) = self.node_addr.rsplit_once(':').ok_or_else(|| {
            ChainError::Config(format!("node address '{}' has no port", self.node_addr))
        })?;
        let port = port.parse::<u16>().map_err(|_| {
            ChainError::Config(format!("node address '{}' has an invalid port", self.node_addr))
        })?;
        Ok((host.to_string(), port))
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| ChainError::Config(format!("{key} has invalid value '{raw}'")))
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ChainError::Config(format!("{key} has invalid value '{raw}'"))),
    }
}
