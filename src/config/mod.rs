//! Configuration management
//!
//! Node settings: listen address, DID namespace, mining difficulty and the
//! peer sync knobs. There is no global instance; the loaded [`NodeConfig`]
//! is handed to [`crate::AppState`].

pub mod settings;

pub use settings::NodeConfig;
