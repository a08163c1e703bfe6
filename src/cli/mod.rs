//! Command-line interface
//!
//! `startnode` runs a node in-process; every other command is a client that
//! sends one request to a running node.

pub mod commands;

pub use commands::{Command, JsonArg, Opt, PeerArg};
