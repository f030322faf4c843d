//! Error types for node supervision, script execution and configuration.
//!
//! Node errors are fatal at startup; script errors are reported by the shell
//! and the session carries on.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures while bringing up the development node.
#[derive(Debug, Error)]
pub enum NodeError {
    /// The version probe could not launch the binary at all.
    #[error("{binary} not found. Please install Foundry: https://getfoundry.sh")]
    BinaryNotFound {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// The node was found but could not be spawned with its port flags.
    #[error("Failed to launch {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// The node's output file could not be prepared.
    #[error("Cannot write node output to '{path}': {source}")]
    Log {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No private key appeared before the deadline or the end of output.
    #[error("Could not capture private key from {binary} (waited {waited:?}, read {lines} lines)")]
    CaptureTimeout {
        binary: String,
        waited: Duration,
        lines: usize,
    },

    /// A node is already supervised; stop it before starting another.
    #[error("A node is already running on {rpc_url}")]
    AlreadyRunning { rpc_url: String },
}

/// Failures while running a user script. Never fatal to the shell.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Script not found: {0}")]
    NotFound(String),

    /// Every candidate runner for the extension was missing.
    #[error("No runner available for {path} (tried: {tried})")]
    NoRunner { path: PathBuf, tried: String },

    #[error("Error running script: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
