//! Error types for the Locus node.

use std::time::Duration;
use thiserror::Error;

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in node operations.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Topology error
    #[error("Topology error: {0}")]
    Topology(#[from] locus_topology::TopologyError),

    /// HTTP error talking to the places service
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Places service returned something unusable
    #[error("Places error: {0}")]
    Places(String),

    /// A flood neighbor could not be reached
    #[error("Peer {peer} unreachable: {reason}")]
    PeerUnreachable { peer: String, reason: String },

    /// An operation exceeded its deadline
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Invalid configuration
    #[error("Config error: {0}")]
    Config(String),
}
