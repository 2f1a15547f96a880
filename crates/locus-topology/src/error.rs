//! Error types for locus-topology.

use thiserror::Error;

/// Result type for topology operations.
pub type Result<T> = std::result::Result<T, TopologyError>;

/// Errors raised while building or querying a topology.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    /// No node with this name is registered.
    #[error("unknown node: {0}")]
    UnknownNode(String),

    /// Two nodes share a name.
    #[error("duplicate node name: {0}")]
    DuplicateName(String),

    /// Two nodes share a listening endpoint.
    #[error("duplicate endpoint {addr} (nodes {first} and {second})")]
    DuplicateEndpoint {
        addr: String,
        first: String,
        second: String,
    },

    /// An edge references a node that is not registered.
    #[error("edge {from} -> {to} references an unknown node")]
    DanglingEdge { from: String, to: String },

    /// A node lists itself as a neighbor.
    #[error("node {0} lists itself as a neighbor")]
    SelfLoop(String),
}
