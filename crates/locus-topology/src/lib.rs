//! Locus Topology
//!
//! Static description of the nodes in a Locus herd and the edges each node
//! floods location updates across.
//!
//! # Model
//!
//! - Every node has an immutable [`NodeIdentity`] (name, host, port).
//! - Each node stores only its outbound edges. A node knows its direct
//!   neighbors and nothing else about the graph.
//! - The graph may contain cycles. Flooding terminates because a node only
//!   re-floods an update its own store accepted as strictly newer.
//!
//! The registry is loaded once at startup and handed to the node that runs
//! it; there is no global table.

mod error;
mod identity;
mod registry;

pub use error::{Result, TopologyError};
pub use identity::NodeIdentity;
pub use registry::Topology;
#[cfg(feature = "serde")]
pub use registry::TopologySpec;

/// Loopback host every node of the default herd listens on.
pub const DEFAULT_HOST: &str = "127.0.0.1";
