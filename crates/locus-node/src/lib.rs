//! Locus Node - Flooding Location Replication
//!
//! A node in a small, fixed herd of location servers. Clients report where
//! they are (`IAMAT`) and ask what is nearby (`WHATSAT`); nodes replicate
//! every accepted report to their neighbors (`AT`) so any node can answer
//! for any client.
//!
//! # Architecture
//!
//! - **Config**: environment-driven settings and topology loading
//! - **Flood**: best-effort concurrent fan-out to topology neighbors
//! - **Places**: nearby-search collaborator and WHATSAT reply building
//! - **Node**: listener, per-connection state machine, lifecycle
//!
//! Consistency comes from the last-writer-wins store in `locus-protocols`:
//! a node floods an update only when its own store accepted it as strictly
//! newer, which is also what stops floods from looping around cycles.
//!
//! # Example
//!
//! ```no_run
//! use locus_node::{GooglePlaces, LocusNode, NodeConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NodeConfig::from_env()?;
//!     let topology = config.load_topology()?;
//!     let search = GooglePlaces::from_config(&config)?;
//!     let node = Arc::new(LocusNode::new(&topology, "Hill", &config, search)?);
//!     node.run(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod flood;
pub mod node;
pub mod places;


pub use config::NodeConfig;
pub use error::{Error, Result};
pub use flood::{FloodReport, Flooder};
pub use node::{LocusNode, Outcome};
pub use places::{GooglePlaces, PlaceSearch, QueryResolver};
