//! Node configuration from environment variables.

use crate::error::{Error, Result};
use locus_topology::{Topology, TopologySpec};
use std::path::PathBuf;
use std::time::Duration;

/// Default nearby-search endpoint.
pub const DEFAULT_PLACES_URL: &str =
    "https://maps.googleapis.com/maps/api/place/nearbysearch/json";

/// Configuration shared by every node process.
///
/// Which node a process runs is chosen on the command line, not here.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// API key sent to the places service
    pub places_api_key: String,

    /// Nearby-search endpoint
    pub places_url: String,

    /// Deadline for one places request
    pub places_timeout: Duration,

    /// Deadline for one flood attempt (connect, write and close)
    pub flood_timeout: Duration,

    /// Extra attempts per neighbor after a failed flood send
    pub flood_retries: u32,

    /// How long open connections may run after shutdown is requested
    pub shutdown_grace: Duration,

    /// JSON topology file; the built-in registry is used when unset
    pub topology_path: Option<PathBuf>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            places_api_key: String::new(),
            places_url: DEFAULT_PLACES_URL.to_string(),
            places_timeout: Duration::from_secs(10),
            flood_timeout: Duration::from_secs(3),
            flood_retries: 1,
            shutdown_grace: Duration::from_secs(2),
            topology_path: None,
        }
    }
}

impl NodeConfig {
    /// Create config from environment variables with sensible defaults.
    ///
    /// - `LOCUS_PLACES_API_KEY`
    /// - `LOCUS_PLACES_URL`
    /// - `LOCUS_PLACES_TIMEOUT_MS`
    /// - `LOCUS_FLOOD_TIMEOUT_MS`
    /// - `LOCUS_FLOOD_RETRIES`
    /// - `LOCUS_SHUTDOWN_GRACE_MS`
    /// - `LOCUS_TOPOLOGY`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let millis = |key: &str, default: Duration| -> Result<Duration> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map(Duration::from_millis)
                    .map_err(|_| Error::Config(format!("{} must be milliseconds, got {:?}", key, raw))),
                None => Ok(default),
            }
        };

        let flood_retries = match lookup("LOCUS_FLOOD_RETRIES") {
            Some(raw) => raw.trim().parse().map_err(|_| {
                Error::Config(format!("LOCUS_FLOOD_RETRIES must be a count, got {:?}", raw))
            })?,
            None => defaults.flood_retries,
        };

        Ok(Self {
            places_api_key: lookup("LOCUS_PLACES_API_KEY").unwrap_or(defaults.places_api_key),
            places_url: lookup("LOCUS_PLACES_URL").unwrap_or(defaults.places_url),
            places_timeout: millis("LOCUS_PLACES_TIMEOUT_MS", defaults.places_timeout)?,
            flood_timeout: millis("LOCUS_FLOOD_TIMEOUT_MS", defaults.flood_timeout)?,
            flood_retries,
            shutdown_grace: millis("LOCUS_SHUTDOWN_GRACE_MS", defaults.shutdown_grace)?,
            topology_path: lookup("LOCUS_TOPOLOGY")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
        })
    }

    /// Load the topology file, or the built-in registry when none is set.
    pub fn load_topology(&self) -> Result<Topology> {
        match &self.topology_path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                let spec: TopologySpec = serde_json::from_str(&raw)?;
                Ok(Topology::try_from(spec)?)
            }
            None => Ok(Topology::default_registry()),
        }
    }
}
