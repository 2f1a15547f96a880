//! Node identity.

use std::fmt;

/// Immutable identity of one node in the herd.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeIdentity {
    /// Unique node name, also used as the origin field of flood messages
    pub name: String,
    /// Listening host
    pub host: String,
    /// Listening port
    pub port: u16,
}

impl NodeIdentity {
    /// Create a new identity.
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
        }
    }

    /// The `host:port` endpoint this node listens on.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.addr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addr_joins_host_and_port() {
        let id = NodeIdentity::new("Hill", "127.0.0.1", 12205);
        assert_eq!(id.addr(), "127.0.0.1:12205");
    }

    #[test]
    fn display_includes_name_and_endpoint() {
        let id = NodeIdentity::new("Smith", "localhost", 9);
        assert_eq!(id.to_string(), "Smith (localhost:9)");
    }
}
