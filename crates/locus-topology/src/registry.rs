//! Topology registry: node identities plus outbound flood edges.

use crate::{NodeIdentity, Result, TopologyError, DEFAULT_HOST};
use std::collections::{BTreeMap, BTreeSet};

/// The static herd description.
///
/// Both maps are ordered so fan-out and iteration order are deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    nodes: BTreeMap<String, NodeIdentity>,
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl Topology {
    /// Build and validate a topology.
    ///
    /// `edges` maps a node name to the names it floods to. Nodes without an
    /// entry have no outbound edges.
    pub fn new<I, E, A, N, B>(nodes: I, edges: E) -> Result<Self>
    where
        I: IntoIterator<Item = NodeIdentity>,
        E: IntoIterator<Item = (A, N)>,
        N: IntoIterator<Item = B>,
        A: Into<String>,
        B: Into<String>,
    {
        let mut by_name = BTreeMap::new();
        let mut endpoints: BTreeMap<String, String> = BTreeMap::new();

        for node in nodes {
            if let Some(first) = endpoints.get(&node.addr()) {
                return Err(TopologyError::DuplicateEndpoint {
                    addr: node.addr(),
                    first: first.clone(),
                    second: node.name,
                });
            }
            if by_name.contains_key(&node.name) {
                return Err(TopologyError::DuplicateName(node.name));
            }
            endpoints.insert(node.addr(), node.name.clone());
            by_name.insert(node.name.clone(), node);
        }

        let mut adjacency: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (from, targets) in edges {
            let from = from.into();
            if !by_name.contains_key(&from) {
                return Err(TopologyError::UnknownNode(from));
            }
            let set = adjacency.entry(from.clone()).or_default();
            for to in targets {
                let to = to.into();
                if to == from {
                    return Err(TopologyError::SelfLoop(from));
                }
                if !by_name.contains_key(&to) {
                    return Err(TopologyError::DanglingEdge { from, to });
                }
                set.insert(to);
            }
        }

        Ok(Self {
            nodes: by_name,
            edges: adjacency,
        })
    }

    /// The five-node herd: Hill, Jaquez, Smith, Campbell and Singleton on
    /// loopback ports 12205-12209.
    ///
    /// ```text
    ///           Singleton
    ///          /    |    \
    ///    Jaquez     |     Campbell
    ///       |       |    /
    ///     Hill ---- Smith
    /// ```
    pub fn default_registry() -> Self {
        let nodes = [
            ("Hill", 12205),
            ("Jaquez", 12206),
            ("Smith", 12207),
            ("Campbell", 12208),
            ("Singleton", 12209),
        ]
        .map(|(name, port)| NodeIdentity::new(name, DEFAULT_HOST, port));

        let edges = [
            ("Hill", vec!["Jaquez", "Smith"]),
            ("Jaquez", vec!["Hill", "Singleton"]),
            ("Smith", vec!["Hill", "Singleton", "Campbell"]),
            ("Campbell", vec!["Smith", "Singleton"]),
            ("Singleton", vec!["Jaquez", "Smith", "Campbell"]),
        ];

        Self::new(nodes, edges).expect("default registry is well-formed")
    }

    /// Look up a node by name.
    pub fn identity(&self, name: &str) -> Result<&NodeIdentity> {
        self.nodes
            .get(name)
            .ok_or_else(|| TopologyError::UnknownNode(name.to_string()))
    }

    /// Whether a node with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Nodes `name` floods to, ordered by name.
    pub fn neighbors(&self, name: &str) -> Result<Vec<&NodeIdentity>> {
        if !self.contains(name) {
            return Err(TopologyError::UnknownNode(name.to_string()));
        }
        Ok(self
            .edges
            .get(name)
            .into_iter()
            .flatten()
            .filter_map(|n| self.nodes.get(n))
            .collect())
    }

    /// All registered nodes, ordered by name.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeIdentity> {
        self.nodes.values()
    }

    /// Outbound edges as `(from, neighbor names)` pairs.
    pub fn edges(&self) -> impl Iterator<Item = (&str, Vec<&str>)> {
        self.edges
            .iter()
            .map(|(from, to)| (from.as_str(), to.iter().map(String::as_str).collect()))
    }

    /// Number of registered nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether every edge has a matching reverse edge.
    ///
    /// Asymmetric graphs are legal; this is a diagnostic.
    pub fn is_symmetric(&self) -> bool {
        self.edges.iter().all(|(from, targets)| {
            targets
                .iter()
                .all(|to| self.edges.get(to).is_some_and(|back| back.contains(from)))
        })
    }

    /// Names reachable from `start` by following outbound edges, including
    /// `start` itself.
    pub fn reachable_from(&self, start: &str) -> Result<BTreeSet<&str>> {
        let start = self.identity(start)?.name.as_str();
        let mut seen = BTreeSet::from([start]);
        let mut frontier = vec![start];
        while let Some(name) = frontier.pop() {
            for next in self.edges.get(name).into_iter().flatten() {
                if seen.insert(next.as_str()) {
                    frontier.push(next.as_str());
                }
            }
        }
        Ok(seen)
    }
}

/// Serializable description of a topology.
///
/// ```json
/// {
///   "nodes": [{"name": "A", "host": "127.0.0.1", "port": 9000}],
///   "edges": {"A": []}
/// }
/// ```
#[cfg(feature = "serde")]
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct TopologySpec {
    pub nodes: Vec<NodeIdentity>,
    #[serde(default)]
    pub edges: BTreeMap<String, Vec<String>>,
}

#[cfg(feature = "serde")]
impl TryFrom<TopologySpec> for Topology {
    type Error = TopologyError;

    fn try_from(spec: TopologySpec) -> Result<Self> {
        Topology::new(spec.nodes, spec.edges)
    }
}

#[cfg(feature = "serde")]
impl From<&Topology> for TopologySpec {
    fn from(topology: &Topology) -> Self {
        Self {
            nodes: topology.nodes().cloned().collect(),
            edges: topology
                .edges()
                .map(|(from, to)| {
                    (
                        from.to_string(),
                        to.into_iter().map(str::to_string).collect(),
                    )
                })
                .collect(),
        }
    }
}
