//! Flooding broadcast engine.
//!
//! An accepted update is pushed to every direct neighbor of the origin node
//! over a fresh TCP connection: connect, write the line, flush, close.
//! Neighbors are attempted concurrently and independently. There is no
//! queue and no acknowledgment; a neighbor that stays unreachable after its
//! retries simply misses this copy.
//!
//! Termination on a cyclic graph is the store's job: a node re-floods only
//! what its own store accepted as strictly newer, so duplicates die at the
//! first node that already holds them.

use crate::error::{Error, Result};
use futures::future::join_all;
use locus_topology::{NodeIdentity, Topology};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Pause before retrying a failed neighbor.
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Outcome of one flood.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FloodReport {
    /// Neighbors that received the line
    pub delivered: Vec<String>,
    /// Neighbors that could not be reached, with the last error
    pub failed: Vec<(String, String)>,
}

/// Floods lines from one node to its neighbors.
#[derive(Debug, Clone)]
pub struct Flooder {
    origin: String,
    neighbors: Vec<NodeIdentity>,
    timeout: Duration,
    retries: u32,
}

impl Flooder {
    /// Build the flooder for `origin` from the topology.
    pub fn new(topology: &Topology, origin: &str, timeout: Duration, retries: u32) -> Result<Self> {
        let neighbors = topology.neighbors(origin)?.into_iter().cloned().collect();
        Ok(Self {
            origin: origin.to_string(),
            neighbors,
            timeout,
            retries,
        })
    }

    /// Neighbors this node floods to.
    pub fn neighbors(&self) -> &[NodeIdentity] {
        &self.neighbors
    }

    /// Send `line` to every neighbor concurrently.
    ///
    /// Never fails as a whole; per-neighbor failures are logged and
    /// reported.
    pub async fn flood(&self, line: &str) -> FloodReport {
        let payload = format!("{}\n", line.trim_end_matches(['\r', '\n']));
        let payload = payload.as_str();
        let attempts = self
            .neighbors
            .iter()
            .map(|peer| async move { (peer, self.deliver(peer, payload).await) });

        let mut report = FloodReport::default();
        for (peer, result) in join_all(attempts).await {
            match result {
                Ok(()) => {
                    debug!("{} flooded to {}: {}", self.origin, peer.name, line);
                    report.delivered.push(peer.name.clone());
                }
                Err(e) => {
                    warn!("{} failed to flood to {}: {}", self.origin, peer.name, e);
                    report.failed.push((peer.name.clone(), e.to_string()));
                }
            }
        }

        info!(
            "{} flood complete: {} delivered, {} failed",
            self.origin,
            report.delivered.len(),
            report.failed.len()
        );
        report
    }

    /// Deliver to one neighbor, retrying up to `retries` times.
    async fn deliver(&self, peer: &NodeIdentity, payload: &str) -> Result<()> {
        let mut attempt = 0;
        loop {
            match self.send_once(peer, payload).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    debug!("Retrying {} after error: {}", peer.name, e);
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One connect-write-close cycle bounded by the flood timeout.
    async fn send_once(&self, peer: &NodeIdentity, payload: &str) -> Result<()> {
        let send = async {
            let mut stream = TcpStream::connect(peer.addr()).await?;
            stream.write_all(payload.as_bytes()).await?;
            stream.flush().await?;
            stream.shutdown().await?;
            Ok::<_, std::io::Error>(())
        };

        match tokio::time::timeout(self.timeout, send).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::PeerUnreachable {
                peer: peer.name.clone(),
                reason: e.to_string(),
            }),
            Err(_) => Err(Error::Timeout(self.timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    async fn bind() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    async fn read_one_line(listener: &TcpListener) -> String {
        let (stream, _) = listener.accept().await.unwrap();
        let mut line = String::new();
        BufReader::new(stream).read_line(&mut line).await.unwrap();
        line
    }

    /// A port nothing listens on: bind then drop.
    async fn dead_port() -> u16 {
        let (listener, port) = bind().await;
        drop(listener);
        port
    }

    /// Origin never receives anything, so its port is never dialed.
    fn star(ports: &[(&str, u16)]) -> Topology {
        let mut nodes = vec![NodeIdentity::new("Origin", "127.0.0.1", 1)];
        nodes.extend(ports.iter().map(|(n, p)| NodeIdentity::new(*n, "127.0.0.1", *p)));
        let targets: Vec<&str> = ports.iter().map(|(n, _)| *n).collect();
        Topology::new(nodes, [("Origin", targets)]).unwrap()
    }

    #[tokio::test]
    async fn floods_every_neighbor() {
        let (a, a_port) = bind().await;
        let (b, b_port) = bind().await;
        let topology = star(&[("A", a_port), ("B", b_port)]);
        let flooder = Flooder::new(&topology, "Origin", Duration::from_secs(2), 0).unwrap();

        let line = "AT Origin +0.5 kiwi +1-2 3";
        let (report, got_a, got_b) =
            tokio::join!(flooder.flood(line), read_one_line(&a), read_one_line(&b));

        assert_eq!(report.delivered, vec!["A", "B"]);
        assert!(report.failed.is_empty());
        assert_eq!(got_a, format!("{}\n", line));
        assert_eq!(got_b, format!("{}\n", line));
    }

    #[tokio::test]
    async fn unreachable_neighbor_does_not_block_others() {
        let (a, a_port) = bind().await;
        let dead = dead_port().await;
        let topology = star(&[("A", a_port), ("Dead", dead)]);
        let flooder = Flooder::new(&topology, "Origin", Duration::from_secs(1), 1).unwrap();

        let (report, got_a) = tokio::join!(flooder.flood("AT Origin +0 c +1-2 3"), read_one_line(&a));

        assert_eq!(report.delivered, vec!["A"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "Dead");
        assert_eq!(got_a, "AT Origin +0 c +1-2 3\n");
    }

    #[tokio::test]
    async fn node_without_neighbors_floods_nothing() {
        let topology = Topology::new(
            [NodeIdentity::new("Alone", "127.0.0.1", 1)],
            Vec::<(&str, Vec<&str>)>::new(),
        )
        .unwrap();
        let flooder = Flooder::new(&topology, "Alone", Duration::from_secs(1), 0).unwrap();
        assert!(flooder.neighbors().is_empty());
        assert_eq!(flooder.flood("AT Alone +0 c +1-2 3").await, FloodReport::default());
    }

    #[test]
    fn unknown_origin_is_an_error() {
        let topology = Topology::default_registry();
        let err = Flooder::new(&topology, "Nobody", Duration::from_secs(1), 0).unwrap_err();
        assert!(matches!(err, Error::Topology(_)));
    }
}
