//! Locus Node - connection handling and node lifecycle.
//!
//! Every accepted connection runs its own task:
//!
//! ```text
//! AWAIT_LINE -> PARSE -> DISPATCH -> (REPLY | NO_REPLY) -> AWAIT_LINE
//! ```
//!
//! until the remote side closes. Clients and peers use the same listener;
//! the message kind decides who is talking. [`LocusNode::dispatch`] is the
//! PARSE/DISPATCH step with no I/O, so the protocol can be driven without
//! sockets.

use crate::config::NodeConfig;
use crate::error::Result;
use crate::flood::Flooder;
use crate::places::{PlaceSearch, QueryResolver};
use locus_protocols::{parse_line, LocationRecord, LocationStore, Malformed, Message, Reason};
use locus_topology::{NodeIdentity, Topology};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// What to do after one line has been dispatched.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Bytes to write back on the same connection
    pub reply: Option<String>,
    /// AT line to flood to neighbors
    pub flood: Option<String>,
}

impl Outcome {
    fn reply(text: String) -> Self {
        Self {
            reply: Some(text),
            flood: None,
        }
    }

    fn line(line: &str) -> Self {
        Self::reply(format!("{}\n", line))
    }
}

/// A running Locus node.
pub struct LocusNode<S> {
    identity: NodeIdentity,
    store: Arc<LocationStore>,
    flooder: Arc<Flooder>,
    resolver: QueryResolver<S>,
    shutdown_grace: Duration,
}

impl<S: PlaceSearch> LocusNode<S> {
    /// Create the node called `name` in `topology`.
    pub fn new(topology: &Topology, name: &str, config: &NodeConfig, search: S) -> Result<Self> {
        let identity = topology.identity(name)?.clone();
        let flooder = Flooder::new(topology, name, config.flood_timeout, config.flood_retries)?;

        Ok(Self {
            identity,
            store: Arc::new(LocationStore::new()),
            flooder: Arc::new(flooder),
            resolver: QueryResolver::new(search),
            shutdown_grace: config.shutdown_grace,
        })
    }

    /// This node's identity.
    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    /// The node's location store.
    pub fn store(&self) -> Arc<LocationStore> {
        Arc::clone(&self.store)
    }

    /// Bind the node's endpoint and serve until `shutdown` completes.
    pub async fn run<F>(self: Arc<Self>, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind(self.identity.addr()).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already-bound listener until `shutdown` completes.
    ///
    /// After shutdown no new connections are accepted. Open connections get
    /// the configured grace period and are then aborted.
    pub async fn serve<F>(self: Arc<Self>, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        info!("Booting node {} on {}", self.identity.name, listener.local_addr()?);
        info!(
            "  Neighbors: {:?}",
            self.flooder.neighbors().iter().map(|n| n.name.as_str()).collect::<Vec<_>>()
        );

        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested for {}", self.identity.name);
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        debug!("Incoming connection from {}", addr);
                        let node = Arc::clone(&self);
                        let span = info_span!("conn", node = %self.identity.name, peer = %addr);
                        connections.spawn(
                            async move {
                                if let Err(e) = node.handle_connection(stream, addr).await {
                                    warn!("Connection error from {}: {}", addr, e);
                                }
                            }
                            .instrument(span),
                        );
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                    }
                },
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        error!("Connection task failed: {}", e);
                    }
                }
            }
        }

        drop(listener);
        let drained = tokio::time::timeout(self.shutdown_grace, async {
            while connections.join_next().await.is_some() {}
        })
        .await
        .is_ok();
        if !drained {
            warn!("Aborting {} open connection(s)", connections.len());
            connections.shutdown().await;
        }

        info!("Node {} stopped", self.identity.name);
        Ok(())
    }

    /// Serve one connection until the remote side closes it.
    async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) -> Result<()> {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let mut line = Vec::new();

        while reader.read_until(b'\n', &mut line).await? > 0 {
            let outcome = match std::str::from_utf8(&line) {
                Ok(text) => {
                    debug!("{} received: {}", self.identity.name, text.trim_end());
                    self.dispatch(text).await
                }
                Err(_) => reject(Malformed::not_utf8(&line)),
            };

            if let Some(flood) = outcome.flood {
                let flooder = Arc::clone(&self.flooder);
                tokio::spawn(
                    async move {
                        flooder.flood(&flood).await;
                    }
                    .in_current_span(),
                );
            }

            if let Some(reply) = outcome.reply {
                debug!("{} send: {}", self.identity.name, reply.trim_end());
                writer.write_all(reply.as_bytes()).await?;
                writer.flush().await?;
            }

            line.clear();
        }

        debug!("Closing connection from {}", addr);
        Ok(())
    }

    /// Parse and dispatch one input line.
    pub async fn dispatch(&self, line: &str) -> Outcome {
        let message = match parse_line(line) {
            Ok(message) => message,
            Err(malformed) => return reject(malformed),
        };

        match message {
            Message::IAmAt(report) => {
                let at = report.to_at(&self.identity.name, unix_now());
                let at_line = at.to_string();

                if self.store.merge(LocationRecord::from_at(&at)).await {
                    info!("Stored report from client {}", at.client_id);
                    Outcome {
                        reply: Some(format!("{}\n", at_line)),
                        flood: Some(at_line),
                    }
                } else {
                    debug!("Stale report from client {}, not flooding", at.client_id);
                    Outcome::line(&at_line)
                }
            }

            Message::WhatsAt(query) => match self.store.get(&query.client_id).await {
                Some(record) => {
                    Outcome::reply(self.resolver.resolve(&record, query.radius, query.bound).await)
                }
                None => {
                    let tokens: Vec<&str> = line.split_whitespace().collect();
                    reject(Malformed::new(&tokens, Reason::UnknownClient(query.client_id)))
                }
            },

            Message::At(at) => {
                if self.store.merge(LocationRecord::from_at(&at)).await {
                    info!("Accepted update for {} from {}", at.client_id, at.origin);
                    Outcome {
                        reply: None,
                        flood: Some(at.to_string()),
                    }
                } else {
                    debug!("Duplicate update for {} from {}, dropping", at.client_id, at.origin);
                    Outcome::default()
                }
            }
        }
    }
}

/// Echo a rejected line back to its sender.
fn reject(malformed: Malformed) -> Outcome {
    info!("Rejected line: {}", malformed);
    Outcome::line(&malformed.echo())
}

/// Current Unix time in seconds.
fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use serde_json::{json, Value};
    use tokio::io::AsyncReadExt;

    const REPORT: &str = "IAMAT kiwi.cs.ucla.edu +34.068930-118.445127 1520023934.918963";

    struct FixedPlaces;

    impl PlaceSearch for FixedPlaces {
        async fn nearby(&self, _: &locus_protocols::Coordinates, _: u32) -> Result<Value> {
            Ok(json!({ "results": [{ "name": "a" }, { "name": "b" }, { "name": "c" }] }))
        }
    }

    struct BrokenPlaces;

    impl PlaceSearch for BrokenPlaces {
        async fn nearby(&self, _: &locus_protocols::Coordinates, _: u32) -> Result<Value> {
            Err(Error::Places("quota exceeded".into()))
        }
    }

    fn solo<S: PlaceSearch>(port: u16, search: S) -> LocusNode<S> {
        let topology = Topology::new(
            [NodeIdentity::new("Hill", "127.0.0.1", port)],
            Vec::<(&str, Vec<&str>)>::new(),
        )
        .unwrap();
        LocusNode::new(&topology, "Hill", &NodeConfig::default(), search).unwrap()
    }

    fn node() -> LocusNode<FixedPlaces> {
        solo(1, FixedPlaces)
    }

    #[tokio::test]
    async fn iamat_replies_with_at_line_and_floods() {
        let node = node();
        let outcome = node.dispatch(REPORT).await;

        let reply = outcome.reply.unwrap();
        let tokens: Vec<&str> = reply.split_whitespace().collect();
        assert!(reply.ends_with('\n'));
        assert_eq!(tokens[0], "AT");
        assert_eq!(tokens[1], "Hill");
        assert!(tokens[2].starts_with('+'), "client timestamp is in the past: {}", tokens[2]);
        assert_eq!(&tokens[3..], ["kiwi.cs.ucla.edu", "+34.068930-118.445127", "1520023934.918963"]);
        assert_eq!(outcome.flood.as_deref(), Some(reply.trim_end()));

        let stored = node.store().get("kiwi.cs.ucla.edu").await.unwrap();
        assert_eq!(stored.raw_message, reply.trim_end());
        assert_eq!(stored.client_timestamp, 1520023934.918963);
    }

    #[tokio::test]
    async fn future_timestamp_gets_negative_diff() {
        let node = node();
        let ts = unix_now() + 1000.0;
        let outcome = node.dispatch(&format!("IAMAT c +1-2 {}", ts)).await;
        let reply = outcome.reply.unwrap();
        assert!(reply.split_whitespace().nth(2).unwrap().starts_with('-'), "{}", reply);
    }

    #[tokio::test]
    async fn repeated_iamat_replies_but_does_not_flood() {
        let node = node();
        node.dispatch(REPORT).await;
        let outcome = node.dispatch(REPORT).await;
        assert!(outcome.reply.unwrap().starts_with("AT Hill "));
        assert_eq!(outcome.flood, None);
    }

    #[tokio::test]
    async fn stale_iamat_keeps_newer_record() {
        let node = node();
        node.dispatch("IAMAT c +1-2 200").await;
        let outcome = node.dispatch("IAMAT c +3-4 100").await;
        assert_eq!(outcome.flood, None);
        let stored = node.store().get("c").await.unwrap();
        assert_eq!(stored.client_timestamp, 200.0);
        assert!(stored.raw_message.contains("+1-2"));
    }

    #[tokio::test]
    async fn malformed_lines_are_echoed() {
        let node = node();
        for (line, echo) in [
            ("IAMAT kiwi 34.0 1.0", "? IAMAT kiwi 34.0 1.0\n"),
            ("HELLO there", "? HELLO there\n"),
            ("WHATSAT kiwi 51 5", "? WHATSAT kiwi 51 5\n"),
            ("AT Hill +0.1 kiwi +1-2", "? AT Hill +0.1 kiwi +1-2\n"),
        ] {
            let outcome = node.dispatch(line).await;
            assert_eq!(outcome.reply.as_deref(), Some(echo));
            assert_eq!(outcome.flood, None);
        }
        assert!(node.store().is_empty().await);
    }

    #[tokio::test]
    async fn whatsat_unknown_client_is_echoed() {
        let node = node();
        let outcome = node.dispatch("WHATSAT ghost 10 5").await;
        assert_eq!(outcome.reply.as_deref(), Some("? WHATSAT ghost 10 5\n"));
    }

    #[tokio::test]
    async fn whatsat_replays_stored_line_with_bounded_results() {
        let node = node();
        let at_line = node.dispatch(REPORT).await.flood.unwrap();
        let outcome = node.dispatch("WHATSAT kiwi.cs.ucla.edu 10 2").await;

        let reply = outcome.reply.unwrap();
        assert_eq!(outcome.flood, None);
        let (first, rest) = reply.split_once('\n').unwrap();
        assert_eq!(first, at_line);
        assert!(rest.ends_with("\n\n"));
        let doc: Value = serde_json::from_str(rest.trim_end()).unwrap();
        assert_eq!(doc["results"], json!([{ "name": "a" }, { "name": "b" }]));
    }

    #[tokio::test]
    async fn whatsat_with_failing_search_still_answers() {
        let node = solo(1, BrokenPlaces);
        node.dispatch("IAMAT c +1-2 5").await;
        let reply = node.dispatch("WHATSAT c 10 2").await.reply.unwrap();
        assert!(reply.starts_with("AT Hill "));
        assert!(reply.contains("quota exceeded"));
        assert!(!reply.starts_with('?'));
    }

    #[tokio::test]
    async fn at_is_stored_and_reflooded_verbatim() {
        let node = node();
        let line = "AT Smith +0.5 kiwi +34.068930-118.445127 1520023934.918963";
        let outcome = node.dispatch(line).await;
        assert_eq!(outcome.reply, None);
        assert_eq!(outcome.flood.as_deref(), Some(line));
        assert_eq!(node.store().get("kiwi").await.unwrap().raw_message, line);
    }

    #[tokio::test]
    async fn duplicate_at_is_dropped() {
        let node = node();
        let line = "AT Smith +0.5 kiwi +1-2 10";
        node.dispatch(line).await;
        assert_eq!(node.dispatch(line).await, Outcome::default());
        assert_eq!(node.dispatch("AT Jaquez +0.7 kiwi +5-6 9").await, Outcome::default());
        assert_eq!(node.store().get("kiwi").await.unwrap().raw_message, line);
    }

    #[tokio::test]
    async fn connection_carries_many_requests() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let node = Arc::new(solo(port, FixedPlaces));
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(Arc::clone(&node).serve(listener, async {
            let _ = stop_rx.await;
        }));

        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream
            .write_all(b"IAMAT c +1-2 5\nBOGUS\nAT X +0 c +1-2 4\nWHATSAT nobody 1 1\n")
            .await
            .unwrap();
        stream.shutdown().await.unwrap();

        let mut replies = String::new();
        stream.read_to_string(&mut replies).await.unwrap();
        let lines: Vec<&str> = replies.lines().collect();
        assert_eq!(lines.len(), 3, "{:?}", lines);
        assert!(lines[0].starts_with("AT Hill "));
        assert!(lines[0].ends_with(" c +1-2 5"));
        assert_eq!(lines[1], "? BOGUS");
        assert_eq!(lines[2], "? WHATSAT nobody 1 1");

        stop_tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn invalid_utf8_line_does_not_end_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let node = Arc::new(solo(port, FixedPlaces));
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(Arc::clone(&node).serve(listener, async {
            let _ = stop_rx.await;
        }));

        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream.write_all(b"IAMAT \xff +1-2 5\nIAMAT c +1-2 5\n").await.unwrap();
        stream.shutdown().await.unwrap();

        let mut replies = String::new();
        stream.read_to_string(&mut replies).await.unwrap();
        let lines: Vec<&str> = replies.lines().collect();
        assert_eq!(lines.len(), 2, "{:?}", lines);
        assert_eq!(lines[0], "? IAMAT \u{FFFD} +1-2 5");
        assert!(lines[1].starts_with("AT Hill "));
        assert!(lines[1].ends_with(" c +1-2 5"));
        assert!(node.store().get("c").await.is_some());
        assert_eq!(node.store().len().await, 1);

        stop_tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn unknown_node_name_is_rejected() {
        let topology = Topology::default_registry();
        let result = LocusNode::new(&topology, "Nobody", &NodeConfig::default(), FixedPlaces);
        assert!(matches!(result, Err(Error::Topology(_))));
    }
}
