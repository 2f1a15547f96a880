//! Locus Node binary
//!
//! Usage: `locus-node <NODE_NAME>`

use locus_node::{GooglePlaces, LocusNode, NodeConfig};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn print_usage() {
    eprintln!("locus-node - Locus location node");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  locus-node <NODE_NAME>");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  LOCUS_PLACES_API_KEY     API key for the places service");
    eprintln!("  LOCUS_PLACES_URL         Nearby-search endpoint");
    eprintln!("  LOCUS_PLACES_TIMEOUT_MS  Places request timeout (default: 10000)");
    eprintln!("  LOCUS_FLOOD_TIMEOUT_MS   Per-neighbor flood timeout (default: 3000)");
    eprintln!("  LOCUS_FLOOD_RETRIES      Flood retries per neighbor (default: 1)");
    eprintln!("  LOCUS_SHUTDOWN_GRACE_MS  Connection drain time on shutdown (default: 2000)");
    eprintln!("  LOCUS_TOPOLOGY           JSON topology file (default: built-in herd)");
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "locus_node=info,locus_protocols=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let Some(name) = std::env::args().nth(1) else {
        print_usage();
        return Ok(ExitCode::from(2));
    };

    let config = NodeConfig::from_env()?;
    let topology = config.load_topology()?;
    if !topology.contains(&name) {
        let known: Vec<_> = topology.nodes().map(|n| n.name.as_str()).collect();
        eprintln!("Invalid node: {} (known: {})", name, known.join(", "));
        return Ok(ExitCode::FAILURE);
    }

    tracing::info!("Starting Locus node {}", name);

    let search = GooglePlaces::from_config(&config)?;
    let node = Arc::new(LocusNode::new(&topology, &name, &config, search)?);
    node.run(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    })
    .await?;

    tracing::info!("Shutting down node {}", name);
    Ok(ExitCode::SUCCESS)
}
