//! # Topology Runner
//!
//! Discovers every constant-product pair of the configured factory (or an
//! address file), builds the pair graph, optionally trims it by liquidity, and
//! then refreshes reserves on every new block until interrupted.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin topology_runner -- --config Config.toml --trim
//! cargo run --bin topology_runner -- --address-file addresses.txt --once
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use pair_topology_sdk::{
    clients::EthersChainClient,
    metrics,
    updater::LogStrategy,
    ChainClient, Discovery, Graph, LiquidityTrimmer, Settings, TokenRegistry, Updater,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::RwLock;

#[derive(Parser, Debug)]
#[command(name = "topology_runner", about = "Constant-product pair topology builder")]
struct Args {
    /// Configuration file
    #[arg(long, default_value = "Config.toml")]
    config: PathBuf,

    /// Trim low-liquidity pools even if trim.enabled is false
    #[arg(long)]
    trim: bool,

    /// Exit after discovery (and trimming) instead of following new blocks
    #[arg(long)]
    once: bool,

    /// Discover the pools listed in this file instead of enumerating the factory
    #[arg(long)]
    address_file: Option<PathBuf>,
}

fn init_observability() -> Result<()> {
    #[cfg(feature = "observability")]
    {
        tracing_subscriber::fmt().json().init();
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .install()
            .context("failed to install Prometheus exporter")?;
        metrics::describe_metrics();
    }
    #[cfg(not(feature = "observability"))]
    {
        env_logger::init();
        metrics::describe_metrics();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_observability()?;

    let args = Args::parse();
    let mut settings = Settings::from_path(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    if args.address_file.is_some() {
        settings.discovery.address_file = args.address_file.clone();
    }
    if args.trim {
        settings.trim.enabled = true;
    }

    let client: Arc<dyn ChainClient> = Arc::new(EthersChainClient::new(
        &settings.rpc.http_url,
        settings.rpc.ws_url.clone(),
        settings.call_timeout(),
    )?);
    info!("🚀 Topology runner starting against {}", settings.rpc.http_url);

    // Discovery
    let registry = Arc::new(TokenRegistry::new());
    let discovery = Discovery::new(Arc::clone(&client), Arc::clone(&registry), settings.discovery.workers);
    let source = settings.discovery_source()?;
    let discovered = discovery.discover_all(&source).await?;
    info!(
        "Discovery: {} pools, {} tokens, {} dropped",
        discovered.report.discovered,
        registry.len(),
        discovered.report.dropped
    );

    let mut graph = Graph::from_pools(discovered.pools);
    info!("Graph built: {} nodes, {} edges", graph.node_count(), graph.edge_count());

    // Trimming
    if settings.trim.enabled {
        let report = LiquidityTrimmer::new(settings.contracts.root_token, settings.trim.threshold)
            .with_drop_unreached(settings.trim.drop_unreached)
            .trim(&mut graph)?;
        info!(
            "Trimmed graph: {} -> {} edges ({} removed)",
            report.edges_before,
            report.edges_after,
            report.edges_removed()
        );
    }
    metrics::record_graph_size(graph.node_count(), graph.edge_count());

    if let Some(path) = &settings.log.snapshot_path {
        if let Err(e) = graph.write_pool_addresses(path) {
            warn!("⚠️ Failed to write pool snapshot to {}: {}", path.display(), e);
        }
    }

    if args.once || !settings.updater.enabled {
        info!("Done.");
        return Ok(());
    }

    // Live refresh
    let updater = Updater::new(Arc::new(RwLock::new(graph)), client, settings.updater.workers)
        .with_policy(settings.updater.overlap)
        .with_event_capacity(settings.updater.event_capacity)
        .with_strategy(Arc::new(LogStrategy));

    tokio::select! {
        result = updater.run() => {
            result?;
        }
        _ = signal::ctrl_c() => {
            info!("🛑 Ctrl+C received, shutting down");
        }
    }
    Ok(())
}
