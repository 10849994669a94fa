//! finger-daemon: runs a single node's membership finger table.
//!
//! Seeds the table from `--peers`, sweeps for failed peers in the background
//! and logs membership changes until Ctrl+C.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use finger_daemon::{Args, Node, NodeConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,finger_daemon=debug,finger_table=debug"
    } else {
        "info,finger_daemon=info,finger_table=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting finger-daemon");

    let config = NodeConfig::from_args(&args)?;
    info!("Failure timeout: {:?}", config.table.timeout);
    info!("Sweep interval: {:?}", config.table.sweep_interval());

    let node = Node::start(config)?;
    let mut status = tokio::time::interval(node.table().sweep_interval());

    info!("Node running. Press Ctrl+C to stop.");

    loop {
        tokio::select! {
            _ = status.tick() => {
                node.report();
            }

            // Handle graceful shutdown
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    node.shutdown().await;
    info!("Shutting down");
    Ok(())
}
