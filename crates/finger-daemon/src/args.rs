//! Command-line arguments and the node configuration derived from them.

use anyhow::{Context, Result, bail};
use clap::Parser;
use finger_table::{Site, TableConfig};
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "finger-daemon")]
#[command(about = "Membership finger table node")]
pub struct Args {
    /// Port this node listens on
    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,

    /// Address this node advertises
    #[arg(long, default_value = "127.0.0.1")]
    pub ip: String,

    /// Site id (defaults to the port)
    #[arg(long)]
    pub id: Option<u64>,

    /// Peers to bootstrap from, comma separated (`id@ip:port` or `ip:port`)
    #[arg(short = 'o', long, value_delimiter = ',')]
    pub peers: Vec<String>,

    /// Seconds of silence before a peer is declared failed
    #[arg(short, long, default_value_t = 5)]
    pub timeout: u64,

    /// Seconds between failure sweeps (defaults to the timeout)
    #[arg(long)]
    pub sweep_interval: Option<u64>,

    /// Join as a pure client (never a routing target)
    #[arg(long)]
    pub client: bool,

    /// Enable verbose logging
    #[arg(long)]
    pub verbose: bool,
}

/// Everything a node needs to build and seed its finger table.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub local: Site,
    pub seeds: Vec<Site>,
    pub table: TableConfig,
}

impl NodeConfig {
    pub fn from_args(args: &Args) -> Result<Self> {
        let id = args.id.unwrap_or(u64::from(args.port));
        let mut local = Site::new(id, args.ip.clone(), args.port);
        local.client = args.client;

        let mut seeds: Vec<Site> = Vec::new();
        for peer in &args.peers {
            let seed: Site = peer
                .parse()
                .with_context(|| format!("Invalid peer '{}'", peer))?;
            if seed.id == local.id {
                continue;
            }
            if seeds.iter().any(|s| s.id == seed.id) {
                bail!("Duplicate peer id {} in --peers", seed.id);
            }
            seeds.push(seed);
        }

        let mut table = TableConfig::from_secs(args.timeout);
        if let Some(secs) = args.sweep_interval {
            table = table.with_sweep_interval(Duration::from_secs(secs));
        }
        table.validate().context("Invalid failure detection settings")?;

        Ok(Self { local, seeds, table })
    }
}
