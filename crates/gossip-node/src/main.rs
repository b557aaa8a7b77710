//! gossip-host: a libp2p gossip pub/sub chat node.
//!
//! Startup sequence:
//!   1. Load `host.config.json` and apply command-line overrides
//!   2. Build the host (transports, Kademlia, GossipSub, mDNS)
//!   3. Join the chat topic, contact bootstrap peers, start discovery
//!   4. Optionally serve JSON-RPC
//!   5. Publish stdin lines until Ctrl+C or end of input

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use gossip_node::GossipNode;
use gossip_p2p::{Config, Overrides};

#[derive(Parser, Debug)]
#[command(name = "gossip-host", version, about = "Starts the gossip pub/sub node")]
struct Args {
    /// The configuration file.
    #[arg(short, long, default_value = "host.config.json")]
    config: PathBuf,

    /// Addresses on which to listen (comma-separated). Overrides the config file.
    #[arg(short, long)]
    listens: Option<String>,

    /// Peers to connect (comma-separated). Overrides the config file.
    #[arg(short, long)]
    peers: Option<String>,

    /// JSON-RPC listen address. Overrides the config file.
    #[arg(short, long)]
    rpc_listen: Option<String>,

    /// Log file location. Defaults to stderr.
    #[arg(long)]
    log: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log.as_deref())?;

    if let Err(e) = run(args).await {
        error!("{e:#}");
        return Err(e);
    }
    // The stdin reader may still be parked in a blocking read that the
    // runtime would wait on during shutdown.
    std::process::exit(0);
}

async fn run(args: Args) -> anyhow::Result<()> {
    info!(config = %args.config.display(), "loading config");
    let overrides = Overrides {
        listens: args.listens,
        peers: args.peers,
        rpc_listen: args.rpc_listen,
    };
    let config = Config::load(&args.config, &overrides).context("loading config")?;
    info!(?config, "loaded configuration, starting host");

    let reason = GossipNode::new(config)
        .run()
        .await
        .context("running host")?;
    info!(?reason, "host stopped");
    Ok(())
}

fn init_logging(log: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match log {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}
