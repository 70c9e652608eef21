//! Strata Node - protocol state engine.
//!
//! Loads configuration, resumes from the newest snapshot and replays a
//! file of base-chain blocks through the consensus engine.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use strata_consensus::{EngineEvent, MemoryChain};
use strata_node::config::{AuthorizationMode, NodeConfig};
use strata_node::node::load_blocks;
use strata_node::observability::{init_logging, LogFormat};
use strata_node::{MemoryBroadcaster, Node};
use strata_types::Network;
use tokio::sync::broadcast::error::TryRecvError;

/// Strata Node - token protocol state engine
#[derive(Parser, Debug)]
#[command(name = "strata-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML, TOML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Network to follow (main, test, regtest)
    #[arg(long)]
    network: Option<Network>,

    /// Data directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (pretty, json)
    #[arg(long)]
    log_format: Option<String>,

    /// Blocks to replay, one JSON block per line
    #[arg(long)]
    blocks: Option<PathBuf>,

    /// Let any sender activate features and publish alerts
    #[arg(long)]
    allow_any_sender: bool,

    /// Accept raw segwit addresses in protocol operations
    #[arg(long)]
    unsafe_addresses: bool,
}

impl Args {
    fn apply(&self, config: &mut NodeConfig) {
        if let Some(network) = self.network {
            config.network = network;
        }
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.log_format = format.clone();
        }
        if self.allow_any_sender {
            config.authorization.mode = AuthorizationMode::Any;
        }
        if self.unsafe_addresses {
            config.safe_addresses = false;
        }
    }
}

fn main() {
    let args = Args::parse();

    let mut config = match NodeConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("strata-node: {e}");
            std::process::exit(1);
        }
    };
    args.apply(&mut config);

    init_logging(&config.log_level, LogFormat::parse(&config.log_format));
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Strata node");
    tracing::info!(
        network = config.network.name(),
        data_dir = %config.data_dir.display(),
        storage = ?config.storage,
        "Node configuration"
    );

    if let Err(e) = std::fs::create_dir_all(&config.data_dir) {
        tracing::error!(error = %e, "Failed to create data directory");
        std::process::exit(1);
    }

    let node = match Node::open(config, Arc::new(MemoryBroadcaster::new())) {
        Ok(node) => node,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Failed to start node");
            std::process::exit(1);
        }
    };

    let mut exit_code = 0;
    if let Some(path) = &args.blocks {
        exit_code = replay(&node, path);
    }

    if let Err(e) = node.shutdown() {
        tracing::error!(error = %format!("{e:#}"), "Shutdown failed");
        if exit_code == 0 {
            exit_code = 1;
        }
    }
    std::process::exit(exit_code);
}

/// Replays the block file and returns the process exit code.
fn replay(node: &Node, path: &std::path::Path) -> i32 {
    let blocks = match load_blocks(path) {
        Ok(blocks) => blocks,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Failed to read blocks");
            return 1;
        }
    };
    let mut events = node.engine().subscribe();
    let chain = MemoryChain::from_blocks(blocks);
    let result = node.engine().sync(&chain);

    loop {
        match events.try_recv() {
            Ok(EngineEvent::CheckpointComputed(checkpoint)) => tracing::info!(
                height = checkpoint.height,
                digest = %checkpoint.digest,
                "Consensus checkpoint"
            ),
            Ok(_) => {}
            Err(TryRecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "event backlog overflowed");
            }
            Err(_) => break,
        }
    }

    match result {
        Ok(report) => {
            tracing::info!(
                processed = report.processed,
                rollbacks = report.rollbacks,
                height = ?report.height,
                "Replay finished"
            );
            0
        }
        Err(err) => match err.fatal() {
            Some(fatal) => {
                tracing::error!(
                    error = %fatal,
                    "Consensus engine halted; upgrade or investigate before restarting"
                );
                fatal.exit_code()
            }
            None => {
                tracing::error!(error = %err, "Replay failed");
                1
            }
        },
    }
}
