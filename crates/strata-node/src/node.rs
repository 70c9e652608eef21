//! Node assembly: store, engine and API wired up from a [`NodeConfig`].

use crate::api::{ProtocolApi, TransactionBroadcaster};
use crate::config::{NodeConfig, StorageBackend};
use crate::validation::AddressValidator;
use anyhow::{bail, Context};
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use strata_consensus::{Block, Engine, EngineState, Genesis};
use strata_storage::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore};

/// A running node.
#[derive(Debug)]
pub struct Node {
    config: NodeConfig,
    engine: Engine,
    api: ProtocolApi,
}

impl Node {
    /// Opens the snapshot store, resumes the engine from its newest
    /// snapshot and builds the API.
    pub fn open(config: NodeConfig, broadcaster: Arc<dyn TransactionBroadcaster>) -> anyhow::Result<Self> {
        let params = config.consensus_params();
        let auth = config
            .authorization
            .build(config.network)
            .map_err(anyhow::Error::msg)
            .context("invalid authorization list")?;
        let store = open_store(&config)?;
        let genesis = genesis_state(&config)?;

        let engine = Engine::open(config.engine_config(), params, auth, store, genesis)
            .context("failed to open consensus engine")?;

        let api = ProtocolApi::new(
            engine.reader(),
            AddressValidator::new(config.network, config.safe_addresses),
            broadcaster,
            config.max_null_data,
        );

        tracing::info!(
            network = config.network.name(),
            height = ?engine.height(),
            storage = ?config.storage,
            safe_addresses = config.safe_addresses,
            "Node opened"
        );
        Ok(Self {
            config,
            engine,
            api,
        })
    }

    /// Configuration the node runs with.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// The consensus engine.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// The protocol operations.
    pub fn api(&self) -> &ProtocolApi {
        &self.api
    }

    /// Writes a final snapshot.
    pub fn shutdown(&self) -> anyhow::Result<()> {
        self.engine
            .persist()
            .context("failed to persist state on shutdown")?;
        tracing::info!(height = ?self.engine.height(), "Node stopped");
        Ok(())
    }
}

/// Opens the configured snapshot store.
pub fn open_store(config: &NodeConfig) -> anyhow::Result<Arc<dyn SnapshotStore>> {
    match config.storage {
        StorageBackend::Memory => Ok(Arc::new(MemorySnapshotStore::new())),
        StorageBackend::File => {
            let dir = config.data_dir.join("snapshots");
            let store = FileSnapshotStore::open(&dir)
                .with_context(|| format!("failed to open snapshot directory {}", dir.display()))?;
            Ok(Arc::new(store))
        }
        StorageBackend::Rocksdb => open_rocksdb(config),
    }
}

#[cfg(feature = "rocksdb-backend")]
fn open_rocksdb(config: &NodeConfig) -> anyhow::Result<Arc<dyn SnapshotStore>> {
    let rocks = strata_storage::RocksDbConfig {
        path: config.data_dir.join("snapshots.db"),
        ..strata_storage::RocksDbConfig::default()
    };
    let store = strata_storage::RocksDbSnapshotStore::open(rocks).context("failed to open RocksDB")?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "rocksdb-backend"))]
fn open_rocksdb(_config: &NodeConfig) -> anyhow::Result<Arc<dyn SnapshotStore>> {
    bail!("storage 'rocksdb' requires the rocksdb-backend feature")
}

/// Builds the state before the first block, from the genesis file if one
/// is configured.
pub fn genesis_state(config: &NodeConfig) -> anyhow::Result<EngineState> {
    let params = config.consensus_params();
    let Some(path) = &config.genesis else {
        return Ok(EngineState::genesis(&params));
    };
    let genesis = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Genesis::load_json(path),
        _ => Genesis::load_yaml(path),
    }
    .with_context(|| format!("failed to load genesis {}", path.display()))?;
    let state = genesis.initial_state(&params)?;
    tracing::info!(allocations = genesis.allocations.len(), "Genesis loaded");
    Ok(state)
}

/// Reads blocks from a file holding one JSON block per line. Blank lines
/// are skipped.
pub fn load_blocks(path: &Path) -> anyhow::Result<Vec<Block>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open block file {}", path.display()))?;
    let mut blocks = Vec::new();
    for (number, line) in std::io::BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let block: Block = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: malformed block", path.display(), number + 1))?;
        if let Some(previous) = blocks.last().map(|b: &Block| b.height) {
            if block.height != previous + 1 {
                bail!(
                    "{}:{}: expected height {}, found {}",
                    path.display(),
                    number + 1,
                    previous + 1,
                    block.height
                );
            }
        }
        blocks.push(block);
    }
    Ok(blocks)
}
