//! Block-processing driver.
//!
//! The [`Engine`] owns the committed [`EngineState`] and applies blocks one
//! at a time. Each block is applied to a private copy; readers keep seeing
//! the previous state until the copy is swapped in. A fatal condition halts
//! ingestion for good while queries keep working.

use crate::activation::SenderAuthorization;
use crate::apply::{self, TxContext};
use crate::block::Block;
use crate::compat;
use crate::error::{EngineError, FatalError, InvalidReason, Result};
use crate::fingerprint::{self, Checkpoint};
use crate::params::{ConsensusParams, EngineConfig};
use crate::state::{Balance, EngineState, Property, TxRecord};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use strata_codec::parse_transaction;
use strata_storage::{Snapshot, SnapshotStore};
use strata_types::{Address, BlockHash, BlockHeight, PropertyId, Txid};
use tokio::sync::broadcast;

/// Events emitted by the engine.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A block was committed.
    BlockProcessed {
        height: BlockHeight,
        hash: BlockHash,
        valid: usize,
        invalid: usize,
    },
    /// A protocol transaction was evaluated.
    TransactionProcessed {
        txid: Txid,
        height: BlockHeight,
        valid: bool,
        code: i32,
    },
    /// A fingerprint was computed.
    CheckpointComputed(Checkpoint),
    /// State was rolled back after a reorganization.
    RolledBack {
        /// Height before the rollback.
        from: Option<BlockHeight>,
        /// Height of the restored state; `None` for genesis.
        to: Option<BlockHeight>,
    },
    /// The engine stopped ingesting blocks.
    Halted(FatalError),
}

/// What processing one block did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSummary {
    /// Block height.
    pub height: BlockHeight,
    /// Block hash.
    pub hash: BlockHash,
    /// Protocol transactions that took effect.
    pub valid: usize,
    /// Protocol transactions that were rejected.
    pub invalid: usize,
    /// Fingerprint taken after the block, if due.
    pub checkpoint: Option<Checkpoint>,
}

/// Read-only view of the committed state.
///
/// Cheap to clone; every call observes the state as of the last fully
/// committed block.
#[derive(Debug, Clone)]
pub struct StateReader {
    state: Arc<RwLock<Arc<EngineState>>>,
}

impl StateReader {
    /// The committed state.
    pub fn current(&self) -> Arc<EngineState> {
        Arc::clone(&self.state.read())
    }

    /// Height of the last committed block.
    pub fn height(&self) -> Option<BlockHeight> {
        self.state.read().height
    }

    /// Balance of `address` in `property`.
    pub fn balance(&self, address: &Address, property: PropertyId) -> Balance {
        self.state.read().tally.balance(address, property)
    }

    /// Every non-empty balance of `address`.
    pub fn balances(&self, address: &Address) -> BTreeMap<PropertyId, Balance> {
        self.state.read().tally.balances_of(address)
    }

    /// Property details.
    pub fn property(&self, id: PropertyId) -> Option<Property> {
        self.state.read().registry.get(id).cloned()
    }

    /// Outcome of a protocol transaction.
    pub fn transaction(&self, txid: &Txid) -> Option<TxRecord> {
        self.state.read().records.transactions.get(txid).cloned()
    }
}

/// The protocol state machine driver.
pub struct Engine {
    config: EngineConfig,
    params: ConsensusParams,
    auth: Arc<dyn SenderAuthorization>,
    store: Arc<dyn SnapshotStore>,

    /// State before the first block, used when no snapshot can be restored.
    genesis: Arc<EngineState>,

    /// Last committed state.
    state: Arc<RwLock<Arc<EngineState>>>,

    /// Set once a fatal condition fired.
    halted: Arc<RwLock<Option<FatalError>>>,

    /// Event broadcaster.
    events: broadcast::Sender<EngineEvent>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("network", &self.params.network)
            .field("height", &self.state.read().height)
            .field("halted", &self.halted.read().is_some())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Creates an engine starting from `genesis`.
    pub fn new(
        config: EngineConfig,
        params: ConsensusParams,
        auth: Arc<dyn SenderAuthorization>,
        store: Arc<dyn SnapshotStore>,
        genesis: EngineState,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        tracing::info!(
            network = params.network.name(),
            client_version = config.client_version,
            authorization = %auth.describe(),
            "consensus engine created"
        );
        let genesis = Arc::new(genesis);
        Self {
            config,
            params,
            auth,
            store,
            state: Arc::new(RwLock::new(Arc::clone(&genesis))),
            genesis,
            halted: Arc::new(RwLock::new(None)),
            events,
        }
    }

    /// Creates an engine resuming from the newest stored snapshot, or from
    /// `genesis` when the store is empty.
    pub fn open(
        config: EngineConfig,
        params: ConsensusParams,
        auth: Arc<dyn SenderAuthorization>,
        store: Arc<dyn SnapshotStore>,
        genesis: EngineState,
    ) -> Result<Self> {
        let engine = Self::new(config, params, auth, store, genesis);
        let latest = engine
            .store
            .latest()
            .map_err(|e| FatalError::SnapshotUnavailable(e.to_string()))?;
        if let Some(snapshot) = latest {
            let state = decode_snapshot(&snapshot)?;
            tracing::info!(
                height = snapshot.height(),
                block = %snapshot.block_hash(),
                "resumed from snapshot"
            );
            *engine.state.write() = Arc::new(state);
        }
        Ok(engine)
    }

    /// Subscribes to engine events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Returns a read-only handle on the committed state.
    pub fn reader(&self) -> StateReader {
        StateReader {
            state: Arc::clone(&self.state),
        }
    }

    /// The committed state.
    pub fn state(&self) -> Arc<EngineState> {
        Arc::clone(&self.state.read())
    }

    /// Height of the last committed block.
    pub fn height(&self) -> Option<BlockHeight> {
        self.state.read().height
    }

    /// Network rules.
    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    /// Local settings.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Snapshot storage.
    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    /// The fatal condition that halted the engine, if any.
    pub fn halted(&self) -> Option<FatalError> {
        self.halted.read().clone()
    }

    /// Fails with [`EngineError::Halted`] once the engine has halted.
    pub(crate) fn ensure_running(&self) -> Result<()> {
        match self.halted.read().as_ref() {
            Some(fatal) => Err(EngineError::Halted(fatal.clone())),
            None => Ok(()),
        }
    }

    /// Applies `block`, which must extend the last committed block.
    pub fn process_block(&self, block: &Block) -> Result<BlockSummary> {
        self.ensure_running()?;

        let current = self.state();
        let expected_height = current.next_height(&self.params);
        let links = match current.height {
            Some(height) => block.extends(height, &current.block_hash),
            None => block.height == expected_height,
        };
        if !links {
            if let Some(height) = current.height {
                // keep the state we may have to return to
                if let Err(e) = self.write_snapshot(&current) {
                    tracing::warn!(height, error = %e, "failed to snapshot before reorg");
                }
            }
            return Err(EngineError::NotChild {
                height: block.height,
                hash: block.hash,
                expected_height,
                expected_parent: current.block_hash,
            });
        }

        let mut next = (*current).clone();
        let (summary, tx_events) = match self.execute(&mut next, block) {
            Ok(summary) => summary,
            Err(fatal) => return Err(self.halt(fatal)),
        };
        let mismatch = summary
            .checkpoint
            .as_ref()
            .and_then(|checkpoint| self.verify_checkpoint(checkpoint).err());

        let committed = Arc::new(next);
        *self.state.write() = Arc::clone(&committed);

        tracing::info!(
            height = block.height,
            block = %block.hash,
            txs = block.tx_count(),
            valid = summary.valid,
            invalid = summary.invalid,
            "block processed"
        );
        for event in tx_events {
            let _ = self.events.send(event);
        }
        if let Some(checkpoint) = &summary.checkpoint {
            let _ = self.events.send(EngineEvent::CheckpointComputed(checkpoint.clone()));
        }
        let _ = self.events.send(EngineEvent::BlockProcessed {
            height: summary.height,
            hash: summary.hash,
            valid: summary.valid,
            invalid: summary.invalid,
        });

        self.maybe_snapshot(&committed);

        if let Some(fatal) = mismatch {
            return Err(self.halt(fatal));
        }
        if let Err(fatal) = compat::check(&committed, block.height, self.config.client_version) {
            return Err(self.halt(fatal));
        }
        Ok(summary)
    }

    /// Applies every transaction of `block` to `state`.
    fn execute(
        &self,
        state: &mut EngineState,
        block: &Block,
    ) -> std::result::Result<(BlockSummary, Vec<EngineEvent>), FatalError> {
        apply::begin_block(state, block.height, block.time).map_err(|e| {
            FatalError::InvariantViolated {
                height: block.height,
                detail: e.to_string(),
            }
        })?;

        let mut valid = 0;
        let mut invalid = 0;
        let mut events = Vec::new();
        for (index, raw) in block.transactions.iter().enumerate() {
            let tx = match parse_transaction(raw) {
                Ok(tx) => tx,
                Err(e) => {
                    tracing::trace!(txid = %raw.txid, error = %e, "not a protocol transaction");
                    continue;
                }
            };
            if tx.message.is_unrecognized() {
                tracing::debug!(
                    txid = %tx.txid,
                    version = tx.message.version(),
                    kind = tx.message.type_code(),
                    "ignoring unrecognized message"
                );
                continue;
            }

            let ctx = TxContext {
                params: &self.params,
                auth: self.auth.as_ref(),
                height: block.height,
                time: block.time,
                index: u32::try_from(index).unwrap_or(u32::MAX),
            };
            let reason: Option<InvalidReason> = apply::apply(state, &tx, &ctx).err();
            match &reason {
                None => {
                    valid += 1;
                    tracing::debug!(txid = %tx.txid, kind = tx.message.type_code(), "message applied");
                }
                Some(reason) => {
                    invalid += 1;
                    tracing::warn!(
                        txid = %tx.txid,
                        sender = %tx.sender,
                        code = reason.code(),
                        reason = %reason,
                        "invalid protocol transaction"
                    );
                }
            }

            let record = TxRecord {
                txid: tx.txid,
                block: block.height,
                index: ctx.index,
                sender: tx.sender.clone(),
                reference: tx.reference.clone(),
                message: tx.message.clone(),
                valid: reason.is_none(),
                reason,
            };
            events.push(EngineEvent::TransactionProcessed {
                txid: record.txid,
                height: block.height,
                valid: record.valid,
                code: record.reason_code(),
            });
            state.records.transactions.insert(record.txid, record);
        }

        for alert in state.alerts.expire(block.height, block.time) {
            tracing::info!(alert = %alert.txid, height = block.height, "alert expired");
        }

        if let Some(mismatch) = state.audit().into_iter().next() {
            tracing::error!(
                height = block.height,
                property = %mismatch.property,
                supply = mismatch.supply,
                held = %mismatch.held,
                "supply audit failed"
            );
            return Err(FatalError::InvariantViolated {
                height: block.height,
                detail: format!(
                    "property {} holds {} against supply {}",
                    mismatch.property, mismatch.held, mismatch.supply
                ),
            });
        }

        state.remember_block(block.height, block.hash, self.config.max_reorg_depth);
        state.height = Some(block.height);
        state.block_hash = block.hash;
        state.block_time = block.time;

        let checkpoint = self.due_fingerprint(block.height).then(|| Checkpoint {
            height: block.height,
            block_hash: block.hash,
            digest: fingerprint::fingerprint(state),
        });
        if let Some(checkpoint) = &checkpoint {
            tracing::info!(
                height = checkpoint.height,
                digest = %checkpoint.digest,
                "consensus fingerprint"
            );
            state.checkpoints.push(checkpoint.clone());
        }

        let summary = BlockSummary {
            height: block.height,
            hash: block.hash,
            valid,
            invalid,
            checkpoint,
        };
        Ok((summary, events))
    }

    fn due_fingerprint(&self, height: BlockHeight) -> bool {
        let interval = self.params.fingerprint_interval;
        (interval > 0 && height % interval == 0) || self.params.checkpoints.contains_key(&height)
    }

    fn verify_checkpoint(&self, checkpoint: &Checkpoint) -> std::result::Result<(), FatalError> {
        if !self.config.verify_checkpoints {
            return Ok(());
        }
        match self.params.checkpoints.get(&checkpoint.height) {
            Some(expected) if !expected.eq_ignore_ascii_case(&checkpoint.digest) => {
                Err(FatalError::ConsensusMismatch {
                    height: checkpoint.height,
                    expected: expected.clone(),
                    computed: checkpoint.digest.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    fn maybe_snapshot(&self, state: &EngineState) {
        let interval = self.config.snapshot_interval;
        let Some(height) = state.height else {
            return;
        };
        if interval == 0 || height % interval != 0 {
            return;
        }
        if let Err(e) = self.write_snapshot(state) {
            tracing::warn!(height, error = %e, "failed to write snapshot");
            return;
        }
        match self.store.prune(self.config.snapshot_retention.max(1)) {
            Ok(0) => {}
            Ok(removed) => tracing::debug!(removed, "pruned old snapshots"),
            Err(e) => tracing::warn!(error = %e, "failed to prune snapshots"),
        }
    }

    pub(crate) fn write_snapshot(&self, state: &EngineState) -> Result<()> {
        let Some(height) = state.height else {
            return Ok(());
        };
        let snapshot = Snapshot::new(height, state.block_hash, state.to_bytes()?);
        self.store.put(snapshot)?;
        tracing::debug!(height, block = %state.block_hash, "snapshot written");
        Ok(())
    }

    /// Writes a snapshot of the committed state and flushes the store.
    pub fn persist(&self) -> Result<()> {
        self.write_snapshot(&self.state())?;
        self.store.flush()?;
        Ok(())
    }

    /// Records `fatal`, notifies subscribers and returns the error to hand
    /// back to the caller.
    pub(crate) fn halt(&self, fatal: FatalError) -> EngineError {
        tracing::error!(error = %fatal, "consensus processing halted");
        *self.halted.write() = Some(fatal.clone());
        let _ = self.events.send(EngineEvent::Halted(fatal.clone()));
        EngineError::Fatal(fatal)
    }

    /// Swaps in a restored state.
    pub(crate) fn replace_state(&self, state: EngineState) {
        *self.state.write() = Arc::new(state);
    }

    /// State before the first block.
    pub(crate) fn genesis_state(&self) -> &EngineState {
        &self.genesis
    }

    pub(crate) fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }
}

/// Verifies and decodes a snapshot.
pub(crate) fn decode_snapshot(snapshot: &Snapshot) -> std::result::Result<EngineState, FatalError> {
    let corrupt = |reason: String| FatalError::SnapshotCorrupt {
        height: snapshot.height(),
        reason,
    };
    snapshot.verify().map_err(|e| corrupt(e.to_string()))?;
    let state = EngineState::from_bytes(&snapshot.payload).map_err(|e| corrupt(e.to_string()))?;
    if state.height != Some(snapshot.height()) || state.block_hash != snapshot.block_hash() {
        return Err(corrupt("payload does not match snapshot metadata".into()));
    }
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::AllowAny;
    use crate::params::CLIENT_VERSION;
    use strata_storage::MemorySnapshotStore;

    fn engine_with(config: EngineConfig, params: ConsensusParams) -> (Engine, Arc<MemorySnapshotStore>) {
        let store = Arc::new(MemorySnapshotStore::new());
        let genesis = EngineState::genesis(&params);
        let engine = Engine::new(config, params, Arc::new(AllowAny), store.clone(), genesis);
        (engine, store)
    }

    fn empty_block(height: BlockHeight, parent: BlockHash) -> Block {
        Block::new(
            height,
            BlockHash::digest(&height.to_be_bytes()),
            parent,
            1_600_000_000 + u64::from(height) * 600,
            vec![],
        )
    }

    fn run(engine: &Engine, from: BlockHeight, to: BlockHeight) {
        let mut parent = engine.state().block_hash;
        for height in from..=to {
            let block = empty_block(height, parent);
            engine.process_block(&block).unwrap();
            parent = block.hash;
        }
    }

    #[test]
    fn test_processes_empty_blocks() {
        let (engine, _) = engine_with(EngineConfig::default(), ConsensusParams::regtest());
        run(&engine, 101, 110);
        assert_eq!(engine.height(), Some(110));
        assert_eq!(engine.state().recent_blocks.len(), 10);
        // regtest fingerprints every 10 blocks
        assert_eq!(engine.state().checkpoints.len(), 1);
        assert!(engine.halted().is_none());
    }

    #[test]
    fn test_rejects_non_child() {
        let (engine, _) = engine_with(EngineConfig::default(), ConsensusParams::regtest());
        assert!(matches!(
            engine.process_block(&empty_block(105, BlockHash::null())),
            Err(EngineError::NotChild { expected_height: 101, .. })
        ));
        run(&engine, 101, 102);
        let orphan = empty_block(103, BlockHash::digest(b"elsewhere"));
        assert!(matches!(
            engine.process_block(&orphan),
            Err(EngineError::NotChild { .. })
        ));
        assert_eq!(engine.height(), Some(102));
    }

    #[test]
    fn test_snapshots_on_interval() {
        let config = EngineConfig {
            snapshot_interval: 5,
            snapshot_retention: 2,
            ..EngineConfig::default()
        };
        let (engine, store) = engine_with(config, ConsensusParams::regtest());
        run(&engine, 101, 120);
        assert_eq!(store.heights().unwrap(), vec![115, 120]);
    }

    #[test]
    fn test_checkpoint_mismatch_halts() {
        let params = ConsensusParams::regtest().with_checkpoint(103, "00".repeat(32));
        let (engine, _) = engine_with(EngineConfig::default(), params);
        run(&engine, 101, 102);

        let block = empty_block(103, engine.state().block_hash);
        let err = engine.process_block(&block).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Fatal(FatalError::ConsensusMismatch { height: 103, .. })
        ));

        let next = empty_block(104, block.hash);
        assert!(matches!(engine.process_block(&next), Err(EngineError::Halted(_))));
        assert_eq!(engine.height(), Some(103));
    }

    #[test]
    fn test_outdated_client_halts() {
        let config = EngineConfig {
            client_version: 0,
            ..EngineConfig::default()
        };
        let mut params = ConsensusParams::regtest();
        params.initial_features.clear();
        let (engine, _) = engine_with(config, params.clone());
        let mut state = EngineState::genesis(&params);
        state
            .activations
            .schedule(&params, Txid::digest(b"act"), 10, 106, CLIENT_VERSION, 100)
            .unwrap();
        engine.replace_state(state);

        run(&engine, 101, 105);
        let block = empty_block(106, engine.state().block_hash);
        assert!(matches!(
            engine.process_block(&block),
            Err(EngineError::Fatal(FatalError::ClientOutdated { .. }))
        ));
        assert!(engine.halted().is_some());
        assert_eq!(engine.reader().height(), Some(106));
    }

    #[test]
    fn test_supply_imbalance_halts_before_commit() {
        let (engine, _) = engine_with(EngineConfig::default(), ConsensusParams::regtest());
        run(&engine, 101, 103);

        let mut state = (*engine.state()).clone();
        state
            .tally
            .credit(&Address::new("alice"), PropertyId::MAIN_NATIVE, 5)
            .unwrap();
        engine.replace_state(state);

        let block = empty_block(104, engine.state().block_hash);
        assert!(matches!(
            engine.process_block(&block),
            Err(EngineError::Fatal(FatalError::InvariantViolated { height: 104, .. }))
        ));
        assert!(engine.halted().is_some());
        assert_eq!(engine.height(), Some(103));
    }

    #[test]
    fn test_open_resumes_from_snapshot() {
        let config = EngineConfig {
            snapshot_interval: 5,
            ..EngineConfig::default()
        };
        let params = ConsensusParams::regtest();
        let (engine, store) = engine_with(config.clone(), params.clone());
        run(&engine, 101, 107);

        let reopened = Engine::open(
            config,
            params.clone(),
            Arc::new(AllowAny),
            store,
            EngineState::genesis(&params),
        )
        .unwrap();
        assert_eq!(reopened.height(), Some(105));
    }

    #[test]
    fn test_events_published() {
        let (engine, _) = engine_with(EngineConfig::default(), ConsensusParams::regtest());
        let mut events = engine.subscribe();
        run(&engine, 101, 101);
        assert!(matches!(
            events.try_recv(),
            Ok(EngineEvent::BlockProcessed { height: 101, .. })
        ));
    }
}
