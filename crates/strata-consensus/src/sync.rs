//! Following the base chain across reorganizations.
//!
//! [`Engine::sync`] pulls blocks from a [`BlockSource`] until the engine is
//! at the source's tip. When the block the engine last committed is no
//! longer on the source's chain, the engine rolls back: it restores the
//! newest snapshot at or below the fork point and replays forward. Blocks
//! past the fork point are never undone individually.

use crate::block::Block;
use crate::engine::{decode_snapshot, Engine, EngineEvent};
use crate::error::{EngineError, FatalError, Result};
use crate::state::EngineState;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use strata_types::{BlockHash, BlockHeight};

/// A view of the base chain.
pub trait BlockSource: Send + Sync {
    /// Height of the current tip, if the chain has any block.
    fn tip_height(&self) -> Option<BlockHeight>;

    /// Hash of the block at `height` on the current chain.
    fn block_hash(&self, height: BlockHeight) -> Option<BlockHash>;

    /// The block at `height` on the current chain.
    fn block(&self, height: BlockHeight) -> Option<Block>;
}

/// An in-memory chain, mainly for replaying recorded blocks and tests.
#[derive(Debug, Default)]
pub struct MemoryChain {
    blocks: RwLock<BTreeMap<BlockHeight, Block>>,
}

impl MemoryChain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a chain holding `blocks`.
    pub fn from_blocks(blocks: impl IntoIterator<Item = Block>) -> Self {
        let chain = Self::new();
        for block in blocks {
            chain.push(block);
        }
        chain
    }

    /// Sets the block at its height, dropping every block above it.
    pub fn push(&self, block: Block) {
        let mut blocks = self.blocks.write();
        let _ = blocks.split_off(&block.height);
        blocks.insert(block.height, block);
    }

    /// Number of blocks held.
    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    /// True if no block is held.
    pub fn is_empty(&self) -> bool {
        self.blocks.read().is_empty()
    }
}

impl BlockSource for MemoryChain {
    fn tip_height(&self) -> Option<BlockHeight> {
        self.blocks.read().keys().next_back().copied()
    }

    fn block_hash(&self, height: BlockHeight) -> Option<BlockHash> {
        self.blocks.read().get(&height).map(|b| b.hash)
    }

    fn block(&self, height: BlockHeight) -> Option<Block> {
        self.blocks.read().get(&height).cloned()
    }
}

/// What a sync run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Blocks applied, replays included.
    pub processed: u64,
    /// Rollbacks performed.
    pub rollbacks: u64,
    /// Height after the run.
    pub height: Option<BlockHeight>,
}

impl Engine {
    /// Processes blocks from `source` until the engine reaches its tip,
    /// rolling back whenever the committed tip left the source's chain.
    pub fn sync(&self, source: &dyn BlockSource) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        loop {
            self.ensure_running()?;

            let current = self.state();
            if let Some(height) = current.height {
                if source.block_hash(height) != Some(current.block_hash) {
                    self.rollback(source)?;
                    report.rollbacks += 1;
                    continue;
                }
            }

            let next = current.next_height(self.params());
            match source.tip_height() {
                Some(tip) if tip >= next => {}
                _ => break,
            }
            let block = source.block(next).ok_or(EngineError::MissingBlock(next))?;
            self.process_block(&block)?;
            report.processed += 1;
        }

        report.height = self.height();
        if report.processed > 0 || report.rollbacks > 0 {
            tracing::info!(
                processed = report.processed,
                rollbacks = report.rollbacks,
                height = ?report.height,
                "sync complete"
            );
        }
        Ok(report)
    }

    /// Restores the newest state that is still on `source`'s chain.
    ///
    /// Returns the height of the restored state, `None` for genesis. Any
    /// failure to read a snapshot halts the engine.
    pub fn rollback(&self, source: &dyn BlockSource) -> Result<Option<BlockHeight>> {
        self.ensure_running()?;

        let current = self.state();
        let from = current.height;
        let ancestor = common_ancestor(&current, source);
        tracing::warn!(
            from = ?from,
            ancestor = ?ancestor,
            "base chain reorganized, rolling back"
        );

        let restored = match self.restore_at_or_below(ancestor.or(from), source) {
            Ok(restored) => restored,
            Err(fatal) => return Err(self.halt(fatal)),
        };

        let state = match restored {
            Some(state) => state,
            None => {
                tracing::warn!("no usable snapshot, replaying from genesis");
                self.genesis_state().clone()
            }
        };
        let to = state.height;

        let cleared = match to {
            Some(height) => self.store().delete_above(height),
            None => self.clear_store(),
        };
        if let Err(e) = cleared {
            return Err(self.halt(FatalError::SnapshotUnavailable(e.to_string())));
        }

        self.replace_state(state);
        self.emit(EngineEvent::RolledBack { from, to });
        tracing::info!(from = ?from, to = ?to, "rolled back");
        Ok(to)
    }

    /// Finds the newest snapshot at or below `limit` whose block is still
    /// on the source's chain. Snapshots of abandoned blocks are deleted.
    fn restore_at_or_below(
        &self,
        limit: Option<BlockHeight>,
        source: &dyn BlockSource,
    ) -> std::result::Result<Option<EngineState>, FatalError> {
        let Some(mut limit) = limit else {
            return Ok(None);
        };
        let unavailable = |e: strata_storage::StorageError| FatalError::SnapshotUnavailable(e.to_string());

        loop {
            let Some(snapshot) = self.store().latest_at_or_below(limit).map_err(unavailable)? else {
                return Ok(None);
            };
            let height = snapshot.height();
            if source.block_hash(height) == Some(snapshot.block_hash()) {
                let state = decode_snapshot(&snapshot)?;
                tracing::info!(height, block = %snapshot.block_hash(), "restored snapshot");
                return Ok(Some(state));
            }

            tracing::debug!(height, "discarding snapshot of abandoned block");
            self.store().delete(height).map_err(unavailable)?;
            match height.checked_sub(1) {
                Some(below) => limit = below,
                None => return Ok(None),
            }
        }
    }

    fn clear_store(&self) -> strata_storage::Result<usize> {
        let mut removed = 0;
        for height in self.store().heights()? {
            if self.store().delete(height)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Highest remembered block that is still on the source's chain.
fn common_ancestor(state: &EngineState, source: &dyn BlockSource) -> Option<BlockHeight> {
    state
        .recent_blocks
        .iter()
        .rev()
        .find(|(height, hash)| source.block_hash(**height) == Some(**hash))
        .map(|(height, _)| *height)
}
