//! Snapshot store traits.
//!
//! Defines the interface that all snapshot backends must implement,
//! enabling pluggable persistence strategies.

use crate::{Result, Snapshot};
use std::sync::Arc;
use strata_types::BlockHeight;

/// Trait for snapshot storage backends.
///
/// Implementations include in-memory, file-per-snapshot, and RocksDB
/// storage. At most one snapshot is kept per height; a later `put` for the
/// same height replaces the earlier one.
pub trait SnapshotStore: Send + Sync {
    /// Stores a snapshot.
    fn put(&self, snapshot: Snapshot) -> Result<()>;

    /// Retrieves the snapshot taken at `height`.
    fn get(&self, height: BlockHeight) -> Result<Option<Snapshot>>;

    /// Lists stored heights in ascending order.
    fn heights(&self) -> Result<Vec<BlockHeight>>;

    /// Deletes the snapshot at `height`.
    fn delete(&self, height: BlockHeight) -> Result<bool>;

    /// Returns the newest snapshot at or below `height`.
    fn latest_at_or_below(&self, height: BlockHeight) -> Result<Option<Snapshot>> {
        match self.heights()?.into_iter().rev().find(|h| *h <= height) {
            Some(h) => self.get(h),
            None => Ok(None),
        }
    }

    /// Returns the newest snapshot.
    fn latest(&self) -> Result<Option<Snapshot>> {
        self.latest_at_or_below(BlockHeight::MAX)
    }

    /// Deletes every snapshot above `height`, returning how many went.
    fn delete_above(&self, height: BlockHeight) -> Result<usize> {
        let mut removed = 0;
        for h in self.heights()?.into_iter().filter(|h| *h > height) {
            if self.delete(h)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Keeps the newest `keep` snapshots and deletes the rest.
    fn prune(&self, keep: usize) -> Result<usize> {
        let heights = self.heights()?;
        let excess = heights.len().saturating_sub(keep);
        let mut removed = 0;
        for h in heights.into_iter().take(excess) {
            if self.delete(h)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Flush any pending writes to durable storage.
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

impl<T: SnapshotStore + ?Sized> SnapshotStore for Arc<T> {
    fn put(&self, snapshot: Snapshot) -> Result<()> {
        (**self).put(snapshot)
    }

    fn get(&self, height: BlockHeight) -> Result<Option<Snapshot>> {
        (**self).get(height)
    }

    fn heights(&self) -> Result<Vec<BlockHeight>> {
        (**self).heights()
    }

    fn delete(&self, height: BlockHeight) -> Result<bool> {
        (**self).delete(height)
    }

    fn latest_at_or_below(&self, height: BlockHeight) -> Result<Option<Snapshot>> {
        (**self).latest_at_or_below(height)
    }

    fn delete_above(&self, height: BlockHeight) -> Result<usize> {
        (**self).delete_above(height)
    }

    fn prune(&self, keep: usize) -> Result<usize> {
        (**self).prune(keep)
    }

    fn flush(&self) -> Result<()> {
        (**self).flush()
    }
}

/// Storage statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageStats {
    /// Number of snapshots currently stored.
    pub snapshot_count: u64,
    /// Number of read operations.
    pub reads: u64,
    /// Number of write operations.
    pub writes: u64,
    /// Number of deletions.
    pub deletes: u64,
}
