//! In-memory snapshot store.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use strata_types::BlockHeight;

use crate::traits::{SnapshotStore, StorageStats};
use crate::{Result, Snapshot};

/// Snapshot store backed by a map in memory.
///
/// Used by tests and by nodes that accept a full rescan after restart.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: RwLock<BTreeMap<BlockHeight, Snapshot>>,
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl MemorySnapshotStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored snapshots.
    pub fn len(&self) -> usize {
        self.snapshots.read().len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.snapshots.read().is_empty()
    }

    /// Returns storage statistics.
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            snapshot_count: self.len() as u64,
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }

    /// Replaces the payload stored at `height` without updating its
    /// checksum. Test hook for corruption handling.
    #[doc(hidden)]
    pub fn corrupt(&self, height: BlockHeight) -> bool {
        match self.snapshots.write().get_mut(&height) {
            Some(snapshot) => {
                let mut bytes = snapshot.payload.to_vec();
                match bytes.first_mut() {
                    Some(b) => *b ^= 0xff,
                    None => bytes.push(0),
                }
                snapshot.payload = bytes.into();
                true
            }
            None => false,
        }
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn put(&self, snapshot: Snapshot) -> Result<()> {
        self.snapshots.write().insert(snapshot.height(), snapshot);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn get(&self, height: BlockHeight) -> Result<Option<Snapshot>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.snapshots.read().get(&height).cloned())
    }

    fn heights(&self) -> Result<Vec<BlockHeight>> {
        Ok(self.snapshots.read().keys().copied().collect())
    }

    fn delete(&self, height: BlockHeight) -> Result<bool> {
        let existed = self.snapshots.write().remove(&height).is_some();
        if existed {
            self.deletes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(existed)
    }

    fn latest_at_or_below(&self, height: BlockHeight) -> Result<Option<Snapshot>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .snapshots
            .read()
            .range(..=height)
            .next_back()
            .map(|(_, s)| s.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_types::BlockHash;

    #[test]
    fn test_put_get_replace() {
        let store = MemorySnapshotStore::new();
        assert!(store.is_empty());

        store
            .put(Snapshot::new(5, BlockHash::digest(b"a"), b"one".to_vec()))
            .unwrap();
        store
            .put(Snapshot::new(5, BlockHash::digest(b"b"), b"two".to_vec()))
            .unwrap();

        assert_eq!(store.len(), 1);
        let snap = store.get(5).unwrap().unwrap();
        assert_eq!(&snap.payload[..], b"two");
        assert_eq!(snap.block_hash(), BlockHash::digest(b"b"));

        let stats = store.stats();
        assert_eq!(stats.writes, 2);
        assert_eq!(stats.reads, 1);
    }

    #[test]
    fn test_range_lookup() {
        let store = MemorySnapshotStore::new();
        for h in [10, 20, 30] {
            store
                .put(Snapshot::new(h, BlockHash::null(), vec![h as u8]))
                .unwrap();
        }
        assert_eq!(store.latest_at_or_below(29).unwrap().unwrap().height(), 20);
        assert!(store.latest_at_or_below(9).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_hook_breaks_checksum() {
        let store = MemorySnapshotStore::new();
        store
            .put(Snapshot::new(1, BlockHash::null(), b"state".to_vec()))
            .unwrap();
        assert!(store.corrupt(1));
        assert!(store.get(1).unwrap().unwrap().verify().is_err());
        assert!(!store.corrupt(2));
    }
}
