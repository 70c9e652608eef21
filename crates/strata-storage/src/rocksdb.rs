//! RocksDB persistent snapshot store.
//!
//! Payloads and metadata live in separate column families keyed by the
//! big-endian block height, so iteration order equals height order.

use rocksdb::{
    BlockBasedOptions, ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch,
    WriteOptions, DB,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use strata_types::BlockHeight;

use crate::traits::{SnapshotStore, StorageStats};
use crate::{Result, Snapshot, SnapshotMeta, StorageError};

/// RocksDB storage configuration.
#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    /// Path to the database directory.
    pub path: PathBuf,

    /// Write buffer size in bytes.
    pub write_buffer_size: usize,

    /// Number of background compaction threads.
    pub background_jobs: i32,

    /// Enable LZ4 compression.
    pub compression_enabled: bool,

    /// Bloom filter bits per key (0 to disable).
    pub bloom_filter_bits: i32,

    /// Sync the write-ahead log on every snapshot write.
    pub sync_writes: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/snapshots"),
            write_buffer_size: 64 * 1024 * 1024, // 64 MB
            background_jobs: 2,
            compression_enabled: true,
            bloom_filter_bits: 10,
            sync_writes: true,
        }
    }
}

/// Column family names.
const CF_SNAPSHOTS: &str = "snapshots";
const CF_METADATA: &str = "metadata";

/// RocksDB snapshot store.
pub struct RocksDbSnapshotStore {
    db: DB,
    config: RocksDbConfig,
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

fn db_err(e: rocksdb::Error) -> StorageError {
    StorageError::Io(std::io::Error::other(e.to_string()))
}

impl RocksDbSnapshotStore {
    /// Opens or creates a RocksDB database.
    pub fn open(config: RocksDbConfig) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts.increase_parallelism(config.background_jobs);
        opts.set_max_background_jobs(config.background_jobs);

        if config.compression_enabled {
            opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        }

        let mut block_opts = BlockBasedOptions::default();
        if config.bloom_filter_bits > 0 {
            block_opts.set_bloom_filter(f64::from(config.bloom_filter_bits), false);
        }
        opts.set_block_based_table_factory(&block_opts);

        let cfs = vec![
            ColumnFamilyDescriptor::new(CF_SNAPSHOTS, opts.clone()),
            ColumnFamilyDescriptor::new(CF_METADATA, opts.clone()),
        ];

        let db = DB::open_cf_descriptors(&opts, &config.path, cfs).map_err(db_err)?;

        tracing::info!(path = %config.path.display(), "opened snapshot database");

        Ok(Self {
            db,
            config,
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        })
    }

    /// Opens with default configuration.
    pub fn open_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open(RocksDbConfig {
            path: path.as_ref().to_path_buf(),
            ..Default::default()
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::Corruption(format!("missing column family {name}")))
    }

    /// Returns storage statistics.
    pub fn stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            snapshot_count: self.heights()?.len() as u64,
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        })
    }
}

impl SnapshotStore for RocksDbSnapshotStore {
    fn put(&self, snapshot: Snapshot) -> Result<()> {
        let key = snapshot.height().to_be_bytes();
        let meta = serde_json::to_vec(&snapshot.meta)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_SNAPSHOTS)?, key, &snapshot.payload);
        batch.put_cf(self.cf(CF_METADATA)?, key, meta);

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        self.db.write_opt(batch, &write_opts).map_err(db_err)?;

        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn get(&self, height: BlockHeight) -> Result<Option<Snapshot>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let key = height.to_be_bytes();

        let Some(meta) = self
            .db
            .get_cf(self.cf(CF_METADATA)?, key)
            .map_err(db_err)?
        else {
            return Ok(None);
        };
        let meta: SnapshotMeta = serde_json::from_slice(&meta)
            .map_err(|e| StorageError::Corruption(format!("metadata at {height}: {e}")))?;

        let payload = self
            .db
            .get_cf(self.cf(CF_SNAPSHOTS)?, key)
            .map_err(db_err)?
            .ok_or_else(|| {
                StorageError::Corruption(format!("payload missing for snapshot at {height}"))
            })?;

        Ok(Some(Snapshot {
            meta,
            payload: payload.into(),
        }))
    }

    fn heights(&self) -> Result<Vec<BlockHeight>> {
        let mut heights = Vec::new();
        for item in self
            .db
            .iterator_cf(self.cf(CF_METADATA)?, IteratorMode::Start)
        {
            let (key, _) = item.map_err(db_err)?;
            let bytes: [u8; 4] = key.as_ref().try_into().map_err(|_| {
                StorageError::Corruption(format!("bad snapshot key length {}", key.len()))
            })?;
            heights.push(BlockHeight::from_be_bytes(bytes));
        }
        Ok(heights)
    }

    fn delete(&self, height: BlockHeight) -> Result<bool> {
        let key = height.to_be_bytes();
        let existed = self
            .db
            .get_pinned_cf(self.cf(CF_METADATA)?, key)
            .map_err(db_err)?
            .is_some();

        let mut batch = WriteBatch::default();
        batch.delete_cf(self.cf(CF_SNAPSHOTS)?, key);
        batch.delete_cf(self.cf(CF_METADATA)?, key);
        self.db.write(batch).map_err(db_err)?;

        if existed {
            self.deletes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(existed)
    }

    fn flush(&self) -> Result<()> {
        self.db.flush().map_err(db_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_types::BlockHash;
    use tempfile::TempDir;

    fn create_test_db() -> (RocksDbSnapshotStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = RocksDbSnapshotStore::open_default(temp_dir.path()).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_put_get() {
        let (store, _dir) = create_test_db();
        let snapshot = Snapshot::new(1000, BlockHash::digest(b"1000"), b"state".to_vec());
        store.put(snapshot.clone()).unwrap();
        assert_eq!(store.get(1000).unwrap(), Some(snapshot));
        assert_eq!(store.get(999).unwrap(), None);
    }

    #[test]
    fn test_heights_in_numeric_order() {
        let (store, _dir) = create_test_db();
        for h in [256, 1, 65_536, 255] {
            store
                .put(Snapshot::new(h, BlockHash::null(), vec![0]))
                .unwrap();
        }
        assert_eq!(store.heights().unwrap(), vec![1, 255, 256, 65_536]);
        assert_eq!(store.latest_at_or_below(300).unwrap().unwrap().height(), 256);
    }

    #[test]
    fn test_delete_above() {
        let (store, _dir) = create_test_db();
        for h in [10, 20, 30] {
            store
                .put(Snapshot::new(h, BlockHash::null(), vec![0]))
                .unwrap();
        }
        assert_eq!(store.delete_above(15).unwrap(), 2);
        assert_eq!(store.heights().unwrap(), vec![10]);
        assert_eq!(store.stats().unwrap().deletes, 2);
    }
}
