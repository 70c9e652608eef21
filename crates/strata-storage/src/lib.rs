//! Snapshot storage for Strata.
//!
//! The persistence manager serializes the full engine state every few
//! blocks and hands it here as an opaque, checksummed [`Snapshot`] tagged
//! with the block height and hash it reflects. Backends only need to store
//! and list snapshots by height; range queries used during reorg recovery
//! are provided by the [`SnapshotStore`] trait.

mod error;
mod file;
mod memory;
mod snapshot;
mod traits;

#[cfg(feature = "rocksdb-backend")]
mod rocksdb;

pub use error::{Result, StorageError};
pub use file::FileSnapshotStore;
pub use memory::MemorySnapshotStore;
pub use snapshot::{Snapshot, SnapshotMeta};
pub use traits::{SnapshotStore, StorageStats};

#[cfg(feature = "rocksdb-backend")]
pub use crate::rocksdb::{RocksDbConfig, RocksDbSnapshotStore};
