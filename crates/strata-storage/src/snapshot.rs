//! Height-tagged state snapshots.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strata_types::{BlockHash, BlockHeight};

use crate::{Result, StorageError};

/// Metadata stored alongside every snapshot payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    /// Height of the last block applied to the captured state.
    pub height: BlockHeight,
    /// Hash of that block.
    pub block_hash: BlockHash,
    /// SHA-256 of the payload, hex encoded.
    pub checksum: String,
    /// Payload length in bytes.
    pub size: u64,
}

/// A serialized engine state, tagged with the block it reflects.
///
/// The payload is opaque to storage; the checksum lets a reader detect
/// corruption before the state is trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Snapshot metadata.
    pub meta: SnapshotMeta,
    /// Serialized state.
    pub payload: Bytes,
}

impl Snapshot {
    /// Creates a snapshot, computing the payload checksum.
    pub fn new(height: BlockHeight, block_hash: BlockHash, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        let meta = SnapshotMeta {
            height,
            block_hash,
            checksum: checksum(&payload),
            size: payload.len() as u64,
        };
        Self { meta, payload }
    }

    /// Height of the captured state.
    #[must_use]
    pub fn height(&self) -> BlockHeight {
        self.meta.height
    }

    /// Block hash of the captured state.
    #[must_use]
    pub fn block_hash(&self) -> BlockHash {
        self.meta.block_hash
    }

    /// Verifies the payload against the recorded checksum.
    pub fn verify(&self) -> Result<()> {
        if self.payload.len() as u64 != self.meta.size {
            return Err(StorageError::Corruption(format!(
                "snapshot at height {}: expected {} bytes, found {}",
                self.meta.height,
                self.meta.size,
                self.payload.len()
            )));
        }
        let actual = checksum(&self.payload);
        if actual != self.meta.checksum {
            return Err(StorageError::Corruption(format!(
                "snapshot at height {}: checksum mismatch (expected {}, got {})",
                self.meta.height, self.meta.checksum, actual
            )));
        }
        Ok(())
    }
}

fn checksum(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_detects_tampering() {
        let snapshot = Snapshot::new(10, BlockHash::digest(b"10"), b"state".to_vec());
        assert!(snapshot.verify().is_ok());

        let mut tampered = snapshot.clone();
        tampered.payload = Bytes::from_static(b"stale");
        assert!(matches!(
            tampered.verify(),
            Err(StorageError::Corruption(_))
        ));

        let mut truncated = snapshot;
        truncated.payload = Bytes::from_static(b"sta");
        assert!(matches!(
            truncated.verify(),
            Err(StorageError::Corruption(_))
        ));
    }
}
