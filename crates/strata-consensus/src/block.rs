//! Base-chain blocks as seen by the engine.
//!
//! Blocks come from the base chain already validated; the engine only
//! needs their position, timestamp and ordered transactions.

use serde::{Deserialize, Serialize};
use strata_codec::RawTransaction;
use strata_types::{BlockHash, BlockHeight};

/// A base-chain block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block height.
    pub height: BlockHeight,
    /// Block hash.
    pub hash: BlockHash,
    /// Hash of the parent block.
    pub parent: BlockHash,
    /// Block timestamp (unix seconds).
    pub time: u64,
    /// Transactions in block order.
    #[serde(default)]
    pub transactions: Vec<RawTransaction>,
}

impl Block {
    /// Creates a block.
    pub fn new(
        height: BlockHeight,
        hash: BlockHash,
        parent: BlockHash,
        time: u64,
        transactions: Vec<RawTransaction>,
    ) -> Self {
        Self {
            height,
            hash,
            parent,
            time,
            transactions,
        }
    }

    /// Returns true if this block directly extends `(height, hash)`.
    #[must_use]
    pub fn extends(&self, height: BlockHeight, hash: &BlockHash) -> bool {
        height.checked_add(1) == Some(self.height) && self.parent == *hash
    }

    /// Number of transactions.
    #[must_use]
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extends() {
        let parent = BlockHash::digest(b"a");
        let block = Block::new(11, BlockHash::digest(b"b"), parent, 0, vec![]);
        assert!(block.extends(10, &parent));
        assert!(!block.extends(9, &parent));
        assert!(!block.extends(10, &BlockHash::digest(b"c")));
        assert!(!block.extends(BlockHeight::MAX, &parent));
        assert_eq!(block.tx_count(), 0);
    }
}
