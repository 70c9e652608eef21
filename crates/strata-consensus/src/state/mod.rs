//! The replicated protocol state.
//!
//! [`EngineState`] is a plain value: the engine clones it, applies a block
//! to the clone and swaps it in. Everything here must be a pure function
//! of the processed chain so that snapshots taken on different nodes, or
//! before and after a rollback, compare equal.

mod nft;
mod records;
mod registry;
mod tally;

pub use nft::{TokenRange, TokenRanges};
pub use records::{DistributionRecord, Payout, Records, TradeRecord, TxRecord};
pub use registry::{
    CloseReason, Crowdsale, IssuanceMode, IssuerChange, Participation, Property, PropertyKind,
    Registry,
};
pub use tally::{Balance, Bucket, LedgerError, Tally};

#[cfg(test)]
pub(crate) use registry::tests::sample as sample_property;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strata_types::{Address, Amount, BlockHash, BlockHeight, PropertyId};

use crate::activation::ActivationSet;
use crate::alert::AlertSet;
use crate::error::InvalidReason;
use crate::dex::OrderBook;
use crate::fingerprint::Checkpoint;
use crate::params::ConsensusParams;

/// A problem found by [`EngineState::audit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplyMismatch {
    /// Property concerned.
    pub property: PropertyId,
    /// Issued minus destroyed.
    pub supply: Amount,
    /// Sum of every balance bucket.
    pub held: i128,
}

/// Complete protocol state after some block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineState {
    /// Height of the last applied block, if any.
    pub height: Option<BlockHeight>,
    /// Hash of the last applied block.
    pub block_hash: BlockHash,
    /// Timestamp of the last applied block.
    pub block_time: u64,
    /// Properties.
    pub registry: Registry,
    /// Balances.
    pub tally: Tally,
    /// Resting DEX orders.
    pub book: OrderBook,
    /// Non-fungible ownership.
    pub tokens: TokenRanges,
    /// Feature activations.
    pub activations: ActivationSet,
    /// Active alerts.
    pub alerts: AlertSet,
    /// History kept for queries.
    pub records: Records,
    /// Fingerprints computed so far.
    pub checkpoints: Vec<Checkpoint>,
    /// Recent block hashes, for locating a fork point.
    #[serde(with = "strata_types::seq_map")]
    pub recent_blocks: BTreeMap<BlockHeight, BlockHash>,
}

impl EngineState {
    /// State before the first block: native tokens registered, scheduled
    /// features known, nothing held.
    #[must_use]
    pub fn genesis(params: &ConsensusParams) -> Self {
        Self {
            height: None,
            block_hash: BlockHash::null(),
            block_time: 0,
            registry: Registry::with_natives(&params.exodus),
            tally: Tally::new(),
            book: OrderBook::new(),
            tokens: TokenRanges::new(),
            activations: ActivationSet::from_params(params),
            alerts: AlertSet::default(),
            records: Records::default(),
            checkpoints: Vec::new(),
            recent_blocks: BTreeMap::new(),
        }
    }

    /// Height the next block must have.
    #[must_use]
    pub fn next_height(&self, params: &ConsensusParams) -> BlockHeight {
        self.height
            .map_or(params.start_height, |h| h.saturating_add(1))
    }

    /// Credits `amount` of `property` to `address` as newly created supply.
    pub fn mint(
        &mut self,
        property: PropertyId,
        address: &Address,
        amount: Amount,
    ) -> Result<(), InvalidReason> {
        let entry = self.registry.require_mut(property)?;
        entry.add_issued(amount)?;
        self.tally
            .credit(address, property, amount)
            .map_err(|_| InvalidReason::SupplyOverflow)
    }

    /// Remembers `hash` for `height`, forgetting blocks older than `depth`.
    pub fn remember_block(&mut self, height: BlockHeight, hash: BlockHash, depth: BlockHeight) {
        self.recent_blocks.insert(height, hash);
        let floor = height.saturating_sub(depth);
        self.recent_blocks = self.recent_blocks.split_off(&floor);
    }

    /// Checks that every property's balances add up to its supply.
    #[must_use]
    pub fn audit(&self) -> Vec<SupplyMismatch> {
        self.registry
            .iter()
            .filter_map(|p| {
                let held = self.tally.total(p.id);
                (held != i128::from(p.supply())).then(|| SupplyMismatch {
                    property: p.id,
                    supply: p.supply(),
                    held,
                })
            })
            .collect()
    }

    /// Serializes the state for a snapshot.
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Restores a state from snapshot bytes.
    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_genesis_has_natives() {
        let state = EngineState::genesis(&ConsensusParams::regtest());
        assert!(state.registry.contains(PropertyId::MAIN_NATIVE));
        assert!(state.registry.contains(PropertyId::TEST_NATIVE));
        assert_eq!(state.next_height(&ConsensusParams::regtest()), 101);
        assert!(state.audit().is_empty());
    }

    #[test]
    fn test_mint_keeps_audit_clean() {
        let mut state = EngineState::genesis(&ConsensusParams::regtest());
        state
            .mint(PropertyId::MAIN_NATIVE, &Address::new("alice"), 500)
            .unwrap();
        assert!(state.audit().is_empty());
        assert_eq!(
            state.tally.available(&Address::new("alice"), PropertyId::MAIN_NATIVE),
            500
        );
    }

    #[test]
    fn test_recent_blocks_window() {
        let mut state = EngineState::genesis(&ConsensusParams::regtest());
        for h in 1..=20 {
            state.remember_block(h, BlockHash::digest(&h.to_be_bytes()), 5);
        }
        let kept: Vec<BlockHeight> = state.recent_blocks.keys().copied().collect();
        assert_eq!(kept, (15..=20).collect::<Vec<_>>());
    }

    #[test]
    fn test_bytes_roundtrip() {
        let mut state = EngineState::genesis(&ConsensusParams::regtest());
        state
            .mint(PropertyId::TEST_NATIVE, &Address::new("bob"), 7)
            .unwrap();
        let back = EngineState::from_bytes(&state.to_bytes().unwrap()).unwrap();
        assert_eq!(back, state);
    }
}
