//! Consensus fingerprints.
//!
//! A fingerprint is the SHA-256 of a canonical byte layout of the ledger.
//! Two nodes agree on the ledger at a height exactly when their
//! fingerprints at that height agree. The layout is fixed:
//!
//! ```text
//! "strata-fingerprint-v2"
//! 'P' for each property by id:
//!     id:u32  kind:u8  mode:u8  issuer  issued:i64  destroyed:i64  freezing_from:u32 (0 = off)
//!     crowdsale:u8 (0 = none), then if 1:
//!         desired:u32  tokens_per_unit:u64  deadline:u64  early_bird:u8
//!         issuer_percentage:u8  active:u8  closed_at:u32 (0 = open)
//!     ranges:u32, then for each token range in token order:
//!         first:u64  last:u64  owner
//! 'F' for each frozen (property, address) pair in ascending order:
//!     property:u32  address
//! 'B' for each non-empty balance by (property, address):
//!     property:u32  address  available:i64  reserved:i64  frozen:i64
//! 'O' for each resting order by (for_sale, address, txid):
//!     for_sale:u32  address  txid[32]  block:u32  index:u32
//!     amount_for_sale:i64  desired:u32  amount_desired:i64  remaining:i64
//!     expires_at:u32 (0 = never)
//! ```
//!
//! Integers are big-endian; an address is a `u16` length followed by its
//! UTF-8 bytes. History, alerts and activations are not covered.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strata_types::{Address, BlockHash, BlockHeight};

use crate::state::{Crowdsale, EngineState, IssuanceMode};

const DOMAIN: &[u8] = b"strata-fingerprint-v2";

/// A fingerprint taken after a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Block height.
    pub height: BlockHeight,
    /// Block hash.
    pub block_hash: BlockHash,
    /// Hex-encoded SHA-256 digest.
    pub digest: String,
}

fn put_address(hasher: &mut Sha256, address: &Address) {
    let bytes = address.as_str().as_bytes();
    let len = u16::try_from(bytes.len()).unwrap_or(u16::MAX);
    hasher.update(len.to_be_bytes());
    hasher.update(&bytes[..usize::from(len)]);
}

fn put_crowdsale(hasher: &mut Sha256, crowdsale: Option<&Crowdsale>) {
    let Some(sale) = crowdsale else {
        hasher.update([0]);
        return;
    };
    hasher.update([1]);
    hasher.update(sale.desired.get().to_be_bytes());
    hasher.update(sale.tokens_per_unit.to_be_bytes());
    hasher.update(sale.deadline.to_be_bytes());
    hasher.update([sale.early_bird, sale.issuer_percentage, u8::from(sale.active)]);
    hasher.update(sale.closed_at.unwrap_or(0).to_be_bytes());
}

fn mode_tag(mode: IssuanceMode) -> u8 {
    match mode {
        IssuanceMode::Native => 0,
        IssuanceMode::Fixed => 1,
        IssuanceMode::Crowdsale => 2,
        IssuanceMode::Managed => 3,
    }
}

/// Computes the fingerprint of `state`.
#[must_use]
pub fn fingerprint(state: &EngineState) -> String {
    let mut hasher = Sha256::new();
    hasher.update(DOMAIN);

    hasher.update(b"P");
    for property in state.registry.iter() {
        hasher.update(property.id.get().to_be_bytes());
        hasher.update([property.kind.tag(), mode_tag(property.mode)]);
        put_address(&mut hasher, &property.issuer);
        hasher.update(property.issued.to_be_bytes());
        hasher.update(property.destroyed.to_be_bytes());
        hasher.update(property.freezing_from.unwrap_or(0).to_be_bytes());
        put_crowdsale(&mut hasher, property.crowdsale.as_ref());

        let ranges = state.tokens.ranges(property.id);
        let count = u32::try_from(ranges.len()).unwrap_or(u32::MAX);
        hasher.update(count.to_be_bytes());
        for range in &ranges {
            hasher.update(range.first.to_be_bytes());
            hasher.update(range.last.to_be_bytes());
            put_address(&mut hasher, &range.owner);
        }
    }

    hasher.update(b"F");
    for (property, address) in state.tally.frozen_entries() {
        hasher.update(property.get().to_be_bytes());
        put_address(&mut hasher, address);
    }

    hasher.update(b"B");
    for ((property, address), balance) in state.tally.iter() {
        if balance.is_empty() {
            continue;
        }
        hasher.update(property.get().to_be_bytes());
        put_address(&mut hasher, address);
        hasher.update(balance.available.to_be_bytes());
        hasher.update(balance.reserved.to_be_bytes());
        hasher.update(balance.frozen.to_be_bytes());
    }

    hasher.update(b"O");
    let mut orders: Vec<_> = state.book.orders().collect();
    orders.sort_by(|a, b| {
        (a.for_sale, &a.address, a.txid).cmp(&(b.for_sale, &b.address, b.txid))
    });
    for order in orders {
        hasher.update(order.for_sale.get().to_be_bytes());
        put_address(&mut hasher, &order.address);
        hasher.update(order.txid.as_bytes());
        hasher.update(order.block.to_be_bytes());
        hasher.update(order.index.to_be_bytes());
        hasher.update(order.amount_for_sale.to_be_bytes());
        hasher.update(order.desired.get().to_be_bytes());
        hasher.update(order.amount_desired.to_be_bytes());
        hasher.update(order.remaining.to_be_bytes());
        hasher.update(order.expires_at.unwrap_or(0).to_be_bytes());
    }

    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::Order;
    use crate::params::ConsensusParams;
    use crate::state::{sample_property, PropertyKind};
    use strata_types::{Ecosystem, PropertyId, Txid};

    fn genesis() -> EngineState {
        EngineState::genesis(&ConsensusParams::regtest())
    }

    #[test]
    fn test_deterministic_and_sensitive() {
        let mut a = genesis();
        let b = genesis();
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_eq!(fingerprint(&a).len(), 64);

        a.mint(PropertyId::MAIN_NATIVE, &Address::new("alice"), 1).unwrap();
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_history_not_covered() {
        let a = genesis();
        let mut b = a.clone();
        b.remember_block(101, BlockHash::digest(b"x"), 10);
        b.block_time = 99;
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_insertion_order_irrelevant() {
        let mut a = genesis();
        let mut b = genesis();
        a.mint(PropertyId::MAIN_NATIVE, &Address::new("x"), 1).unwrap();
        a.mint(PropertyId::MAIN_NATIVE, &Address::new("y"), 2).unwrap();
        b.mint(PropertyId::MAIN_NATIVE, &Address::new("y"), 2).unwrap();
        b.mint(PropertyId::MAIN_NATIVE, &Address::new("x"), 1).unwrap();
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_frozen_flag_covered() {
        let alice = Address::new("alice");
        let plain = genesis();
        let mut frozen = genesis();
        frozen.tally.freeze(&alice, PropertyId::MAIN_NATIVE).unwrap();
        // same balances, only the flag differs
        assert_eq!(
            frozen.tally.balance(&alice, PropertyId::MAIN_NATIVE),
            plain.tally.balance(&alice, PropertyId::MAIN_NATIVE)
        );
        assert_ne!(fingerprint(&plain), fingerprint(&frozen));

        // the flag decides where later credits land
        let mut plain = plain;
        plain.mint(PropertyId::MAIN_NATIVE, &alice, 5).unwrap();
        frozen.mint(PropertyId::MAIN_NATIVE, &alice, 5).unwrap();
        assert_eq!(frozen.tally.balance(&alice, PropertyId::MAIN_NATIVE).frozen, 5);
        assert_ne!(fingerprint(&plain), fingerprint(&frozen));
    }

    #[test]
    fn test_crowdsale_fields_covered() {
        let mut base = genesis();
        let mut property = sample_property("alice", PropertyKind::Divisible, IssuanceMode::Crowdsale);
        property.crowdsale = Some(Crowdsale {
            desired: PropertyId::MAIN_NATIVE,
            tokens_per_unit: 10,
            deadline: 1_000,
            early_bird: 5,
            issuer_percentage: 10,
            active: true,
            closed_at: None,
            close_reason: None,
            participations: Vec::new(),
        });
        let id = base.registry.register(Ecosystem::Main, property).unwrap();
        let reference = fingerprint(&base);

        let edits: Vec<fn(&mut Crowdsale)> = vec![
            |c| c.desired = PropertyId::TEST_NATIVE,
            |c| c.tokens_per_unit = 11,
            |c| c.deadline = 999,
            |c| c.early_bird = 6,
            |c| c.issuer_percentage = 11,
            |c| c.active = false,
            |c| c.closed_at = Some(200),
        ];
        for edit in edits {
            let mut changed = base.clone();
            let sale = changed
                .registry
                .get_mut(id)
                .and_then(|p| p.crowdsale.as_mut())
                .unwrap();
            edit(sale);
            assert_ne!(fingerprint(&changed), reference);
        }

        let mut removed = base.clone();
        removed.registry.get_mut(id).unwrap().crowdsale = None;
        assert_ne!(fingerprint(&removed), reference);
    }

    #[test]
    fn test_token_ranges_covered() {
        let mut base = genesis();
        let property = sample_property("alice", PropertyKind::NonFungible, IssuanceMode::Managed);
        let id = base.registry.register(Ecosystem::Main, property).unwrap();

        let mut a = base.clone();
        let mut b = base.clone();
        a.tokens.mint(id, 4, &Address::new("alice")).unwrap();
        b.tokens.mint(id, 4, &Address::new("bob")).unwrap();
        assert_ne!(fingerprint(&a), fingerprint(&b));
        assert_ne!(fingerprint(&a), fingerprint(&base));

        let mut moved = a.clone();
        moved.tokens.transfer(id, 2, 3, &Address::new("bob"));
        assert_ne!(fingerprint(&a), fingerprint(&moved));

        // merged back into one range owned by alice
        moved.tokens.transfer(id, 2, 3, &Address::new("alice"));
        assert_eq!(fingerprint(&a), fingerprint(&moved));
        base.tokens.mint(id, 4, &Address::new("alice")).unwrap();
        assert_eq!(fingerprint(&a), fingerprint(&base));
    }

    #[test]
    fn test_order_fields_covered() {
        let alice = Address::new("alice");
        let order = |block: BlockHeight, index: u32| Order {
            txid: Txid::digest(b"order"),
            address: alice.clone(),
            block,
            index,
            for_sale: PropertyId::MAIN_NATIVE,
            amount_for_sale: 10,
            desired: PropertyId::TEST_NATIVE,
            amount_desired: 20,
            remaining: 0,
            expires_at: None,
        };
        let with_order = |order: Order, expiry_window: BlockHeight| {
            let mut state = genesis();
            state.mint(PropertyId::MAIN_NATIVE, &alice, 10).unwrap();
            state
                .book
                .place(&mut state.tally, order, 101, expiry_window)
                .unwrap();
            fingerprint(&state)
        };

        let reference = with_order(order(101, 0), 0);
        assert_eq!(reference, with_order(order(101, 0), 0));
        assert_ne!(reference, with_order(order(102, 0), 0));
        assert_ne!(reference, with_order(order(101, 1), 0));
        assert_ne!(reference, with_order(order(101, 0), 5));
    }
}
