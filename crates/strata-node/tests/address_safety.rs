//! Address safety through the protocol operations, end to end.

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::Arc;
use strata_consensus::{AllowAny, Balance, Block, ConsensusParams, Engine, EngineConfig, EngineState};
use strata_node::{AddressValidator, MemoryBroadcaster, ProtocolApi};
use strata_storage::MemorySnapshotStore;
use strata_types::{Address, BaseAddress, BlockHash, Network, PropertyId, Txid, COIN};

const NET: Network = Network::Regtest;

fn base_address_strategy() -> impl Strategy<Value = BaseAddress> {
    prop_oneof![
        prop::array::uniform20(any::<u8>()).prop_map(BaseAddress::P2pkh),
        prop::array::uniform20(any::<u8>()).prop_map(BaseAddress::P2sh),
        prop::array::uniform20(any::<u8>()).prop_map(BaseAddress::P2wpkh),
        prop::array::uniform32(any::<u8>()).prop_map(BaseAddress::P2wsh),
        prop::array::uniform32(any::<u8>()).prop_map(BaseAddress::P2tr),
    ]
}

struct Harness {
    engine: Engine,
    api: ProtocolApi,
    broadcaster: Arc<MemoryBroadcaster>,
    parent: BlockHash,
}

impl Harness {
    fn new(funded: &[(BaseAddress, i64)]) -> Self {
        let params = ConsensusParams::regtest();
        let mut genesis = EngineState::genesis(&params);
        for (base, amount) in funded {
            genesis
                .mint(PropertyId::MAIN_NATIVE, &base.to_address(NET).unwrap(), *amount)
                .unwrap();
        }
        let engine = Engine::new(
            EngineConfig::default(),
            params,
            Arc::new(AllowAny),
            Arc::new(MemorySnapshotStore::new()),
            genesis,
        );
        let broadcaster = Arc::new(MemoryBroadcaster::new());
        let api = ProtocolApi::new(
            engine.reader(),
            AddressValidator::new(NET, true),
            broadcaster.clone(),
            strata_codec::DEFAULT_MAX_NULL_DATA,
        );
        Self {
            engine,
            api,
            broadcaster,
            parent: BlockHash::null(),
        }
    }

    /// Mines everything broadcast so far into the next block.
    fn mine(&mut self) {
        let height = self.engine.height().map_or(101, |h| h + 1);
        let transactions = self
            .broadcaster
            .drain()
            .into_iter()
            .map(|(txid, request)| request.to_raw(txid, 100_000))
            .collect();
        let hash = BlockHash::digest(&height.to_be_bytes());
        let block = Block::new(height, hash, self.parent, u64::from(height) * 600, transactions);
        self.engine.process_block(&block).unwrap();
        self.parent = hash;
    }
}

#[test]
fn test_send_between_derived_addresses() {
    let alice = BaseAddress::P2wpkh([1; 20]);
    let bob = BaseAddress::P2tr([2; 32]);
    let mut harness = Harness::new(&[(alice, 50 * COIN)]);

    let alice_derived = alice.encode_derived(NET).unwrap();
    let bob_derived = bob.encode_derived(NET).unwrap();
    let txid = harness.api.send(&alice_derived, &bob_derived, 1, "10").unwrap();
    harness.mine();

    let view = harness.api.get_transaction(&txid.to_hex()).unwrap();
    assert!(view.valid);
    assert_eq!(view.sending_address, alice_derived);
    assert_eq!(view.reference_address.as_deref(), Some(bob_derived.as_str()));

    let bob_raw = bob.encode(NET).unwrap();
    assert_eq!(harness.api.get_balance(&bob_derived, 1).unwrap().balance, "10.00000000");
    assert_eq!(
        harness.api.get_balance(&bob_derived, 1).unwrap(),
        harness.api.get_balance(&bob_raw, 1).unwrap()
    );
    assert_eq!(
        harness.api.get_all_balances(&bob_derived).unwrap(),
        harness.api.get_all_balances(&bob_raw).unwrap()
    );
    assert_eq!(
        harness
            .engine
            .reader()
            .balance(&Address::new(bob_raw), PropertyId::MAIN_NATIVE)
            .available,
        10 * COIN
    );
}

#[test]
fn test_legacy_addresses_keep_working() {
    let carol = BaseAddress::P2pkh([3; 20]);
    let dave = BaseAddress::P2sh([4; 20]);
    let mut harness = Harness::new(&[(carol, 5 * COIN)]);

    harness
        .api
        .send(&carol.encode(NET).unwrap(), &dave.encode(NET).unwrap(), 1, "2")
        .unwrap();
    harness.mine();
    assert_eq!(
        harness.api.get_balance(&dave.encode(NET).unwrap(), 1).unwrap().balance,
        "2.00000000"
    );
}

#[test]
fn test_rejected_send_leaves_no_trace() {
    let alice = BaseAddress::P2wpkh([5; 20]);
    let bob = BaseAddress::P2wpkh([6; 20]);
    let mut harness = Harness::new(&[(alice, 50 * COIN)]);

    let err = harness
        .api
        .send(
            &alice.encode_derived(NET).unwrap(),
            &bob.encode(NET).unwrap(),
            1,
            "10",
        )
        .unwrap_err();
    assert_eq!(err.code(), -5);
    assert!(harness.broadcaster.sent().is_empty());

    harness.mine();
    let state = harness.engine.state();
    assert!(state.records.transactions.is_empty());
    assert_eq!(
        harness.engine.reader().balance(&bob.to_address(NET).unwrap(), PropertyId::MAIN_NATIVE),
        Balance::default()
    );
}

#[test]
fn test_unknown_txid_is_reported() {
    let harness = Harness::new(&[]);
    assert_eq!(
        harness
            .api
            .get_transaction(&Txid::digest(b"elsewhere").to_hex())
            .unwrap_err()
            .code(),
        -5
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: a derived address next to a raw address of a different key
    /// is rejected before anything is broadcast.
    #[test]
    fn prop_mixed_forms_rejected(
        a in base_address_strategy(),
        b in base_address_strategy(),
        derived_first in any::<bool>(),
    ) {
        prop_assume!(a != b);
        let harness = Harness::new(&[(a, 100 * COIN), (b, 100 * COIN)]);
        let derived = a.encode_derived(NET).unwrap();
        let raw = b.encode(NET).unwrap();
        let (from, to) = if derived_first { (&derived, &raw) } else { (&raw, &derived) };

        let send = harness.api.send(from, to, 1, "1");
        prop_assert_eq!(send.unwrap_err().code(), -5);
        let send_all = harness.api.send_all(from, to, 1);
        prop_assert_eq!(send_all.unwrap_err().code(), -5);
        let many = harness.api.send_to_many(from, 1, &[(to.as_str(), "1")]);
        prop_assert_eq!(many.unwrap_err().code(), -5);
        prop_assert!(harness.broadcaster.sent().is_empty());
    }

    /// Property: both encodings of one key answer balance queries alike.
    #[test]
    fn prop_query_forms_agree(base in base_address_strategy(), amount in 1..1_000_000i64) {
        let harness = Harness::new(&[(base, amount)]);
        let raw = base.encode(NET).unwrap();
        let derived = base.encode_derived(NET).unwrap();
        prop_assert_eq!(
            harness.api.get_balance(&raw, 1).unwrap(),
            harness.api.get_balance(&derived, 1).unwrap()
        );
        prop_assert_eq!(harness.api.decode_address(&derived).unwrap(), raw.clone());
        prop_assert_eq!(harness.api.encode_address(&raw).unwrap(), derived);
    }
}
