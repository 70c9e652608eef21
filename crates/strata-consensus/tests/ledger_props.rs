//! Property-based tests over random message sequences.

mod common;

use common::{addr, header, tx, ChainBuilder};
use proptest::prelude::*;
use strata_codec::{Message, OrderTerms, RawTransaction};
use strata_consensus::{fingerprint, EngineConfig, EngineState, MemoryChain};
use strata_types::PropertyId;

const USERS: [&str; 4] = ["alice", "bob", "carol", "dave"];
const NATIVE: PropertyId = PropertyId::MAIN_NATIVE;
const TOKEN: PropertyId = PropertyId(3);

#[derive(Debug, Clone)]
enum Op {
    Send { from: usize, to: usize, token: bool, amount: u64 },
    Trade { from: usize, sell_token: bool, sell: u64, want: u64 },
    CancelAll { from: usize },
    Distribute { from: usize, amount: u64 },
    SendAll { from: usize, to: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let who = 0..USERS.len();
    prop_oneof![
        4 => (who.clone(), who.clone(), any::<bool>(), 1..5_000u64)
            .prop_map(|(from, to, token, amount)| Op::Send { from, to, token, amount }),
        4 => (who.clone(), any::<bool>(), 1..2_000u64, 1..2_000u64)
            .prop_map(|(from, sell_token, sell, want)| Op::Trade { from, sell_token, sell, want }),
        1 => who.clone().prop_map(|from| Op::CancelAll { from }),
        1 => (who.clone(), 1..3_000u64).prop_map(|(from, amount)| Op::Distribute { from, amount }),
        1 => (who.clone(), who).prop_map(|(from, to)| Op::SendAll { from, to }),
    ]
}

fn property(token: bool) -> PropertyId {
    if token {
        TOKEN
    } else {
        NATIVE
    }
}

fn to_tx(op: &Op) -> RawTransaction {
    match *op {
        Op::Send { from, to, token, amount } => tx(
            USERS[from],
            Some(USERS[to]),
            &Message::SimpleSend {
                property: property(token),
                amount,
            },
        ),
        Op::Trade { from, sell_token, sell, want } => tx(
            USERS[from],
            None,
            &Message::Trade(OrderTerms {
                for_sale: property(sell_token),
                amount_for_sale: sell,
                desired: property(!sell_token),
                amount_desired: want,
            }),
        ),
        Op::CancelAll { from } => tx(USERS[from], None, &Message::CancelEcosystem { ecosystem: 1 }),
        Op::Distribute { from, amount } => tx(
            USERS[from],
            None,
            &Message::SendToOwners {
                property: NATIVE,
                amount,
                source: None,
            },
        ),
        Op::SendAll { from, to } => {
            tx(USERS[from], Some(USERS[to]), &Message::SendAll { ecosystem: 1 })
        }
    }
}

/// A chain whose first block creates the token, followed by `blocks`.
fn build_chain(tag: &str, blocks: &[Vec<Op>]) -> ChainBuilder {
    let mut chain = ChainBuilder::new(tag);
    chain.push(vec![tx(
        "alice",
        None,
        &Message::CreateFixed {
            header: header("Token", 1),
            amount: 50_000,
        },
    )]);
    for ops in blocks {
        chain.push(ops.iter().map(to_tx).collect());
    }
    chain
}

fn blocks_strategy() -> impl Strategy<Value = Vec<Vec<Op>>> {
    prop::collection::vec(prop::collection::vec(op_strategy(), 0..6), 1..12)
}

fn config() -> EngineConfig {
    EngineConfig {
        snapshot_interval: 3,
        ..EngineConfig::default()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Property: every property's balances always add up to its supply.
    #[test]
    fn prop_supply_conserved(blocks in blocks_strategy()) {
        let engine = common::funded_engine(&USERS, 10_000, config());
        for block in build_chain("main", &blocks).blocks() {
            engine.process_block(block).unwrap();
            let state = engine.state();
            prop_assert!(state.audit().is_empty(), "audit failed at {}", block.height);
            for ((_, _), balance) in state.tally.iter() {
                prop_assert!(balance.available >= 0 && balance.reserved >= 0 && balance.frozen >= 0);
            }
        }
    }

    /// Property: two engines fed the same blocks agree on every fingerprint.
    #[test]
    fn prop_fingerprint_deterministic(blocks in blocks_strategy()) {
        let chain = build_chain("main", &blocks);
        let a = common::funded_engine(&USERS, 10_000, config());
        let b = common::funded_engine(&USERS, 10_000, config());
        for block in chain.blocks() {
            a.process_block(block).unwrap();
            b.process_block(block).unwrap();
        }
        prop_assert_eq!(fingerprint(&a.state()), fingerprint(&b.state()));
        prop_assert_eq!(&a.state().checkpoints, &b.state().checkpoints);
    }

    /// Property: rolling back to a snapshot and replaying the new branch
    /// yields byte-identical state to following the new branch from the start.
    #[test]
    fn prop_rollback_idempotent(
        blocks in blocks_strategy(),
        other in blocks_strategy(),
        keep_seed in any::<usize>(),
    ) {
        let first = build_chain("a", &blocks);
        let keep = 1 + keep_seed % first.blocks().len();
        let mut second = first.fork("b", keep);
        for ops in &other {
            second.push(ops.iter().map(to_tx).collect());
        }

        let reorged = common::funded_engine(&USERS, 10_000, config());
        reorged.sync(&MemoryChain::from_blocks(first.blocks().to_vec())).unwrap();
        let report = reorged
            .sync(&MemoryChain::from_blocks(second.blocks().to_vec()))
            .unwrap();
        prop_assert!(report.rollbacks <= 1);

        let straight = common::funded_engine(&USERS, 10_000, config());
        straight.sync(&MemoryChain::from_blocks(second.blocks().to_vec())).unwrap();

        let expected: EngineState = (*straight.state()).clone();
        prop_assert_eq!(reorged.state().to_bytes().unwrap(), expected.to_bytes().unwrap());
    }
}
