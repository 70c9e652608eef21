//! Fatal conditions stop block ingestion for good.

mod common;

use common::{addr, tx, ChainBuilder};
use std::sync::Arc;
use strata_codec::Message;
use strata_consensus::{
    AllowList, ConsensusParams, Engine, EngineConfig, EngineError, EngineEvent, FatalError,
    InvalidReason, CLIENT_VERSION,
};
use strata_storage::MemorySnapshotStore;
use strata_types::PropertyId;

fn version_alert(required: u32) -> Message {
    Message::Alert {
        alert_type: 3,
        expiry_value: required,
        message: "upgrade required".into(),
    }
}

fn pay(amount: u64) -> Message {
    Message::SimpleSend {
        property: PropertyId::MAIN_NATIVE,
        amount,
    }
}

#[test]
fn test_version_alert_stops_ingestion() {
    let engine = common::funded_engine(&["alice"], 1_000, EngineConfig::default());
    let mut events = engine.subscribe();
    let mut chain = ChainBuilder::new("main");

    engine
        .process_block(&chain.push(vec![tx("alice", Some("bob"), &pay(100))]))
        .unwrap();

    let alert = chain.push(vec![tx("governance", None, &version_alert(CLIENT_VERSION + 1))]);
    let err = engine.process_block(&alert).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Fatal(FatalError::ClientOutdated { required, .. }) if required == CLIENT_VERSION + 1
    ));
    assert_eq!(err.fatal().map(FatalError::exit_code), Some(2));

    // nothing after the halt changes anything
    let before = engine.state();
    let after_halt = chain.push(vec![tx("alice", Some("bob"), &pay(100))]);
    let txid = after_halt.transactions[0].txid;
    for _ in 0..3 {
        assert!(matches!(
            engine.process_block(&after_halt),
            Err(EngineError::Halted(FatalError::ClientOutdated { .. }))
        ));
    }
    assert_eq!(*engine.state(), *before);
    assert_eq!(engine.height(), Some(alert.height));

    // reads keep working
    let reader = engine.reader();
    assert_eq!(reader.balance(&addr("bob"), PropertyId::MAIN_NATIVE).available, 100);
    assert!(reader.transaction(&txid).is_none());

    let mut halted = false;
    while let Ok(event) = events.try_recv() {
        halted |= matches!(event, EngineEvent::Halted(_));
    }
    assert!(halted);
}

#[test]
fn test_satisfied_version_alert_is_harmless() {
    let engine = common::funded_engine(&["alice"], 1_000, EngineConfig::default());
    let mut chain = ChainBuilder::new("main");
    engine
        .process_block(&chain.push(vec![tx("governance", None, &version_alert(CLIENT_VERSION))]))
        .unwrap();
    engine
        .process_block(&chain.push(vec![tx("alice", Some("bob"), &pay(1))]))
        .unwrap();
    assert!(engine.halted().is_none());
    assert_eq!(engine.state().alerts.len(), 1);
}

#[test]
fn test_unauthorized_alert_is_only_invalid() {
    let params = ConsensusParams::regtest();
    let genesis = common::funded_genesis(&params, &[], 0);
    let auth = AllowList::default().with(addr("governance"));
    let engine = Engine::new(
        EngineConfig::default(),
        params,
        Arc::new(auth),
        Arc::new(MemorySnapshotStore::new()),
        genesis,
    );
    let mut chain = ChainBuilder::new("main");

    let forged = tx("mallory", None, &version_alert(u32::MAX));
    let txid = forged.txid;
    engine.process_block(&chain.push(vec![forged])).unwrap();
    engine.process_block(&chain.push(vec![])).unwrap();

    assert!(engine.halted().is_none());
    assert_eq!(
        engine.reader().transaction(&txid).unwrap().reason,
        Some(InvalidReason::Unauthorized)
    );
}

#[test]
fn test_unsupported_feature_halts_when_live() {
    let engine = common::funded_engine(&[], 0, EngineConfig::default());
    let mut chain = ChainBuilder::new("main");
    let live_at = chain.next_height() + 5;
    engine
        .process_block(&chain.push(vec![tx(
            "governance",
            None,
            &Message::Activation {
                feature: 4_242,
                activation_height: live_at,
                min_client_version: 0,
            },
        )]))
        .unwrap();

    while chain.next_height() < live_at {
        engine.process_block(&chain.push(vec![])).unwrap();
    }
    assert!(matches!(
        engine.process_block(&chain.push(vec![])),
        Err(EngineError::Fatal(FatalError::UnsupportedFeatureLive { feature: 4_242, .. }))
    ));
    assert!(matches!(
        engine.process_block(&chain.push(vec![])),
        Err(EngineError::Halted(_))
    ));
}
