//! Shared helpers for building chains of protocol transactions.

#![allow(dead_code)]

use std::sync::Arc;
use strata_codec::{embed_payload, IssuanceHeader, Message, RawTransaction, TxInput, TxOutput};
use strata_consensus::{AllowAny, Block, ConsensusParams, Engine, EngineConfig, EngineState};
use strata_storage::MemorySnapshotStore;
use strata_types::{Address, BlockHash, BlockHeight, Txid};

/// First height processed on regtest.
pub const START: BlockHeight = 101;

pub fn addr(name: &str) -> Address {
    Address::new(name)
}

/// A transaction from `sender` carrying `message`, paying `receiver` if given.
pub fn tx(sender: &str, receiver: Option<&str>, message: &Message) -> RawTransaction {
    tx_to_many(sender, receiver.into_iter().collect::<Vec<_>>().as_slice(), message)
}

/// A transaction whose payment outputs follow the null-data output at index 0.
pub fn tx_to_many(sender: &str, receivers: &[&str], message: &Message) -> RawTransaction {
    let payload = message.encode().unwrap();
    let mut outputs = vec![TxOutput::NullData {
        data: embed_payload(&payload, 1_000).unwrap(),
    }];
    for receiver in receivers {
        outputs.push(TxOutput::Payment {
            address: addr(receiver),
            value: 546,
        });
    }
    RawTransaction {
        txid: Txid::random(),
        inputs: vec![TxInput {
            address: Some(addr(sender)),
            value: 100_000,
        }],
        outputs,
    }
}

pub fn header(name: &str, kind: u16) -> IssuanceHeader {
    IssuanceHeader {
        ecosystem: 1,
        kind,
        previous: 0,
        category: "test".into(),
        subcategory: String::new(),
        name: name.into(),
        url: String::new(),
        data: String::new(),
    }
}

/// Builds consecutive blocks on one branch.
#[derive(Debug, Clone)]
pub struct ChainBuilder {
    tag: Vec<u8>,
    blocks: Vec<Block>,
}

impl ChainBuilder {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.as_bytes().to_vec(),
            blocks: Vec::new(),
        }
    }

    /// Continues the branch of `self` under a new tag.
    pub fn fork(&self, tag: &str, keep: usize) -> Self {
        Self {
            tag: tag.as_bytes().to_vec(),
            blocks: self.blocks[..keep].to_vec(),
        }
    }

    pub fn next_height(&self) -> BlockHeight {
        self.blocks.last().map_or(START, |b| b.height + 1)
    }

    /// Appends a block holding `transactions` and returns it.
    pub fn push(&mut self, transactions: Vec<RawTransaction>) -> Block {
        let height = self.next_height();
        let parent = self.blocks.last().map_or(BlockHash::null(), |b| b.hash);
        let hash = BlockHash::digest(&[self.tag.as_slice(), &height.to_be_bytes()].concat());
        let block = Block::new(
            height,
            hash,
            parent,
            1_700_000_000 + u64::from(height) * 600,
            transactions,
        );
        self.blocks.push(block.clone());
        block
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }
}

pub fn engine_with(
    config: EngineConfig,
    params: ConsensusParams,
    genesis: EngineState,
) -> (Engine, Arc<MemorySnapshotStore>) {
    let store = Arc::new(MemorySnapshotStore::new());
    let engine = Engine::new(config, params, Arc::new(AllowAny), store.clone(), genesis);
    (engine, store)
}

/// A regtest engine with the given addresses holding `amount` of the
/// main-ecosystem native token.
pub fn funded_engine(holders: &[&str], amount: i64, config: EngineConfig) -> Engine {
    let params = ConsensusParams::regtest();
    let genesis = funded_genesis(&params, holders, amount);
    engine_with(config, params, genesis).0
}

pub fn funded_genesis(params: &ConsensusParams, holders: &[&str], amount: i64) -> EngineState {
    let mut genesis = EngineState::genesis(params);
    for holder in holders {
        genesis
            .mint(strata_types::PropertyId::MAIN_NATIVE, &addr(holder), amount)
            .unwrap();
    }
    genesis
}
