//! Historical records kept for queries.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strata_codec::Message;
use strata_types::{Address, Amount, BlockHeight, PropertyId, Txid};

use crate::error::InvalidReason;

/// Outcome of one protocol transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRecord {
    /// Transaction identifier.
    pub txid: Txid,
    /// Block height.
    pub block: BlockHeight,
    /// Position within the block.
    pub index: u32,
    /// Resolved sender.
    pub sender: Address,
    /// Resolved reference receiver.
    pub reference: Option<Address>,
    /// Decoded message.
    pub message: Message,
    /// Whether the message took effect.
    pub valid: bool,
    /// Why it did not.
    pub reason: Option<InvalidReason>,
}

impl TxRecord {
    /// Numeric reason code, zero for valid transactions.
    #[must_use]
    pub fn reason_code(&self) -> i32 {
        self.reason.as_ref().map_or(0, InvalidReason::code)
    }
}

/// One payout of a distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    /// Receiver.
    pub address: Address,
    /// Amount paid, possibly zero.
    pub amount: Amount,
}

/// A completed send-to-owners distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionRecord {
    /// Distributing transaction.
    pub txid: Txid,
    /// Block height.
    pub block: BlockHeight,
    /// Distributor.
    pub sender: Address,
    /// Property paid out.
    pub property: PropertyId,
    /// Property whose holders were eligible.
    pub source: PropertyId,
    /// Amount distributed.
    pub total: Amount,
    /// Payouts in ascending address order.
    pub payouts: Vec<Payout>,
    /// Rounding remainder returned to the sender.
    pub remainder: Amount,
}

/// One fill between an incoming and a resting order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Block of the fill.
    pub block: BlockHeight,
    /// Incoming order.
    pub taker: Txid,
    /// Resting order.
    pub maker: Txid,
    /// Taker's address.
    pub taker_address: Address,
    /// Maker's address.
    pub maker_address: Address,
    /// Property the taker paid.
    pub taker_paid_property: PropertyId,
    /// Amount the taker paid.
    pub taker_paid: Amount,
    /// Property the maker paid.
    pub maker_paid_property: PropertyId,
    /// Amount the maker paid.
    pub maker_paid: Amount,
}

/// Query-side history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Records {
    /// Protocol transactions by txid.
    pub transactions: BTreeMap<Txid, TxRecord>,
    /// Distributions by txid.
    pub distributions: BTreeMap<Txid, DistributionRecord>,
    /// Fills in execution order.
    pub trades: Vec<TradeRecord>,
}

impl Records {
    /// Fills that involved `order` as taker or maker.
    #[must_use]
    pub fn trades_of(&self, order: &Txid) -> Vec<&TradeRecord> {
        self.trades
            .iter()
            .filter(|t| t.taker == *order || t.maker == *order)
            .collect()
    }

    /// Transactions sent by `address`, in chain order.
    #[must_use]
    pub fn transactions_of(&self, address: &Address) -> Vec<&TxRecord> {
        let mut found: Vec<&TxRecord> = self
            .transactions
            .values()
            .filter(|r| r.sender == *address)
            .collect();
        found.sort_by_key(|r| (r.block, r.index));
        found
    }
}
