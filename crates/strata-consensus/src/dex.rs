//! Token-for-token order book.
//!
//! Each market is keyed by `(for_sale, desired)` and keeps its resting
//! orders sorted best first: lowest asking price (desired per unit offered),
//! then earliest `(block, index)`. An incoming order walks the opposite
//! market and fills at each resting order's own price until its price
//! limit, its funds or the market run out.
//!
//! All arithmetic on prices is done by cross-multiplying the original
//! order amounts in 128 bits, so no rounding ever enters a comparison.
//!
//! ```text
//! incoming: sells A (a0) for B (b0)        resting: sells B (f0) for A (d0)
//!
//!   match while   d0 * b0 <= a0 * f0
//!   B filled   =  min(resting left, floor(A left * f0 / d0))
//!   A paid     =  ceil(B filled * d0 / f0)
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use strata_types::{Address, Amount, BlockHeight, PropertyId, Txid};

use crate::state::{Bucket, LedgerError, Tally, TradeRecord};

/// A resting or incoming order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Creating transaction; also the order identifier.
    pub txid: Txid,
    /// Owner.
    pub address: Address,
    /// Creation height.
    pub block: BlockHeight,
    /// Position of the creating transaction in its block.
    pub index: u32,
    /// Property offered.
    pub for_sale: PropertyId,
    /// Amount originally offered.
    pub amount_for_sale: Amount,
    /// Property wanted.
    pub desired: PropertyId,
    /// Amount originally wanted.
    pub amount_desired: Amount,
    /// Amount still offered and reserved.
    pub remaining: Amount,
    /// Height at which the order lapses without a further match.
    pub expires_at: Option<BlockHeight>,
}

impl Order {
    /// Compares asking prices: `self.desired / self.for_sale` against
    /// `other`'s.
    #[must_use]
    pub fn cmp_price(&self, other: &Order) -> Ordering {
        let lhs = wide(self.amount_desired) * wide(other.amount_for_sale);
        let rhs = wide(other.amount_desired) * wide(self.amount_for_sale);
        lhs.cmp(&rhs)
    }

    /// True if this order asks exactly `amount_desired / amount_for_sale`.
    #[must_use]
    pub fn has_price(&self, amount_for_sale: Amount, amount_desired: Amount) -> bool {
        wide(self.amount_desired) * wide(amount_for_sale)
            == wide(amount_desired) * wide(self.amount_for_sale)
    }

    fn priority(&self, other: &Order) -> Ordering {
        self.cmp_price(other)
            .then(self.block.cmp(&other.block))
            .then(self.index.cmp(&other.index))
    }

    /// Units of `desired` the remaining funds can buy at this order's own
    /// price.
    fn purchasable(&self) -> u128 {
        wide(self.remaining) * wide(self.amount_desired) / wide(self.amount_for_sale)
    }
}

fn wide(v: Amount) -> u128 {
    u128::try_from(v).unwrap_or(0)
}

fn narrow(v: u128) -> Result<Amount, LedgerError> {
    Amount::try_from(v).map_err(|_| LedgerError::Overflow)
}

fn expiry(height: BlockHeight, window: BlockHeight) -> Option<BlockHeight> {
    if window == 0 {
        None
    } else {
        height.checked_add(window)
    }
}

/// What happened to an incoming order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaceOutcome {
    /// Fills executed.
    pub fills: Vec<TradeRecord>,
    /// Amount left resting in the book.
    pub rested: Amount,
    /// Dust returned to the owner because it could not buy one unit.
    pub released: Amount,
    /// Resting orders closed after a partial fill left them unable to buy
    /// one unit, with the amount returned to each owner.
    pub makers_released: Vec<(Txid, Amount)>,
}

/// The order book of all markets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBook {
    #[serde(with = "strata_types::seq_map")]
    markets: BTreeMap<(PropertyId, PropertyId), Vec<Order>>,
}

impl OrderBook {
    /// Creates an empty book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resting orders of one market, best first.
    #[must_use]
    pub fn market(&self, for_sale: PropertyId, desired: PropertyId) -> &[Order] {
        self.markets
            .get(&(for_sale, desired))
            .map_or(&[], Vec::as_slice)
    }

    /// All resting orders, market by market.
    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.markets.values().flatten()
    }

    /// Resting orders owned by `address`.
    #[must_use]
    pub fn orders_of(&self, address: &Address) -> Vec<&Order> {
        self.orders().filter(|o| o.address == *address).collect()
    }

    /// Looks up a resting order.
    #[must_use]
    pub fn get(&self, txid: &Txid) -> Option<&Order> {
        self.orders().find(|o| o.txid == *txid)
    }

    /// Number of resting orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.markets.values().map(Vec::len).sum()
    }

    /// True if no order rests.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }

    /// Reserves the incoming order's funds, matches it and rests or
    /// releases what is left.
    ///
    /// The caller has checked that the owner's available balance covers
    /// `amount_for_sale`.
    pub fn place(
        &mut self,
        tally: &mut Tally,
        mut order: Order,
        height: BlockHeight,
        expiry_window: BlockHeight,
    ) -> Result<PlaceOutcome, LedgerError> {
        tally.shift(
            &order.address,
            order.for_sale,
            Bucket::Available,
            Bucket::Reserved,
            order.amount_for_sale,
        )?;
        order.remaining = order.amount_for_sale;

        let mut outcome = PlaceOutcome::default();
        let opposite = (order.desired, order.for_sale);
        if let Some(book) = self.markets.get_mut(&opposite) {
            let mut i = 0;
            while i < book.len() && order.remaining > 0 {
                let resting = &mut book[i];
                let crosses = wide(resting.amount_desired) * wide(order.amount_desired)
                    <= wide(order.amount_for_sale) * wide(resting.amount_for_sale);
                if !crosses {
                    break;
                }

                let affordable = wide(order.remaining) * wide(resting.amount_for_sale)
                    / wide(resting.amount_desired);
                let filled = affordable.min(wide(resting.remaining));
                if filled == 0 {
                    break;
                }
                let paid = (filled * wide(resting.amount_desired))
                    .div_ceil(wide(resting.amount_for_sale));
                let filled = narrow(filled)?;
                let paid = narrow(paid)?;

                tally.settle(&order.address, &resting.address, order.for_sale, paid)?;
                tally.settle(&resting.address, &order.address, resting.for_sale, filled)?;

                order.remaining -= paid;
                resting.remaining -= filled;
                resting.expires_at = expiry(height, expiry_window);

                tracing::debug!(
                    taker = %order.txid,
                    maker = %resting.txid,
                    paid,
                    filled,
                    "orders matched"
                );
                outcome.fills.push(TradeRecord {
                    block: height,
                    taker: order.txid,
                    maker: resting.txid,
                    taker_address: order.address.clone(),
                    maker_address: resting.address.clone(),
                    taker_paid_property: order.for_sale,
                    taker_paid: paid,
                    maker_paid_property: resting.for_sale,
                    maker_paid: filled,
                });

                if resting.remaining == 0 {
                    book.remove(i);
                } else if resting.purchasable() == 0 {
                    let dust = book.remove(i);
                    tally.release(&dust.address, dust.for_sale, dust.remaining)?;
                    tracing::debug!(order = %dust.txid, amount = dust.remaining, "resting dust released");
                    outcome.makers_released.push((dust.txid, dust.remaining));
                } else {
                    i += 1;
                }
            }
            if book.is_empty() {
                self.markets.remove(&opposite);
            }
        }

        if order.remaining > 0 {
            if order.purchasable() >= 1 {
                order.expires_at = expiry(height, expiry_window);
                outcome.rested = order.remaining;
                self.insert(order);
            } else {
                tally.release(&order.address, order.for_sale, order.remaining)?;
                outcome.released = order.remaining;
            }
        }
        Ok(outcome)
    }

    /// Removes every order matching `predicate` and returns their funds.
    pub fn cancel_where(
        &mut self,
        tally: &mut Tally,
        predicate: impl Fn(&Order) -> bool,
    ) -> Result<Vec<Order>, LedgerError> {
        let mut cancelled = Vec::new();
        for book in self.markets.values_mut() {
            let (gone, kept): (Vec<Order>, Vec<Order>) =
                std::mem::take(book).into_iter().partition(|o| predicate(o));
            *book = kept;
            cancelled.extend(gone);
        }
        self.markets.retain(|_, book| !book.is_empty());
        for order in &cancelled {
            tally.release(&order.address, order.for_sale, order.remaining)?;
        }
        Ok(cancelled)
    }

    /// Removes orders that lapsed at or before `height`.
    pub fn expire(&mut self, tally: &mut Tally, height: BlockHeight) -> Result<Vec<Order>, LedgerError> {
        self.cancel_where(tally, |o| o.expires_at.is_some_and(|at| at <= height))
    }

    fn insert(&mut self, order: Order) {
        let book = self
            .markets
            .entry((order.for_sale, order.desired))
            .or_default();
        let at = book.partition_point(|o| o.priority(&order) != Ordering::Greater);
        book.insert(at, order);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const A: PropertyId = PropertyId(3);
    const B: PropertyId = PropertyId(4);

    fn addr(s: &str) -> Address {
        Address::new(s)
    }

    fn order(who: &str, idx: u32, sell: PropertyId, sell_amt: Amount, want: PropertyId, want_amt: Amount) -> Order {
        Order {
            txid: Txid::digest(format!("{who}{idx}").as_bytes()),
            address: addr(who),
            block: 1,
            index: idx,
            for_sale: sell,
            amount_for_sale: sell_amt,
            desired: want,
            amount_desired: want_amt,
            remaining: 0,
            expires_at: None,
        }
    }

    fn funded() -> Tally {
        let mut tally = Tally::new();
        for who in ["alice", "bob", "carol"] {
            tally.credit(&addr(who), A, 1_000).unwrap();
            tally.credit(&addr(who), B, 1_000).unwrap();
        }
        tally
    }

    #[test]
    fn test_resting_then_full_match() {
        let mut tally = funded();
        let mut book = OrderBook::new();

        let out = book
            .place(&mut tally, order("alice", 0, A, 100, B, 200), 1, 0)
            .unwrap();
        assert!(out.fills.is_empty());
        assert_eq!(out.rested, 100);
        assert_eq!(tally.balance(&addr("alice"), A).reserved, 100);

        let out = book
            .place(&mut tally, order("bob", 1, B, 200, A, 100), 2, 0)
            .unwrap();
        assert_eq!(out.fills.len(), 1);
        assert_eq!(out.fills[0].taker_paid, 200);
        assert_eq!(out.fills[0].maker_paid, 100);
        assert!(book.is_empty());
        assert_eq!(tally.available(&addr("alice"), A), 900);
        assert_eq!(tally.available(&addr("alice"), B), 1_200);
        assert_eq!(tally.available(&addr("bob"), A), 1_100);
        assert_eq!(tally.available(&addr("bob"), B), 800);
        assert_eq!(tally.total(A), 3_000);
        assert_eq!(tally.total(B), 3_000);
    }

    #[test]
    fn test_executes_at_resting_price() {
        let mut tally = funded();
        let mut book = OrderBook::new();
        // alice asks 1 B per A
        book.place(&mut tally, order("alice", 0, A, 100, B, 100), 1, 0)
            .unwrap();
        // bob would pay 2 B per A but only wants 50 A
        let out = book
            .place(&mut tally, order("bob", 1, B, 100, A, 50), 2, 0)
            .unwrap();
        assert_eq!(out.fills[0].maker_paid, 100);
        assert_eq!(out.fills[0].taker_paid, 100);
        // bob got 100 A for 100 B: all of alice's offer at her price
        assert_eq!(tally.available(&addr("bob"), A), 1_100);
        assert!(book.is_empty());
    }

    #[test]
    fn test_price_priority_then_time() {
        let mut tally = funded();
        let mut book = OrderBook::new();
        book.place(&mut tally, order("alice", 0, A, 10, B, 30), 1, 0)
            .unwrap();
        book.place(&mut tally, order("bob", 1, A, 10, B, 20), 1, 0)
            .unwrap();
        book.place(&mut tally, order("carol", 2, A, 10, B, 20), 1, 0)
            .unwrap();
        let market: Vec<&str> = book.market(A, B).iter().map(|o| o.address.as_str()).collect();
        assert_eq!(market, vec!["bob", "carol", "alice"]);
    }

    #[test]
    fn test_no_cross_rests_both() {
        let mut tally = funded();
        let mut book = OrderBook::new();
        book.place(&mut tally, order("alice", 0, A, 10, B, 30), 1, 0)
            .unwrap();
        let out = book
            .place(&mut tally, order("bob", 1, B, 20, A, 10), 1, 0)
            .unwrap();
        assert!(out.fills.is_empty());
        assert_eq!(book.len(), 2);
    }

    #[test]
    fn test_dust_remainder_released() {
        let mut tally = funded();
        let mut book = OrderBook::new();
        // alice sells 3 A for 2 B
        book.place(&mut tally, order("alice", 0, A, 3, B, 2), 1, 0)
            .unwrap();
        // bob sells 3 B for 4 A; after the fill the 1 B left buys 1 A at
        // bob's own price (4/3 A per B) so it rests
        let out = book
            .place(&mut tally, order("bob", 1, B, 3, A, 4), 1, 0)
            .unwrap();
        assert_eq!(out.fills.len(), 1);
        assert_eq!(out.fills[0].maker_paid, 3);
        assert_eq!(out.fills[0].taker_paid, 2);
        assert_eq!(out.rested, 1);
        assert_eq!(out.released, 0);

        // carol's leftover A cannot buy a whole B at her own price
        let out = book
            .place(&mut tally, order("carol", 2, A, 3, B, 1), 1, 0)
            .unwrap();
        assert_eq!(out.fills.len(), 1);
        assert_eq!(out.fills[0].maker_paid, 1);
        assert_eq!(out.fills[0].taker_paid, 2);
        assert_eq!(out.released, 1);
        assert_eq!(out.rested, 0);
        assert!(book.is_empty());
        assert_eq!(tally.balance(&addr("carol"), A).reserved, 0);
        assert_eq!(tally.total(A), 3_000);
        assert_eq!(tally.total(B), 3_000);
    }

    #[test]
    fn test_resting_dust_released_after_partial_fill() {
        let mut tally = funded();
        let mut book = OrderBook::new();
        // alice asks 2 B for 3 A
        book.place(&mut tally, order("alice", 0, A, 3, B, 2), 1, 0)
            .unwrap();

        let out = book
            .place(&mut tally, order("bob", 1, B, 1, A, 1), 2, 0)
            .unwrap();
        assert_eq!(out.fills[0].maker_paid, 1);
        assert!(out.makers_released.is_empty());
        assert_eq!(book.market(A, B)[0].remaining, 2);

        // the single A left would need 2/3 B, so it cannot buy a whole unit
        let out = book
            .place(&mut tally, order("carol", 2, B, 1, A, 1), 3, 0)
            .unwrap();
        assert_eq!(out.fills[0].maker_paid, 1);
        assert_eq!(
            out.makers_released,
            vec![(Txid::digest(b"alice0"), 1)]
        );
        assert!(book.is_empty());
        assert_eq!(tally.balance(&addr("alice"), A).reserved, 0);
        assert_eq!(tally.available(&addr("alice"), A), 998);
        assert_eq!(tally.available(&addr("alice"), B), 1_002);
        assert_eq!(tally.total(A), 3_000);
        assert_eq!(tally.total(B), 3_000);
    }

    #[test]
    fn test_cancel_and_expire() {
        let mut tally = funded();
        let mut book = OrderBook::new();
        book.place(&mut tally, order("alice", 0, A, 10, B, 30), 1, 5)
            .unwrap();
        book.place(&mut tally, order("bob", 1, A, 10, B, 30), 3, 5)
            .unwrap();

        assert!(book.expire(&mut tally, 5).unwrap().is_empty());
        let expired = book.expire(&mut tally, 6).unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].address, addr("alice"));
        assert_eq!(tally.available(&addr("alice"), A), 1_000);

        let cancelled = book
            .cancel_where(&mut tally, |o| o.address == addr("bob"))
            .unwrap();
        assert_eq!(cancelled.len(), 1);
        assert!(book.is_empty());
        assert_eq!(tally.balance(&addr("bob"), A).reserved, 0);
    }

    #[test]
    fn test_has_price() {
        let o = order("alice", 0, A, 10, B, 30);
        assert!(o.has_price(20, 60));
        assert!(!o.has_price(20, 61));
    }
}
