//! Per-address, per-property balances.
//!
//! Every balance has three buckets. `available` is spendable, `reserved`
//! backs open orders, `frozen` is held by an issuer freeze. Entries whose
//! buckets are all zero are removed so that two histories reaching the
//! same balances produce identical maps.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use strata_types::{Address, Amount, PropertyId};
use thiserror::Error;

use crate::error::InvalidReason;

/// Balance buckets of one address in one property.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Spendable.
    pub available: Amount,
    /// Locked in open orders.
    pub reserved: Amount,
    /// Held by a freeze.
    pub frozen: Amount,
}

impl Balance {
    /// Sum of all buckets.
    #[must_use]
    pub fn total(&self) -> i128 {
        i128::from(self.available) + i128::from(self.reserved) + i128::from(self.frozen)
    }

    /// True if every bucket is zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.available == 0 && self.reserved == 0 && self.frozen == 0
    }

    fn bucket_mut(&mut self, bucket: Bucket) -> &mut Amount {
        match bucket {
            Bucket::Available => &mut self.available,
            Bucket::Reserved => &mut self.reserved,
            Bucket::Frozen => &mut self.frozen,
        }
    }
}

/// A balance bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    /// Spendable.
    Available,
    /// Locked in open orders.
    Reserved,
    /// Held by a freeze.
    Frozen,
}

/// Ledger operation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The source bucket holds less than requested.
    #[error("insufficient funds: have {have}, need {need}")]
    Insufficient {
        /// Bucket content.
        have: Amount,
        /// Requested amount.
        need: Amount,
    },
    /// A bucket would exceed the amount range.
    #[error("balance overflow")]
    Overflow,
    /// Negative amount requested.
    #[error("negative amount")]
    Negative,
}

impl From<LedgerError> for InvalidReason {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Insufficient { have, need } => InvalidReason::InsufficientBalance {
                available: have,
                required: need,
            },
            LedgerError::Overflow | LedgerError::Negative => InvalidReason::AmountOutOfRange,
        }
    }
}

/// The balance ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    #[serde(with = "strata_types::seq_map")]
    balances: BTreeMap<(PropertyId, Address), Balance>,
    frozen: BTreeSet<(PropertyId, Address)>,
}

impl Tally {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of `address` in `property`.
    #[must_use]
    pub fn balance(&self, address: &Address, property: PropertyId) -> Balance {
        self.balances
            .get(&(property, address.clone()))
            .copied()
            .unwrap_or_default()
    }

    /// Available balance of `address` in `property`.
    #[must_use]
    pub fn available(&self, address: &Address, property: PropertyId) -> Amount {
        self.balance(address, property).available
    }

    /// Every non-empty balance of `address`, by property.
    #[must_use]
    pub fn balances_of(&self, address: &Address) -> BTreeMap<PropertyId, Balance> {
        self.balances
            .iter()
            .filter(|((_, a), _)| a == address)
            .map(|((p, _), b)| (*p, *b))
            .collect()
    }

    /// Holders of `property` in ascending address order.
    pub fn holders(&self, property: PropertyId) -> impl Iterator<Item = (&Address, &Balance)> {
        let start = (property, Address::new(String::new()));
        self.balances
            .range((Bound::Included(start), Bound::Unbounded))
            .take_while(move |((p, _), _)| *p == property)
            .map(|((_, a), b)| (a, b))
    }

    /// Iterates over all balances in `(property, address)` order.
    pub fn iter(&self) -> impl Iterator<Item = (&(PropertyId, Address), &Balance)> {
        self.balances.iter()
    }

    /// Sum of all buckets of all holders of `property`.
    #[must_use]
    pub fn total(&self, property: PropertyId) -> i128 {
        self.holders(property).map(|(_, b)| b.total()).sum()
    }

    /// True if `address` is frozen for `property`.
    #[must_use]
    pub fn is_frozen(&self, address: &Address, property: PropertyId) -> bool {
        self.frozen.contains(&(property, address.clone()))
    }

    /// Addresses frozen for `property`.
    pub fn frozen_addresses(&self, property: PropertyId) -> impl Iterator<Item = &Address> {
        self.frozen
            .iter()
            .filter(move |(p, _)| *p == property)
            .map(|(_, a)| a)
    }

    /// Every frozen `(property, address)` pair in ascending order.
    pub fn frozen_entries(&self) -> impl Iterator<Item = &(PropertyId, Address)> {
        self.frozen.iter()
    }

    /// Credits `amount` to `address`.
    ///
    /// Lands in the frozen bucket while the address is frozen for the
    /// property, otherwise in the available bucket.
    pub fn credit(
        &mut self,
        address: &Address,
        property: PropertyId,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        let bucket = if self.is_frozen(address, property) {
            Bucket::Frozen
        } else {
            Bucket::Available
        };
        self.add(address, property, bucket, amount)
    }

    /// Debits `amount` from the available bucket.
    pub fn debit(
        &mut self,
        address: &Address,
        property: PropertyId,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.sub(address, property, Bucket::Available, amount)
    }

    /// Moves `amount` between two buckets of the same balance.
    pub fn shift(
        &mut self,
        address: &Address,
        property: PropertyId,
        from: Bucket,
        to: Bucket,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.sub(address, property, from, amount)?;
        self.add(address, property, to, amount)
    }

    /// Transfers `amount` from `from`'s available bucket to `to`.
    pub fn transfer(
        &mut self,
        from: &Address,
        to: &Address,
        property: PropertyId,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.debit(from, property, amount)?;
        self.credit(to, property, amount)
    }

    /// Pays `amount` out of `from`'s reserved bucket to `to`.
    pub fn settle(
        &mut self,
        from: &Address,
        to: &Address,
        property: PropertyId,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.sub(from, property, Bucket::Reserved, amount)?;
        self.credit(to, property, amount)
    }

    /// Returns reserved funds to their owner.
    pub fn release(
        &mut self,
        address: &Address,
        property: PropertyId,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.sub(address, property, Bucket::Reserved, amount)?;
        self.credit(address, property, amount)
    }

    /// Freezes `address` for `property`, moving its available balance into
    /// the frozen bucket. Reserved funds must be released first.
    pub fn freeze(&mut self, address: &Address, property: PropertyId) -> Result<(), LedgerError> {
        let available = self.available(address, property);
        if available > 0 {
            self.shift(address, property, Bucket::Available, Bucket::Frozen, available)?;
        }
        self.frozen.insert((property, address.clone()));
        Ok(())
    }

    /// Unfreezes `address` for `property`, making its frozen funds available.
    pub fn unfreeze(&mut self, address: &Address, property: PropertyId) -> Result<(), LedgerError> {
        self.frozen.remove(&(property, address.clone()));
        let frozen = self.balance(address, property).frozen;
        if frozen > 0 {
            self.shift(address, property, Bucket::Frozen, Bucket::Available, frozen)?;
        }
        Ok(())
    }

    /// Unfreezes every address frozen for `property`.
    pub fn unfreeze_all(&mut self, property: PropertyId) -> Result<(), LedgerError> {
        let targets: Vec<Address> = self.frozen_addresses(property).cloned().collect();
        for address in targets {
            self.unfreeze(&address, property)?;
        }
        Ok(())
    }

    fn add(
        &mut self,
        address: &Address,
        property: PropertyId,
        bucket: Bucket,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        if amount < 0 {
            return Err(LedgerError::Negative);
        }
        if amount == 0 {
            return Ok(());
        }
        let entry = self
            .balances
            .entry((property, address.clone()))
            .or_default();
        let slot = entry.bucket_mut(bucket);
        *slot = slot.checked_add(amount).ok_or(LedgerError::Overflow)?;
        Ok(())
    }

    fn sub(
        &mut self,
        address: &Address,
        property: PropertyId,
        bucket: Bucket,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        if amount < 0 {
            return Err(LedgerError::Negative);
        }
        if amount == 0 {
            return Ok(());
        }
        let key = (property, address.clone());
        let mut balance = self.balances.get(&key).copied().unwrap_or_default();
        let slot = balance.bucket_mut(bucket);
        if *slot < amount {
            return Err(LedgerError::Insufficient {
                have: *slot,
                need: amount,
            });
        }
        *slot -= amount;
        if balance.is_empty() {
            self.balances.remove(&key);
        } else {
            self.balances.insert(key, balance);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const P: PropertyId = PropertyId(3);

    fn a(s: &str) -> Address {
        Address::new(s)
    }

    #[test]
    fn test_credit_debit() {
        let mut tally = Tally::new();
        tally.credit(&a("alice"), P, 100).unwrap();
        tally.transfer(&a("alice"), &a("bob"), P, 40).unwrap();
        assert_eq!(tally.available(&a("alice"), P), 60);
        assert_eq!(tally.available(&a("bob"), P), 40);
        assert_eq!(tally.total(P), 100);

        let err = tally.debit(&a("bob"), P, 41).unwrap_err();
        assert_eq!(err, LedgerError::Insufficient { have: 40, need: 41 });
        assert_eq!(tally.available(&a("bob"), P), 40);
    }

    #[test]
    fn test_empty_entries_removed() {
        let mut tally = Tally::new();
        tally.credit(&a("alice"), P, 5).unwrap();
        tally.debit(&a("alice"), P, 5).unwrap();
        assert_eq!(tally, Tally::new());
    }

    #[test]
    fn test_reserve_and_release() {
        let mut tally = Tally::new();
        tally.credit(&a("alice"), P, 10).unwrap();
        tally
            .shift(&a("alice"), P, Bucket::Available, Bucket::Reserved, 7)
            .unwrap();
        assert_eq!(
            tally.balance(&a("alice"), P),
            Balance {
                available: 3,
                reserved: 7,
                frozen: 0
            }
        );
        tally.release(&a("alice"), P, 7).unwrap();
        assert_eq!(tally.available(&a("alice"), P), 10);
    }

    #[test]
    fn test_freeze_routes_credits() {
        let mut tally = Tally::new();
        tally.credit(&a("alice"), P, 10).unwrap();
        tally.freeze(&a("alice"), P).unwrap();
        assert!(tally.is_frozen(&a("alice"), P));
        tally.credit(&a("alice"), P, 5).unwrap();
        assert_eq!(tally.balance(&a("alice"), P).frozen, 15);
        assert_eq!(tally.available(&a("alice"), P), 0);

        tally.unfreeze_all(P).unwrap();
        assert!(!tally.is_frozen(&a("alice"), P));
        assert_eq!(tally.available(&a("alice"), P), 15);
    }

    #[test]
    fn test_holders_scoped_to_property() {
        let mut tally = Tally::new();
        tally.credit(&a("b"), P, 1).unwrap();
        tally.credit(&a("a"), P, 2).unwrap();
        tally.credit(&a("a"), PropertyId(4), 3).unwrap();
        tally.credit(&a("a"), PropertyId(2), 3).unwrap();
        let holders: Vec<_> = tally.holders(P).map(|(a, b)| (a.clone(), b.available)).collect();
        assert_eq!(holders, vec![(a("a"), 2), (a("b"), 1)]);
        assert_eq!(tally.balances_of(&a("a")).len(), 3);
    }

    #[test]
    fn test_negative_rejected() {
        let mut tally = Tally::new();
        assert_eq!(tally.credit(&a("a"), P, -1), Err(LedgerError::Negative));
    }
}
