//! Ownership of non-fungible token ranges.
//!
//! Tokens of a non-fungible property are numbered from 1. Ownership is
//! kept as maximal ranges: adjacent ranges with the same owner are always
//! merged, so a contiguous run owned by one address is a single entry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Bound;
use strata_types::{Address, PropertyId};

/// A run of tokens with a single owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRange {
    /// First token, inclusive.
    pub first: u64,
    /// Last token, inclusive.
    pub last: u64,
    /// Owner.
    pub owner: Address,
}

/// Token range ownership for every non-fungible property.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRanges {
    /// `(property, first)` to `(last, owner)`.
    #[serde(with = "strata_types::seq_map")]
    ranges: BTreeMap<(PropertyId, u64), (u64, Address)>,
    #[serde(with = "strata_types::seq_map")]
    next_token: BTreeMap<PropertyId, u64>,
}

impl TokenRanges {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns the next `count` tokens of `property` to `owner`.
    ///
    /// Returns the assigned `(first, last)` or `None` if the numbering
    /// would overflow.
    pub fn mint(&mut self, property: PropertyId, count: u64, owner: &Address) -> Option<(u64, u64)> {
        if count == 0 {
            return None;
        }
        let first = self.next_token.get(&property).copied().unwrap_or(1);
        let last = first.checked_add(count - 1)?;
        let next = last.checked_add(1)?;
        self.next_token.insert(property, next);
        self.insert(property, first, last, owner.clone());
        Some((first, last))
    }

    /// Owner of `token`.
    #[must_use]
    pub fn owner_of(&self, property: PropertyId, token: u64) -> Option<&Address> {
        self.containing(property, token)
            .filter(|(_, last, _)| token <= *last)
            .map(|(_, _, owner)| owner)
    }

    /// True if `owner` holds every token in `first..=last`.
    #[must_use]
    pub fn owns(&self, property: PropertyId, first: u64, last: u64, owner: &Address) -> bool {
        match self.containing(property, first) {
            Some((_, range_last, range_owner)) => range_owner == owner && last <= range_last,
            None => false,
        }
    }

    /// Moves `first..=last` to `to`. The caller checks ownership first.
    pub fn transfer(&mut self, property: PropertyId, first: u64, last: u64, to: &Address) {
        self.carve(property, first, last);
        self.insert(property, first, last, to.clone());
    }

    /// Ranges of `property` in token order.
    #[must_use]
    pub fn ranges(&self, property: PropertyId) -> Vec<TokenRange> {
        self.ranges
            .range((property, 0)..=(property, u64::MAX))
            .map(|((_, first), (last, owner))| TokenRange {
                first: *first,
                last: *last,
                owner: owner.clone(),
            })
            .collect()
    }

    /// Ranges of `property` held by `owner`.
    #[must_use]
    pub fn ranges_of(&self, property: PropertyId, owner: &Address) -> Vec<TokenRange> {
        self.ranges(property)
            .into_iter()
            .filter(|r| &r.owner == owner)
            .collect()
    }

    fn containing(&self, property: PropertyId, token: u64) -> Option<(u64, u64, &Address)> {
        self.ranges
            .range((Bound::Included((property, 0)), Bound::Included((property, token))))
            .next_back()
            .filter(|(_, (last, _))| token <= *last)
            .map(|((_, first), (last, owner))| (*first, *last, owner))
    }

    // Removes first..=last from whatever ranges cover it, keeping the rest.
    fn carve(&mut self, property: PropertyId, first: u64, last: u64) {
        let covered: Vec<(u64, u64, Address)> = self
            .ranges
            .range((property, 0)..=(property, last))
            .filter(|(_, (l, _))| *l >= first)
            .map(|((_, f), (l, o))| (*f, *l, o.clone()))
            .collect();
        for (f, l, owner) in covered {
            self.ranges.remove(&(property, f));
            if f < first {
                self.ranges.insert((property, f), (first - 1, owner.clone()));
            }
            if l > last {
                self.ranges.insert((property, last + 1), (l, owner));
            }
        }
    }

    fn insert(&mut self, property: PropertyId, mut first: u64, mut last: u64, owner: Address) {
        if first > 0 {
            if let Some((f, _, _)) = self
                .containing(property, first - 1)
                .filter(|(_, _, o)| **o == owner)
            {
                self.ranges.remove(&(property, f));
                first = f;
            }
        }
        if let Some(next) = last.checked_add(1) {
            if let Some((l, o)) = self.ranges.get(&(property, next)) {
                if *o == owner {
                    last = *l;
                    self.ranges.remove(&(property, next));
                }
            }
        }
        self.ranges.insert((property, first), (last, owner));
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

    fn r(first: u64, last: u64, owner: &str) -> TokenRange {
        TokenRange {
            first,
            last,
            owner: a(owner),
        }
    }

    #[test]
    fn test_mint_merges_adjacent() {
        let mut nft = TokenRanges::new();
        assert_eq!(nft.mint(P, 10, &a("alice")), Some((1, 10)));
        assert_eq!(nft.mint(P, 5, &a("alice")), Some((11, 15)));
        assert_eq!(nft.ranges(P), vec![r(1, 15, "alice")]);
        assert_eq!(nft.mint(P, 0, &a("alice")), None);
    }

    #[test]
    fn test_transfer_splits_and_merges() {
        let mut nft = TokenRanges::new();
        nft.mint(P, 10, &a("alice"));
        nft.transfer(P, 4, 6, &a("bob"));
        assert_eq!(
            nft.ranges(P),
            vec![r(1, 3, "alice"), r(4, 6, "bob"), r(7, 10, "alice")]
        );
        assert!(nft.owns(P, 4, 6, &a("bob")));
        assert!(!nft.owns(P, 3, 6, &a("bob")));
        assert!(!nft.owns(P, 6, 7, &a("alice")));
        assert_eq!(nft.owner_of(P, 5), Some(&a("bob")));

        nft.transfer(P, 4, 6, &a("alice"));
        assert_eq!(nft.ranges(P), vec![r(1, 10, "alice")]);
    }

    #[test]
    fn test_unminted_tokens_have_no_owner() {
        let mut nft = TokenRanges::new();
        nft.mint(P, 3, &a("alice"));
        assert_eq!(nft.owner_of(P, 4), None);
        assert!(!nft.owns(P, 2, 4, &a("alice")));
        assert_eq!(nft.owner_of(PropertyId(4), 1), None);
        assert_eq!(nft.ranges_of(P, &a("alice")), vec![r(1, 3, "alice")]);
    }
}
