//! Send-to-owners distributions.
//!
//! The distributed amount is split across every address holding a
//! positive available-plus-reserved balance of the source property, in
//! proportion to that balance. Frozen funds do not count. The distributor
//! is a holder like any other. Shares are rounded down; whatever rounding
//! leaves over goes back to the distributor.

use strata_types::{Address, Amount, PropertyId};

use crate::error::InvalidReason;
use crate::state::{Payout, Tally};

/// A computed distribution, not yet applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// Payouts in ascending address order.
    pub payouts: Vec<Payout>,
    /// Rounding remainder.
    pub remainder: Amount,
}

/// Splits `amount` among the holders of `source`.
///
/// Each share is `amount * eligible / eligible_total`, rounded down, where
/// `eligible` is a holder's available plus reserved balance. The divisor is
/// the sum over eligible holders, distributor included, and not the
/// property's issued supply: frozen balances are left out of both.
pub fn plan(tally: &Tally, source: PropertyId, amount: Amount) -> Result<Plan, InvalidReason> {
    let holders: Vec<(Address, u128)> = tally
        .holders(source)
        .filter_map(|(address, balance)| {
            let eligible = i128::from(balance.available) + i128::from(balance.reserved);
            u128::try_from(eligible)
                .ok()
                .filter(|e| *e > 0)
                .map(|e| (address.clone(), e))
        })
        .collect();

    let eligible_total: u128 = holders.iter().map(|(_, e)| e).sum();
    if eligible_total == 0 {
        return Err(InvalidReason::NoEligibleHolders);
    }

    let total = u128::try_from(amount).map_err(|_| InvalidReason::AmountOutOfRange)?;
    let mut paid: u128 = 0;
    let mut payouts = Vec::with_capacity(holders.len());
    for (address, eligible) in holders {
        let share = total * eligible / eligible_total;
        paid += share;
        payouts.push(Payout {
            address,
            amount: Amount::try_from(share).map_err(|_| InvalidReason::AmountOutOfRange)?,
        });
    }
    let remainder =
        Amount::try_from(total - paid).map_err(|_| InvalidReason::AmountOutOfRange)?;
    Ok(Plan { payouts, remainder })
}

/// Moves funds according to `plan`: debits `amount` from `sender`, pays
/// every share and returns the remainder.
pub fn execute(
    tally: &mut Tally,
    sender: &Address,
    property: PropertyId,
    amount: Amount,
    plan: &Plan,
) -> Result<(), InvalidReason> {
    let available = tally.available(sender, property);
    tally
        .debit(sender, property, amount)
        .map_err(|_| InvalidReason::InsufficientBalance {
            available,
            required: amount,
        })?;
    for payout in &plan.payouts {
        tally
            .credit(&payout.address, property, payout.amount)
            .map_err(|_| InvalidReason::AmountOutOfRange)?;
    }
    tally
        .credit(sender, property, plan.remainder)
        .map_err(|_| InvalidReason::AmountOutOfRange)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Bucket;
    use pretty_assertions::assert_eq;
    use strata_types::COIN;

    const HELD: PropertyId = PropertyId(3);
    const PAID: PropertyId = PropertyId(4);

    fn a(s: &str) -> Address {
        Address::new(s)
    }

    #[test]
    fn test_proportional_split() {
        let mut tally = Tally::new();
        for (who, held) in [("a", 5), ("b", 10), ("c", 15), ("d", 20), ("e", 25), ("f", 25)] {
            tally.credit(&a(who), HELD, held).unwrap();
        }
        tally.credit(&a("issuer"), PAID, 1_000 * COIN).unwrap();

        let plan = plan(&tally, HELD, 1_000 * COIN).unwrap();
        let amounts: Vec<Amount> = plan.payouts.iter().map(|p| p.amount).collect();
        assert_eq!(
            amounts,
            vec![50 * COIN, 100 * COIN, 150 * COIN, 200 * COIN, 250 * COIN, 250 * COIN]
        );
        assert_eq!(plan.remainder, 0);

        execute(&mut tally, &a("issuer"), PAID, 1_000 * COIN, &plan).unwrap();
        assert_eq!(tally.available(&a("issuer"), PAID), 0);
        assert_eq!(tally.available(&a("f"), PAID), 250 * COIN);
        assert_eq!(tally.total(PAID), i128::from(1_000 * COIN));
    }

    #[test]
    fn test_remainder_returns_to_sender() {
        let mut tally = Tally::new();
        for who in ["a", "b", "c"] {
            tally.credit(&a(who), HELD, 1).unwrap();
        }
        let plan = plan(&tally, HELD, 10).unwrap();
        assert_eq!(plan.payouts.iter().map(|p| p.amount).sum::<Amount>(), 9);
        assert_eq!(plan.remainder, 1);
    }

    #[test]
    fn test_zero_shares_recorded() {
        let mut tally = Tally::new();
        tally.credit(&a("whale"), HELD, 1_000).unwrap();
        tally.credit(&a("minnow"), HELD, 1).unwrap();
        let plan = plan(&tally, HELD, 100).unwrap();
        assert_eq!(plan.payouts.len(), 2);
        assert_eq!(plan.payouts[0].address, a("minnow"));
        assert_eq!(plan.payouts[0].amount, 0);
        assert_eq!(plan.payouts[1].amount, 99);
        assert_eq!(plan.remainder, 1);
    }

    #[test]
    fn test_divisor_is_eligible_total_not_supply() {
        let mut tally = Tally::new();
        tally.credit(&a("a"), HELD, 10).unwrap();
        tally.freeze(&a("a"), HELD).unwrap();
        tally.credit(&a("b"), HELD, 30).unwrap();
        tally.credit(&a("c"), HELD, 10).unwrap();
        tally
            .shift(&a("c"), HELD, Bucket::Available, Bucket::Reserved, 5)
            .unwrap();
        assert_eq!(tally.total(HELD), 50);

        // 40 eligible: b holds 3/4, c holds 1/4 with half of it reserved
        let plan = plan(&tally, HELD, 80).unwrap();
        let shares: Vec<(Address, Amount)> = plan
            .payouts
            .iter()
            .map(|p| (p.address.clone(), p.amount))
            .collect();
        assert_eq!(shares, vec![(a("b"), 60), (a("c"), 20)]);
        assert_eq!(plan.remainder, 0);
    }

    #[test]
    fn test_frozen_excluded_and_empty_rejected() {
        let mut tally = Tally::new();
        tally.credit(&a("a"), HELD, 10).unwrap();
        tally.freeze(&a("a"), HELD).unwrap();
        assert_eq!(plan(&tally, HELD, 5), Err(InvalidReason::NoEligibleHolders));
    }
}
