//! Crowdsale token issuance.
//!
//! A payment of the desired property to the issuer of an active crowdsale
//! buys newly created tokens. Every full week left before the deadline adds
//! the early-bird percentage on top; the issuer receives a further
//! percentage of what the participant got.

use strata_types::{Amount, COIN};

use crate::state::Crowdsale;

const SECONDS_PER_WEEK: u64 = 604_800;

/// Tokens created by one contribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Issuance {
    /// Tokens for the participant.
    pub tokens: Amount,
    /// Tokens for the issuer.
    pub issuer_tokens: Amount,
    /// The maximum supply was reached; the crowdsale must close.
    pub exhausted: bool,
}

/// Computes the issuance for `contributed` units of the desired property
/// received at block time `time`. `headroom` caps the total created.
#[must_use]
pub fn issuance(
    crowdsale: &Crowdsale,
    contributed: Amount,
    desired_divisible: bool,
    time: u64,
    headroom: Amount,
) -> Issuance {
    let weeks = crowdsale.deadline.saturating_sub(time) / SECONDS_PER_WEEK;
    let bonus = u128::from(weeks) * u128::from(crowdsale.early_bird);
    let unit: u128 = if desired_divisible { COIN.unsigned_abs().into() } else { 1 };

    let contributed = u128::try_from(contributed).unwrap_or(0);
    let tokens = contributed
        .checked_mul(u128::from(crowdsale.tokens_per_unit))
        .and_then(|v| v.checked_mul(100 + bonus))
        .map_or(u128::MAX, |v| v / (100 * unit));
    let issuer_tokens = tokens
        .checked_mul(u128::from(crowdsale.issuer_percentage))
        .map_or(u128::MAX, |v| v / 100);

    let room = u128::try_from(headroom).unwrap_or(0);
    let exhausted = tokens.saturating_add(issuer_tokens) > room;
    let tokens = tokens.min(room);
    let issuer_tokens = issuer_tokens.min(room - tokens);

    Issuance {
        tokens: Amount::try_from(tokens).unwrap_or(Amount::MAX),
        issuer_tokens: Amount::try_from(issuer_tokens).unwrap_or(Amount::MAX),
        exhausted,
    }
}
