//! Fixed-point token amounts.
//!
//! Divisible properties carry eight implied decimals; indivisible ones
//! count whole units. Ledger amounts are signed 64-bit integers so that a
//! single range check guards every arithmetic path.

use crate::error::{Result, TypesError};

/// A ledger amount in the smallest unit of its property.
pub type Amount = i64;

/// Smallest units per whole unit of a divisible property.
pub const COIN: Amount = 100_000_000;

/// The largest representable amount.
pub const MAX_AMOUNT: Amount = i64::MAX;

const DECIMALS: usize = 8;

/// Formats an amount for display.
///
/// Divisible amounts always show eight decimals.
#[must_use]
pub fn format_amount(value: Amount, divisible: bool) -> String {
    if !divisible {
        return value.to_string();
    }
    let sign = if value < 0 { "-" } else { "" };
    let abs = value.unsigned_abs();
    let coin = COIN.unsigned_abs();
    format!("{sign}{}.{:08}", abs / coin, abs % coin)
}

/// Parses a user-supplied amount string.
///
/// Rejects signs, exponents, more than eight decimals, fractional parts for
/// indivisible properties, and anything above [`MAX_AMOUNT`]. Zero parses
/// successfully; callers decide whether zero is acceptable.
pub fn parse_amount(input: &str, divisible: bool) -> Result<Amount> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(TypesError::invalid_amount(input, "empty"));
    }

    let (whole, frac) = match trimmed.split_once('.') {
        Some((w, f)) => (w, Some(f)),
        None => (trimmed, None),
    };

    if whole.is_empty() && frac.map_or(true, str::is_empty) {
        return Err(TypesError::invalid_amount(input, "malformed number"));
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TypesError::invalid_amount(input, "malformed number"));
    }

    let whole_value: i128 = if whole.is_empty() {
        0
    } else {
        whole
            .parse()
            .map_err(|_| TypesError::invalid_amount(input, "out of range"))?
    };

    let value: i128 = if divisible {
        let frac = frac.unwrap_or("");
        if !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TypesError::invalid_amount(input, "malformed number"));
        }
        if frac.len() > DECIMALS {
            return Err(TypesError::invalid_amount(input, "too many decimal places"));
        }
        let mut padded = frac.to_string();
        while padded.len() < DECIMALS {
            padded.push('0');
        }
        let frac_value: i128 = padded
            .parse()
            .map_err(|_| TypesError::invalid_amount(input, "malformed number"))?;
        whole_value
            .checked_mul(i128::from(COIN))
            .and_then(|v| v.checked_add(frac_value))
            .ok_or_else(|| TypesError::invalid_amount(input, "out of range"))?
    } else {
        match frac {
            Some(f) if !f.bytes().all(|b| b == b'0') => {
                return Err(TypesError::invalid_amount(
                    input,
                    "indivisible amounts cannot have decimals",
                ))
            }
            _ => whole_value,
        }
    };

    Amount::try_from(value).map_err(|_| TypesError::invalid_amount(input, "out of range"))
}
