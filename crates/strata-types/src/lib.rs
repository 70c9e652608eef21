//! Common types used throughout `strata`.
//!
//! This crate provides the value types shared by the wire codec, the
//! protocol state machine and the node: property and ecosystem
//! identifiers, fixed-point amounts, base-chain hashes, and addresses in
//! both their raw base-chain and derived encodings.

mod address;
mod amount;
mod error;
mod id;
pub mod seq_map;

pub use address::{is_derived_form, Address, AddressForm, BaseAddress, Network};
pub use amount::{format_amount, parse_amount, Amount, COIN, MAX_AMOUNT};
pub use error::{Result, TypesError};
pub use id::{BlockHash, Ecosystem, PropertyId, Txid};

/// A base-chain block height.
pub type BlockHeight = u32;

/// Maximum length in bytes of a text field carried in a payload.
pub const MAX_TEXT_FIELD_LEN: usize = 255;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_exports() {
        let _ = PropertyId::MAIN_NATIVE;
        let _ = Ecosystem::Main;
        let _ = Network::Regtest;
        let _ = Address::new("x");
        assert_eq!(COIN, 100_000_000);
    }
}
