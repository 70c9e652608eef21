//! # Address Safety Validator
//!
//! Checks addresses handed to protocol operations before anything is
//! built or broadcast.
//!
//! With the safe-address policy on:
//!
//! - raw native segwit addresses are refused for protocol-affecting
//!   operations
//! - a single call may not mix derived and raw encodings
//! - queries accept either form and resolve both to the same ledger key
//!
//! With the policy off any valid base-chain address is accepted and the
//! derived form is still understood.
//!
//! ## Usage
//!
//! ```rust
//! use strata_node::validation::AddressValidator;
//! use strata_types::{BaseAddress, Network};
//!
//! let validator = AddressValidator::new(Network::Regtest, true);
//! let derived = BaseAddress::P2wpkh([1; 20]).encode_derived(Network::Regtest).unwrap();
//! assert!(validator.check_operation(&[derived.as_str()]).is_ok());
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use strata_types::{
    is_derived_form, Address, AddressForm, BaseAddress, Network, MAX_TEXT_FIELD_LEN,
};
use validator::ValidationError;

/// Shape of a derived address: known prefix, then bech32 characters.
pub static DERIVED_ADDRESS_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i)(o|otb|ocrt)1[qpzry9x8gf2tvdw0s3jn54khce6mua7l]{8,90}$")
        .expect("Invalid regex")
});

/// Characters an address may consist of at all.
pub static ADDRESS_CHARSET_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9]+$").expect("Invalid regex"));

/// Longest address string accepted (a bech32 string's upper bound).
pub const MAX_ADDRESS_LENGTH: usize = 90;

fn error(code: &'static str, message: impl Into<String>) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into().into());
    err
}

/// An address that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckedAddress {
    /// Decoded destination.
    pub base: BaseAddress,
    /// Encoding the caller used.
    pub form: AddressForm,
    /// Key under which the ledger tracks it.
    pub ledger: Address,
}

/// Validates caller-supplied addresses against the safe-address policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressValidator {
    network: Network,
    safe_addresses: bool,
}

impl AddressValidator {
    /// Creates a validator for `network`.
    #[must_use]
    pub const fn new(network: Network, safe_addresses: bool) -> Self {
        Self {
            network,
            safe_addresses,
        }
    }

    /// Network addresses are checked against.
    #[must_use]
    pub const fn network(&self) -> Network {
        self.network
    }

    /// Whether the safe-address policy is on.
    #[must_use]
    pub const fn safe_addresses(&self) -> bool {
        self.safe_addresses
    }

    /// Parses one address in either encoding.
    pub fn parse(&self, input: &str) -> Result<CheckedAddress, ValidationError> {
        validate_address_shape(input)?;
        if DERIVED_ADDRESS_REGEX.is_match(input) && !is_derived_form(input, self.network) {
            return Err(error(
                "network",
                format!("'{input}' is a derived address of another network"),
            ));
        }
        let (base, form) = BaseAddress::parse_any(input, self.network)
            .map_err(|e| error("format", e.to_string()))?;
        let ledger = base
            .to_address(self.network)
            .map_err(|e| error("format", e.to_string()))?;
        Ok(CheckedAddress { base, form, ledger })
    }

    /// Resolves an address for a read-only query. Both encodings of the
    /// same destination yield the same ledger key.
    pub fn check_query(&self, input: &str) -> Result<Address, ValidationError> {
        self.parse(input).map(|checked| checked.ledger)
    }

    /// Validates every address of one protocol-affecting call.
    pub fn check_operation(&self, inputs: &[&str]) -> Result<Vec<CheckedAddress>, ValidationError> {
        let checked = inputs
            .iter()
            .map(|input| self.parse(input))
            .collect::<Result<Vec<_>, _>>()?;
        if !self.safe_addresses {
            return Ok(checked);
        }

        for (input, address) in inputs.iter().zip(&checked) {
            if address.form == AddressForm::Raw && is_segwit(&address.base) {
                return Err(error(
                    "unsafe",
                    format!(
                        "'{input}' is a raw segwit address; use its derived form {}",
                        self.network.derived_prefix()
                    ),
                ));
            }
        }

        let derived = checked.iter().any(|a| a.form == AddressForm::Derived);
        let raw = checked.iter().any(|a| a.form == AddressForm::Raw);
        if derived && raw {
            return Err(error(
                "mixed",
                "derived and raw addresses may not be mixed in one operation",
            ));
        }
        Ok(checked)
    }

    /// Renders a ledger key for output: derived for segwit destinations
    /// when the policy is on, unchanged otherwise.
    #[must_use]
    pub fn display(&self, ledger: &Address) -> String {
        if !self.safe_addresses {
            return ledger.to_string();
        }
        match BaseAddress::parse(ledger.as_str(), self.network) {
            Ok(base) if is_segwit(&base) => base
                .encode_derived(self.network)
                .unwrap_or_else(|_| ledger.to_string()),
            _ => ledger.to_string(),
        }
    }
}

fn is_segwit(base: &BaseAddress) -> bool {
    matches!(
        base,
        BaseAddress::P2wpkh(_) | BaseAddress::P2wsh(_) | BaseAddress::P2tr(_)
    )
}

/// Cheap shape checks run before any decoding.
pub fn validate_address_shape(input: &str) -> Result<(), ValidationError> {
    if input.is_empty() {
        return Err(error("length", "Address cannot be empty"));
    }

    if input.len() > MAX_ADDRESS_LENGTH {
        return Err(error(
            "length",
            format!("Address must be at most {MAX_ADDRESS_LENGTH} characters"),
        ));
    }

    if !ADDRESS_CHARSET_REGEX.is_match(input) {
        return Err(error("pattern", "Address may only contain letters and digits"));
    }

    Ok(())
}

/// Validates free text that ends up in a payload field.
pub fn validate_text_field(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.len() > MAX_TEXT_FIELD_LEN {
        return Err(error(
            "length",
            format!("{field} must be at most {MAX_TEXT_FIELD_LEN} bytes"),
        ));
    }
    if value.contains('\0') {
        return Err(error("security", format!("{field} cannot contain null bytes")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const NET: Network = Network::Regtest;

    fn wpkh(seed: u8) -> BaseAddress {
        BaseAddress::P2wpkh([seed; 20])
    }

    #[test]
    fn test_validate_address_shape() {
        assert!(validate_address_shape("mipcBbFg9gMiCh81Kj8tqqdgoZub1ZJRfn").is_ok());
        assert!(validate_address_shape("").is_err());
        assert!(validate_address_shape("has space").is_err());
        assert!(validate_address_shape("semi;colon").is_err());
        assert!(validate_address_shape(&"a".repeat(91)).is_err());
    }

    #[test]
    fn test_derived_regex() {
        let derived = wpkh(1).encode_derived(NET).unwrap();
        assert!(DERIVED_ADDRESS_REGEX.is_match(&derived));
        assert!(!DERIVED_ADDRESS_REGEX.is_match(&wpkh(1).encode(NET).unwrap()));
    }

    #[test]
    fn test_query_forms_agree() {
        let validator = AddressValidator::new(NET, true);
        for base in [wpkh(2), BaseAddress::P2pkh([3; 20]), BaseAddress::P2tr([4; 32])] {
            let raw = base.encode(NET).unwrap();
            let derived = base.encode_derived(NET).unwrap();
            assert_eq!(
                validator.check_query(&raw).unwrap(),
                validator.check_query(&derived).unwrap()
            );
        }
    }

    #[test]
    fn test_raw_segwit_refused_when_safe() {
        let raw = wpkh(5).encode(NET).unwrap();
        let err = AddressValidator::new(NET, true)
            .check_operation(&[raw.as_str()])
            .unwrap_err();
        assert_eq!(err.code, "unsafe");
        assert!(AddressValidator::new(NET, false)
            .check_operation(&[raw.as_str()])
            .is_ok());
    }

    #[test]
    fn test_legacy_raw_allowed_when_safe() {
        let a = BaseAddress::P2pkh([6; 20]).encode(NET).unwrap();
        let b = BaseAddress::P2sh([7; 20]).encode(NET).unwrap();
        let checked = AddressValidator::new(NET, true)
            .check_operation(&[a.as_str(), b.as_str()])
            .unwrap();
        assert_eq!(checked.len(), 2);
        assert!(checked.iter().all(|c| c.form == AddressForm::Raw));
    }

    #[test]
    fn test_mixed_forms_refused() {
        let derived = wpkh(8).encode_derived(NET).unwrap();
        let legacy = BaseAddress::P2pkh([9; 20]).encode(NET).unwrap();
        let err = AddressValidator::new(NET, true)
            .check_operation(&[derived.as_str(), legacy.as_str()])
            .unwrap_err();
        assert_eq!(err.code, "mixed");
    }

    #[test]
    fn test_wrong_network_refused() {
        let main = wpkh(1).encode_derived(Network::Main).unwrap();
        let err = AddressValidator::new(NET, false).parse(&main).unwrap_err();
        assert_eq!(err.code, "network");

        let raw_main = BaseAddress::P2pkh([1; 20]).encode(Network::Main).unwrap();
        let err = AddressValidator::new(NET, false).parse(&raw_main).unwrap_err();
        assert_eq!(err.code, "format");
    }

    #[test]
    fn test_display() {
        let base = wpkh(10);
        let ledger = base.to_address(NET).unwrap();
        let safe = AddressValidator::new(NET, true);
        assert_eq!(safe.display(&ledger), base.encode_derived(NET).unwrap());

        let legacy = BaseAddress::P2pkh([11; 20]).to_address(NET).unwrap();
        assert_eq!(safe.display(&legacy), legacy.to_string());
        assert_eq!(
            AddressValidator::new(NET, false).display(&ledger),
            ledger.to_string()
        );
    }

    #[test]
    fn test_validate_text_field() {
        assert!(validate_text_field("name", "Token").is_ok());
        assert!(validate_text_field("name", "a\0b").is_err());
        assert!(validate_text_field("name", &"x".repeat(256)).is_err());
    }
}
