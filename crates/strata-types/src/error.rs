//! Error types for Strata value types.

use thiserror::Error;

/// Errors raised while parsing or converting value types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypesError {
    /// An address string could not be parsed.
    #[error("invalid address '{address}': {reason}")]
    InvalidAddress {
        /// The offending input.
        address: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An address is valid but belongs to another network.
    #[error("address '{address}' is not valid on {network}")]
    WrongNetwork {
        /// The offending input.
        address: String,
        /// The network the caller expected.
        network: &'static str,
    },

    /// An amount string could not be parsed.
    #[error("invalid amount '{input}': {reason}")]
    InvalidAmount {
        /// The offending input.
        input: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A hex-encoded identifier was malformed.
    #[error("invalid hex identifier: {0}")]
    InvalidHex(String),
}

/// A specialized Result type for value type conversions.
pub type Result<T> = std::result::Result<T, TypesError>;

impl TypesError {
    /// Creates a new invalid address error.
    #[must_use]
    pub fn invalid_address(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new invalid amount error.
    #[must_use]
    pub fn invalid_amount(input: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidAmount {
            input: input.into(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_error_display() {
        let err = TypesError::invalid_address("xyz", "bad checksum");
        assert_eq!(err.to_string(), "invalid address 'xyz': bad checksum");

        let err = TypesError::invalid_amount("1.2.3", "malformed number");
        assert_eq!(err.to_string(), "invalid amount '1.2.3': malformed number");
    }
}
