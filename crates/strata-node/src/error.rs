//! Errors returned to callers of the protocol operations.
//!
//! Every variant carries the numeric code a remote caller sees, in the
//! numbering base-chain node interfaces use.

use strata_consensus::EngineError;
use strata_types::TypesError;
use thiserror::Error;
use validator::ValidationError;

/// Invalid or unsafe address.
pub const RPC_INVALID_ADDRESS_OR_KEY: i32 = -5;
/// Invalid, missing or duplicate parameter.
pub const RPC_INVALID_PARAMETER: i32 = -8;
/// Unexpected type or out-of-range amount.
pub const RPC_TYPE_ERROR: i32 = -3;
/// Not enough tokens to cover the request.
pub const RPC_WALLET_INSUFFICIENT_FUNDS: i32 = -6;
/// Any other rejection.
pub const RPC_MISC_ERROR: i32 = -1;
/// Internal failure.
pub const RPC_INTERNAL_ERROR: i32 = -32603;

/// Caller-input errors. Nothing reaches the base chain when one is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// An address failed parsing or the safe-address policy.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// A parameter is out of its accepted domain.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// An amount could not be parsed or is out of range.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// The sender does not hold enough of the property.
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    /// Anything else the caller can act on.
    #[error("{0}")]
    Misc(String),

    /// A failure inside the node.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Numeric code reported to remote callers.
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::InvalidAddress(_) => RPC_INVALID_ADDRESS_OR_KEY,
            Self::InvalidParameter(_) => RPC_INVALID_PARAMETER,
            Self::InvalidAmount(_) => RPC_TYPE_ERROR,
            Self::InsufficientFunds(_) => RPC_WALLET_INSUFFICIENT_FUNDS,
            Self::Misc(_) => RPC_MISC_ERROR,
            Self::Internal(_) => RPC_INTERNAL_ERROR,
        }
    }

    /// Builds an address error from a validation failure.
    pub fn address(err: &ValidationError) -> Self {
        Self::InvalidAddress(
            err.message
                .as_ref()
                .map_or_else(|| err.code.to_string(), ToString::to_string),
        )
    }
}

impl From<TypesError> for ApiError {
    fn from(err: TypesError) -> Self {
        match err {
            TypesError::InvalidAddress { .. } | TypesError::WrongNetwork { .. } => {
                Self::InvalidAddress(err.to_string())
            }
            TypesError::InvalidAmount { .. } => Self::InvalidAmount(err.to_string()),
            TypesError::InvalidHex(_) => Self::InvalidParameter(err.to_string()),
        }
    }
}

impl From<strata_codec::CodecError> for ApiError {
    fn from(err: strata_codec::CodecError) -> Self {
        Self::InvalidParameter(err.to_string())
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self::Internal(err.to_string())
    }
}

/// A specialized Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ApiError>;
