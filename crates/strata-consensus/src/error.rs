//! Engine error types.
//!
//! Four classes of failure exist. Decode failures never leave the codec.
//! Rejected messages are recorded as [`InvalidReason`] and are not errors
//! of the engine at all. Caller mistakes surface as [`EngineError`]. A
//! [`FatalError`] halts ingestion for good.

use strata_types::{BlockHash, BlockHeight, PropertyId};
use thiserror::Error;

/// Conditions after which the engine refuses to process further blocks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FatalError {
    /// A computed fingerprint disagrees with a trusted checkpoint.
    #[error("consensus mismatch at height {height}: expected {expected}, computed {computed}")]
    ConsensusMismatch {
        /// Checkpoint height.
        height: BlockHeight,
        /// Trusted digest.
        expected: String,
        /// Locally computed digest.
        computed: String,
    },

    /// A snapshot needed for recovery failed verification.
    #[error("snapshot at height {height} is corrupt: {reason}")]
    SnapshotCorrupt {
        /// Snapshot height.
        height: BlockHeight,
        /// What failed.
        reason: String,
    },

    /// Snapshot storage could not be read during recovery.
    #[error("snapshot storage unavailable: {0}")]
    SnapshotUnavailable(String),

    /// A live rule requires a newer client.
    #[error("client version {running} is outdated, {required} required by {source_desc}")]
    ClientOutdated {
        /// Version this software reports.
        running: u32,
        /// Minimum version demanded.
        required: u32,
        /// What demanded it.
        source_desc: String,
    },

    /// Ledger bookkeeping broke an internal invariant.
    #[error("invariant violated at height {height}: {detail}")]
    InvariantViolated {
        /// Block being processed.
        height: BlockHeight,
        /// What broke.
        detail: String,
    },

    /// A feature this software does not implement went live.
    #[error("unsupported feature {feature} is live since height {height}")]
    UnsupportedFeatureLive {
        /// Feature identifier.
        feature: u16,
        /// Activation height.
        height: BlockHeight,
    },
}

impl FatalError {
    /// Process exit code used when the node stops on this condition.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        2
    }
}

/// Errors returned by engine operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Processing hit a fatal condition.
    #[error("fatal: {0}")]
    Fatal(#[from] FatalError),

    /// The engine halted earlier and accepts no more blocks.
    #[error("engine halted: {0}")]
    Halted(FatalError),

    /// The block does not extend the last processed block.
    #[error("block {hash} at height {height} does not extend {expected_parent} at {expected_height}")]
    NotChild {
        /// Offered block height.
        height: BlockHeight,
        /// Offered block hash.
        hash: BlockHash,
        /// Height the engine expected.
        expected_height: BlockHeight,
        /// Parent the engine expected.
        expected_parent: BlockHash,
    },

    /// The block source returned nothing where a block must exist.
    #[error("block source has no block at height {0}")]
    MissingBlock(BlockHeight),

    /// Invalid genesis configuration.
    #[error("invalid genesis: {0}")]
    InvalidGenesis(String),

    /// Snapshot storage failed outside of recovery.
    #[error("storage error: {0}")]
    Storage(String),

    /// State could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl EngineError {
    /// Returns the fatal condition behind this error, if any.
    #[must_use]
    pub fn fatal(&self) -> Option<&FatalError> {
        match self {
            Self::Fatal(f) | Self::Halted(f) => Some(f),
            _ => None,
        }
    }
}

impl From<strata_storage::StorageError> for EngineError {
    fn from(err: strata_storage::StorageError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// A specialized Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

// Reason code families.
const PKT: i32 = -9000;
const SEND: i32 = -60000;
const STO: i32 = -50000;
const ISSUE: i32 = -40000;
const CROWD: i32 = -45000;
const TOKENS: i32 = -82000;
const DEX: i32 = -80000;
const NFT: i32 = -85000;
const GOVERN: i32 = -87000;

/// Why a well-formed message was rejected.
///
/// A rejected message changes nothing but its transaction record.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum InvalidReason {
    /// The message needs a feature that is not live.
    #[error("feature {feature} is not live")]
    FeatureNotLive {
        /// Feature identifier.
        feature: u16,
    },
    /// Amount is zero.
    #[error("amount must be positive")]
    ZeroAmount,
    /// Amount exceeds the representable range.
    #[error("amount out of range")]
    AmountOutOfRange,
    /// No such property.
    #[error("property {0} does not exist")]
    PropertyNotFound(PropertyId),
    /// Operation not allowed on a non-fungible property.
    #[error("property {0} is non-fungible")]
    NonFungibleProperty(PropertyId),
    /// Operation requires a non-fungible property.
    #[error("property {0} is fungible")]
    FungibleProperty(PropertyId),
    /// No receiver could be resolved.
    #[error("transaction has no reference receiver")]
    MissingReference,
    /// Unknown ecosystem byte.
    #[error("invalid ecosystem {0}")]
    InvalidEcosystem(u8),
    /// Properties belong to different ecosystems.
    #[error("properties are in different ecosystems")]
    CrossEcosystem,
    /// The sender is frozen for the property.
    #[error("sender is frozen for property {0}")]
    SenderFrozen(PropertyId),
    /// Available balance too small.
    #[error("insufficient balance: available {available}, required {required}")]
    InsufficientBalance {
        /// Sender's available balance.
        available: i64,
        /// Amount needed.
        required: i64,
    },
    /// Nothing to transfer.
    #[error("no available balance to send")]
    NothingToSend,
    /// Send-to-many without receivers.
    #[error("no receivers")]
    NoReceivers,
    /// A send-to-many index names no payment output.
    #[error("output {0} is not a payment output")]
    InvalidOutputIndex(u8),
    /// Distribution without eligible holders.
    #[error("no eligible holders")]
    NoEligibleHolders,
    /// A trade offers and requests the same property.
    #[error("cannot trade a property for itself")]
    SamePropertyTrade,
    /// A cancel matched nothing.
    #[error("no matching orders to cancel")]
    NoOrdersToCancel,
    /// Unsupported property kind.
    #[error("invalid property kind {0}")]
    InvalidPropertyKind(u16),
    /// Issuance references a previous property.
    #[error("previous property {0} is not supported")]
    InvalidPreviousProperty(u32),
    /// Issuance without a name.
    #[error("property name is empty")]
    EmptyName,
    /// The identifier space of the ecosystem is used up.
    #[error("no property identifiers left")]
    IdSpaceExhausted,
    /// Issuance would exceed the maximum supply.
    #[error("supply would exceed the maximum")]
    SupplyOverflow,
    /// The sender is not the issuer.
    #[error("sender is not the issuer of property {0}")]
    NotIssuer(PropertyId),
    /// Operation requires a managed property.
    #[error("property {0} is not managed")]
    NotManaged(PropertyId),
    /// The sender already runs an active crowdsale.
    #[error("sender already has an active crowdsale")]
    CrowdsaleAlreadyActive,
    /// Operation not allowed while a crowdsale is active.
    #[error("property {0} has an active crowdsale")]
    CrowdsaleInProgress(PropertyId),
    /// No active crowdsale for the property.
    #[error("property {0} has no active crowdsale")]
    NoActiveCrowdsale(PropertyId),
    /// Crowdsale deadline is not in the future.
    #[error("crowdsale deadline has passed")]
    DeadlinePassed,
    /// Crowdsale would issue nothing.
    #[error("crowdsale issues zero tokens per unit")]
    ZeroTokensPerUnit,
    /// Freezing already enabled.
    #[error("freezing already enabled for property {0}")]
    FreezingAlreadyEnabled(PropertyId),
    /// Freezing not enabled or not yet effective.
    #[error("freezing not enabled for property {0}")]
    FreezingNotEnabled(PropertyId),
    /// Target already frozen.
    #[error("address already frozen for property {0}")]
    AlreadyFrozen(PropertyId),
    /// Target not frozen.
    #[error("address not frozen for property {0}")]
    NotFrozen(PropertyId),
    /// Malformed token range.
    #[error("invalid token range {first}-{last}")]
    InvalidTokenRange {
        /// First token.
        first: u64,
        /// Last token.
        last: u64,
    },
    /// The sender does not own the whole range.
    #[error("sender does not own tokens {first}-{last}")]
    TokenRangeNotOwned {
        /// First token.
        first: u64,
        /// Last token.
        last: u64,
    },
    /// Sender not authorized for governance messages.
    #[error("sender is not authorized")]
    Unauthorized,
    /// Activation height outside the notice window.
    #[error("activation height {height} outside window {min}-{max}")]
    ActivationOutOfWindow {
        /// Requested height.
        height: BlockHeight,
        /// Earliest allowed height.
        min: BlockHeight,
        /// Latest allowed height.
        max: BlockHeight,
    },
    /// Feature already pending or live.
    #[error("feature {0} is already scheduled")]
    FeatureAlreadyScheduled(u16),
    /// Unknown alert type.
    #[error("invalid alert type {0}")]
    InvalidAlertType(u16),
}

impl InvalidReason {
    /// Stable negative code reported by queries.
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::FeatureNotLive { .. } => PKT - 22,
            Self::ZeroAmount => PKT - 23,
            Self::AmountOutOfRange => PKT - 24,
            Self::PropertyNotFound(_) => PKT - 25,
            Self::MissingReference => PKT - 26,
            Self::InvalidEcosystem(_) => PKT - 27,
            Self::CrossEcosystem => PKT - 28,
            Self::SenderFrozen(_) => PKT - 29,
            Self::Unauthorized => PKT - 51,
            Self::InsufficientBalance { .. } => SEND - 5,
            Self::NothingToSend => SEND - 6,
            Self::NoReceivers => SEND - 7,
            Self::InvalidOutputIndex(_) => SEND - 8,
            Self::NoEligibleHolders => STO - 1,
            Self::SamePropertyTrade => DEX - 1,
            Self::NoOrdersToCancel => DEX - 2,
            Self::InvalidPropertyKind(_) => ISSUE - 1,
            Self::InvalidPreviousProperty(_) => ISSUE - 2,
            Self::EmptyName => ISSUE - 3,
            Self::IdSpaceExhausted => ISSUE - 4,
            Self::SupplyOverflow => ISSUE - 5,
            Self::CrowdsaleAlreadyActive => CROWD - 1,
            Self::CrowdsaleInProgress(_) => CROWD - 2,
            Self::NoActiveCrowdsale(_) => CROWD - 3,
            Self::DeadlinePassed => CROWD - 4,
            Self::ZeroTokensPerUnit => CROWD - 5,
            Self::NotIssuer(_) => TOKENS - 1,
            Self::NotManaged(_) => TOKENS - 2,
            Self::FreezingAlreadyEnabled(_) => TOKENS - 3,
            Self::FreezingNotEnabled(_) => TOKENS - 4,
            Self::AlreadyFrozen(_) => TOKENS - 5,
            Self::NotFrozen(_) => TOKENS - 6,
            Self::NonFungibleProperty(_) => NFT - 1,
            Self::FungibleProperty(_) => NFT - 2,
            Self::InvalidTokenRange { .. } => NFT - 3,
            Self::TokenRangeNotOwned { .. } => NFT - 4,
            Self::ActivationOutOfWindow { .. } => GOVERN - 1,
            Self::FeatureAlreadyScheduled(_) => GOVERN - 2,
            Self::InvalidAlertType(_) => GOVERN - 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_codes_are_negative_and_distinct() {
        let reasons = [
            InvalidReason::FeatureNotLive { feature: 1 },
            InvalidReason::ZeroAmount,
            InvalidReason::InsufficientBalance {
                available: 0,
                required: 1,
            },
            InvalidReason::NoEligibleHolders,
            InvalidReason::SamePropertyTrade,
            InvalidReason::NotIssuer(PropertyId(3)),
            InvalidReason::Unauthorized,
            InvalidReason::NonFungibleProperty(PropertyId(3)),
        ];
        let codes: HashSet<i32> = reasons.iter().map(InvalidReason::code).collect();
        assert_eq!(codes.len(), reasons.len());
        assert!(codes.iter().all(|c| *c < 0));
    }

    #[test]
    fn test_fatal_wrapping() {
        let fatal = FatalError::UnsupportedFeatureLive {
            feature: 99,
            height: 10,
        };
        let err: EngineError = fatal.clone().into();
        assert_eq!(err.fatal(), Some(&fatal));
        assert_eq!(fatal.exit_code(), 2);
        assert!(EngineError::MissingBlock(3).fatal().is_none());
    }
}
