//! Consensus parameters and engine configuration.
//!
//! [`ConsensusParams`] are network rules: every node on a network must use
//! the same values or their states diverge. [`EngineConfig`] holds local
//! operational choices that never influence the ledger.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strata_types::{Address, BlockHeight, Network};

/// Features that can be switched on by activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum Feature {
    /// Token-for-token order book.
    Dex = 2,
    /// Send-all transfers.
    SendAll = 6,
    /// Distributions paid to holders of a different property.
    CrossPropertyDistribution = 10,
    /// Issuer-controlled freezing.
    Freezing = 14,
    /// Non-fungible token properties and transfers.
    NonFungible = 17,
    /// Send-to-many transfers.
    SendToMany = 18,
}

impl Feature {
    /// Every feature this software implements.
    pub const ALL: [Feature; 6] = [
        Feature::Dex,
        Feature::SendAll,
        Feature::CrossPropertyDistribution,
        Feature::Freezing,
        Feature::NonFungible,
        Feature::SendToMany,
    ];

    /// Looks up a feature by identifier.
    #[must_use]
    pub fn from_id(id: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.id() == id)
    }

    /// Wire identifier.
    #[must_use]
    pub const fn id(self) -> u16 {
        self as u16
    }

    /// Human-readable name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Dex => "Distributed Token Exchange",
            Self::SendAll => "Send All",
            Self::CrossPropertyDistribution => "Cross-property Send To Owners",
            Self::Freezing => "Token Freezing",
            Self::NonFungible => "Non-Fungible Tokens",
            Self::SendToMany => "Send To Many",
        }
    }
}

/// Encodes `major.minor.patch` as a single comparable number.
#[must_use]
pub const fn client_version(major: u32, minor: u32, patch: u32) -> u32 {
    major * 1_000_000 + minor * 1_000 + patch
}

/// Version this build reports to the compatibility gate.
pub const CLIENT_VERSION: u32 = client_version(0, 1, 0);

/// Per-network protocol rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusParams {
    /// Network these rules apply to.
    pub network: Network,
    /// First base-chain block the engine processes.
    pub start_height: BlockHeight,
    /// Issuer of the native tokens.
    pub exodus: Address,
    /// Minimum distance between an activation message and its height.
    pub min_activation_notice: BlockHeight,
    /// Maximum distance between an activation message and its height.
    pub max_activation_notice: BlockHeight,
    /// Blocks between enabling freezing and it taking effect.
    pub freeze_wait_blocks: BlockHeight,
    /// Blocks without a match after which an order expires; zero disables.
    pub order_expiry_blocks: BlockHeight,
    /// Blocks between consensus fingerprints; zero disables.
    pub fingerprint_interval: BlockHeight,
    /// Features live without an activation message, by height.
    #[serde(default)]
    pub initial_features: BTreeMap<u16, BlockHeight>,
    /// Trusted fingerprints by height.
    #[serde(default)]
    pub checkpoints: BTreeMap<BlockHeight, String>,
}

impl ConsensusParams {
    /// Returns the rules for `network`.
    #[must_use]
    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Main => Self::main(),
            Network::Test => Self::test(),
            Network::Regtest => Self::regtest(),
        }
    }

    /// Main network rules.
    #[must_use]
    pub fn main() -> Self {
        Self {
            network: Network::Main,
            start_height: 252_317,
            exodus: Address::new("1EXoDusjGwvnjZUyKkxZ4UHEf77z6A5S4P"),
            min_activation_notice: 2_048,
            max_activation_notice: 12_288,
            freeze_wait_blocks: 4_096,
            order_expiry_blocks: 4_320,
            fingerprint_interval: 10_000,
            initial_features: [(Feature::Dex.id(), 400_000), (Feature::SendAll.id(), 395_000)]
                .into_iter()
                .collect(),
            checkpoints: BTreeMap::new(),
        }
    }

    /// Test network rules.
    #[must_use]
    pub fn test() -> Self {
        Self {
            network: Network::Test,
            start_height: 263_000,
            exodus: Address::new("mpexoDuSkGGqvqrkrjiFng38QPkJQVFyqv"),
            min_activation_notice: 5,
            max_activation_notice: 12_288,
            freeze_wait_blocks: 10,
            order_expiry_blocks: 4_320,
            fingerprint_interval: 10_000,
            initial_features: [(Feature::Dex.id(), 263_000), (Feature::SendAll.id(), 263_000)]
                .into_iter()
                .collect(),
            checkpoints: BTreeMap::new(),
        }
    }

    /// Regression-test network rules: everything live except
    /// cross-property distributions.
    #[must_use]
    pub fn regtest() -> Self {
        Self {
            network: Network::Regtest,
            start_height: 101,
            exodus: Address::new("mpexoDuSkGGqvqrkrjiFng38QPkJQVFyqv"),
            min_activation_notice: 5,
            max_activation_notice: 10,
            freeze_wait_blocks: 10,
            order_expiry_blocks: 100,
            fingerprint_interval: 10,
            initial_features: Feature::ALL
                .into_iter()
                .filter(|f| *f != Feature::CrossPropertyDistribution)
                .map(|f| (f.id(), 0))
                .collect(),
            checkpoints: BTreeMap::new(),
        }
    }

    /// Adds a trusted checkpoint.
    #[must_use]
    pub fn with_checkpoint(mut self, height: BlockHeight, digest: impl Into<String>) -> Self {
        self.checkpoints.insert(height, digest.into());
        self
    }
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self::main()
    }
}

/// Local engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Version reported to the compatibility gate.
    pub client_version: u32,
    /// Blocks between periodic snapshots.
    pub snapshot_interval: BlockHeight,
    /// Number of snapshots kept.
    pub snapshot_retention: usize,
    /// Number of recent block hashes remembered for reorg detection.
    pub max_reorg_depth: BlockHeight,
    /// Compare fingerprints against trusted checkpoints.
    pub verify_checkpoints: bool,
    /// Capacity of the event channel.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            client_version: CLIENT_VERSION,
            snapshot_interval: 100,
            snapshot_retention: 50,
            max_reorg_depth: 1_000,
            verify_checkpoints: true,
            event_capacity: 1_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_ids() {
        for feature in Feature::ALL {
            assert_eq!(Feature::from_id(feature.id()), Some(feature));
        }
        assert_eq!(Feature::from_id(10), Some(Feature::CrossPropertyDistribution));
        assert_eq!(Feature::from_id(999), None);
    }

    #[test]
    fn test_client_version_encoding() {
        assert_eq!(client_version(0, 1, 0), 1_000);
        assert_eq!(client_version(1, 2, 3), 1_002_003);
        assert!(client_version(0, 0, 999) < CLIENT_VERSION);
    }

    #[test]
    fn test_regtest_features() {
        let params = ConsensusParams::regtest();
        assert_eq!(params.min_activation_notice, 5);
        assert_eq!(params.max_activation_notice, 10);
        assert!(params.initial_features.contains_key(&Feature::Dex.id()));
        assert!(!params
            .initial_features
            .contains_key(&Feature::CrossPropertyDistribution.id()));
    }

    #[test]
    fn test_params_yaml_roundtrip() {
        let params = ConsensusParams::regtest().with_checkpoint(110, "ab");
        let yaml = serde_yaml::to_string(&params).unwrap();
        let back: ConsensusParams = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, params);
    }
}
