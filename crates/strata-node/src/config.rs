//! Node configuration types.
//!
//! Settings are layered: built-in defaults, then an optional file (YAML,
//! TOML or JSON, picked by extension), then `STRATA_`-prefixed environment
//! variables. Command line flags are applied on top by the binary.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strata_codec::DEFAULT_MAX_NULL_DATA;
use strata_consensus::{AllowAny, AllowList, ConsensusParams, EngineConfig, SenderAuthorization};
use strata_types::{BaseAddress, BlockHeight, Network};
use validator::{Validate, ValidationError};

/// Where snapshots are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// In-memory only; lost on exit.
    Memory,
    /// One file per snapshot under `data_dir/snapshots`.
    #[default]
    File,
    /// RocksDB under `data_dir/snapshots.db`.
    Rocksdb,
}

/// Who may send activation and alert messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizationMode {
    /// Only the listed addresses.
    #[default]
    Restricted,
    /// Anyone. Test networks only.
    Any,
}

/// Sender authorization for governance messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct AuthorizationConfig {
    /// Policy.
    pub mode: AuthorizationMode,
    /// Addresses allowed to schedule activations.
    pub activators: Vec<String>,
    /// Addresses allowed to publish alerts.
    pub alerters: Vec<String>,
}

impl AuthorizationConfig {
    /// Builds the engine's authorization capability.
    pub fn build(&self, network: Network) -> Result<Arc<dyn SenderAuthorization>, String> {
        match self.mode {
            AuthorizationMode::Any => {
                tracing::warn!("any sender may activate features and publish alerts");
                Ok(Arc::new(AllowAny))
            }
            AuthorizationMode::Restricted => {
                let parse = |list: &[String]| {
                    list.iter()
                        .map(|s| {
                            BaseAddress::parse(s, network)
                                .and_then(|a| a.to_address(network))
                                .map_err(|e| e.to_string())
                        })
                        .collect::<Result<Vec<_>, _>>()
                };
                Ok(Arc::new(AllowList::new(
                    parse(&self.activators)?,
                    parse(&self.alerters)?,
                )))
            }
        }
    }
}

/// Configuration for the Strata node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct NodeConfig {
    /// Base chain followed.
    pub network: Network,
    /// Data directory.
    pub data_dir: PathBuf,
    /// Log level.
    #[validate(custom(function = "validate_log_level"))]
    pub log_level: String,
    /// Log format, `pretty` or `json`.
    #[validate(custom(function = "validate_log_format"))]
    pub log_format: String,

    /// Snapshot backend.
    pub storage: StorageBackend,
    /// Blocks between snapshots.
    #[validate(range(min = 1))]
    pub snapshot_interval: BlockHeight,
    /// Snapshots kept.
    #[validate(range(min = 1))]
    pub snapshot_retention: usize,
    /// Block hashes remembered for reorg detection.
    #[validate(range(min = 1))]
    pub max_reorg_depth: BlockHeight,
    /// Blocks between fingerprints; the network default when unset.
    pub fingerprint_interval: Option<BlockHeight>,
    /// Trusted fingerprints, hex encoded, keyed by decimal height.
    #[validate(custom(function = "validate_checkpoints"))]
    pub trusted_checkpoints: BTreeMap<String, String>,
    /// Order expiry; the network default when unset.
    pub order_expiry_blocks: Option<BlockHeight>,

    /// Governance sender policy.
    #[validate(nested)]
    pub authorization: AuthorizationConfig,
    /// Safe-address policy for protocol operations.
    pub safe_addresses: bool,
    /// Largest null-data output the base chain relays, marker included.
    #[validate(range(min = 8))]
    pub max_null_data: usize,

    /// Reported client version; only meant for tests.
    pub client_version: Option<u32>,
    /// Genesis allocation file.
    pub genesis: Option<PathBuf>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            network: Network::Main,
            data_dir: PathBuf::from("./data"),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            storage: StorageBackend::File,
            snapshot_interval: engine.snapshot_interval,
            snapshot_retention: engine.snapshot_retention,
            max_reorg_depth: engine.max_reorg_depth,
            fingerprint_interval: None,
            trusted_checkpoints: BTreeMap::new(),
            order_expiry_blocks: None,
            authorization: AuthorizationConfig::default(),
            safe_addresses: true,
            max_null_data: DEFAULT_MAX_NULL_DATA,
            client_version: None,
            genesis: None,
        }
    }
}

/// Failure to assemble a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A source could not be read or deserialized.
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),
    /// A value broke a validation rule.
    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

impl NodeConfig {
    /// Loads defaults, then `file` if given, then the environment.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(::config::File::from(path).required(false));
        }
        let settings = builder
            .add_source(
                ::config::Environment::with_prefix("STRATA")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Protocol rules for the configured network, with local overrides.
    #[must_use]
    pub fn consensus_params(&self) -> ConsensusParams {
        let mut params = ConsensusParams::for_network(self.network);
        if let Some(interval) = self.fingerprint_interval {
            params.fingerprint_interval = interval;
        }
        if let Some(expiry) = self.order_expiry_blocks {
            params.order_expiry_blocks = expiry;
        }
        for (height, digest) in &self.trusted_checkpoints {
            if let Ok(height) = height.parse::<BlockHeight>() {
                params = params.with_checkpoint(height, digest.to_ascii_lowercase());
            }
        }
        params
    }

    /// Engine settings.
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        let defaults = EngineConfig::default();
        EngineConfig {
            client_version: self.client_version.unwrap_or(defaults.client_version),
            snapshot_interval: self.snapshot_interval,
            snapshot_retention: self.snapshot_retention,
            max_reorg_depth: self.max_reorg_depth,
            ..defaults
        }
    }
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    match level.to_ascii_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => {
            let mut err = ValidationError::new("log_level");
            err.message = Some("expected trace, debug, info, warn or error".into());
            Err(err)
        }
    }
}

fn validate_log_format(format: &str) -> Result<(), ValidationError> {
    match format.to_ascii_lowercase().as_str() {
        "pretty" | "json" => Ok(()),
        _ => {
            let mut err = ValidationError::new("log_format");
            err.message = Some("expected pretty or json".into());
            Err(err)
        }
    }
}

fn validate_checkpoints(checkpoints: &BTreeMap<String, String>) -> Result<(), ValidationError> {
    for (height, digest) in checkpoints {
        let valid = height.parse::<BlockHeight>().is_ok()
            && digest.len() == 64
            && hex::decode(digest).is_ok();
        if !valid {
            let mut err = ValidationError::new("checkpoint");
            err.message =
                Some(format!("checkpoint '{height}' needs a height and a 32-byte hex digest").into());
            return Err(err);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        let config = NodeConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.safe_addresses);
        assert_eq!(config.authorization.mode, AuthorizationMode::Restricted);
        assert_eq!(config.engine_config(), EngineConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let config = NodeConfig {
            log_level: "loud".into(),
            ..NodeConfig::default()
        };
        assert!(config.validate().is_err());

        let config = NodeConfig {
            snapshot_interval: 0,
            ..NodeConfig::default()
        };
        assert!(config.validate().is_err());

        let config = NodeConfig {
            trusted_checkpoints: [("1000".to_string(), "abc".to_string())].into_iter().collect(),
            ..NodeConfig::default()
        };
        assert!(config.validate().is_err());

        let config = NodeConfig {
            trusted_checkpoints: [("tip".to_string(), "ab".repeat(32))].into_iter().collect(),
            ..NodeConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "network: regtest\nsnapshot_interval: 10\nsafe_addresses: false\nauthorization:\n  mode: any\ntrusted_checkpoints:\n  200: \"{}\"",
            "ab".repeat(32)
        )
        .unwrap();

        let config = NodeConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.network, Network::Regtest);
        assert_eq!(config.snapshot_interval, 10);
        assert!(!config.safe_addresses);
        assert_eq!(config.authorization.mode, AuthorizationMode::Any);
        // untouched keys keep their defaults
        assert_eq!(config.snapshot_retention, NodeConfig::default().snapshot_retention);

        let params = config.consensus_params();
        assert_eq!(params.network, Network::Regtest);
        assert_eq!(params.checkpoints.get(&200), Some(&"ab".repeat(32)));
    }

    #[test]
    fn test_overrides_applied() {
        let config = NodeConfig {
            network: Network::Test,
            fingerprint_interval: Some(7),
            order_expiry_blocks: Some(0),
            client_version: Some(1),
            ..NodeConfig::default()
        };
        let params = config.consensus_params();
        assert_eq!(params.fingerprint_interval, 7);
        assert_eq!(params.order_expiry_blocks, 0);
        assert_eq!(config.engine_config().client_version, 1);
    }

    #[test]
    fn test_restricted_authorization() {
        let network = Network::Regtest;
        let governor = BaseAddress::P2pkh([1; 20]).encode(network).unwrap();
        let auth = AuthorizationConfig {
            mode: AuthorizationMode::Restricted,
            activators: vec![governor.clone()],
            alerters: vec![],
        }
        .build(network)
        .unwrap();
        let governor = strata_types::Address::new(governor);
        assert!(auth.may_activate(&governor));
        assert!(!auth.may_alert(&governor));

        let bad = AuthorizationConfig {
            mode: AuthorizationMode::Restricted,
            activators: vec!["nonsense".into()],
            alerters: vec![],
        };
        assert!(bad.build(network).is_err());
    }
}
