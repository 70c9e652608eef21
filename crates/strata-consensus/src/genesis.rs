//! Genesis allocations.
//!
//! A genesis file seeds balances of the native tokens before the first
//! block is processed. It is mostly useful for private test networks where
//! no historical issuance exists.

use crate::error::{EngineError, Result};
use crate::params::ConsensusParams;
use crate::state::EngineState;
use serde::{Deserialize, Serialize};
use std::path::Path;
use strata_types::{Address, Amount, BaseAddress, Network, PropertyId};

/// One seeded balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAllocation {
    /// Receiving address, raw base-chain form.
    pub address: String,

    /// Native token id (1 or 2).
    pub property: u32,

    /// Amount in smallest units.
    pub amount: Amount,
}

/// Complete genesis configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genesis {
    /// Network the allocations are meant for.
    pub network: Network,

    /// Seeded balances.
    #[serde(default)]
    pub allocations: Vec<GenesisAllocation>,
}

impl Genesis {
    /// Creates an empty genesis for `network`.
    pub fn new(network: Network) -> Self {
        Self {
            network,
            allocations: Vec::new(),
        }
    }

    /// Adds an allocation.
    pub fn with_allocation(mut self, address: impl Into<String>, property: u32, amount: Amount) -> Self {
        self.allocations.push(GenesisAllocation {
            address: address.into(),
            property,
            amount,
        });
        self
    }

    /// Loads genesis from a JSON file.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| EngineError::InvalidGenesis(format!("failed to read file: {}", e)))?;

        let genesis: Genesis = serde_json::from_str(&content)
            .map_err(|e| EngineError::InvalidGenesis(e.to_string()))?;
        genesis.validate()?;
        Ok(genesis)
    }

    /// Loads genesis from a YAML file.
    pub fn load_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| EngineError::InvalidGenesis(format!("failed to read file: {}", e)))?;

        let genesis: Genesis = serde_yaml::from_str(&content)
            .map_err(|e| EngineError::InvalidGenesis(e.to_string()))?;
        genesis.validate()?;
        Ok(genesis)
    }

    /// Validates the allocations.
    pub fn validate(&self) -> Result<()> {
        let mut totals = [0i64; 2];
        for alloc in &self.allocations {
            BaseAddress::parse(&alloc.address, self.network).map_err(|e| {
                EngineError::InvalidGenesis(format!("allocation to {}: {}", alloc.address, e))
            })?;

            let slot = match PropertyId(alloc.property) {
                PropertyId::MAIN_NATIVE => 0,
                PropertyId::TEST_NATIVE => 1,
                other => {
                    return Err(EngineError::InvalidGenesis(format!(
                        "property {} is not a native token",
                        other
                    )))
                }
            };

            if alloc.amount <= 0 {
                return Err(EngineError::InvalidGenesis(format!(
                    "allocation to {} must be positive, got {}",
                    alloc.address, alloc.amount
                )));
            }

            totals[slot] = totals[slot].checked_add(alloc.amount).ok_or_else(|| {
                EngineError::InvalidGenesis(format!(
                    "allocations of property {} exceed the maximum supply",
                    alloc.property
                ))
            })?;
        }
        Ok(())
    }

    /// Builds the initial engine state.
    pub fn initial_state(&self, params: &ConsensusParams) -> Result<EngineState> {
        if self.network != params.network {
            return Err(EngineError::InvalidGenesis(format!(
                "genesis is for {}, engine runs {}",
                self.network.name(),
                params.network.name()
            )));
        }
        self.validate()?;

        let mut state = EngineState::genesis(params);
        for alloc in &self.allocations {
            state
                .mint(
                    PropertyId(alloc.property),
                    &Address::new(alloc.address.clone()),
                    alloc.amount,
                )
                .map_err(|e| EngineError::InvalidGenesis(e.to_string()))?;
        }
        Ok(state)
    }
}
