//! Feature activation and governance authorization.
//!
//! A feature becomes live either from the network's initial schedule or
//! through an activation message sent by an authorized address. Scheduled
//! activations may name features this software does not implement; they
//! are accepted and trip the compatibility gate once live.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use strata_types::{Address, BlockHeight, Txid};

use crate::error::InvalidReason;
use crate::params::{ConsensusParams, Feature};

/// Decides which senders may issue governance messages.
pub trait SenderAuthorization: Send + Sync + fmt::Debug {
    /// May `sender` schedule feature activations?
    fn may_activate(&self, sender: &Address) -> bool;

    /// May `sender` broadcast alerts?
    fn may_alert(&self, sender: &Address) -> bool;

    /// One-line description for logs.
    fn describe(&self) -> String;
}

/// Only explicitly listed addresses are authorized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    activators: BTreeSet<Address>,
    alerters: BTreeSet<Address>,
}

impl AllowList {
    /// Creates a list from the two address sets.
    pub fn new(
        activators: impl IntoIterator<Item = Address>,
        alerters: impl IntoIterator<Item = Address>,
    ) -> Self {
        Self {
            activators: activators.into_iter().collect(),
            alerters: alerters.into_iter().collect(),
        }
    }

    /// Authorizes `address` for both message kinds.
    #[must_use]
    pub fn with(mut self, address: Address) -> Self {
        self.activators.insert(address.clone());
        self.alerters.insert(address);
        self
    }
}

impl SenderAuthorization for AllowList {
    fn may_activate(&self, sender: &Address) -> bool {
        self.activators.contains(sender)
    }

    fn may_alert(&self, sender: &Address) -> bool {
        self.alerters.contains(sender)
    }

    fn describe(&self) -> String {
        format!(
            "allow-list ({} activators, {} alerters)",
            self.activators.len(),
            self.alerters.len()
        )
    }
}

/// Every sender is authorized. For private test networks only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllowAny;

impl SenderAuthorization for AllowAny {
    fn may_activate(&self, _sender: &Address) -> bool {
        true
    }

    fn may_alert(&self, _sender: &Address) -> bool {
        true
    }

    fn describe(&self) -> String {
        "allow-any".to_string()
    }
}

/// Where an activation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationSource {
    /// The network's initial schedule.
    Schedule,
    /// An activation message.
    Message(Txid),
}

/// A scheduled or completed activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activation {
    /// Feature identifier.
    pub feature: u16,
    /// Feature name, or "unknown".
    pub name: String,
    /// Height at which the feature is live.
    pub activation_height: BlockHeight,
    /// Minimum client version needed to follow it.
    pub min_client_version: u32,
    /// Whether this software implements the feature.
    pub supported: bool,
    /// Origin of the activation.
    pub source: ActivationSource,
}

impl Activation {
    /// True once `height` has reached the activation height.
    #[must_use]
    pub fn is_live(&self, height: BlockHeight) -> bool {
        self.activation_height <= height
    }
}

/// All known activations, by feature.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationSet {
    #[serde(with = "strata_types::seq_map")]
    entries: BTreeMap<u16, Activation>,
}

impl ActivationSet {
    /// Seeds the set from the network's initial schedule.
    #[must_use]
    pub fn from_params(params: &ConsensusParams) -> Self {
        let entries = params
            .initial_features
            .iter()
            .map(|(&feature, &height)| {
                let known = Feature::from_id(feature);
                (
                    feature,
                    Activation {
                        feature,
                        name: known.map_or("unknown", Feature::name).to_string(),
                        activation_height: height,
                        min_client_version: 0,
                        supported: known.is_some(),
                        source: ActivationSource::Schedule,
                    },
                )
            })
            .collect();
        Self { entries }
    }

    /// True if `feature` is live at `height`.
    #[must_use]
    pub fn is_live(&self, feature: Feature, height: BlockHeight) -> bool {
        self.entries
            .get(&feature.id())
            .is_some_and(|a| a.is_live(height))
    }

    /// Fails with `FeatureNotLive` unless `feature` is live at `height`.
    pub fn require(&self, feature: Feature, height: BlockHeight) -> Result<(), InvalidReason> {
        if self.is_live(feature, height) {
            Ok(())
        } else {
            Err(InvalidReason::FeatureNotLive {
                feature: feature.id(),
            })
        }
    }

    /// Looks up the activation of a feature.
    #[must_use]
    pub fn get(&self, feature: u16) -> Option<&Activation> {
        self.entries.get(&feature)
    }

    /// Activations not yet live at `height`.
    #[must_use]
    pub fn pending(&self, height: BlockHeight) -> Vec<&Activation> {
        self.entries.values().filter(|a| !a.is_live(height)).collect()
    }

    /// Activations live at `height`.
    #[must_use]
    pub fn completed(&self, height: BlockHeight) -> Vec<&Activation> {
        self.entries.values().filter(|a| a.is_live(height)).collect()
    }

    /// Validates and records an activation message received at `height`.
    pub fn schedule(
        &mut self,
        params: &ConsensusParams,
        txid: Txid,
        feature: u16,
        activation_height: BlockHeight,
        min_client_version: u32,
        height: BlockHeight,
    ) -> Result<&Activation, InvalidReason> {
        let min = height.saturating_add(params.min_activation_notice);
        let max = height.saturating_add(params.max_activation_notice);
        if activation_height < min || activation_height > max {
            return Err(InvalidReason::ActivationOutOfWindow {
                height: activation_height,
                min,
                max,
            });
        }
        if self.entries.contains_key(&feature) {
            return Err(InvalidReason::FeatureAlreadyScheduled(feature));
        }
        let known = Feature::from_id(feature);
        let entry = self.entries.entry(feature).or_insert(Activation {
            feature,
            name: known.map_or("unknown", Feature::name).to_string(),
            activation_height,
            min_client_version,
            supported: known.is_some(),
            source: ActivationSource::Message(txid),
        });
        Ok(entry)
    }

    /// Iterates over all activations in feature order.
    pub fn iter(&self) -> impl Iterator<Item = &Activation> {
        self.entries.values()
    }
}
