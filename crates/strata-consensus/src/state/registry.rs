//! Property registry.
//!
//! Tracks every property ever created, its issuer and supply, crowdsale
//! terms and freezing status. Identifiers are assigned sequentially per
//! ecosystem and never reused.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strata_types::{Address, Amount, BlockHeight, Ecosystem, PropertyId, Txid};

use crate::error::InvalidReason;

/// Token kind of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    /// Whole units only.
    Indivisible,
    /// Eight decimal places.
    Divisible,
    /// Individually numbered tokens.
    NonFungible,
}

impl PropertyKind {
    /// Parses the issuance kind field.
    ///
    /// Kinds 65/66 and 129/130 are legacy append/replace variants of the
    /// two fungible kinds and map onto them.
    #[must_use]
    pub fn from_wire(kind: u16) -> Option<Self> {
        match kind {
            1 | 65 | 129 => Some(Self::Indivisible),
            2 | 66 | 130 => Some(Self::Divisible),
            5 => Some(Self::NonFungible),
            _ => None,
        }
    }

    /// Stable byte used by the fingerprint.
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::Indivisible => 1,
            Self::Divisible => 2,
            Self::NonFungible => 5,
        }
    }
}

/// How a property's supply comes into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssuanceMode {
    /// Entire supply at creation.
    Fixed,
    /// Created against contributions.
    Crowdsale,
    /// Minted and burned by the issuer.
    Managed,
    /// Native token of an ecosystem.
    Native,
}

/// One contribution to a crowdsale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participation {
    /// Contributing transaction.
    pub txid: Txid,
    /// Block of the contribution.
    pub block: BlockHeight,
    /// Contributor.
    pub participant: Address,
    /// Amount of the desired property contributed.
    pub contributed: Amount,
    /// Tokens issued to the contributor.
    pub tokens: Amount,
    /// Tokens issued to the issuer alongside.
    pub issuer_tokens: Amount,
}

/// Why a crowdsale ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Closed by its issuer.
    Manual,
    /// Deadline passed.
    Deadline,
    /// Maximum supply reached.
    MaxTokens,
}

/// Crowdsale state of a property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crowdsale {
    /// Property accepted as contribution.
    pub desired: PropertyId,
    /// Tokens issued per whole unit contributed.
    pub tokens_per_unit: u64,
    /// Deadline (block timestamp).
    pub deadline: u64,
    /// Weekly early-bird bonus percentage.
    pub early_bird: u8,
    /// Issuer bonus percentage.
    pub issuer_percentage: u8,
    /// Still accepting contributions.
    pub active: bool,
    /// Height at which it closed.
    pub closed_at: Option<BlockHeight>,
    /// Why it closed.
    pub close_reason: Option<CloseReason>,
    /// Contributions in arrival order.
    pub participations: Vec<Participation>,
}

/// A change of issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerChange {
    /// Block of the change.
    pub block: BlockHeight,
    /// Position of the transaction within the block.
    pub index: u32,
    /// New issuer.
    pub issuer: Address,
}

/// A registered property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    /// Identifier.
    pub id: PropertyId,
    /// Current issuer.
    pub issuer: Address,
    /// Token kind.
    pub kind: PropertyKind,
    /// Supply mode.
    pub mode: IssuanceMode,
    /// Category text.
    pub category: String,
    /// Subcategory text.
    pub subcategory: String,
    /// Name text.
    pub name: String,
    /// URL text.
    pub url: String,
    /// Free-form data text.
    pub data: String,
    /// Total ever created.
    pub issued: Amount,
    /// Total ever destroyed.
    pub destroyed: Amount,
    /// Creating transaction; null for native tokens.
    pub creation_txid: Txid,
    /// Creation height.
    pub creation_block: BlockHeight,
    /// Crowdsale state, for crowdsale properties.
    pub crowdsale: Option<Crowdsale>,
    /// Height from which freezing takes effect, if enabled.
    pub freezing_from: Option<BlockHeight>,
    /// Issuer changes, oldest first.
    pub issuer_history: Vec<IssuerChange>,
}

impl Property {
    /// Ecosystem of this property.
    #[must_use]
    pub fn ecosystem(&self) -> Option<Ecosystem> {
        self.id.ecosystem()
    }

    /// Circulating supply.
    #[must_use]
    pub fn supply(&self) -> Amount {
        self.issued - self.destroyed
    }

    /// True for divisible properties.
    #[must_use]
    pub fn divisible(&self) -> bool {
        self.kind == PropertyKind::Divisible
    }

    /// True for non-fungible properties.
    #[must_use]
    pub fn non_fungible(&self) -> bool {
        self.kind == PropertyKind::NonFungible
    }

    /// True for managed properties.
    #[must_use]
    pub fn managed(&self) -> bool {
        self.mode == IssuanceMode::Managed
    }

    /// True while a crowdsale accepts contributions.
    #[must_use]
    pub fn crowdsale_active(&self) -> bool {
        self.crowdsale.as_ref().is_some_and(|c| c.active)
    }

    /// True if freezing was enabled and is in effect at `height`.
    #[must_use]
    pub fn freezing_effective(&self, height: BlockHeight) -> bool {
        self.freezing_from.is_some_and(|from| from <= height)
    }

    /// Records newly created supply.
    pub fn add_issued(&mut self, amount: Amount) -> Result<(), InvalidReason> {
        self.issued = self
            .issued
            .checked_add(amount)
            .ok_or(InvalidReason::SupplyOverflow)?;
        Ok(())
    }

    /// Room left before the supply hits the amount range.
    #[must_use]
    pub fn headroom(&self) -> Amount {
        Amount::MAX - self.issued
    }
}

/// The property registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    #[serde(with = "strata_types::seq_map")]
    properties: BTreeMap<PropertyId, Property>,
    next_main: PropertyId,
    next_test: PropertyId,
    /// Issuer address to the property of its active crowdsale.
    active_crowdsales: BTreeMap<Address, PropertyId>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            properties: BTreeMap::new(),
            next_main: Ecosystem::Main.first_issued_id(),
            next_test: Ecosystem::Test.first_issued_id(),
            active_crowdsales: BTreeMap::new(),
        }
    }
}

impl Registry {
    /// Creates a registry holding the two native tokens, issued by `exodus`.
    #[must_use]
    pub fn with_natives(exodus: &Address) -> Self {
        let mut registry = Self::default();
        for (id, name) in [
            (PropertyId::MAIN_NATIVE, "Main Native Token"),
            (PropertyId::TEST_NATIVE, "Test Native Token"),
        ] {
            registry.properties.insert(
                id,
                Property {
                    id,
                    issuer: exodus.clone(),
                    kind: PropertyKind::Divisible,
                    mode: IssuanceMode::Native,
                    category: String::new(),
                    subcategory: String::new(),
                    name: name.to_string(),
                    url: String::new(),
                    data: String::new(),
                    issued: 0,
                    destroyed: 0,
                    creation_txid: Txid::null(),
                    creation_block: 0,
                    crowdsale: None,
                    freezing_from: None,
                    issuer_history: Vec::new(),
                },
            );
        }
        registry
    }

    /// Looks up a property.
    #[must_use]
    pub fn get(&self, id: PropertyId) -> Option<&Property> {
        self.properties.get(&id)
    }

    /// Looks up a property mutably.
    pub fn get_mut(&mut self, id: PropertyId) -> Option<&mut Property> {
        self.properties.get_mut(&id)
    }

    /// Looks up a property or fails with `PropertyNotFound`.
    pub fn require(&self, id: PropertyId) -> Result<&Property, InvalidReason> {
        self.get(id).ok_or(InvalidReason::PropertyNotFound(id))
    }

    /// Mutable variant of [`Registry::require`].
    pub fn require_mut(&mut self, id: PropertyId) -> Result<&mut Property, InvalidReason> {
        self.get_mut(id).ok_or(InvalidReason::PropertyNotFound(id))
    }

    /// True if `id` exists.
    #[must_use]
    pub fn contains(&self, id: PropertyId) -> bool {
        self.properties.contains_key(&id)
    }

    /// All properties in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.properties.values()
    }

    /// Number of properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// True if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Identifier the next property in `ecosystem` will receive.
    #[must_use]
    pub fn peek_next_id(&self, ecosystem: Ecosystem) -> PropertyId {
        match ecosystem {
            Ecosystem::Main => self.next_main,
            Ecosystem::Test => self.next_test,
        }
    }

    /// Checks that another property can be created in `ecosystem`.
    pub fn ensure_id_available(&self, ecosystem: Ecosystem) -> Result<(), InvalidReason> {
        let next = self.peek_next_id(ecosystem);
        let in_space = match ecosystem {
            Ecosystem::Main => next.get() < 0x8000_0000,
            Ecosystem::Test => next.get() >= 0x8000_0000,
        };
        if in_space && next.next().is_some() {
            Ok(())
        } else {
            Err(InvalidReason::IdSpaceExhausted)
        }
    }

    /// Registers a new property, assigning its identifier.
    ///
    /// The `id` field of `property` is overwritten.
    pub fn register(
        &mut self,
        ecosystem: Ecosystem,
        mut property: Property,
    ) -> Result<PropertyId, InvalidReason> {
        self.ensure_id_available(ecosystem)?;
        let slot = match ecosystem {
            Ecosystem::Main => &mut self.next_main,
            Ecosystem::Test => &mut self.next_test,
        };
        let id = *slot;
        *slot = id.next().ok_or(InvalidReason::IdSpaceExhausted)?;
        property.id = id;
        if property.crowdsale_active() {
            self.active_crowdsales.insert(property.issuer.clone(), id);
        }
        self.properties.insert(id, property);
        Ok(id)
    }

    /// Property of the active crowdsale run by `issuer`.
    #[must_use]
    pub fn active_crowdsale_of(&self, issuer: &Address) -> Option<PropertyId> {
        self.active_crowdsales.get(issuer).copied()
    }

    /// Properties with an active crowdsale.
    #[must_use]
    pub fn active_crowdsales(&self) -> Vec<PropertyId> {
        self.active_crowdsales.values().copied().collect()
    }

    /// Ends the crowdsale of `id`.
    pub fn close_crowdsale(
        &mut self,
        id: PropertyId,
        height: BlockHeight,
        reason: CloseReason,
    ) -> Result<(), InvalidReason> {
        let property = self.require_mut(id)?;
        let issuer = property.issuer.clone();
        let crowdsale = property
            .crowdsale
            .as_mut()
            .filter(|c| c.active)
            .ok_or(InvalidReason::NoActiveCrowdsale(id))?;
        crowdsale.active = false;
        crowdsale.closed_at = Some(height);
        crowdsale.close_reason = Some(reason);
        self.active_crowdsales.remove(&issuer);
        Ok(())
    }

    /// Hands the issuer role of `id` to `issuer`.
    pub fn change_issuer(
        &mut self,
        id: PropertyId,
        issuer: Address,
        block: BlockHeight,
        index: u32,
    ) -> Result<(), InvalidReason> {
        let property = self.require_mut(id)?;
        property.issuer_history.push(IssuerChange {
            block,
            index,
            issuer: issuer.clone(),
        });
        property.issuer = issuer;
        Ok(())
    }
}
