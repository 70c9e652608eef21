//! Protocol messages and their binary payload layout.
//!
//! Every payload starts with a big-endian `version: u16` and
//! `type: u16` header followed by type-specific fields, all big-endian.
//! Text fields are NUL-terminated. Bytes trailing the last known field are
//! ignored so that later protocol revisions may append fields.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use strata_types::{PropertyId, MAX_TEXT_FIELD_LEN};

use crate::error::{CodecError, Result};

/// Message type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum MessageType {
    /// Transfer of one property to the reference output.
    SimpleSend = 0,
    /// Proportional distribution to holders.
    SendToOwners = 3,
    /// Transfer of every available balance in an ecosystem.
    SendAll = 4,
    /// Transfer of a non-fungible token range.
    SendNonFungible = 5,
    /// Transfer to several outputs at once.
    SendToMany = 7,
    /// DEX order.
    Trade = 25,
    /// Cancel orders at an exact price.
    CancelAtPrice = 26,
    /// Cancel orders for a property pair.
    CancelPair = 27,
    /// Cancel every order in an ecosystem.
    CancelEcosystem = 28,
    /// Fixed-supply issuance.
    CreateFixed = 50,
    /// Crowdsale issuance.
    CreateCrowdsale = 51,
    /// Manual crowdsale close.
    CloseCrowdsale = 53,
    /// Managed (issuer-mintable) issuance.
    CreateManaged = 54,
    /// Mint managed tokens.
    Grant = 55,
    /// Burn managed tokens.
    Revoke = 56,
    /// Hand the issuer role to another address.
    ChangeIssuer = 70,
    /// Allow the issuer to freeze holders.
    EnableFreezing = 71,
    /// Remove the freezing capability.
    DisableFreezing = 72,
    /// Freeze an address.
    Freeze = 185,
    /// Unfreeze an address.
    Unfreeze = 186,
    /// Schedule a feature activation.
    Activation = 65534,
    /// Network alert.
    Alert = 65535,
}

impl MessageType {
    /// Parses a type discriminator.
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        Some(match value {
            0 => Self::SimpleSend,
            3 => Self::SendToOwners,
            4 => Self::SendAll,
            5 => Self::SendNonFungible,
            7 => Self::SendToMany,
            25 => Self::Trade,
            26 => Self::CancelAtPrice,
            27 => Self::CancelPair,
            28 => Self::CancelEcosystem,
            50 => Self::CreateFixed,
            51 => Self::CreateCrowdsale,
            53 => Self::CloseCrowdsale,
            54 => Self::CreateManaged,
            55 => Self::Grant,
            56 => Self::Revoke,
            70 => Self::ChangeIssuer,
            71 => Self::EnableFreezing,
            72 => Self::DisableFreezing,
            185 => Self::Freeze,
            186 => Self::Unfreeze,
            65534 => Self::Activation,
            65535 => Self::Alert,
            _ => return None,
        })
    }

    /// Returns the wire discriminator.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Highest payload version understood for this type.
    #[must_use]
    pub const fn max_version(self) -> u16 {
        match self {
            Self::SendToOwners => 1,
            _ => 0,
        }
    }

    /// Human-readable name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SimpleSend => "Simple Send",
            Self::SendToOwners => "Send To Owners",
            Self::SendAll => "Send All",
            Self::SendNonFungible => "Send Non-Fungible",
            Self::SendToMany => "Send To Many",
            Self::Trade => "DEx Trade",
            Self::CancelAtPrice => "DEx Cancel Price",
            Self::CancelPair => "DEx Cancel Pair",
            Self::CancelEcosystem => "DEx Cancel Ecosystem",
            Self::CreateFixed => "Create Property - Fixed",
            Self::CreateCrowdsale => "Create Property - Variable",
            Self::CloseCrowdsale => "Close Crowdsale",
            Self::CreateManaged => "Create Property - Manual",
            Self::Grant => "Grant Property Tokens",
            Self::Revoke => "Revoke Property Tokens",
            Self::ChangeIssuer => "Change Issuer Address",
            Self::EnableFreezing => "Enable Freezing",
            Self::DisableFreezing => "Disable Freezing",
            Self::Freeze => "Freeze Property Tokens",
            Self::Unfreeze => "Unfreeze Property Tokens",
            Self::Activation => "Feature Activation",
            Self::Alert => "Alert",
        }
    }
}

/// Price and quantity terms of a DEX order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTerms {
    /// Property offered.
    pub for_sale: PropertyId,
    /// Amount offered.
    pub amount_for_sale: u64,
    /// Property wanted in exchange.
    pub desired: PropertyId,
    /// Amount wanted.
    pub amount_desired: u64,
}

/// Fields shared by every issuance message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceHeader {
    /// Target ecosystem byte.
    pub ecosystem: u8,
    /// Property kind (1 indivisible, 2 divisible, 5 non-fungible, ...).
    pub kind: u16,
    /// Property this one replaces or appends to, zero for a new one.
    pub previous: u32,
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
}

/// Crowdsale parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrowdsaleTerms {
    /// Property accepted as contribution.
    pub desired: PropertyId,
    /// Tokens issued per whole unit contributed.
    pub tokens_per_unit: u64,
    /// Deadline as a block timestamp.
    pub deadline: u64,
    /// Bonus percentage per full week before the deadline.
    pub early_bird: u8,
    /// Percentage of created tokens additionally issued to the issuer.
    pub issuer_percentage: u8,
}

/// One receiver of a send-to-many message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManyOutput {
    /// Index of the base-chain output that identifies the receiver.
    pub output_index: u8,
    /// Amount to send.
    pub amount: u64,
}

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Transfer to the reference output.
    SimpleSend {
        /// Property sent.
        property: PropertyId,
        /// Amount sent.
        amount: u64,
    },
    /// Proportional distribution.
    ///
    /// `source` is `None` for version 0, where holders of the distributed
    /// property itself are the recipients.
    SendToOwners {
        /// Property distributed.
        property: PropertyId,
        /// Total amount distributed.
        amount: u64,
        /// Property whose holders receive the distribution.
        source: Option<PropertyId>,
    },
    /// Transfer of all available balances in an ecosystem.
    SendAll {
        /// Ecosystem byte.
        ecosystem: u8,
    },
    /// Transfer of a non-fungible token range.
    SendNonFungible {
        /// Property sent.
        property: PropertyId,
        /// First token of the range.
        first: u64,
        /// Last token of the range, inclusive.
        last: u64,
    },
    /// Transfer to several outputs.
    SendToMany {
        /// Property sent.
        property: PropertyId,
        /// Receivers by output index.
        outputs: Vec<ManyOutput>,
    },
    /// Place a DEX order.
    Trade(OrderTerms),
    /// Cancel orders matching these exact terms.
    CancelAtPrice(OrderTerms),
    /// Cancel orders for a pair.
    CancelPair {
        /// Property offered.
        for_sale: PropertyId,
        /// Property wanted.
        desired: PropertyId,
    },
    /// Cancel every order in an ecosystem.
    CancelEcosystem {
        /// Ecosystem byte.
        ecosystem: u8,
    },
    /// Fixed-supply issuance.
    CreateFixed {
        /// Issuance fields.
        header: IssuanceHeader,
        /// Total supply.
        amount: u64,
    },
    /// Crowdsale issuance.
    CreateCrowdsale {
        /// Issuance fields.
        header: IssuanceHeader,
        /// Crowdsale parameters.
        terms: CrowdsaleTerms,
    },
    /// Close an active crowdsale.
    CloseCrowdsale {
        /// Crowdsale property.
        property: PropertyId,
    },
    /// Managed issuance.
    CreateManaged {
        /// Issuance fields.
        header: IssuanceHeader,
    },
    /// Mint managed tokens.
    Grant {
        /// Managed property.
        property: PropertyId,
        /// Amount minted.
        amount: u64,
        /// Optional memo.
        memo: String,
    },
    /// Burn managed tokens.
    Revoke {
        /// Managed property.
        property: PropertyId,
        /// Amount burned.
        amount: u64,
        /// Optional memo.
        memo: String,
    },
    /// Transfer the issuer role to the reference output.
    ChangeIssuer {
        /// Property.
        property: PropertyId,
    },
    /// Enable freezing.
    EnableFreezing {
        /// Managed property.
        property: PropertyId,
    },
    /// Disable freezing.
    DisableFreezing {
        /// Managed property.
        property: PropertyId,
    },
    /// Freeze the reference output address.
    Freeze {
        /// Property.
        property: PropertyId,
        /// Carried for layout compatibility; not used.
        amount: u64,
    },
    /// Unfreeze the reference output address.
    Unfreeze {
        /// Property.
        property: PropertyId,
        /// Carried for layout compatibility; not used.
        amount: u64,
    },
    /// Schedule a feature activation.
    Activation {
        /// Feature identifier.
        feature: u16,
        /// Height at which the feature goes live.
        activation_height: u32,
        /// Minimum client version required to follow the feature.
        min_client_version: u32,
    },
    /// Network alert.
    Alert {
        /// Alert kind.
        alert_type: u16,
        /// Expiry height, time or client version, depending on kind.
        expiry_value: u32,
        /// Alert text.
        message: String,
    },
    /// A type/version combination this software does not understand.
    Unrecognized {
        /// Payload version.
        version: u16,
        /// Payload type.
        kind: u16,
    },
}

impl Message {
    /// Returns the message type, if recognized.
    #[must_use]
    pub fn message_type(&self) -> Option<MessageType> {
        Some(match self {
            Self::SimpleSend { .. } => MessageType::SimpleSend,
            Self::SendToOwners { .. } => MessageType::SendToOwners,
            Self::SendAll { .. } => MessageType::SendAll,
            Self::SendNonFungible { .. } => MessageType::SendNonFungible,
            Self::SendToMany { .. } => MessageType::SendToMany,
            Self::Trade(_) => MessageType::Trade,
            Self::CancelAtPrice(_) => MessageType::CancelAtPrice,
            Self::CancelPair { .. } => MessageType::CancelPair,
            Self::CancelEcosystem { .. } => MessageType::CancelEcosystem,
            Self::CreateFixed { .. } => MessageType::CreateFixed,
            Self::CreateCrowdsale { .. } => MessageType::CreateCrowdsale,
            Self::CloseCrowdsale { .. } => MessageType::CloseCrowdsale,
            Self::CreateManaged { .. } => MessageType::CreateManaged,
            Self::Grant { .. } => MessageType::Grant,
            Self::Revoke { .. } => MessageType::Revoke,
            Self::ChangeIssuer { .. } => MessageType::ChangeIssuer,
            Self::EnableFreezing { .. } => MessageType::EnableFreezing,
            Self::DisableFreezing { .. } => MessageType::DisableFreezing,
            Self::Freeze { .. } => MessageType::Freeze,
            Self::Unfreeze { .. } => MessageType::Unfreeze,
            Self::Activation { .. } => MessageType::Activation,
            Self::Alert { .. } => MessageType::Alert,
            Self::Unrecognized { .. } => return None,
        })
    }

    /// Returns the payload version this message encodes to.
    #[must_use]
    pub fn version(&self) -> u16 {
        match self {
            Self::SendToOwners {
                source: Some(_), ..
            } => 1,
            Self::Unrecognized { version, .. } => *version,
            _ => 0,
        }
    }

    /// Returns the raw type discriminator.
    #[must_use]
    pub fn type_code(&self) -> u16 {
        match self {
            Self::Unrecognized { kind, .. } => *kind,
            other => other.message_type().map_or(0, MessageType::as_u16),
        }
    }

    /// Returns true for the forward-compatibility placeholder.
    #[must_use]
    pub fn is_unrecognized(&self) -> bool {
        matches!(self, Self::Unrecognized { .. })
    }

    /// Encodes the message into payload bytes.
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(32);
        buf.put_u16(self.version());
        buf.put_u16(self.type_code());

        match self {
            Self::SimpleSend { property, amount } => {
                buf.put_u32(property.get());
                buf.put_u64(*amount);
            }
            Self::SendToOwners {
                property,
                amount,
                source,
            } => {
                buf.put_u32(property.get());
                buf.put_u64(*amount);
                if let Some(source) = source {
                    buf.put_u32(source.get());
                }
            }
            Self::SendAll { ecosystem } | Self::CancelEcosystem { ecosystem } => {
                buf.put_u8(*ecosystem);
            }
            Self::SendNonFungible {
                property,
                first,
                last,
            } => {
                buf.put_u32(property.get());
                buf.put_u64(*first);
                buf.put_u64(*last);
            }
            Self::SendToMany { property, outputs } => {
                buf.put_u32(property.get());
                let count = u8::try_from(outputs.len())
                    .map_err(|_| CodecError::TooManyOutputs(outputs.len()))?;
                buf.put_u8(count);
                for output in outputs {
                    buf.put_u8(output.output_index);
                    buf.put_u64(output.amount);
                }
            }
            Self::Trade(terms) | Self::CancelAtPrice(terms) => put_terms(&mut buf, terms),
            Self::CancelPair { for_sale, desired } => {
                buf.put_u32(for_sale.get());
                buf.put_u32(desired.get());
            }
            Self::CreateFixed { header, amount } => {
                put_header(&mut buf, header)?;
                buf.put_u64(*amount);
            }
            Self::CreateCrowdsale { header, terms } => {
                put_header(&mut buf, header)?;
                buf.put_u32(terms.desired.get());
                buf.put_u64(terms.tokens_per_unit);
                buf.put_u64(terms.deadline);
                buf.put_u8(terms.early_bird);
                buf.put_u8(terms.issuer_percentage);
            }
            Self::CreateManaged { header } => put_header(&mut buf, header)?,
            Self::CloseCrowdsale { property }
            | Self::ChangeIssuer { property }
            | Self::EnableFreezing { property }
            | Self::DisableFreezing { property } => buf.put_u32(property.get()),
            Self::Grant {
                property,
                amount,
                memo,
            }
            | Self::Revoke {
                property,
                amount,
                memo,
            } => {
                buf.put_u32(property.get());
                buf.put_u64(*amount);
                if !memo.is_empty() {
                    put_text(&mut buf, "memo", memo)?;
                }
            }
            Self::Freeze { property, amount } | Self::Unfreeze { property, amount } => {
                buf.put_u32(property.get());
                buf.put_u64(*amount);
            }
            Self::Activation {
                feature,
                activation_height,
                min_client_version,
            } => {
                buf.put_u16(*feature);
                buf.put_u32(*activation_height);
                buf.put_u32(*min_client_version);
            }
            Self::Alert {
                alert_type,
                expiry_value,
                message,
            } => {
                buf.put_u16(*alert_type);
                buf.put_u32(*expiry_value);
                put_text(&mut buf, "message", message)?;
            }
            Self::Unrecognized { .. } => {}
        }

        Ok(buf.freeze())
    }

    /// Decodes payload bytes into a message.
    ///
    /// Unknown type/version combinations decode to
    /// [`Message::Unrecognized`]; only malformed known messages fail.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut r = Reader { buf: payload };
        let version = r.u16("version")?;
        let kind = r.u16("type")?;

        let Some(message_type) = MessageType::from_u16(kind) else {
            return Ok(Self::Unrecognized { version, kind });
        };
        if version > message_type.max_version() {
            return Ok(Self::Unrecognized { version, kind });
        }

        let message = match message_type {
            MessageType::SimpleSend => Self::SimpleSend {
                property: r.property("property")?,
                amount: r.u64("amount")?,
            },
            MessageType::SendToOwners => {
                let property = r.property("property")?;
                let amount = r.u64("amount")?;
                let source = if version >= 1 {
                    Some(r.property("distribution property")?)
                } else {
                    None
                };
                Self::SendToOwners {
                    property,
                    amount,
                    source,
                }
            }
            MessageType::SendAll => Self::SendAll {
                ecosystem: r.u8("ecosystem")?,
            },
            MessageType::SendNonFungible => Self::SendNonFungible {
                property: r.property("property")?,
                first: r.u64("first token")?,
                last: r.u64("last token")?,
            },
            MessageType::SendToMany => {
                let property = r.property("property")?;
                let count = r.u8("output count")?;
                let mut outputs = Vec::with_capacity(usize::from(count));
                for _ in 0..count {
                    outputs.push(ManyOutput {
                        output_index: r.u8("output index")?,
                        amount: r.u64("output amount")?,
                    });
                }
                Self::SendToMany { property, outputs }
            }
            MessageType::Trade => Self::Trade(r.terms()?),
            MessageType::CancelAtPrice => Self::CancelAtPrice(r.terms()?),
            MessageType::CancelPair => Self::CancelPair {
                for_sale: r.property("property for sale")?,
                desired: r.property("property desired")?,
            },
            MessageType::CancelEcosystem => Self::CancelEcosystem {
                ecosystem: r.u8("ecosystem")?,
            },
            MessageType::CreateFixed => Self::CreateFixed {
                header: r.header()?,
                amount: r.u64("amount")?,
            },
            MessageType::CreateCrowdsale => Self::CreateCrowdsale {
                header: r.header()?,
                terms: CrowdsaleTerms {
                    desired: r.property("property desired")?,
                    tokens_per_unit: r.u64("tokens per unit")?,
                    deadline: r.u64("deadline")?,
                    early_bird: r.u8("early bird bonus")?,
                    issuer_percentage: r.u8("issuer percentage")?,
                },
            },
            MessageType::CloseCrowdsale => Self::CloseCrowdsale {
                property: r.property("property")?,
            },
            MessageType::CreateManaged => Self::CreateManaged { header: r.header()? },
            MessageType::Grant => Self::Grant {
                property: r.property("property")?,
                amount: r.u64("amount")?,
                memo: r.optional_text("memo")?,
            },
            MessageType::Revoke => Self::Revoke {
                property: r.property("property")?,
                amount: r.u64("amount")?,
                memo: r.optional_text("memo")?,
            },
            MessageType::ChangeIssuer => Self::ChangeIssuer {
                property: r.property("property")?,
            },
            MessageType::EnableFreezing => Self::EnableFreezing {
                property: r.property("property")?,
            },
            MessageType::DisableFreezing => Self::DisableFreezing {
                property: r.property("property")?,
            },
            MessageType::Freeze => Self::Freeze {
                property: r.property("property")?,
                amount: r.u64("amount")?,
            },
            MessageType::Unfreeze => Self::Unfreeze {
                property: r.property("property")?,
                amount: r.u64("amount")?,
            },
            MessageType::Activation => Self::Activation {
                feature: r.u16("feature id")?,
                activation_height: r.u32("activation block")?,
                min_client_version: r.u32("min client version")?,
            },
            MessageType::Alert => Self::Alert {
                alert_type: r.u16("alert type")?,
                expiry_value: r.u32("expiry value")?,
                message: r.text("message")?,
            },
        };

        Ok(message)
    }
}

fn put_terms(buf: &mut BytesMut, terms: &OrderTerms) {
    buf.put_u32(terms.for_sale.get());
    buf.put_u64(terms.amount_for_sale);
    buf.put_u32(terms.desired.get());
    buf.put_u64(terms.amount_desired);
}

fn put_header(buf: &mut BytesMut, header: &IssuanceHeader) -> Result<()> {
    buf.put_u8(header.ecosystem);
    buf.put_u16(header.kind);
    buf.put_u32(header.previous);
    put_text(buf, "category", &header.category)?;
    put_text(buf, "subcategory", &header.subcategory)?;
    put_text(buf, "name", &header.name)?;
    put_text(buf, "url", &header.url)?;
    put_text(buf, "data", &header.data)?;
    Ok(())
}

fn put_text(buf: &mut BytesMut, field: &'static str, text: &str) -> Result<()> {
    let bytes = text.as_bytes();
    if bytes.len() > MAX_TEXT_FIELD_LEN {
        return Err(CodecError::TextTooLong {
            field,
            len: bytes.len(),
        });
    }
    if bytes.contains(&0) {
        return Err(CodecError::EmbeddedNul(field));
    }
    buf.put_slice(bytes);
    buf.put_u8(0);
    Ok(())
}

/// Cursor over payload bytes that names the field on truncation.
struct Reader<'a> {
    buf: &'a [u8],
}

impl Reader<'_> {
    fn need(&self, n: usize, field: &'static str) -> Result<()> {
        if self.buf.remaining() < n {
            return Err(CodecError::Truncated(field));
        }
        Ok(())
    }

    fn u8(&mut self, field: &'static str) -> Result<u8> {
        self.need(1, field)?;
        Ok(self.buf.get_u8())
    }

    fn u16(&mut self, field: &'static str) -> Result<u16> {
        self.need(2, field)?;
        Ok(self.buf.get_u16())
    }

    fn u32(&mut self, field: &'static str) -> Result<u32> {
        self.need(4, field)?;
        Ok(self.buf.get_u32())
    }

    fn u64(&mut self, field: &'static str) -> Result<u64> {
        self.need(8, field)?;
        Ok(self.buf.get_u64())
    }

    fn property(&mut self, field: &'static str) -> Result<PropertyId> {
        self.u32(field).map(PropertyId)
    }

    fn terms(&mut self) -> Result<OrderTerms> {
        Ok(OrderTerms {
            for_sale: self.property("property for sale")?,
            amount_for_sale: self.u64("amount for sale")?,
            desired: self.property("property desired")?,
            amount_desired: self.u64("amount desired")?,
        })
    }

    fn header(&mut self) -> Result<IssuanceHeader> {
        Ok(IssuanceHeader {
            ecosystem: self.u8("ecosystem")?,
            kind: self.u16("property type")?,
            previous: self.u32("previous property")?,
            category: self.text("category")?,
            subcategory: self.text("subcategory")?,
            name: self.text("name")?,
            url: self.text("url")?,
            data: self.text("data")?,
        })
    }

    fn text(&mut self, field: &'static str) -> Result<String> {
        let end = self
            .buf
            .iter()
            .position(|&b| b == 0)
            .ok_or(CodecError::Truncated(field))?;
        if end > MAX_TEXT_FIELD_LEN {
            return Err(CodecError::TextTooLong { field, len: end });
        }
        let text = std::str::from_utf8(&self.buf[..end])
            .map_err(|_| CodecError::InvalidText(field))?
            .to_string();
        self.buf.advance(end + 1);
        Ok(text)
    }

    fn optional_text(&mut self, field: &'static str) -> Result<String> {
        if self.buf.has_remaining() {
            self.text(field)
        } else {
            Ok(String::new())
        }
    }
}
