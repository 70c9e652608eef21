//! Base-chain addresses and the derived ("safe") address encoding.
//!
//! The ledger keys balances by the canonical text form of a base-chain
//! address. Users may also refer to the same destination through a derived
//! encoding: a bech32 string under a protocol-specific human-readable part,
//! so that protocol-aware destinations can never be mistaken for raw
//! base-chain ones.
//!
//! ```text
//!   base-chain form                         derived form
//!   ---------------                         ------------
//!   P2PKH  (base58check, version byte)  <->  hrp1 + [24] + hash160
//!   P2SH   (base58check, version byte)  <->  hrp1 + [25] + hash160
//!   P2WPKH (bech32,  witness v0, 20)    <->  hrp1 + [0]  + program
//!   P2WSH  (bech32,  witness v0, 32)    <->  hrp1 + [0]  + program
//!   P2TR   (bech32m, witness v1, 32)    <->  hrp1 + [1]  + program
//! ```
//!
//! The first data symbol of the derived form is the kind tag; the rest is
//! the payload in base32. Both directions are total over the supported
//! kinds, so `decode(encode(a)) == a`.

use bech32::{u5, FromBase32, ToBase32, Variant};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, TypesError};

/// Canonical text form of a base-chain address, as used for ledger keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Wraps an address string without validating it.
    ///
    /// The state machine receives addresses from the base chain and treats
    /// them as opaque keys.
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Returns the address text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Address {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The base chain a node follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Production network.
    #[default]
    Main,
    /// Public test network.
    Test,
    /// Local regression-test network.
    Regtest,
}

impl Network {
    /// Name used in error messages and configuration.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Test => "test",
            Self::Regtest => "regtest",
        }
    }

    const fn pubkey_version(self) -> u8 {
        match self {
            Self::Main => 0x00,
            Self::Test | Self::Regtest => 0x6f,
        }
    }

    const fn script_version(self) -> u8 {
        match self {
            Self::Main => 0x05,
            Self::Test | Self::Regtest => 0xc4,
        }
    }

    /// Human-readable part of native segwit addresses.
    #[must_use]
    pub const fn segwit_hrp(self) -> &'static str {
        match self {
            Self::Main => "bc",
            Self::Test => "tb",
            Self::Regtest => "bcrt",
        }
    }

    /// Human-readable part of derived addresses.
    #[must_use]
    pub const fn derived_hrp(self) -> &'static str {
        match self {
            Self::Main => "o",
            Self::Test => "otb",
            Self::Regtest => "ocrt",
        }
    }

    /// The fixed prefix every derived address starts with.
    #[must_use]
    pub fn derived_prefix(self) -> String {
        format!("{}1", self.derived_hrp())
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Network {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "main" | "mainnet" => Ok(Self::Main),
            "test" | "testnet" => Ok(Self::Test),
            "regtest" => Ok(Self::Regtest),
            other => Err(TypesError::invalid_address(other, "unknown network")),
        }
    }
}

/// A decoded base-chain destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseAddress {
    /// Legacy pay-to-pubkey-hash.
    P2pkh([u8; 20]),
    /// Pay-to-script-hash, including script-hash-wrapped segwit.
    P2sh([u8; 20]),
    /// Native segwit v0 key hash.
    P2wpkh([u8; 20]),
    /// Native segwit v0 script hash.
    P2wsh([u8; 32]),
    /// Native segwit v1 output key.
    P2tr([u8; 32]),
}

/// Which encoding an address string was supplied in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressForm {
    /// Raw base-chain text encoding.
    Raw,
    /// Derived protocol encoding.
    Derived,
}

const TAG_WITNESS_V0: u8 = 0;
const TAG_WITNESS_V1: u8 = 1;
const TAG_PUBKEY_HASH: u8 = 24;
const TAG_SCRIPT_HASH: u8 = 25;

impl BaseAddress {
    /// Short kind name.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::P2pkh(_) => "p2pkh",
            Self::P2sh(_) => "p2sh",
            Self::P2wpkh(_) => "p2wpkh",
            Self::P2wsh(_) => "p2wsh",
            Self::P2tr(_) => "p2tr",
        }
    }

    fn payload(&self) -> &[u8] {
        match self {
            Self::P2pkh(h) | Self::P2sh(h) | Self::P2wpkh(h) => h,
            Self::P2wsh(p) | Self::P2tr(p) => p,
        }
    }

    /// Parses the raw base-chain text encoding for `network`.
    pub fn parse(s: &str, network: Network) -> Result<Self> {
        let segwit_prefix = format!("{}1", network.segwit_hrp());
        if s.to_ascii_lowercase().starts_with(&segwit_prefix) {
            return Self::parse_segwit(s, network);
        }
        Self::parse_base58(s, network)
    }

    fn parse_segwit(s: &str, network: Network) -> Result<Self> {
        let (hrp, data, variant) =
            bech32::decode(s).map_err(|e| TypesError::invalid_address(s, e.to_string()))?;
        if hrp != network.segwit_hrp() {
            return Err(TypesError::WrongNetwork {
                address: s.to_string(),
                network: network.name(),
            });
        }
        let (version, program) = split_tagged(s, &data)?;
        match (version, variant, program.len()) {
            (0, Variant::Bech32, 20) => Ok(Self::P2wpkh(to_array(s, &program)?)),
            (0, Variant::Bech32, 32) => Ok(Self::P2wsh(to_array(s, &program)?)),
            (1, Variant::Bech32m, 32) => Ok(Self::P2tr(to_array(s, &program)?)),
            (v, _, len) => Err(TypesError::invalid_address(
                s,
                format!("unsupported witness program (version {v}, {len} bytes)"),
            )),
        }
    }

    fn parse_base58(s: &str, network: Network) -> Result<Self> {
        let bytes = bs58::decode(s)
            .with_check(None)
            .into_vec()
            .map_err(|e| TypesError::invalid_address(s, e.to_string()))?;
        if bytes.len() != 21 {
            return Err(TypesError::invalid_address(
                s,
                format!("expected 21 payload bytes, got {}", bytes.len()),
            ));
        }
        let hash = to_array(s, &bytes[1..])?;
        match bytes[0] {
            v if v == network.pubkey_version() => Ok(Self::P2pkh(hash)),
            v if v == network.script_version() => Ok(Self::P2sh(hash)),
            _ => Err(TypesError::WrongNetwork {
                address: s.to_string(),
                network: network.name(),
            }),
        }
    }

    /// Renders the canonical raw base-chain text encoding.
    pub fn encode(&self, network: Network) -> Result<String> {
        match self {
            Self::P2pkh(hash) | Self::P2sh(hash) => {
                let version = if matches!(self, Self::P2pkh(_)) {
                    network.pubkey_version()
                } else {
                    network.script_version()
                };
                let mut payload = Vec::with_capacity(21);
                payload.push(version);
                payload.extend_from_slice(hash);
                Ok(bs58::encode(payload).with_check().into_string())
            }
            Self::P2wpkh(_) | Self::P2wsh(_) => {
                bech32_with_tag(network.segwit_hrp(), 0, self.payload(), Variant::Bech32)
            }
            Self::P2tr(_) => {
                bech32_with_tag(network.segwit_hrp(), 1, self.payload(), Variant::Bech32m)
            }
        }
    }

    /// Renders the canonical ledger key.
    pub fn to_address(&self, network: Network) -> Result<Address> {
        self.encode(network).map(Address)
    }

    /// Renders the derived encoding.
    pub fn encode_derived(&self, network: Network) -> Result<String> {
        let (tag, variant) = match self {
            Self::P2pkh(_) => (TAG_PUBKEY_HASH, Variant::Bech32m),
            Self::P2sh(_) => (TAG_SCRIPT_HASH, Variant::Bech32m),
            Self::P2wpkh(_) | Self::P2wsh(_) => (TAG_WITNESS_V0, Variant::Bech32),
            Self::P2tr(_) => (TAG_WITNESS_V1, Variant::Bech32m),
        };
        bech32_with_tag(network.derived_hrp(), tag, self.payload(), variant)
    }

    /// Parses the derived encoding.
    pub fn decode_derived(s: &str, network: Network) -> Result<Self> {
        let (hrp, data, variant) =
            bech32::decode(s).map_err(|e| TypesError::invalid_address(s, e.to_string()))?;
        if hrp != network.derived_hrp() {
            return Err(TypesError::WrongNetwork {
                address: s.to_string(),
                network: network.name(),
            });
        }
        let (tag, payload) = split_tagged(s, &data)?;
        match (tag, variant, payload.len()) {
            (TAG_PUBKEY_HASH, Variant::Bech32m, 20) => Ok(Self::P2pkh(to_array(s, &payload)?)),
            (TAG_SCRIPT_HASH, Variant::Bech32m, 20) => Ok(Self::P2sh(to_array(s, &payload)?)),
            (TAG_WITNESS_V0, Variant::Bech32, 20) => Ok(Self::P2wpkh(to_array(s, &payload)?)),
            (TAG_WITNESS_V0, Variant::Bech32, 32) => Ok(Self::P2wsh(to_array(s, &payload)?)),
            (TAG_WITNESS_V1, Variant::Bech32m, 32) => Ok(Self::P2tr(to_array(s, &payload)?)),
            (tag, _, len) => Err(TypesError::invalid_address(
                s,
                format!("unknown derived address kind (tag {tag}, {len} bytes)"),
            )),
        }
    }

    /// Parses either encoding, reporting which one was used.
    pub fn parse_any(s: &str, network: Network) -> Result<(Self, AddressForm)> {
        if is_derived_form(s, network) {
            Self::decode_derived(s, network).map(|a| (a, AddressForm::Derived))
        } else {
            Self::parse(s, network).map(|a| (a, AddressForm::Raw))
        }
    }
}

/// Returns true if `s` carries the derived-address prefix of `network`.
///
/// This only inspects the prefix; it does not validate the checksum.
#[must_use]
pub fn is_derived_form(s: &str, network: Network) -> bool {
    s.to_ascii_lowercase()
        .starts_with(&network.derived_prefix())
}

fn bech32_with_tag(hrp: &str, tag: u8, payload: &[u8], variant: Variant) -> Result<String> {
    let tag = u5::try_from_u8(tag).map_err(|e| TypesError::invalid_address(hrp, e.to_string()))?;
    let mut data = Vec::with_capacity(1 + payload.len() * 8 / 5 + 1);
    data.push(tag);
    data.extend(payload.to_base32());
    bech32::encode(hrp, data, variant).map_err(|e| TypesError::invalid_address(hrp, e.to_string()))
}

fn split_tagged(s: &str, data: &[u5]) -> Result<(u8, Vec<u8>)> {
    let (tag, rest) = data
        .split_first()
        .ok_or_else(|| TypesError::invalid_address(s, "empty data part"))?;
    let payload =
        Vec::<u8>::from_base32(rest).map_err(|e| TypesError::invalid_address(s, e.to_string()))?;
    Ok((tag.to_u8(), payload))
}

fn to_array<const N: usize>(s: &str, bytes: &[u8]) -> Result<[u8; N]> {
    bytes
        .try_into()
        .map_err(|_| TypesError::invalid_address(s, format!("expected {N} bytes, got {}", bytes.len())))
}
