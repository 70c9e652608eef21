//! Identifier types for Strata entities.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::TypesError;

/// Token ecosystem.
///
/// Properties live in one of two ecosystems whose identifier spaces never
/// overlap. Trades and ecosystem-wide operations never cross between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Ecosystem {
    /// The production ecosystem.
    Main,
    /// The test ecosystem.
    Test,
}

impl Ecosystem {
    /// Parses the single-byte wire representation.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Main),
            2 => Some(Self::Test),
            _ => None,
        }
    }

    /// Returns the single-byte wire representation.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Main => 1,
            Self::Test => 2,
        }
    }

    /// The first identifier handed out to issued properties.
    #[must_use]
    pub const fn first_issued_id(self) -> PropertyId {
        match self {
            Self::Main => PropertyId(3),
            Self::Test => PropertyId(0x8000_0003),
        }
    }

    /// The implicit native token of this ecosystem.
    #[must_use]
    pub const fn native_token(self) -> PropertyId {
        match self {
            Self::Main => PropertyId::MAIN_NATIVE,
            Self::Test => PropertyId::TEST_NATIVE,
        }
    }
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Main => write!(f, "main"),
            Self::Test => write!(f, "test"),
        }
    }
}

/// A property (token) identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyId(pub u32);

impl PropertyId {
    /// The base-chain currency. Never held on the ledger.
    pub const BASE_CURRENCY: Self = Self(0);
    /// Native token of the main ecosystem.
    pub const MAIN_NATIVE: Self = Self(1);
    /// Native token of the test ecosystem.
    pub const TEST_NATIVE: Self = Self(2);

    /// Returns the raw identifier.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Returns the ecosystem this identifier belongs to.
    ///
    /// The base currency has no ecosystem.
    #[must_use]
    pub fn ecosystem(self) -> Option<Ecosystem> {
        match self.0 {
            0 => None,
            2 => Some(Ecosystem::Test),
            id if id >= 0x8000_0000 => Some(Ecosystem::Test),
            _ => Some(Ecosystem::Main),
        }
    }

    /// Returns the next identifier in sequence.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for PropertyId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

macro_rules! hash_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name([u8; 32]);

        impl $name {
            /// The length in bytes.
            pub const LEN: usize = 32;

            /// Creates an identifier from raw bytes.
            #[must_use]
            pub const fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            /// Returns the raw bytes.
            #[must_use]
            pub const fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// Creates a null (all zeros) identifier.
            #[must_use]
            pub const fn null() -> Self {
                Self([0u8; 32])
            }

            /// Returns true if this is the null identifier.
            #[must_use]
            pub fn is_null(&self) -> bool {
                self.0 == [0u8; 32]
            }

            /// Hex representation.
            #[must_use]
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Parses a 64-character hex string.
            pub fn from_hex(s: &str) -> crate::Result<Self> {
                let bytes = hex::decode(s).map_err(|e| TypesError::InvalidHex(e.to_string()))?;
                let arr: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
                    TypesError::InvalidHex(format!("expected 32 bytes, got {}", v.len()))
                })?;
                Ok(Self(arr))
            }

            /// Derives an identifier by hashing arbitrary bytes.
            #[must_use]
            pub fn digest(data: &[u8]) -> Self {
                use sha2::{Digest, Sha256};
                Self(Sha256::digest(data).into())
            }

            /// Generates a random identifier for testing.
            #[cfg(any(test, feature = "test-utils"))]
            #[must_use]
            pub fn random() -> Self {
                use rand::RngCore;
                let mut bytes = [0u8; 32];
                rand::thread_rng().fill_bytes(&mut bytes);
                Self(bytes)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), hex::encode(&self.0[..8]))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = TypesError;

            fn from_str(s: &str) -> crate::Result<Self> {
                Self::from_hex(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::from_hex(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

hash_id!(
    /// A base-chain transaction identifier.
    Txid
);

hash_id!(
    /// A base-chain block identifier.
    BlockHash
);

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_property_ecosystem() {
        assert_eq!(PropertyId::BASE_CURRENCY.ecosystem(), None);
        assert_eq!(PropertyId(1).ecosystem(), Some(Ecosystem::Main));
        assert_eq!(PropertyId(2).ecosystem(), Some(Ecosystem::Test));
        assert_eq!(PropertyId(3).ecosystem(), Some(Ecosystem::Main));
        assert_eq!(PropertyId(0x8000_0003).ecosystem(), Some(Ecosystem::Test));
        assert_eq!(Ecosystem::Test.first_issued_id(), PropertyId(0x8000_0003));
    }

    #[test]
    fn test_ecosystem_wire_byte() {
        assert_eq!(Ecosystem::from_u8(1), Some(Ecosystem::Main));
        assert_eq!(Ecosystem::from_u8(2), Some(Ecosystem::Test));
        assert_eq!(Ecosystem::from_u8(3), None);
        assert_eq!(Ecosystem::Test.as_u8(), 2);
    }

    #[test]
    fn test_hash_hex_roundtrip() {
        let id = Txid::random();
        let parsed: Txid = id.to_hex().parse().unwrap();
        assert_eq!(id, parsed);
        assert!(Txid::from_hex("abcd").is_err());
        assert!(Txid::from_hex("zz").is_err());
    }

    #[test]
    fn test_hash_serde_as_hex() {
        let hash = BlockHash::digest(b"block");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", hash.to_hex()));
        let back: BlockHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }

    #[test]
    fn test_null_hash() {
        assert!(BlockHash::null().is_null());
        assert!(!BlockHash::digest(b"x").is_null());
    }
}
