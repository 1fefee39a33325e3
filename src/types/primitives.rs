// Primitives - Types fondamentaux (hash, adresses, quantités)
use num_bigint::BigUint;
use num_traits::Num;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Block height as recorded by the ledger
pub type BlockNumber = u64;

/// Gas units
pub type Gas = u64;

/// Parse a `0x`-prefixed (or bare) hex string into a fixed-size byte array
fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], PrimitiveError> {
    let hex_str = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(hex_str).map_err(|e| PrimitiveError::InvalidHex(e.to_string()))?;
    if bytes.len() != N {
        return Err(PrimitiveError::InvalidLength {
            expected: N,
            actual: bytes.len(),
        });
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// 32-byte hash (transaction and block hashes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash([u8; 32]);

impl Hash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Hash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0[..8]))
    }
}

impl From<[u8; 32]> for Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Hash(bytes)
    }
}

impl FromStr for Hash {
    type Err = PrimitiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_fixed::<32>(s).map(Hash)
    }
}

/// 20-byte account address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 20]);

impl Address {
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Address(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Address {
    type Err = PrimitiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_fixed::<20>(s).map(Address)
    }
}

macro_rules! hex_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(de::Error::custom)
            }
        }
    };
}

hex_serde!(Hash);
hex_serde!(Address);

/// Format an integer as an Ethereum JSON-RPC quantity (`0x` + minimal hex)
pub fn to_quantity(value: u64) -> String {
    format!("0x{:x}", value)
}

/// Format an arbitrary-precision integer as a JSON-RPC quantity
pub fn big_to_quantity(value: &BigUint) -> String {
    format!("0x{}", value.to_str_radix(16))
}

/// Parse a JSON-RPC quantity (`0x`-prefixed hex) or a decimal string
pub fn parse_big_quantity(s: &str) -> Result<BigUint, PrimitiveError> {
    match s.strip_prefix("0x") {
        Some("") => Err(PrimitiveError::InvalidQuantity(s.to_string())),
        Some(hex_str) => BigUint::from_str_radix(hex_str, 16)
            .map_err(|_| PrimitiveError::InvalidQuantity(s.to_string())),
        None => BigUint::from_str_radix(s, 10)
            .map_err(|_| PrimitiveError::InvalidQuantity(s.to_string())),
    }
}

/// Serde adapter storing `BigUint` prices as hex quantities
pub mod quantity {
    use super::*;

    pub fn serialize<S: Serializer>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&big_to_quantity(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_big_quantity(&s).map_err(de::Error::custom)
    }
}

/// Same as [`quantity`], for optional values
pub mod opt_quantity {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &Option<BigUint>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_some(&big_to_quantity(v)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<BigUint>, D::Error> {
        let s = Option::<String>::deserialize(deserializer)?;
        s.map(|s| parse_big_quantity(&s).map_err(de::Error::custom))
            .transpose()
    }
}

/// Errors parsing primitive values
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PrimitiveError {
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    #[error("Invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),
}
