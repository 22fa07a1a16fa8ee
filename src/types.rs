use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

pub type Hash = String;
pub type Timestamp = String;

// ----------------------
// Address
// ----------------------

/// 20-byte account identifier, written as `0x` followed by 40 hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address([u8; 20]);

impl Address {
    /// The reserved null account. It never holds value.
    pub const NULL: Address = Address([0u8; 20]);

    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_null(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAddressError(String);

impl fmt::Display for ParseAddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid address: {}", self.0)
    }
}

impl std::error::Error for ParseAddressError {}

impl FromStr for Address {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
        let bytes = hex::decode(digits).map_err(|e| ParseAddressError(format!("{s}: {e}")))?;
        let arr: [u8; 20] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| ParseAddressError(format!("{s}: expected 20 bytes, got {}", bytes.len())))?;
        Ok(Self(arr))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

// ----------------------
// Amount
// ----------------------

/// Non-negative token quantity in base units.
///
/// Serialized as a decimal string so values above 2^53 survive JSON clients;
/// plain JSON integers are accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);
    pub const MAX: Amount = Amount(u128::MAX);

    pub const fn new(value: u128) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u128 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    pub fn checked_sub(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_sub(rhs.0).map(Amount)
    }
}

impl From<u128> for Amount {
    fn from(value: u128) -> Self {
        Self(value)
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Self(value as u128)
    }
}

impl FromStr for Amount {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u128>().map(Amount)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AmountVisitor;

        impl<'de> de::Visitor<'de> for AmountVisitor {
            type Value = Amount;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a non-negative integer or a decimal string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
                Ok(Amount::from(v))
            }

            fn visit_u128<E: de::Error>(self, v: u128) -> Result<Amount, E> {
                Ok(Amount(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
                u64::try_from(v)
                    .map(Amount::from)
                    .map_err(|_| E::custom(format!("negative amount: {v}")))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
                v.parse().map_err(|e| E::custom(format!("invalid amount '{v}': {e}")))
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}

// ----------------------
// Notifications
// ----------------------
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Value moved `from -> to`. Mint uses the null account as `from`, burn as `to`.
    Transfer { from: Address, to: Address, value: Amount },
    Approval { owner: Address, spender: Address, value: Amount },
}

// ----------------------
// EventRecord
// ----------------------
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub seq: u64,
    pub tx_id: String,
    pub timestamp: Timestamp,
    pub notification: Notification,
    #[serde(default)]
    pub previous_record_hash: Option<Hash>,
    pub record_hash: Hash,
    #[serde(default)]
    pub record_signature: Option<String>, // base64(ed25519(sig(record_hash bytes)))
}

// ----------------------
// Supply model
// ----------------------
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum SupplyModel {
    #[default]
    Fixed,
    Elastic { minter: Address },
}

// ----------------------
// API
// ----------------------
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TransferReq {
    pub to: Address,
    pub amount: Amount,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ApproveReq {
    pub spender: Address,
    pub amount: Amount,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TransferFromReq {
    pub from: Address,
    pub to: Address,
    pub amount: Amount,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MintReq {
    pub to: Address,
    pub amount: Amount,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BurnReq {
    pub amount: Amount,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BurnFromReq {
    pub from: Address,
    pub amount: Amount,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct EventsQuery {
    #[serde(default)]
    pub after: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_parses_with_and_without_prefix() {
        let a: Address = "0x00000000000000000000000000000000000000ff".parse().unwrap();
        let b: Address = "00000000000000000000000000000000000000FF".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "0x00000000000000000000000000000000000000ff");
        assert!(!a.is_null());
        assert!(Address::NULL.is_null());
    }

    #[test]
    fn address_rejects_wrong_length() {
        assert!("0x1234".parse::<Address>().is_err());
        assert!("0xzz00000000000000000000000000000000000000".parse::<Address>().is_err());
    }

    #[test]
    fn amount_accepts_numbers_and_strings() {
        let a: Amount = serde_json::from_str("42").unwrap();
        let b: Amount = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(a, b);
        assert!(serde_json::from_str::<Amount>("-1").is_err());

        let big = Amount::MAX;
        let s = serde_json::to_string(&big).unwrap();
        assert_eq!(serde_json::from_str::<Amount>(&s).unwrap(), big);
    }

    #[test]
    fn amount_checked_arithmetic() {
        assert_eq!(Amount::MAX.checked_add(Amount::new(1)), None);
        assert_eq!(Amount::ZERO.checked_sub(Amount::new(1)), None);
        assert_eq!(Amount::new(5).checked_sub(Amount::new(2)), Some(Amount::new(3)));
    }
}
