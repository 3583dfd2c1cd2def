use std::{fmt, str::FromStr};

use ed25519_dalek::VerifyingKey;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

pub const ADDRESS_LEN: usize = 20;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AddressError {
    #[error("invalid hex in address: {0}")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("address must be {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Account identity on the ledger.
///
/// `Address::ZERO` is reserved: it never holds a balance and is rejected as a
/// recipient, spender or sender by every mutating ledger operation.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    pub const ZERO: Address = Address([0u8; ADDRESS_LEN]);

    pub const fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Last 20 bytes of `sha256("addr" || pk)`.
    pub fn from_verifying_key(pk: &VerifyingKey) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"addr");
        hasher.update(pk.as_bytes());
        let digest: [u8; 32] = hasher.finalize().into();
        let mut out = [0u8; ADDRESS_LEN];
        out.copy_from_slice(&digest[32 - ADDRESS_LEN..]);
        Self(out)
    }
}

impl From<[u8; ADDRESS_LEN]> for Address {
    fn from(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        let bytes = hex::decode(s)?;
        let arr: [u8; ADDRESS_LEN] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| AddressError::InvalidLength {
                    expected: ADDRESS_LEN,
                    actual: bytes.len(),
                })?;
        Ok(Self(arr))
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

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;

    #[test]
    fn parses_with_and_without_prefix() {
        let hex = "00112233445566778899aabbccddeeff00112233";
        let a: Address = format!("0x{hex}").parse().unwrap();
        let b: Address = hex.parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), format!("0x{hex}"));
    }

    #[test]
    fn zero_is_distinguished() {
        let zero: Address = "0x0000000000000000000000000000000000000000".parse().unwrap();
        assert_eq!(zero, Address::ZERO);
        assert!(zero.is_zero());
        assert!(!Address::from_bytes([1u8; ADDRESS_LEN]).is_zero());
    }

    #[test]
    fn rejects_wrong_length_and_bad_hex() {
        assert_eq!(
            "0xdeadbeef".parse::<Address>(),
            Err(AddressError::InvalidLength {
                expected: ADDRESS_LEN,
                actual: 4
            })
        );
        assert!(matches!(
            "0xzz".parse::<Address>(),
            Err(AddressError::InvalidHex(_))
        ));
    }

    #[test]
    fn derivation_from_key_is_deterministic() {
        let sk = SigningKey::from_bytes(&[7u8; 32]);
        let pk = sk.verifying_key();
        let a = Address::from_verifying_key(&pk);
        assert_eq!(a, Address::from_verifying_key(&pk));
        assert!(!a.is_zero());
        let other = SigningKey::from_bytes(&[8u8; 32]).verifying_key();
        assert_ne!(a, Address::from_verifying_key(&other));
    }

    #[test]
    fn serializes_as_hex_string() {
        let a = Address::from_bytes([0xab; ADDRESS_LEN]);
        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, format!("\"{a}\""));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);
    }
}
