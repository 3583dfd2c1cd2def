use std::{fs, path::Path};

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::{rngs::OsRng, RngCore};
use serde::Serialize;

use crate::address::Address;

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("invalid public key hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("public key must be 32 bytes, got {0}")]
    InvalidLength(usize),
    #[error("not a valid ed25519 public key")]
    InvalidKey,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// An account keypair; the ledger only ever sees `address`.
pub struct AccountKey {
    signing: SigningKey,
}

#[derive(Serialize)]
pub struct AccountKeyInfo {
    pub address: Address,
    pub pk_hex: String,
}

impl AccountKey {
    pub fn generate() -> Self {
        let mut sk_bytes = [0u8; 32];
        OsRng.fill_bytes(&mut sk_bytes);
        Self::from_secret(sk_bytes)
    }

    pub fn from_secret(sk_bytes: [u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(&sk_bytes),
        }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }

    pub fn address(&self) -> Address {
        Address::from_verifying_key(&self.verifying_key())
    }

    pub fn info(&self) -> AccountKeyInfo {
        AccountKeyInfo {
            address: self.address(),
            pk_hex: hex::encode(self.verifying_key().as_bytes()),
        }
    }

    /// Writes `sk.hex`, `pk.hex` and `address.txt` into `out_dir`.
    pub fn write_to(&self, out_dir: &Path) -> Result<(), KeyError> {
        fs::create_dir_all(out_dir)?;
        fs::write(out_dir.join("sk.hex"), hex::encode(self.signing.to_bytes()))?;
        fs::write(
            out_dir.join("pk.hex"),
            hex::encode(self.verifying_key().as_bytes()),
        )?;
        fs::write(out_dir.join("address.txt"), self.address().to_string())?;
        Ok(())
    }
}

pub fn address_from_pk_hex(pk_hex: &str) -> Result<Address, KeyError> {
    let bytes = hex::decode(pk_hex.trim())?;
    let arr: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| KeyError::InvalidLength(bytes.len()))?;
    let pk = VerifyingKey::from_bytes(&arr).map_err(|_| KeyError::InvalidKey)?;
    Ok(Address::from_verifying_key(&pk))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_from_pk_hex_matches_key() {
        let key = AccountKey::from_secret([9u8; 32]);
        let info = key.info();
        assert_eq!(address_from_pk_hex(&info.pk_hex).unwrap(), key.address());
    }

    #[test]
    fn rejects_short_public_key() {
        assert!(matches!(
            address_from_pk_hex("abcd"),
            Err(KeyError::InvalidLength(2))
        ));
    }

    #[test]
    fn generated_keys_differ() {
        assert_ne!(AccountKey::generate().address(), AccountKey::generate().address());
    }

    #[test]
    fn writes_key_files() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("alice");
        let key = AccountKey::from_secret([3u8; 32]);
        key.write_to(&dir).unwrap();
        let address = fs::read_to_string(dir.join("address.txt")).unwrap();
        assert_eq!(address, key.address().to_string());
        let pk = fs::read_to_string(dir.join("pk.hex")).unwrap();
        assert_eq!(address_from_pk_hex(&pk).unwrap(), key.address());
        let sk = fs::read_to_string(dir.join("sk.hex")).unwrap();
        assert_eq!(sk, hex::encode([3u8; 32]));
    }

    #[test]
    fn info_serializes_address_and_public_key() {
        let key = AccountKey::from_secret([5u8; 32]);
        let json = serde_json::to_string(&key.info()).unwrap();
        assert_eq!(
            json,
            format!(
                r#"{{"address":"{}","pk_hex":"{}"}}"#,
                key.address(),
                hex::encode(key.verifying_key().as_bytes())
            )
        );
    }
}
