//! Session signing keys.

use std::fmt;

use alloy_primitives::{Address, B256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;

use crate::error::{Result, SessionError};
use crate::storage::{SigningKeySlot, StorageService};

/// Locally generated secp256k1 key whose address a session delegates to.
#[derive(Clone)]
pub struct SigningKey {
    signer: PrivateKeySigner,
}

impl SigningKey {
    pub fn random() -> Self {
        Self {
            signer: PrivateKeySigner::random(),
        }
    }

    /// Parse a `0x`-prefixed or bare 32-byte hex private key.
    pub fn from_hex(hex_key: &str) -> Result<Self> {
        let bytes: B256 = hex_key
            .trim()
            .parse()
            .map_err(|e| SessionError::Signing(format!("invalid private key: {e}")))?;
        let signer = PrivateKeySigner::from_bytes(&bytes)
            .map_err(|e| SessionError::Signing(format!("invalid private key: {e}")))?;
        Ok(Self { signer })
    }

    /// `0x`-prefixed hex encoding of the private key.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.signer.to_bytes()))
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Sign a 32-byte digest and return the 65-byte `r || s || v` signature
    /// as `0x` hex, `v` being 27 or 28.
    pub fn sign_hash(&self, hash: &str) -> Result<String> {
        let digest: B256 = hash
            .trim()
            .parse()
            .map_err(|e| SessionError::Signing(format!("invalid hash {hash}: {e}")))?;
        let signature = self
            .signer
            .sign_hash_sync(&digest)
            .map_err(|e| SessionError::Signing(e.to_string()))?;
        Ok(format!("0x{}", hex::encode(signature.as_bytes())))
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

impl PartialEq for SigningKey {
    fn eq(&self, other: &Self) -> bool {
        self.signer.to_bytes() == other.signer.to_bytes()
    }
}

impl Eq for SigningKey {}

/// Persists the signing key in the shared storage.
#[derive(Clone)]
pub struct KeyStore {
    storage: StorageService,
}

impl KeyStore {
    pub fn new(storage: StorageService) -> Self {
        Self { storage }
    }

    /// The stored key, if present and readable.
    pub fn current(&self) -> Option<SigningKey> {
        let stored = self.storage.get::<SigningKeySlot>()?;
        match SigningKey::from_hex(&stored) {
            Ok(key) => Some(key),
            Err(e) => {
                tracing::warn!("Ignoring unreadable signing key: {}", e);
                None
            }
        }
    }

    /// Return the stored key, or generate and persist a new one when none is
    /// stored or `refresh` is set.
    pub fn get_or_create_signing_key(&self, refresh: bool) -> Result<SigningKey> {
        if !refresh && let Some(key) = self.current() {
            return Ok(key);
        }

        let key = SigningKey::random();
        self.storage.set::<SigningKeySlot>(&key.to_hex())?;
        tracing::debug!("Generated signing key for {}", key.address());

        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Signature;
    use std::str::FromStr;

    #[test]
    fn test_hex_round_trip() {
        let key = SigningKey::random();
        let parsed = SigningKey::from_hex(&key.to_hex()).unwrap();
        assert_eq!(parsed, key);
        assert_eq!(parsed.address(), key.address());
    }

    #[test]
    fn test_sign_hash_recovers_address() {
        let key = SigningKey::random();
        let hash = B256::repeat_byte(0x42);

        let signature = key.sign_hash(&hash.to_string()).unwrap();
        assert_eq!(signature.len(), 2 + 130);
        assert!(signature.ends_with("1b") || signature.ends_with("1c"));

        let parsed = Signature::from_str(&signature).unwrap();
        assert_eq!(parsed.recover_address_from_prehash(&hash).unwrap(), key.address());
    }

    #[test]
    fn test_sign_rejects_bad_hash() {
        let key = SigningKey::random();
        assert!(matches!(key.sign_hash("0x1234"), Err(SessionError::Signing(_))));
    }

    #[test]
    fn test_get_or_create_reuses_and_refreshes() {
        let keys = KeyStore::new(StorageService::in_memory());
        assert!(keys.current().is_none());

        let first = keys.get_or_create_signing_key(false).unwrap();
        assert_eq!(keys.get_or_create_signing_key(false).unwrap(), first);

        let refreshed = keys.get_or_create_signing_key(true).unwrap();
        assert_ne!(refreshed, first);
        assert_eq!(keys.current(), Some(refreshed));
    }

    #[test]
    fn test_corrupt_key_is_replaced() {
        let storage = StorageService::in_memory();
        storage.set::<SigningKeySlot>(&"not-a-key".to_string()).unwrap();

        let keys = KeyStore::new(storage);
        assert!(keys.current().is_none());
        assert!(keys.get_or_create_signing_key(false).is_ok());
        assert!(keys.current().is_some());
    }
}
