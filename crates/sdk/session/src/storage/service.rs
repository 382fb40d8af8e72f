//! Typed JSON slots over a swappable backend.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use beam_core::Session;
use serde::Serialize;
use serde::de::DeserializeOwned;
use strum::{AsRefStr, EnumIter, IntoEnumIterator};

use super::{InMemoryStorage, Result, StorageBackend, StorageError};

/// Every key the SDK writes. `clear` touches nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumIter)]
pub enum StorageKey {
    #[strum(serialize = "beam.account-address")]
    AccountAddress,

    #[strum(serialize = "beam.access-token")]
    AccessToken,

    #[strum(serialize = "beam.session")]
    Session,

    #[strum(serialize = "beam.signing-key")]
    SigningKey,
}

/// A storage key paired with the type stored under it.
pub trait StorageSlot {
    const KEY: StorageKey;
    type Value: Serialize + DeserializeOwned;
}

/// Connected account address per numeric chain id.
pub struct AccountAddressSlot;

impl StorageSlot for AccountAddressSlot {
    const KEY: StorageKey = StorageKey::AccountAddress;
    type Value = BTreeMap<u64, String>;
}

pub struct AccessTokenSlot;

impl StorageSlot for AccessTokenSlot {
    const KEY: StorageKey = StorageKey::AccessToken;
    type Value = String;
}

pub struct SessionSlot;

impl StorageSlot for SessionSlot {
    const KEY: StorageKey = StorageKey::Session;
    type Value = Session;
}

/// Hex-encoded secp256k1 private key.
pub struct SigningKeySlot;

impl StorageSlot for SigningKeySlot {
    const KEY: StorageKey = StorageKey::SigningKey;
    type Value = String;
}

/// Typed access to SDK state.
///
/// Cloning shares the backend, and [`StorageService::replace_backend`] is
/// visible through every clone.
#[derive(Clone)]
pub struct StorageService {
    backend: Arc<RwLock<Arc<dyn StorageBackend>>>,
}

impl StorageService {
    pub fn new(backend: impl StorageBackend + 'static) -> Self {
        Self::from_shared(Arc::new(backend))
    }

    pub fn from_shared(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend: Arc::new(RwLock::new(backend)),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(InMemoryStorage::new())
    }

    /// Swap the backend for every holder of this service.
    pub fn replace_backend(&self, backend: Arc<dyn StorageBackend>) -> Result<()> {
        let mut current = self.backend.write().map_err(|_| StorageError::LockPoisoned)?;
        *current = backend;
        tracing::debug!("Storage backend replaced");
        Ok(())
    }

    fn backend(&self) -> Result<Arc<dyn StorageBackend>> {
        self.backend
            .read()
            .map(|backend| Arc::clone(&backend))
            .map_err(|_| StorageError::LockPoisoned)
    }

    /// Read a slot. Missing, `null`, `undefined` and undecodable values all
    /// read as `None`.
    pub fn get<S: StorageSlot>(&self) -> Option<S::Value> {
        let key = S::KEY.as_ref();

        let raw = match self.backend().and_then(|backend| backend.get_item(key)) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", key, e);
                return None;
            }
        };

        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "null" || trimmed == "undefined" {
            return None;
        }

        match serde_json::from_str(trimmed) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Discarding corrupt value under {}: {}", key, e);
                None
            }
        }
    }

    pub fn set<S: StorageSlot>(&self, value: &S::Value) -> Result<()> {
        let raw =
            serde_json::to_string(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.backend()?.set_item(S::KEY.as_ref(), &raw)
    }

    pub fn remove<S: StorageSlot>(&self) -> Result<()> {
        self.backend()?.remove_item(S::KEY.as_ref())
    }

    /// Remove every SDK key, leaving foreign keys untouched.
    pub fn clear(&self) -> Result<()> {
        let backend = self.backend()?;
        for key in StorageKey::iter() {
            backend.remove_item(key.as_ref())?;
        }
        tracing::debug!("Cleared local SDK state");
        Ok(())
    }
}

impl Default for StorageService {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample_session() -> Session {
        Session {
            id: "session-1".into(),
            is_active: true,
            session_address: "0x00000000000000000000000000000000000000aa".into(),
            start_time: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            end_time: Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()),
        }
    }

    #[test]
    fn test_session_round_trip() {
        let storage = StorageService::in_memory();
        let session = sample_session();

        storage.set::<SessionSlot>(&session).unwrap();
        assert_eq!(storage.get::<SessionSlot>(), Some(session));

        storage.remove::<SessionSlot>().unwrap();
        assert_eq!(storage.get::<SessionSlot>(), None);
    }

    #[test]
    fn test_account_addresses_keyed_by_chain() {
        let storage = StorageService::in_memory();
        let mut addresses = BTreeMap::new();
        addresses.insert(13337, "0xabc".to_string());

        storage.set::<AccountAddressSlot>(&addresses).unwrap();
        let stored = storage.get::<AccountAddressSlot>().unwrap();
        assert_eq!(stored.get(&13337).map(String::as_str), Some("0xabc"));
    }

    #[test]
    fn test_null_like_values_read_as_none() {
        let backend = Arc::new(InMemoryStorage::new());
        let storage = StorageService::from_shared(backend.clone());

        for raw in ["null", "undefined", "", "{not json"] {
            backend.set_item("beam.session", raw).unwrap();
            assert_eq!(storage.get::<SessionSlot>(), None, "raw value {raw:?}");
        }
    }

    #[test]
    fn test_clear_only_removes_sdk_keys() {
        let backend = Arc::new(InMemoryStorage::new());
        let storage = StorageService::from_shared(backend.clone());

        backend.set_item("app.theme", "\"dark\"").unwrap();
        storage.set::<SigningKeySlot>(&"0x01".to_string()).unwrap();
        storage.set::<AccessTokenSlot>(&"token".to_string()).unwrap();
        storage.set::<SessionSlot>(&sample_session()).unwrap();

        storage.clear().unwrap();

        assert_eq!(storage.get::<SigningKeySlot>(), None);
        assert_eq!(storage.get::<AccessTokenSlot>(), None);
        assert_eq!(storage.get::<SessionSlot>(), None);
        assert_eq!(backend.get_item("app.theme").unwrap().as_deref(), Some("\"dark\""));
    }

    #[test]
    fn test_replace_backend_is_shared() {
        let storage = StorageService::in_memory();
        let other = storage.clone();
        storage.set::<AccessTokenSlot>(&"old".to_string()).unwrap();

        storage.replace_backend(Arc::new(InMemoryStorage::new())).unwrap();

        assert_eq!(other.get::<AccessTokenSlot>(), None);
        other.set::<AccessTokenSlot>(&"new".to_string()).unwrap();
        assert_eq!(storage.get::<AccessTokenSlot>().as_deref(), Some("new"));
    }
}
