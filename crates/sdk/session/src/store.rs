//! Cached session and per-chain account addresses.

use beam_core::Session;

use crate::error::Result;
use crate::storage::{AccountAddressSlot, SessionSlot, StorageService};

/// Thin wrapper over the session slot. Unreadable data reads as no session.
#[derive(Clone)]
pub struct SessionStore {
    storage: StorageService,
}

impl SessionStore {
    pub fn new(storage: StorageService) -> Self {
        Self { storage }
    }

    pub fn get(&self) -> Option<Session> {
        self.storage.get::<SessionSlot>()
    }

    pub fn set(&self, session: &Session) -> Result<()> {
        Ok(self.storage.set::<SessionSlot>(session)?)
    }

    pub fn clear(&self) -> Result<()> {
        Ok(self.storage.remove::<SessionSlot>()?)
    }

    /// Connected account address for `chain_id`.
    pub fn address(&self, chain_id: u64) -> Option<String> {
        self.storage
            .get::<AccountAddressSlot>()
            .and_then(|mut addresses| addresses.remove(&chain_id))
            .filter(|address| !address.is_empty())
    }

    pub fn set_address(&self, chain_id: u64, address: &str) -> Result<()> {
        let mut addresses = self.storage.get::<AccountAddressSlot>().unwrap_or_default();
        addresses.insert(chain_id, address.to_string());
        Ok(self.storage.set::<AccountAddressSlot>(&addresses)?)
    }

    /// Forget every connected address.
    pub fn clear_addresses(&self) -> Result<()> {
        Ok(self.storage.remove::<AccountAddressSlot>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addresses_per_chain() {
        let store = SessionStore::new(StorageService::in_memory());
        assert_eq!(store.address(13337), None);

        store.set_address(13337, "0xaaa").unwrap();
        store.set_address(4337, "0xbbb").unwrap();

        assert_eq!(store.address(13337).as_deref(), Some("0xaaa"));
        assert_eq!(store.address(4337).as_deref(), Some("0xbbb"));

        store.clear_addresses().unwrap();
        assert_eq!(store.address(4337), None);
    }

    #[test]
    fn test_missing_session_reads_none() {
        let store = SessionStore::new(StorageService::in_memory());
        assert_eq!(store.get(), None);
        store.clear().unwrap();
    }
}
