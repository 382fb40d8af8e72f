//! Local persistence for SDK state.
//!
//! Backends store raw strings under string keys, mirroring the web storage
//! interface. [`StorageService`] layers typed JSON slots on top and owns the
//! policy for missing or corrupt values.
//!
//! - [`InMemoryStorage`]: process-local, used in tests and ephemeral clients
//! - [`FileStorage`]: one file per key, atomic writes

mod error;
mod file;
mod memory;
mod service;

pub use error::{Result, StorageError};
pub use file::FileStorage;
pub use memory::InMemoryStorage;
pub use service::{
    AccessTokenSlot, AccountAddressSlot, SessionSlot, SigningKeySlot, StorageKey, StorageService,
    StorageSlot,
};

/// Raw key/value backend.
///
/// Implementations must be safe to share across tasks; the service never
/// holds a backend lock across an `.await`.
pub trait StorageBackend: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Removing a missing key is not an error.
    fn remove_item(&self, key: &str) -> Result<()>;
}
