//! Session keys, delegated sessions and interactive confirmation for Beam
//! player accounts.
//!
//! A game holds a locally generated secp256k1 key. The user delegates signing
//! rights to that key through a *session*, approved once in the identity
//! site's popup; afterwards operations are signed silently with the key.
//! Without a usable session the SDK falls back to asking the user in the
//! popup for every operation.
//!
//! Modules are organized by responsibility:
//! - [`manager`] hosts [`SessionManager`] and its builder
//! - [`confirmation`] drives the popup/overlay handshake behind [`WindowHost`]
//! - [`storage`] persists SDK state behind [`StorageBackend`]
//! - [`keys`], [`store`] and [`validity`] hold the session key, the cached
//!   session and the rules deciding whether a session is usable
//! - [`config`] selects the chain and its endpoints
pub mod config;
pub mod confirmation;
pub mod error;
pub mod keys;
pub mod manager;
pub mod storage;
pub mod store;
pub mod validity;

pub use config::{
    ChainConfig, ChainEnvironment, ConfigHandle, ConfirmationConfig, EndpointOverrides, SdkConfig,
};
pub use confirmation::{
    Confirmation, ConfirmationChannel, ConnectionResult, MessageEvent, MessageType,
    OverlayControls, OverlayHandle, OverlayKind, OverlayOptions, PopupBlocked, PopupRequest,
    PopupSize, PopupWindow, WindowHost,
};
pub use error::{ConfigError, ConfirmationError, Flow, Result, SessionError};
pub use keys::{KeyStore, SigningKey};
pub use manager::{ActiveSession, SessionManager, SessionManagerBuilder, SessionState};
pub use storage::{FileStorage, InMemoryStorage, StorageBackend, StorageError, StorageService};
pub use store::SessionStore;
pub use validity::{
    hash_message, is_session_owned_by, is_session_usable, is_session_valid, is_session_valid_at,
    verify_message_signature,
};

#[cfg(any(test, feature = "mock"))]
pub use confirmation::{MockOverlay, MockPopup, MockWindowHost};
