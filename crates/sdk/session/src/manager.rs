//! Session lifecycle orchestration.
//!
//! The manager decides, per call, whether an operation can be signed locally
//! with the delegated session key or needs the user's interactive approval
//! through the confirmation channel.

use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use alloy_primitives::Address;
use beam_core::{
    ConfirmOperationAction, ConfirmOperationRequest, ConfirmOperationStatus, ConnectionApi,
    CreateConnectionRequest, CreateOperationRequest, CreateTransactionRequest,
    GenerateSessionRequest, MessageSignatureRequest, OperationActionInput, OperationStatus,
    PlayerApi, PlayerOperation, RevokeSessionRequest, Session, TransactionInteraction,
    VerifyOwnershipRequest,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{ConfigHandle, SdkConfig};
use crate::confirmation::{ConfirmationChannel, PopupSize, WindowHost};
use crate::error::{Result, SessionError};
use crate::keys::{KeyStore, SigningKey};
use crate::storage::{StorageBackend, StorageService};
use crate::store::SessionStore;
use crate::validity::{
    hash_message, is_session_usable, is_session_valid, verify_message_signature,
};

/// Where the local session lifecycle stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No signing key has been generated yet.
    NoKey,
    /// A key exists but no usable session delegates to it.
    KeyOnly,
    /// A cached session is valid and owned by the key.
    SessionActive,
}

/// Result of resolving the local key and the best available session.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub session: Option<Session>,
    pub key: SigningKey,
}

pub struct SessionManager {
    config: ConfigHandle,
    storage: StorageService,
    keys: KeyStore,
    sessions: SessionStore,
    host: Arc<dyn WindowHost>,
    confirm: RwLock<ConfirmationChannel>,
    player_api: Arc<dyn PlayerApi>,
    connection_api: Arc<dyn ConnectionApi>,
    /// Serializes `create_session` and `revoke_session`.
    lifecycle: tokio::sync::Mutex<()>,
}

impl SessionManager {
    pub fn builder() -> SessionManagerBuilder {
        SessionManagerBuilder::default()
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    pub fn storage(&self) -> &StorageService {
        &self.storage
    }

    /// Replace the configuration and rebuild the confirmation channel.
    pub fn set_config(&self, config: SdkConfig) -> Result<()> {
        config.validate()?;
        self.config.replace(config)?;

        let channel = ConfirmationChannel::new(Arc::clone(&self.host), self.config.clone());
        let previous = {
            let mut confirm = self.confirm.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *confirm, channel)
        };
        previous.close_window();

        debug!("Configuration updated");
        Ok(())
    }

    /// Swap the storage backend for every component sharing it.
    pub fn set_storage(&self, backend: Arc<dyn StorageBackend>) -> Result<()> {
        Ok(self.storage.replace_backend(backend)?)
    }

    fn channel(&self) -> ConfirmationChannel {
        self.confirm
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Local view of the lifecycle, without contacting the service.
    pub fn session_state(&self) -> SessionState {
        let Some(key) = self.keys.current() else {
            return SessionState::NoKey;
        };
        match self.sessions.get() {
            Some(session) if is_session_usable(&session, &key) => SessionState::SessionActive,
            _ => SessionState::KeyOnly,
        }
    }

    /// Address of the local signing key, generating the key if absent.
    pub fn signing_address(&self) -> Result<Address> {
        Ok(self.keys.get_or_create_signing_key(false)?.address())
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    /// Resolve the signing key and the best session for it.
    ///
    /// Uses the cached session if still valid, otherwise asks the service for
    /// the session delegated to the key. A session that is invalid or owned
    /// by another key is removed from storage. Lookup failures are logged and
    /// treated as "no session".
    pub async fn get_active_session_and_keys(
        &self,
        entity_id: &str,
        chain_id: u64,
    ) -> Result<ActiveSession> {
        let mut session = self.sessions.get();
        let key = self.keys.get_or_create_signing_key(false)?;

        if !session.as_ref().is_some_and(is_session_valid) {
            match self
                .player_api
                .get_active_session(entity_id, &key.address(), chain_id)
                .await
            {
                Ok(Some(remote)) => session = Some(remote),
                Ok(None) => debug!("No remote session for {}", key.address()),
                Err(e) => warn!("Failed to get active session: {}", e),
            }
        }

        match session {
            Some(session) if is_session_usable(&session, &key) => {
                self.sessions.set(&session)?;
                Ok(ActiveSession {
                    session: Some(session),
                    key,
                })
            }
            _ => {
                self.sessions.clear()?;
                Ok(ActiveSession { session: None, key })
            }
        }
    }

    /// The usable session, or `NoActiveSession` after wiping local state.
    pub async fn get_active_session(&self, entity_id: &str, chain_id: u64) -> Result<Session> {
        let ActiveSession { session, .. } =
            self.get_active_session_and_keys(entity_id, chain_id).await?;

        match session {
            Some(session) => {
                debug!("Got active session {}", session.id);
                Ok(session)
            }
            None => {
                debug!("Unable to get active session");
                self.reset_local_state()?;
                Err(SessionError::NoActiveSession)
            }
        }
    }

    /// Delegate a fresh key through an interactive session request.
    ///
    /// The popup must already be open (see [`SessionManager::open_popup`]);
    /// otherwise the confirmation resolves as dismissed.
    pub async fn create_session(&self, entity_id: &str, chain_id: u64) -> Result<Session> {
        let _guard = self.lifecycle.lock().await;

        let active = self.get_active_session_and_keys(entity_id, chain_id).await?;
        if active.session.is_some() {
            info!("Already has an active session, ending early");
            return Err(SessionError::AlreadyActive);
        }

        info!("Creating a new session");
        let key = self.keys.get_or_create_signing_key(true)?;

        let request = GenerateSessionRequest {
            chain_id,
            address: key.address(),
            auth_provider: self.config.auth_provider(),
        };
        let session_request = self
            .player_api
            .create_session_request(entity_id, &request)
            .await
            .inspect_err(|e| warn!("Failed to create session request: {}", e))
            .map_err(SessionError::api("Failed to create session request"))?;
        debug!("Created session request {:?}", session_request.id);

        let confirmation = self
            .channel()
            .request_session(&session_request.url)
            .await
            .inspect_err(|e| warn!("Failed to confirm session request: {}", e))?;
        if !confirmation.is_confirmed() {
            return Err(SessionError::SessionNotConfirmed);
        }
        info!("Session request confirmed");

        self.get_active_session(entity_id, chain_id).await
    }

    /// Revoke the active session and wipe local state.
    pub async fn revoke_session(&self, entity_id: &str, chain_id: u64) -> Result<()> {
        let _guard = self.lifecycle.lock().await;

        let active = self.get_active_session_and_keys(entity_id, chain_id).await?;
        if active.session.is_none() {
            info!("No active session found, ending early");
            return Err(SessionError::NoSessionToRevoke);
        }

        info!("Revoking session");
        let key = self.keys.get_or_create_signing_key(true)?;

        let request = RevokeSessionRequest {
            chain_id,
            address: key.address(),
            auth_provider: self.config.auth_provider(),
        };
        let operation = self
            .player_api
            .revoke_session(entity_id, &request)
            .await
            .map_err(SessionError::api("Failed to get operation to revoke session"))?;

        self.confirm_operation(&operation).await?;

        let operation = self.fetch_operation(&operation.id).await?;
        if operation.status != OperationStatus::Executed {
            return Err(SessionError::OperationFailed {
                status: operation.status,
            });
        }

        self.reset_local_state()?;
        info!("Session revoked");
        Ok(())
    }

    /// Forget the session, key and connected addresses. No remote call.
    pub fn clear_session(&self) -> Result<()> {
        self.reset_local_state()
    }

    /// Remove every SDK key from storage.
    pub fn reset_local_state(&self) -> Result<()> {
        self.storage.clear()?;
        Ok(())
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Sign an operation with the session key, or in the popup when there is
    /// no usable session and `use_browser_fallback` is set.
    pub async fn sign_operation(
        &self,
        entity_id: &str,
        operation_id: &str,
        chain_id: u64,
        use_browser_fallback: bool,
    ) -> Result<PlayerOperation> {
        let active = self.get_active_session_and_keys(entity_id, chain_id).await?;

        debug!("Retrieving operation {}", operation_id);
        let operation = self.fetch_operation(operation_id).await?;

        if active.session.is_some() {
            return self.sign_operation_using_session(&operation, &active.key).await;
        }

        if use_browser_fallback {
            return self
                .with_confirmation_screen(None, self.sign_operation_using_browser(&operation))
                .await;
        }

        Err(SessionError::NoSessionNoFallback)
    }

    async fn sign_operation_using_session(
        &self,
        operation: &PlayerOperation,
        key: &SigningKey,
    ) -> Result<PlayerOperation> {
        if operation.actions.is_empty() {
            return Err(SessionError::NoActions);
        }

        let mut actions = Vec::with_capacity(operation.actions.len());
        let mut failure = None;

        for action in &operation.actions {
            let Some(request) = action.signature.as_ref() else {
                continue;
            };
            match key.sign_hash(&request.hash) {
                Ok(signature) => actions.push(ConfirmOperationAction {
                    id: action.id.clone(),
                    signature,
                }),
                Err(e) => {
                    warn!("Failed to provide signature for {}: {}", action.id, e);
                    failure = Some(e);
                }
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }

        let request = ConfirmOperationRequest {
            status: ConfirmOperationStatus::Pending,
            actions,
        };
        let result = self
            .player_api
            .process_operation(&operation.id, &request)
            .await
            .map_err(SessionError::api("Failed to sign operation"))?;

        if !result.status.is_accepted_after_signing() {
            warn!("Operation {} failed with status {}", operation.id, result.status);
            return Err(SessionError::OperationFailed {
                status: result.status,
            });
        }
        info!("Operation {} signed: {}", operation.id, result.status);

        self.fetch_operation(&operation.id).await
    }

    async fn sign_operation_using_browser(
        &self,
        operation: &PlayerOperation,
    ) -> Result<PlayerOperation> {
        self.confirm_operation(operation).await?;
        self.fetch_operation(&operation.id).await
    }

    /// Run the interactive operation confirmation in the popup.
    async fn confirm_operation(&self, operation: &PlayerOperation) -> Result<()> {
        let url = operation
            .url
            .as_deref()
            .ok_or_else(|| SessionError::MissingUrl(operation.id.clone()))?;

        debug!("Signing operation using browser: {}", operation.id);
        let confirmation = self
            .channel()
            .sign_operation(url)
            .await
            .inspect_err(|e| warn!("Failed to sign operation: {}", e))?;

        if !confirmation.is_confirmed() {
            return Err(SessionError::OperationNotConfirmed);
        }
        Ok(())
    }

    async fn fetch_operation(&self, operation_id: &str) -> Result<PlayerOperation> {
        self.player_api
            .get_operation(operation_id)
            .await
            .map_err(|source| SessionError::OperationNotFound {
                operation_id: operation_id.to_string(),
                source,
            })
    }

    /// Ask the user to sign `data` (a string message or typed data) with
    /// their account and return the signature.
    pub async fn sign_message_or_data(
        &self,
        chain_id: u64,
        account_address: &str,
        data: Value,
    ) -> Result<String> {
        self.with_confirmation_screen(None, async {
            debug!("Requesting signature");
            let request = CreateOperationRequest {
                account_address: account_address.to_string(),
                chain_id,
                actions: vec![OperationActionInput::sign(data)],
                auth_provider: self.config.auth_provider(),
            };
            let operation = self
                .connection_api
                .create_operation(&request)
                .await
                .map_err(SessionError::api("Failed to get operation"))?;

            self.confirm_operation(&operation).await?;

            let operation = self.fetch_operation(&operation.id).await?;
            if operation.status != OperationStatus::Executed {
                return Err(SessionError::OperationFailed {
                    status: operation.status,
                });
            }

            operation
                .actions
                .first()
                .and_then(|action| action.signature.as_ref())
                .and_then(|request| request.signature.clone())
                .ok_or(SessionError::MissingSignature)
        })
        .await
    }

    /// Create a transaction for `account_address`, confirm it in the popup,
    /// and return the resulting operation.
    pub async fn send_transaction(
        &self,
        account_address: &str,
        chain_id: u64,
        sponsor: bool,
        interaction: TransactionInteraction,
    ) -> Result<PlayerOperation> {
        self.with_confirmation_screen(None, async {
            debug!("Sending transaction");
            let request = CreateTransactionRequest {
                account_address: account_address.to_string(),
                chain_id,
                sponsor,
                interactions: vec![interaction],
                auth_provider: self.config.auth_provider(),
            };
            let operation = self
                .connection_api
                .create_transaction_for_address(&request)
                .await
                .map_err(SessionError::api("Failed to get operation"))?;

            self.confirm_operation(&operation).await?;
            self.fetch_operation(&operation.id).await
        })
        .await
    }

    // ========================================================================
    // Accounts
    // ========================================================================

    /// The account address for `chain_id`, connecting interactively if none
    /// is cached. `message` is signed by the owner and verified locally.
    pub async fn connect(&self, chain_id: u64, message: &str) -> Result<String> {
        if let Some(address) = self.get_address(chain_id) {
            return Ok(address);
        }

        self.with_confirmation_screen(None, async {
            let request = MessageSignatureRequest {
                chain_id,
                message: hash_message(message),
                auth_provider: self.config.auth_provider(),
            };
            let response = self
                .connection_api
                .get_message_signature_url(&request)
                .await
                .map_err(SessionError::api("Failed to get address"))?;

            let result = self
                .channel()
                .request_connection(&response.url)
                .await?
                .confirmed()
                .ok_or(SessionError::ConnectionNotConfirmed)?;

            let signature = result.signature.as_deref().ok_or_else(|| {
                SessionError::Validation("connection result has no signature".to_string())
            })?;
            let owner = result.owner_address.as_deref().ok_or_else(|| {
                SessionError::Validation("connection result has no owner address".to_string())
            })?;
            verify_message_signature(message, signature, owner)?;

            if result.address.is_empty() {
                return Err(SessionError::Validation("Failed to get address".to_string()));
            }

            self.set_address(chain_id, &result.address)?;
            info!("Connected {} on chain {}", result.address, chain_id);
            Ok(result.address)
        })
        .await
    }

    /// Link the player entity to the user's account through a connection request.
    pub async fn connect_user_to_game(&self, entity_id: &str, chain_id: u64) -> Result<()> {
        info!("Connecting user to game");
        let request = CreateConnectionRequest {
            entity_id: entity_id.to_string(),
            chain_id,
            auth_provider: self.config.auth_provider(),
        };
        let response = self
            .player_api
            .create_connection_request(&request)
            .await
            .map_err(SessionError::api("Failed to create connection request"))?;

        debug!("Opening connection request URL: {}", response.url);
        self.with_confirmation_screen(None, async {
            let confirmation = self.channel().request_connection(&response.url).await?;
            if !confirmation.is_confirmed() {
                return Err(SessionError::ConnectionNotConfirmed);
            }
            info!("Connection request successful");
            Ok(())
        })
        .await
    }

    pub async fn verify_ownership(
        &self,
        address: &str,
        owner_address: &str,
        chain_id: u64,
    ) -> Result<bool> {
        let request = VerifyOwnershipRequest {
            account_address: address.to_string(),
            owner_address: owner_address.to_string(),
            chain_id,
        };
        self.connection_api
            .verify_ownership(&request)
            .await
            .map_err(SessionError::api("Failed to verify ownership"))
    }

    pub fn get_address(&self, chain_id: u64) -> Option<String> {
        self.sessions.address(chain_id)
    }

    pub fn set_address(&self, chain_id: u64, address: &str) -> Result<()> {
        self.sessions.set_address(chain_id, address)
    }

    /// Forget every connected account address.
    pub fn clear_addresses(&self) -> Result<()> {
        self.sessions.clear_addresses()
    }

    // ========================================================================
    // Popup
    // ========================================================================

    /// Pre-open the confirmation popup on its loading page.
    pub fn open_popup(&self, size: Option<PopupSize>) -> Result<()> {
        Ok(self.channel().loading(size)?)
    }

    pub fn close_popup(&self) {
        self.channel().close_window();
    }

    /// Open the popup, run `task`, and close the popup if `task` fails
    /// (kept open in debug mode).
    pub async fn with_confirmation_screen<T>(
        &self,
        size: Option<PopupSize>,
        task: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        self.open_popup(size)?;

        let result = task.await;
        if let Err(e) = &result {
            debug!("Confirmation task failed: {}", e);
            if !self.config.debug() {
                self.close_popup();
            }
        }
        result
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`SessionManager`].
#[derive(Default)]
pub struct SessionManagerBuilder {
    config: Option<ConfigHandle>,
    storage: Option<StorageService>,
    host: Option<Arc<dyn WindowHost>>,
    player_api: Option<Arc<dyn PlayerApi>>,
    connection_api: Option<Arc<dyn ConnectionApi>>,
}

impl SessionManagerBuilder {
    pub fn config(mut self, config: SdkConfig) -> Self {
        self.config = Some(ConfigHandle::new(config));
        self
    }

    /// Share an existing configuration handle.
    pub fn config_handle(mut self, config: ConfigHandle) -> Self {
        self.config = Some(config);
        self
    }

    /// Defaults to in-memory storage.
    pub fn storage(mut self, storage: StorageService) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn window_host(mut self, host: Arc<dyn WindowHost>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn player_api(mut self, api: Arc<dyn PlayerApi>) -> Self {
        self.player_api = Some(api);
        self
    }

    pub fn connection_api(mut self, api: Arc<dyn ConnectionApi>) -> Self {
        self.connection_api = Some(api);
        self
    }

    /// Use one client for both the player and connection services.
    pub fn api<A>(self, api: Arc<A>) -> Self
    where
        A: PlayerApi + ConnectionApi + 'static,
    {
        self.player_api(api.clone()).connection_api(api)
    }

    pub fn build(self) -> Result<SessionManager> {
        let config = self.config.ok_or(SessionError::MissingComponent("config"))?;
        config.snapshot()?.validate()?;

        let host = self.host.ok_or(SessionError::MissingComponent("window host"))?;
        let player_api = self
            .player_api
            .ok_or(SessionError::MissingComponent("player api"))?;
        let connection_api = self
            .connection_api
            .ok_or(SessionError::MissingComponent("connection api"))?;
        let storage = self.storage.unwrap_or_default();

        let confirm = ConfirmationChannel::new(Arc::clone(&host), config.clone());

        Ok(SessionManager {
            keys: KeyStore::new(storage.clone()),
            sessions: SessionStore::new(storage.clone()),
            storage,
            config,
            host,
            confirm: RwLock::new(confirm),
            player_api,
            connection_api,
            lifecycle: tokio::sync::Mutex::new(()),
        })
    }
}
