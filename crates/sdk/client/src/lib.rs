//! Composition root for the Beam player SDK.
//!
//! ```text
//! BeamClient
//!   ├─→ SessionManager (keys, sessions, confirmation popup)
//!   │     ├─→ HttpApiClient (player + connection services)
//!   │     └─→ WindowHost (browser, terminal or test host)
//!   └─→ Eip1193Provider (on demand, backed by HttpRpcTransport)
//! ```
//!
//! The HTTP clients resolve their endpoint from the shared configuration on
//! every request, so switching chains needs no rebuild.
mod builder;
pub mod dirs;
pub mod logging;
pub mod terminal;

pub use builder::{BeamClientBuilder, RpcFactory};
pub use terminal::{TerminalInput, TerminalWindowHost, parse_line};

use std::sync::Arc;

use beam_core::{PlayerOperation, Session};
use beam_provider::Eip1193Provider;
use beam_session::{
    ConfigHandle, PopupSize, Result, SdkConfig, SessionManager, SessionState, StorageBackend,
};
use tracing::info;

/// Entry points of the SDK for a game or wallet frontend.
pub struct BeamClient {
    manager: Arc<SessionManager>,
    rpc_factory: Arc<RpcFactory>,
}

impl BeamClient {
    pub fn builder() -> BeamClientBuilder {
        BeamClientBuilder::new()
    }

    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    pub fn config(&self) -> &ConfigHandle {
        self.manager.config()
    }

    /// Numeric id of the active chain.
    pub fn chain_id(&self) -> Result<u64> {
        Ok(self.config().chain_id()?.id())
    }

    /// Replace the configuration; an open popup is closed.
    pub fn set_config(&self, config: SdkConfig) -> Result<()> {
        self.manager.set_config(config)
    }

    /// Read and write state through `backend` from now on. Nothing is copied
    /// over from the previous backend.
    pub fn set_storage(&self, backend: Arc<dyn StorageBackend>) -> Result<()> {
        self.manager.set_storage(backend)
    }

    pub fn session_state(&self) -> SessionState {
        self.manager.session_state()
    }

    /// Address of the local signing key, generating the key if absent.
    pub fn signing_address(&self) -> Result<String> {
        Ok(self.manager.signing_address()?.to_string())
    }

    pub async fn get_active_session(&self, entity_id: &str, chain_id: u64) -> Result<Session> {
        self.manager.get_active_session(entity_id, chain_id).await
    }

    /// Ask the user to approve a new session. Call [`BeamClient::open_popup`]
    /// first so the popup exists when the request URL arrives.
    pub async fn create_session(&self, entity_id: &str, chain_id: u64) -> Result<Session> {
        let session = self.manager.create_session(entity_id, chain_id).await?;
        info!("Session {} created for {}", session.id, entity_id);
        Ok(session)
    }

    /// Ask the user to revoke the current session. Needs an open popup, like
    /// [`BeamClient::create_session`].
    pub async fn revoke_session(&self, entity_id: &str, chain_id: u64) -> Result<()> {
        self.manager.revoke_session(entity_id, chain_id).await?;
        info!("Session revoked for {}", entity_id);
        Ok(())
    }

    /// Forget the local key, session and connected addresses.
    pub fn clear_session(&self) -> Result<()> {
        self.manager.clear_session()
    }

    pub async fn sign_operation(
        &self,
        entity_id: &str,
        operation_id: &str,
        chain_id: u64,
        use_browser_fallback: bool,
    ) -> Result<PlayerOperation> {
        self.manager
            .sign_operation(entity_id, operation_id, chain_id, use_browser_fallback)
            .await
    }

    /// Connect the player's account and return its address.
    pub async fn connect(&self, chain_id: u64, message: &str) -> Result<String> {
        self.manager.connect(chain_id, message).await
    }

    pub async fn verify_ownership(
        &self,
        address: &str,
        owner_address: &str,
        chain_id: u64,
    ) -> Result<bool> {
        self.manager
            .verify_ownership(address, owner_address, chain_id)
            .await
    }

    pub fn open_popup(&self, size: Option<PopupSize>) -> Result<()> {
        self.manager.open_popup(size)
    }

    pub fn close_popup(&self) {
        self.manager.close_popup();
    }

    /// An EIP-1193 provider sharing this client's sessions and configuration.
    pub fn connect_provider(&self) -> Result<Eip1193Provider> {
        let factory = Arc::clone(&self.rpc_factory);
        let provider = Eip1193Provider::new(Arc::clone(&self.manager), move |environment| {
            factory(environment)
        })?;
        Ok(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beam_core::{ApiCall, ChainId, MockApi, MockRpcTransport, RpcTransport};
    use beam_provider::RequestArguments;
    use beam_session::{
        ChainConfig, ChainEnvironment, InMemoryStorage, MockWindowHost, SessionError,
    };
    use serde_json::json;

    const ENTITY: &str = "player-1";

    fn config() -> SdkConfig {
        SdkConfig::new(vec![ChainConfig::new(ChainId::BeamTestnet, "pk")]).unwrap()
    }

    fn client(api: &MockApi, rpc: &MockRpcTransport) -> BeamClient {
        let rpc = rpc.clone();
        BeamClient::builder()
            .config(config())
            .window_host(Arc::new(MockWindowHost::new()))
            .api(Arc::new(api.clone()))
            .rpc_factory(move |_: &ChainEnvironment| -> Arc<dyn RpcTransport> {
                Arc::new(rpc.clone())
            })
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_missing_session_is_reported() {
        let api = MockApi::new("https://identity.beta.onbeam.com");
        let client = client(&api, &MockRpcTransport::new(13337));

        let error = client.get_active_session(ENTITY, 13337).await.unwrap_err();

        assert!(matches!(error, SessionError::NoActiveSession));
        assert_eq!(client.session_state(), SessionState::NoKey);
        assert_eq!(
            api.count(|call| matches!(call, ApiCall::GetActiveSession { .. })),
            1
        );
    }

    #[tokio::test]
    async fn test_provider_forwards_node_queries() {
        let rpc = MockRpcTransport::new(13337);
        rpc.respond("eth_blockNumber", json!("0x10"));
        let client = client(&MockApi::new("https://identity.beta.onbeam.com"), &rpc);

        let provider = client.connect_provider().unwrap();
        let block = provider
            .request(RequestArguments::new("eth_blockNumber"))
            .await
            .unwrap();

        assert_eq!(block, json!("0x10"));
        assert_eq!(rpc.calls().last().unwrap().0, "eth_blockNumber");
    }

    #[test]
    fn test_set_storage_switches_backend() {
        let client = client(
            &MockApi::new("https://identity.beta.onbeam.com"),
            &MockRpcTransport::new(13337),
        );
        let address = client.signing_address().unwrap();
        assert_eq!(client.session_state(), SessionState::KeyOnly);

        client
            .set_storage(Arc::new(InMemoryStorage::new()))
            .unwrap();

        assert_eq!(client.session_state(), SessionState::NoKey);
        assert_ne!(client.signing_address().unwrap(), address);
        assert_eq!(client.chain_id().unwrap(), 13337);
    }
}
