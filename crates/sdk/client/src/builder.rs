//! Builder wiring the session manager to HTTP clients or injected doubles.

use std::sync::Arc;

use anyhow::{Context, Result};
use beam_api::{ApiEndpoint, HttpApiClient, HttpRpcTransport};
use beam_core::{ApiError, ConnectionApi, PlayerApi, RpcTransport};
use beam_session::{
    ChainEnvironment, ConfigHandle, SdkConfig, SessionManager, StorageBackend, StorageService,
    WindowHost,
};

use crate::BeamClient;

/// Builds the node transport for a chain.
pub type RpcFactory = dyn Fn(&ChainEnvironment) -> Arc<dyn RpcTransport> + Send + Sync;

/// Builder for [`BeamClient`].
///
/// Config and window host are required. The player and connection services
/// default to [`HttpApiClient`], the node transport to [`HttpRpcTransport`],
/// and storage to memory.
#[derive(Default)]
pub struct BeamClientBuilder {
    config: Option<SdkConfig>,
    storage: Option<Arc<dyn StorageBackend>>,
    window_host: Option<Arc<dyn WindowHost>>,
    player_api: Option<Arc<dyn PlayerApi>>,
    connection_api: Option<Arc<dyn ConnectionApi>>,
    rpc_factory: Option<Arc<RpcFactory>>,
}

impl BeamClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration (required).
    pub fn config(mut self, config: SdkConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn storage(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.storage = Some(backend);
        self
    }

    /// Set the host that opens confirmation popups (required).
    pub fn window_host(mut self, host: Arc<dyn WindowHost>) -> Self {
        self.window_host = Some(host);
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

    /// Use one implementation for both services.
    pub fn api<A>(self, api: Arc<A>) -> Self
    where
        A: PlayerApi + ConnectionApi + 'static,
    {
        self.player_api(api.clone()).connection_api(api)
    }

    pub fn rpc_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&ChainEnvironment) -> Arc<dyn RpcTransport> + Send + Sync + 'static,
    {
        self.rpc_factory = Some(Arc::new(factory));
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns an error if config or window host is missing, or the config
    /// does not validate.
    pub fn build(self) -> Result<BeamClient> {
        let config = self
            .config
            .context("Config is required. Use .config() to set it.")?;

        let host = self
            .window_host
            .context("Window host is required. Use .window_host() to set it.")?;

        let config = ConfigHandle::new(config);
        let http = Arc::new(http_api_client(config.clone()));
        let player_api: Arc<dyn PlayerApi> = match self.player_api {
            Some(api) => api,
            None => http.clone(),
        };
        let connection_api: Arc<dyn ConnectionApi> = match self.connection_api {
            Some(api) => api,
            None => http,
        };

        let storage = self
            .storage
            .map(StorageService::from_shared)
            .unwrap_or_default();

        let manager = SessionManager::builder()
            .config_handle(config)
            .storage(storage)
            .window_host(host)
            .player_api(player_api)
            .connection_api(connection_api)
            .build()
            .context("Failed to build session manager")?;

        let rpc_factory: Arc<RpcFactory> = match self.rpc_factory {
            Some(factory) => factory,
            None => Arc::new(http_rpc_transport),
        };

        Ok(BeamClient {
            manager: Arc::new(manager),
            rpc_factory,
        })
    }
}

/// API client that follows the active chain's endpoint and key.
fn http_api_client(config: ConfigHandle) -> HttpApiClient {
    HttpApiClient::with_resolver(move || endpoint_for(&config))
}

fn endpoint_for(config: &ConfigHandle) -> Result<ApiEndpoint, ApiError> {
    let environment = config
        .environment()
        .map_err(|e| ApiError::Config(e.to_string()))?;
    Ok(ApiEndpoint::new(
        environment.api_url,
        environment.publishable_key,
    ))
}

fn http_rpc_transport(environment: &ChainEnvironment) -> Arc<dyn RpcTransport> {
    Arc::new(HttpRpcTransport::new(environment.rpc_url.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use beam_core::ChainId;
    use beam_session::{ChainConfig, MockWindowHost};

    fn config() -> SdkConfig {
        SdkConfig::new(vec![ChainConfig::new(ChainId::BeamTestnet, "pk")]).unwrap()
    }

    #[test]
    fn test_build_requires_config() {
        let error = BeamClientBuilder::new()
            .window_host(Arc::new(MockWindowHost::new()))
            .build()
            .err()
            .unwrap();

        assert!(error.to_string().contains("Config is required"));
    }

    #[test]
    fn test_build_requires_window_host() {
        let error = BeamClientBuilder::new()
            .config(config())
            .build()
            .err()
            .unwrap();

        assert!(error.to_string().contains("Window host is required"));
    }

    #[test]
    fn test_build_defaults_to_http_clients() {
        let client = BeamClientBuilder::new()
            .config(config())
            .window_host(Arc::new(MockWindowHost::new()))
            .build()
            .unwrap();

        assert_eq!(client.chain_id().unwrap(), 13337);
        assert!(client.connect_provider().is_ok());
    }

    #[test]
    fn test_endpoint_follows_chain_switch() {
        let handle = ConfigHandle::new(
            SdkConfig::new(vec![
                ChainConfig::new(ChainId::BeamTestnet, "pk-test"),
                ChainConfig::new(ChainId::BeamMainnet, "pk-main"),
            ])
            .unwrap(),
        );
        assert_eq!(endpoint_for(&handle).unwrap().api_key, "pk-test");

        handle.set_chain_id(ChainId::BeamMainnet).unwrap();

        let endpoint = endpoint_for(&handle).unwrap();
        assert_eq!(endpoint.api_key, "pk-main");
        assert_eq!(endpoint.base_url, "https://api.onbeam.com");
    }
}
