//! SDK configuration and per-chain environments.

use std::env;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use beam_core::{AuthProvider, ChainId};

use crate::confirmation::{OverlayOptions, PopupSize};
use crate::error::ConfigError;

const BEAM_AUTH_URL: &str = "https://identity.onbeam.com";
const BEAM_API_URL: &str = "https://api.onbeam.com";
const BETA_AUTH_URL: &str = "https://identity.beta.onbeam.com";
const BETA_API_URL: &str = "https://api.beta.onbeam.com";
const PREVIEW_AUTH_URL: &str = "https://identity.preview.onbeam.com";
const PREVIEW_API_URL: &str = "https://api.preview.onbeam.com";

/// Endpoints resolved for the active chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEnvironment {
    pub chain_id: ChainId,
    pub publishable_key: String,
    pub sponsor: bool,
    /// Origin of the confirmation pages. Messages from any other origin are ignored.
    pub auth_url: String,
    pub api_url: String,
    pub rpc_url: String,
}

/// Explicit endpoint overrides, mostly for local development.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointOverrides {
    pub auth_url: Option<String>,
    pub api_url: Option<String>,
    pub rpc_url: Option<String>,
}

/// One configured chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    pub id: ChainId,
    pub publishable_key: String,
    /// Use the preview identity/API deployment (testnets only).
    pub is_preview: bool,
    pub sponsor: bool,
    pub overrides: EndpointOverrides,
}

impl ChainConfig {
    pub fn new(id: ChainId, publishable_key: impl Into<String>) -> Self {
        Self {
            id,
            publishable_key: publishable_key.into(),
            is_preview: false,
            sponsor: false,
            overrides: EndpointOverrides::default(),
        }
    }

    pub fn with_preview(mut self, is_preview: bool) -> Self {
        self.is_preview = is_preview;
        self
    }

    pub fn with_sponsor(mut self, sponsor: bool) -> Self {
        self.sponsor = sponsor;
        self
    }

    pub fn with_auth_url(mut self, url: impl Into<String>) -> Self {
        self.overrides.auth_url = Some(url.into());
        self
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.overrides.api_url = Some(url.into());
        self
    }

    pub fn with_rpc_url(mut self, url: impl Into<String>) -> Self {
        self.overrides.rpc_url = Some(url.into());
        self
    }

    /// Resolve endpoints for this chain.
    pub fn environment(&self) -> ChainEnvironment {
        let (auth_url, api_url, rpc_url) = match self.id {
            ChainId::BeamMainnet => (BEAM_AUTH_URL, BEAM_API_URL, "https://build.onbeam.com/rpc"),
            ChainId::SophonMainnet => (BEAM_AUTH_URL, BEAM_API_URL, "https://rpc.sophon.xyz"),
            ChainId::BeamTestnet if self.is_preview => (
                PREVIEW_AUTH_URL,
                PREVIEW_API_URL,
                "https://build.onbeam.com/rpc/testnet",
            ),
            ChainId::BeamTestnet => (
                BETA_AUTH_URL,
                BETA_API_URL,
                "https://build.onbeam.com/rpc/testnet",
            ),
            ChainId::SophonTestnet if self.is_preview => (
                PREVIEW_AUTH_URL,
                PREVIEW_API_URL,
                "https://rpc.testnet.sophon.xyz",
            ),
            ChainId::SophonTestnet => {
                (BETA_AUTH_URL, BETA_API_URL, "https://rpc.testnet.sophon.xyz")
            }
        };

        let pick = |custom: &Option<String>, default: &str| {
            custom
                .as_deref()
                .unwrap_or(default)
                .trim_end_matches('/')
                .to_string()
        };

        ChainEnvironment {
            chain_id: self.id,
            publishable_key: self.publishable_key.clone(),
            sponsor: self.sponsor,
            auth_url: pick(&self.overrides.auth_url, auth_url),
            api_url: pick(&self.overrides.api_url, api_url),
            rpc_url: pick(&self.overrides.rpc_url, rpc_url),
        }
    }
}

/// Popup and handshake tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationConfig {
    /// How often the handshake checks for a closed popup or dismissed overlay.
    pub poll_interval: Duration,
    /// Give up on a stalled handshake. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    pub popup_size: PopupSize,
    pub popup_title: String,
    pub overlay: OverlayOptions,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            timeout: None,
            popup_size: PopupSize::default(),
            popup_title: "Confirm this transaction".to_string(),
            overlay: OverlayOptions::default(),
        }
    }
}

/// Complete SDK configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdkConfig {
    chains: Vec<ChainConfig>,
    chain_id: ChainId,
    pub auth_provider: Option<AuthProvider>,
    /// Keep the popup open on failures and log more.
    pub debug: bool,
    pub confirmation: ConfirmationConfig,
}

impl SdkConfig {
    /// Build a configuration; the first chain becomes active.
    pub fn new(chains: Vec<ChainConfig>) -> Result<Self, ConfigError> {
        let chain_id = chains.first().map(|chain| chain.id).ok_or(ConfigError::NoChains)?;
        Ok(Self {
            chains,
            chain_id,
            auth_provider: None,
            debug: false,
            confirmation: ConfirmationConfig::default(),
        })
    }

    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `BEAM_PUBLISHABLE_KEY` - Publishable API key (required)
    /// - `BEAM_CHAIN_ID` - Numeric chain id (default: 13337)
    /// - `BEAM_PREVIEW` - Use the preview deployment (default: false)
    /// - `BEAM_SPONSOR` - Request fee sponsorship (default: false)
    /// - `BEAM_DEBUG` - Debug mode (default: false)
    /// - `BEAM_AUTH_PROVIDER` - any, google, discord or apple
    /// - `BEAM_AUTH_URL`, `BEAM_API_URL`, `BEAM_RPC_URL` - Endpoint overrides
    /// - `BEAM_CONFIRMATION_POLL_MS` - Popup poll interval (default: 1000)
    /// - `BEAM_CONFIRMATION_TIMEOUT_SECS` - Handshake timeout (default: none)
    pub fn from_env() -> Result<Self, ConfigError> {
        let publishable_key = env::var("BEAM_PUBLISHABLE_KEY")
            .map_err(|_| ConfigError::MissingEnv("BEAM_PUBLISHABLE_KEY"))?;

        let chain_id = match read_env::<u64>("BEAM_CHAIN_ID")? {
            Some(id) => ChainId::try_from(id)?,
            None => ChainId::BeamTestnet,
        };

        let mut chain = ChainConfig::new(chain_id, publishable_key)
            .with_preview(read_env_bool("BEAM_PREVIEW")?.unwrap_or(false))
            .with_sponsor(read_env_bool("BEAM_SPONSOR")?.unwrap_or(false));
        chain.overrides = EndpointOverrides {
            auth_url: env::var("BEAM_AUTH_URL").ok(),
            api_url: env::var("BEAM_API_URL").ok(),
            rpc_url: env::var("BEAM_RPC_URL").ok(),
        };

        let mut config = Self::new(vec![chain])?;
        config.debug = read_env_bool("BEAM_DEBUG")?.unwrap_or(false);

        if let Ok(raw) = env::var("BEAM_AUTH_PROVIDER") {
            config.auth_provider = Some(parse_auth_provider(&raw)?);
        }

        if let Some(ms) = read_env::<u64>("BEAM_CONFIRMATION_POLL_MS")? {
            config.confirmation.poll_interval = Duration::from_millis(ms.max(1));
        }
        config.confirmation.timeout =
            read_env::<u64>("BEAM_CONFIRMATION_TIMEOUT_SECS")?.map(Duration::from_secs);

        config.validate()?;
        Ok(config)
    }

    pub fn with_chain_id(mut self, chain_id: ChainId) -> Result<Self, ConfigError> {
        self.set_chain_id(chain_id)?;
        Ok(self)
    }

    pub fn with_auth_provider(mut self, provider: AuthProvider) -> Self {
        self.auth_provider = Some(provider);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_confirmation(mut self, confirmation: ConfirmationConfig) -> Self {
        self.confirmation = confirmation;
        self
    }

    pub fn chains(&self) -> &[ChainConfig] {
        &self.chains
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    pub fn has_chain(&self, chain_id: ChainId) -> bool {
        self.chains.iter().any(|chain| chain.id == chain_id)
    }

    /// Switch the active chain. Fails if `chain_id` is not configured.
    pub fn set_chain_id(&mut self, chain_id: ChainId) -> Result<(), ConfigError> {
        if !self.has_chain(chain_id) {
            return Err(ConfigError::ChainNotConfigured(chain_id));
        }
        self.chain_id = chain_id;
        Ok(())
    }

    pub fn chain_config(&self) -> Result<&ChainConfig, ConfigError> {
        self.chains
            .iter()
            .find(|chain| chain.id == self.chain_id)
            .ok_or(ConfigError::ChainNotSelected)
    }

    pub fn environment(&self) -> Result<ChainEnvironment, ConfigError> {
        self.chain_config().map(ChainConfig::environment)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chains.is_empty() {
            return Err(ConfigError::NoChains);
        }

        for chain in &self.chains {
            let env = chain.environment();
            for endpoint in [&env.auth_url, &env.api_url, &env.rpc_url] {
                url::Url::parse(endpoint).map_err(|e| ConfigError::InvalidUrl {
                    url: endpoint.clone(),
                    reason: e.to_string(),
                })?;
            }
        }

        self.chain_config().map(|_| ())
    }
}

/// Configuration shared between the session manager, the confirmation
/// channel and the provider, so a chain switch is seen by all of them.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<SdkConfig>>,
}

impl ConfigHandle {
    pub fn new(config: SdkConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Copy of the current configuration.
    pub fn snapshot(&self) -> Result<SdkConfig, ConfigError> {
        self.inner
            .read()
            .map(|config| config.clone())
            .map_err(|_| ConfigError::LockPoisoned)
    }

    pub fn replace(&self, config: SdkConfig) -> Result<(), ConfigError> {
        let mut current = self.inner.write().map_err(|_| ConfigError::LockPoisoned)?;
        *current = config;
        Ok(())
    }

    pub fn set_chain_id(&self, chain_id: ChainId) -> Result<(), ConfigError> {
        self.inner
            .write()
            .map_err(|_| ConfigError::LockPoisoned)?
            .set_chain_id(chain_id)
    }

    pub fn chain_id(&self) -> Result<ChainId, ConfigError> {
        self.read(SdkConfig::chain_id)
    }

    pub fn environment(&self) -> Result<ChainEnvironment, ConfigError> {
        self.inner
            .read()
            .map_err(|_| ConfigError::LockPoisoned)?
            .environment()
    }

    pub fn auth_url(&self) -> Result<String, ConfigError> {
        self.environment().map(|env| env.auth_url)
    }

    pub fn auth_provider(&self) -> Option<AuthProvider> {
        self.read(|config| config.auth_provider).ok().flatten()
    }

    pub fn debug(&self) -> bool {
        self.read(|config| config.debug).unwrap_or(false)
    }

    pub fn has_chain(&self, chain_id: ChainId) -> bool {
        self.read(|config| config.has_chain(chain_id)).unwrap_or(false)
    }

    fn read<T>(&self, f: impl FnOnce(&SdkConfig) -> T) -> Result<T, ConfigError> {
        self.inner
            .read()
            .map(|config| f(&*config))
            .map_err(|_| ConfigError::LockPoisoned)
    }
}

fn read_env<T>(key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
{
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { var: key, value }),
        Err(_) => Ok(None),
    }
}

fn read_env_bool(key: &'static str) -> Result<Option<bool>, ConfigError> {
    match env::var(key) {
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" | "" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidEnv { var: key, value }),
        },
        Err(_) => Ok(None),
    }
}

fn parse_auth_provider(raw: &str) -> Result<AuthProvider, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "any" => Ok(AuthProvider::Any),
        "google" => Ok(AuthProvider::Google),
        "discord" => Ok(AuthProvider::Discord),
        "apple" => Ok(AuthProvider::Apple),
        _ => Err(ConfigError::InvalidEnv {
            var: "BEAM_AUTH_PROVIDER",
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_a_chain() {
        assert_eq!(SdkConfig::new(Vec::new()), Err(ConfigError::NoChains));
    }

    #[test]
    fn test_environments() {
        let beam = ChainConfig::new(ChainId::BeamMainnet, "pk").environment();
        assert_eq!(beam.auth_url, "https://identity.onbeam.com");
        assert_eq!(beam.api_url, "https://api.onbeam.com");

        let beta = ChainConfig::new(ChainId::BeamTestnet, "pk").environment();
        assert_eq!(beta.auth_url, "https://identity.beta.onbeam.com");

        let preview = ChainConfig::new(ChainId::SophonTestnet, "pk")
            .with_preview(true)
            .environment();
        assert_eq!(preview.api_url, "https://api.preview.onbeam.com");
        assert_eq!(preview.rpc_url, "https://rpc.testnet.sophon.xyz");
    }

    #[test]
    fn test_overrides_trim_trailing_slash() {
        let env = ChainConfig::new(ChainId::BeamTestnet, "pk")
            .with_auth_url("http://localhost:3000/")
            .environment();
        assert_eq!(env.auth_url, "http://localhost:3000");
    }

    #[test]
    fn test_set_chain_id_requires_configured_chain() {
        let mut config = SdkConfig::new(vec![
            ChainConfig::new(ChainId::BeamTestnet, "a"),
            ChainConfig::new(ChainId::BeamMainnet, "b"),
        ])
        .unwrap();
        assert_eq!(config.chain_id(), ChainId::BeamTestnet);

        config.set_chain_id(ChainId::BeamMainnet).unwrap();
        assert_eq!(config.environment().unwrap().publishable_key, "b");

        assert_eq!(
            config.set_chain_id(ChainId::SophonMainnet),
            Err(ConfigError::ChainNotConfigured(ChainId::SophonMainnet))
        );
        assert_eq!(config.chain_id(), ChainId::BeamMainnet);
    }

    #[test]
    fn test_handle_shares_chain_switch() {
        let handle = ConfigHandle::new(
            SdkConfig::new(vec![
                ChainConfig::new(ChainId::BeamTestnet, "a"),
                ChainConfig::new(ChainId::BeamMainnet, "b"),
            ])
            .unwrap(),
        );
        let other = handle.clone();

        handle.set_chain_id(ChainId::BeamMainnet).unwrap();
        assert_eq!(other.chain_id().unwrap(), ChainId::BeamMainnet);
        assert_eq!(other.auth_url().unwrap(), "https://identity.onbeam.com");
    }

    #[test]
    fn test_validate_rejects_bad_override() {
        let config = SdkConfig::new(vec![
            ChainConfig::new(ChainId::BeamTestnet, "a").with_api_url("not a url"),
        ])
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidUrl { .. })));
    }
}
