//! Base URL and credentials resolution.
//!
//! The active chain can change at runtime, so clients resolve their endpoint
//! on every request instead of capturing it once.

use beam_core::ApiError;
use url::Url;

/// Base URL plus the publishable key sent as `x-api-key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEndpoint {
    pub base_url: String,
    pub api_key: String,
}

impl ApiEndpoint {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// `base_url` joined with percent-encoded path `segments`.
    pub fn url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ApiError::Config(format!("invalid API url {}: {}", self.base_url, e)))?;

        url.path_segments_mut()
            .map_err(|_| ApiError::Config(format!("API url cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);

        Ok(url)
    }
}

/// Source of the endpoint used for the next request.
pub trait EndpointResolver: Send + Sync {
    fn resolve(&self) -> Result<ApiEndpoint, ApiError>;
}

impl EndpointResolver for ApiEndpoint {
    fn resolve(&self) -> Result<ApiEndpoint, ApiError> {
        Ok(self.clone())
    }
}

impl<F> EndpointResolver for F
where
    F: Fn() -> Result<ApiEndpoint, ApiError> + Send + Sync,
{
    fn resolve(&self) -> Result<ApiEndpoint, ApiError> {
        self()
    }
}
