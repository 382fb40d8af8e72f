//! `reqwest` implementation of the player and connection services.

use std::sync::Arc;

use alloy_primitives::Address;
use async_trait::async_trait;
use beam_core::{
    ApiError, ConfirmOperationRequest, ConnectionApi, CreateConnectionRequest,
    CreateOperationRequest, CreateTransactionRequest, GenerateSessionRequest,
    MessageSignatureRequest, PlayerApi, PlayerOperation, RequestUrlResponse,
    RevokeSessionRequest, Session, VerifyOwnershipRequest,
};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

use crate::endpoint::{ApiEndpoint, EndpointResolver};

/// Body of the active-session lookup.
#[derive(Debug, Deserialize)]
struct ActiveSessionResponse {
    #[serde(default)]
    session: Option<Session>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyOwnershipResponse {
    #[serde(alias = "owned", deserialize_with = "lenient_bool")]
    is_owner: bool,
}

/// Accepts `true`/`false` as booleans or strings.
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Bool(value) => Ok(value),
        Raw::Text(text) => Ok(text.eq_ignore_ascii_case("true")),
    }
}

/// HTTP client for the Beam player and connection services.
///
/// Every request carries the publishable key of the active chain in the
/// `x-api-key` header and targets that chain's API base URL.
#[derive(Clone)]
pub struct HttpApiClient {
    http_client: reqwest::Client,
    endpoint: Arc<dyn EndpointResolver>,
}

impl HttpApiClient {
    /// Client bound to a fixed endpoint.
    pub fn new(endpoint: ApiEndpoint) -> Self {
        Self::with_resolver(endpoint)
    }

    /// Client resolving its endpoint before each request.
    pub fn with_resolver(resolver: impl EndpointResolver + 'static) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            endpoint: Arc::new(resolver),
        }
    }

    /// Reuse an existing connection pool.
    pub fn with_http_client(mut self, http_client: reqwest::Client) -> Self {
        self.http_client = http_client;
        self
    }

    async fn call<B, T>(&self, method: Method, segments: &[&str], body: Option<&B>) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.call_with_query(method, segments, &[], body).await
    }

    async fn call_with_query<B, T>(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let endpoint = self.endpoint.resolve()?;
        let mut url = endpoint.url(segments)?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(key, value)| (*key, value.as_str())));
        }

        tracing::debug!("{} {}", method, url);

        let mut request = self
            .http_client
            .request(method, url)
            .header("x-api-key", &endpoint.api_key);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        decode_response(status, &text)
    }
}

/// Map a raw response to the typed body or an [`ApiError`].
fn decode_response<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<T, ApiError> {
    if status == StatusCode::NOT_FOUND {
        return Err(ApiError::NotFound(body.to_string()));
    }
    if !status.is_success() {
        return Err(ApiError::Status {
            status: status.as_u16(),
            body: body.to_string(),
        });
    }

    serde_json::from_str(body).map_err(|e| {
        tracing::debug!("Undecodable response body: {}", body);
        ApiError::Decode(e.to_string())
    })
}

#[async_trait]
impl PlayerApi for HttpApiClient {
    async fn create_session_request(
        &self,
        entity_id: &str,
        request: &GenerateSessionRequest,
    ) -> Result<RequestUrlResponse, ApiError> {
        self.call(
            Method::POST,
            &["v1", "player", "sessions", "users", entity_id, "request"],
            Some(request),
        )
        .await
    }

    async fn get_active_session(
        &self,
        entity_id: &str,
        address: &Address,
        chain_id: u64,
    ) -> Result<Option<Session>, ApiError> {
        let address = address.to_string();
        let result = self
            .call_with_query::<(), ActiveSessionResponse>(
                Method::GET,
                &["v1", "player", "sessions", "users", entity_id, &address, "active"],
                &[("chainId", chain_id.to_string())],
                None,
            )
            .await;

        match result {
            Ok(response) => Ok(response.session),
            Err(ApiError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn revoke_session(
        &self,
        entity_id: &str,
        request: &RevokeSessionRequest,
    ) -> Result<PlayerOperation, ApiError> {
        self.call(
            Method::POST,
            &["v1", "player", "sessions", "users", entity_id, "revoke"],
            Some(request),
        )
        .await
    }

    async fn get_operation(&self, operation_id: &str) -> Result<PlayerOperation, ApiError> {
        self.call::<(), _>(Method::GET, &["v1", "player", "operation", operation_id], None)
            .await
    }

    async fn process_operation(
        &self,
        operation_id: &str,
        request: &ConfirmOperationRequest,
    ) -> Result<PlayerOperation, ApiError> {
        self.call(
            Method::PATCH,
            &["v1", "player", "operation", operation_id],
            Some(request),
        )
        .await
    }

    async fn create_connection_request(
        &self,
        request: &CreateConnectionRequest,
    ) -> Result<RequestUrlResponse, ApiError> {
        self.call(
            Method::POST,
            &["v1", "player", "connection", "request"],
            Some(request),
        )
        .await
    }
}

#[async_trait]
impl ConnectionApi for HttpApiClient {
    async fn get_message_signature_url(
        &self,
        request: &MessageSignatureRequest,
    ) -> Result<RequestUrlResponse, ApiError> {
        self.call(
            Method::POST,
            &["v1", "connector", "message", "signature"],
            Some(request),
        )
        .await
    }

    async fn verify_ownership(&self, request: &VerifyOwnershipRequest) -> Result<bool, ApiError> {
        let response: VerifyOwnershipResponse = self
            .call(
                Method::POST,
                &["v1", "connector", "ownership", "verify"],
                Some(request),
            )
            .await?;
        Ok(response.is_owner)
    }

    async fn create_operation(
        &self,
        request: &CreateOperationRequest,
    ) -> Result<PlayerOperation, ApiError> {
        self.call(Method::POST, &["v1", "connector", "operation"], Some(request))
            .await
    }

    async fn create_transaction_for_address(
        &self,
        request: &CreateTransactionRequest,
    ) -> Result<PlayerOperation, ApiError> {
        self.call(Method::POST, &["v1", "connector", "transaction"], Some(request))
            .await
    }
}
