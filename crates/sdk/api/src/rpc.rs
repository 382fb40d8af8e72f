//! JSON-RPC 2.0 over HTTP.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use beam_core::{RpcTransport, TransportError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// Node URL for the next request.
pub trait RpcUrlResolver: Send + Sync {
    fn rpc_url(&self) -> Result<String, TransportError>;
}

impl RpcUrlResolver for String {
    fn rpc_url(&self) -> Result<String, TransportError> {
        Ok(self.clone())
    }
}

impl<F> RpcUrlResolver for F
where
    F: Fn() -> Result<String, TransportError> + Send + Sync,
{
    fn rpc_url(&self) -> Result<String, TransportError> {
        self()
    }
}

/// Posts JSON-RPC requests to the active chain's node.
#[derive(Clone)]
pub struct HttpRpcTransport {
    http_client: reqwest::Client,
    url: Arc<dyn RpcUrlResolver>,
    next_id: Arc<AtomicU64>,
}

impl HttpRpcTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_resolver(url.into())
    }

    pub fn with_resolver(resolver: impl RpcUrlResolver + 'static) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            url: Arc::new(resolver),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }
}

/// Extract `result` from a JSON-RPC response body.
fn parse_response(body: &str) -> Result<Value, TransportError> {
    let response: RpcResponse = serde_json::from_str(body)
        .map_err(|e| TransportError::InvalidResponse(format!("{e}: {body}")))?;

    if let Some(error) = response.error {
        return Err(TransportError::Rpc {
            code: error.code,
            message: error.message,
        });
    }

    Ok(response.result.unwrap_or(Value::Null))
}

#[async_trait]
impl RpcTransport for HttpRpcTransport {
    async fn send(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        let url = self.url.rpc_url()?;
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        tracing::debug!("RPC {} #{} -> {}", method, request.id, url);

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(TransportError::Network(format!(
                "RPC request failed with status {status}: {body}"
            )));
        }

        parse_response(&body)
    }
}
