//! Request, response and event shapes of the provider.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::JsonRpcError;

/// Arguments of an EIP-1193 `request` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestArguments {
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RequestArguments {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: None,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    /// Positional parameter `index`, if present and not null.
    pub fn param(&self, index: usize) -> Option<&Value> {
        self.params
            .as_ref()
            .and_then(|params| params.get(index))
            .filter(|value| !value.is_null())
    }

    /// Params forwarded to the node; missing params become `[]`.
    pub fn params_or_empty(&self) -> Value {
        self.params
            .clone()
            .unwrap_or_else(|| Value::Array(Vec::new()))
    }
}

/// JSON-RPC 2.0 request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

fn default_version() -> String {
    "2.0".to_string()
}

/// Outcome carried by a [`JsonRpcResponse`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResponsePayload {
    #[serde(rename = "result")]
    Result(Value),
    #[serde(rename = "error")]
    Error(JsonRpcError),
}

/// JSON-RPC 2.0 response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(flatten)]
    pub payload: ResponsePayload,
}

impl JsonRpcResponse {
    pub fn new(id: Value, outcome: Result<Value, JsonRpcError>) -> Self {
        let payload = match outcome {
            Ok(result) => ResponsePayload::Result(result),
            Err(error) => ResponsePayload::Error(error),
        };
        Self {
            jsonrpc: default_version(),
            id,
            payload,
        }
    }

    pub fn error(id: Value, error: JsonRpcError) -> Self {
        Self::new(id, Err(error))
    }
}

/// Events emitted to provider subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    AccountsChanged(Vec<String>),
    Disconnect,
}
