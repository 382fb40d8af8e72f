//! JSON-RPC and EIP-1193 error values.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Standard JSON-RPC 2.0 error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
}

impl RpcErrorCode {
    pub const fn code(self) -> i64 {
        match self {
            RpcErrorCode::ParseError => -32700,
            RpcErrorCode::InvalidRequest => -32600,
            RpcErrorCode::MethodNotFound => -32601,
            RpcErrorCode::InvalidParams => -32602,
            RpcErrorCode::InternalError => -32603,
        }
    }
}

/// EIP-1193 provider error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorCode {
    UserRejectedRequest,
    Unauthorized,
    UnsupportedMethod,
    Disconnected,
    ChainDisconnected,
}

impl ProviderErrorCode {
    pub const fn code(self) -> i64 {
        match self {
            ProviderErrorCode::UserRejectedRequest => 4001,
            ProviderErrorCode::Unauthorized => 4100,
            ProviderErrorCode::UnsupportedMethod => 4200,
            ProviderErrorCode::Disconnected => 4900,
            ProviderErrorCode::ChainDisconnected => 4901,
        }
    }
}

/// Error object returned from [`crate::Eip1193Provider::request`] and embedded
/// in JSON-RPC responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message} (code {code})")]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

impl JsonRpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn rpc(code: RpcErrorCode, message: impl Into<String>) -> Self {
        Self::new(code.code(), message)
    }

    pub fn provider(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self::new(code.code(), message)
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::rpc(RpcErrorCode::ParseError, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::rpc(RpcErrorCode::InvalidRequest, message)
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::rpc(RpcErrorCode::InvalidParams, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::rpc(RpcErrorCode::InternalError, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::provider(ProviderErrorCode::Unauthorized, message)
    }

    pub fn unsupported_method(method: &str) -> Self {
        Self::provider(
            ProviderErrorCode::UnsupportedMethod,
            format!("{method} - Method not supported"),
        )
    }

    /// Wrap a lower-level failure as an internal error with `context`.
    pub(crate) fn internal_from(context: &str, error: impl std::fmt::Display) -> Self {
        Self::internal(format!("{context}: {error}"))
    }
}
