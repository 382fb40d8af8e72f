//! Remote-service traits.
//!
//! - `PlayerApi`: session and operation lifecycle on behalf of an entity
//! - `ConnectionApi`: wallet connection, message signatures, transactions
//! - `RpcTransport`: plain JSON-RPC for pass-through provider calls

use alloy_primitives::Address;
use async_trait::async_trait;
use serde_json::Value;

use crate::types::{
    ConfirmOperationRequest, CreateConnectionRequest, CreateOperationRequest,
    CreateTransactionRequest, GenerateSessionRequest, MessageSignatureRequest, PlayerOperation,
    RequestUrlResponse, RevokeSessionRequest, Session, VerifyOwnershipRequest,
};

// ============================================================================
// Error Types
// ============================================================================

/// Failures reported by the player or connection service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// JSON-RPC transport failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Invalid RPC response: {0}")]
    InvalidResponse(String),
}

// ============================================================================
// Player API
// ============================================================================

/// Session and operation lifecycle for a player entity.
#[async_trait]
pub trait PlayerApi: Send + Sync {
    /// Ask the service for a page where the player approves a new session key.
    async fn create_session_request(
        &self,
        entity_id: &str,
        request: &GenerateSessionRequest,
    ) -> Result<RequestUrlResponse, ApiError>;

    /// Look up the active session delegated to `address`, if any.
    async fn get_active_session(
        &self,
        entity_id: &str,
        address: &Address,
        chain_id: u64,
    ) -> Result<Option<Session>, ApiError>;

    /// Create an operation that revokes the session delegated to `request.address`.
    async fn revoke_session(
        &self,
        entity_id: &str,
        request: &RevokeSessionRequest,
    ) -> Result<PlayerOperation, ApiError>;

    async fn get_operation(&self, operation_id: &str) -> Result<PlayerOperation, ApiError>;

    /// Submit signatures (or a rejection) for an operation.
    async fn process_operation(
        &self,
        operation_id: &str,
        request: &ConfirmOperationRequest,
    ) -> Result<PlayerOperation, ApiError>;

    async fn create_connection_request(
        &self,
        request: &CreateConnectionRequest,
    ) -> Result<RequestUrlResponse, ApiError>;
}

// ============================================================================
// Connection API
// ============================================================================

/// Wallet-level calls that act on an account address rather than an entity.
#[async_trait]
pub trait ConnectionApi: Send + Sync {
    async fn get_message_signature_url(
        &self,
        request: &MessageSignatureRequest,
    ) -> Result<RequestUrlResponse, ApiError>;

    async fn verify_ownership(&self, request: &VerifyOwnershipRequest) -> Result<bool, ApiError>;

    async fn create_operation(
        &self,
        request: &CreateOperationRequest,
    ) -> Result<PlayerOperation, ApiError>;

    async fn create_transaction_for_address(
        &self,
        request: &CreateTransactionRequest,
    ) -> Result<PlayerOperation, ApiError>;
}

// ============================================================================
// RPC Transport
// ============================================================================

/// Minimal JSON-RPC client used for methods the SDK does not handle itself.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn send(&self, method: &str, params: Value) -> Result<Value, TransportError>;

    /// Chain id reported by the node.
    async fn chain_id(&self) -> Result<u64, TransportError> {
        let value = self.send("eth_chainId", Value::Array(Vec::new())).await?;
        let hex = value
            .as_str()
            .ok_or_else(|| TransportError::InvalidResponse(format!("eth_chainId: {value}")))?;

        u64::from_str_radix(hex.trim_start_matches("0x"), 16)
            .map_err(|e| TransportError::InvalidResponse(format!("eth_chainId {hex}: {e}")))
    }
}
