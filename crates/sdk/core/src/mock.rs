//! In-memory doubles for the remote traits.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use alloy_primitives::Address;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value;

use crate::traits::{ApiError, ConnectionApi, PlayerApi, RpcTransport, TransportError};
use crate::types::{
    ConfirmOperationRequest, CreateConnectionRequest, CreateOperationRequest,
    CreateTransactionRequest, GenerateSessionRequest, MessageSignatureRequest, OperationStatus,
    PlayerOperation, RequestUrlResponse, RevokeSessionRequest, Session, VerifyOwnershipRequest,
};

/// Every call the mock received, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    CreateSessionRequest { entity_id: String, address: Address },
    GetActiveSession { entity_id: String, address: Address },
    RevokeSession { entity_id: String, address: Address },
    GetOperation(String),
    ProcessOperation { operation_id: String, request: ConfirmOperationRequest },
    CreateConnectionRequest { entity_id: String },
    GetMessageSignatureUrl { message: String },
    VerifyOwnership(VerifyOwnershipRequest),
    CreateOperation(CreateOperationRequest),
    CreateTransaction(CreateTransactionRequest),
}

struct MockState {
    calls: Vec<ApiCall>,
    sessions: HashMap<Address, Session>,
    operations: HashMap<String, PlayerOperation>,
    failing: HashSet<&'static str>,
    issue_sessions_on_request: bool,
    process_status: OperationStatus,
    revoke_operation: Option<PlayerOperation>,
    created_operation: Option<PlayerOperation>,
    ownership: bool,
    counter: u64,
}

/// Mock player + connection service.
///
/// Cloning shares state, so a test can keep a handle while the SDK owns another.
#[derive(Clone)]
pub struct MockApi {
    base_url: String,
    state: Arc<Mutex<MockState>>,
}

impl MockApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            state: Arc::new(Mutex::new(MockState {
                calls: Vec::new(),
                sessions: HashMap::new(),
                operations: HashMap::new(),
                failing: HashSet::new(),
                issue_sessions_on_request: false,
                process_status: OperationStatus::Signed,
                revoke_operation: None,
                created_operation: None,
                ownership: true,
                counter: 0,
            })),
        }
    }

    /// Register an active session for the address it delegates to.
    pub fn insert_session(&self, session: Session) {
        let address = session
            .session_address
            .parse::<Address>()
            .expect("mock session address must be a valid address");
        self.state.lock().unwrap().sessions.insert(address, session);
    }

    /// Drop every registered session.
    pub fn clear_sessions(&self) {
        self.state.lock().unwrap().sessions.clear();
    }

    /// When set, `create_session_request` immediately registers a valid
    /// one-hour session for the requesting address.
    pub fn issue_sessions_on_request(&self, enabled: bool) {
        self.state.lock().unwrap().issue_sessions_on_request = enabled;
    }

    pub fn insert_operation(&self, operation: PlayerOperation) {
        self.state
            .lock()
            .unwrap()
            .operations
            .insert(operation.id.clone(), operation);
    }

    pub fn set_operation_status(&self, operation_id: &str, status: OperationStatus) {
        if let Some(operation) = self.state.lock().unwrap().operations.get_mut(operation_id) {
            operation.status = status;
        }
    }

    pub fn operation(&self, operation_id: &str) -> Option<PlayerOperation> {
        self.state.lock().unwrap().operations.get(operation_id).cloned()
    }

    /// Status returned by `process_operation`.
    pub fn set_process_status(&self, status: OperationStatus) {
        self.state.lock().unwrap().process_status = status;
    }

    /// Operation returned by `revoke_session`.
    pub fn set_revoke_operation(&self, operation: PlayerOperation) {
        self.state.lock().unwrap().revoke_operation = Some(operation);
    }

    /// Operation returned by `create_operation` and `create_transaction_for_address`.
    pub fn set_created_operation(&self, operation: PlayerOperation) {
        self.state.lock().unwrap().created_operation = Some(operation);
    }

    pub fn set_ownership(&self, owned: bool) {
        self.state.lock().unwrap().ownership = owned;
    }

    /// Make every call to `method` (trait method name) fail with a network error.
    pub fn fail_on(&self, method: &'static str) {
        self.state.lock().unwrap().failing.insert(method);
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Number of recorded calls matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&ApiCall) -> bool) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|call| predicate(call))
            .count()
    }

    fn record(&self, method: &'static str, call: ApiCall) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if state.failing.contains(method) {
            return Err(ApiError::Network(format!("mock failure in {method}")));
        }
        Ok(())
    }

    fn next_url(&self, path: &str) -> RequestUrlResponse {
        let mut state = self.state.lock().unwrap();
        state.counter += 1;
        let id = format!("req-{}", state.counter);
        RequestUrlResponse {
            url: format!("{}/{}/{}", self.base_url, path, id),
            id: Some(id),
        }
    }

    fn store_operation(&self, operation: Option<PlayerOperation>) -> Result<PlayerOperation, ApiError> {
        let operation =
            operation.ok_or_else(|| ApiError::NotFound("no mock operation configured".into()))?;
        self.insert_operation(operation.clone());
        Ok(operation)
    }
}

impl Default for MockApi {
    fn default() -> Self {
        Self::new("https://identity.mock")
    }
}

#[async_trait]
impl PlayerApi for MockApi {
    async fn create_session_request(
        &self,
        entity_id: &str,
        request: &GenerateSessionRequest,
    ) -> Result<RequestUrlResponse, ApiError> {
        self.record(
            "create_session_request",
            ApiCall::CreateSessionRequest {
                entity_id: entity_id.to_string(),
                address: request.address,
            },
        )?;

        let response = self.next_url("session");

        let mut state = self.state.lock().unwrap();
        if state.issue_sessions_on_request {
            let now = Utc::now();
            state.sessions.insert(
                request.address,
                Session {
                    id: response.id.clone().unwrap_or_default(),
                    is_active: true,
                    session_address: request.address.to_string(),
                    start_time: Some(now - Duration::minutes(1)),
                    end_time: Some(now + Duration::hours(1)),
                },
            );
        }

        Ok(response)
    }

    async fn get_active_session(
        &self,
        entity_id: &str,
        address: &Address,
        _chain_id: u64,
    ) -> Result<Option<Session>, ApiError> {
        self.record(
            "get_active_session",
            ApiCall::GetActiveSession {
                entity_id: entity_id.to_string(),
                address: *address,
            },
        )?;

        Ok(self.state.lock().unwrap().sessions.get(address).cloned())
    }

    async fn revoke_session(
        &self,
        entity_id: &str,
        request: &RevokeSessionRequest,
    ) -> Result<PlayerOperation, ApiError> {
        self.record(
            "revoke_session",
            ApiCall::RevokeSession {
                entity_id: entity_id.to_string(),
                address: request.address,
            },
        )?;

        let operation = self.state.lock().unwrap().revoke_operation.clone();
        self.store_operation(operation)
    }

    async fn get_operation(&self, operation_id: &str) -> Result<PlayerOperation, ApiError> {
        self.record("get_operation", ApiCall::GetOperation(operation_id.to_string()))?;

        self.operation(operation_id)
            .ok_or_else(|| ApiError::NotFound(format!("operation {operation_id}")))
    }

    async fn process_operation(
        &self,
        operation_id: &str,
        request: &ConfirmOperationRequest,
    ) -> Result<PlayerOperation, ApiError> {
        self.record(
            "process_operation",
            ApiCall::ProcessOperation {
                operation_id: operation_id.to_string(),
                request: request.clone(),
            },
        )?;

        let mut state = self.state.lock().unwrap();
        let status = state.process_status;
        let operation = state
            .operations
            .get_mut(operation_id)
            .ok_or_else(|| ApiError::NotFound(format!("operation {operation_id}")))?;

        for signed in &request.actions {
            if let Some(action) = operation.actions.iter_mut().find(|a| a.id == signed.id)
                && let Some(signature) = action.signature.as_mut()
            {
                signature.signature = Some(signed.signature.clone());
            }
        }
        operation.status = status;

        Ok(operation.clone())
    }

    async fn create_connection_request(
        &self,
        request: &CreateConnectionRequest,
    ) -> Result<RequestUrlResponse, ApiError> {
        self.record(
            "create_connection_request",
            ApiCall::CreateConnectionRequest {
                entity_id: request.entity_id.clone(),
            },
        )?;

        Ok(self.next_url("connect"))
    }
}

#[async_trait]
impl ConnectionApi for MockApi {
    async fn get_message_signature_url(
        &self,
        request: &MessageSignatureRequest,
    ) -> Result<RequestUrlResponse, ApiError> {
        self.record(
            "get_message_signature_url",
            ApiCall::GetMessageSignatureUrl {
                message: request.message.clone(),
            },
        )?;

        Ok(self.next_url("signature"))
    }

    async fn verify_ownership(&self, request: &VerifyOwnershipRequest) -> Result<bool, ApiError> {
        self.record("verify_ownership", ApiCall::VerifyOwnership(request.clone()))?;
        Ok(self.state.lock().unwrap().ownership)
    }

    async fn create_operation(
        &self,
        request: &CreateOperationRequest,
    ) -> Result<PlayerOperation, ApiError> {
        self.record("create_operation", ApiCall::CreateOperation(request.clone()))?;

        let operation = self.state.lock().unwrap().created_operation.clone();
        self.store_operation(operation)
    }

    async fn create_transaction_for_address(
        &self,
        request: &CreateTransactionRequest,
    ) -> Result<PlayerOperation, ApiError> {
        self.record(
            "create_transaction_for_address",
            ApiCall::CreateTransaction(request.clone()),
        )?;

        let operation = self.state.lock().unwrap().created_operation.clone();
        self.store_operation(operation)
    }
}

/// JSON-RPC double answering from a fixed table.
#[derive(Clone)]
pub struct MockRpcTransport {
    responses: Arc<Mutex<HashMap<String, Value>>>,
    calls: Arc<Mutex<Vec<(String, Value)>>>,
}

impl MockRpcTransport {
    /// A transport whose node reports `chain_id`.
    pub fn new(chain_id: u64) -> Self {
        let transport = Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        };
        transport.respond("eth_chainId", Value::String(format!("0x{chain_id:x}")));
        transport
    }

    pub fn respond(&self, method: &str, result: Value) {
        self.responses
            .lock()
            .unwrap()
            .insert(method.to_string(), result);
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RpcTransport for MockRpcTransport {
    async fn send(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), params));

        self.responses
            .lock()
            .unwrap()
            .get(method)
            .cloned()
            .ok_or_else(|| TransportError::Rpc {
                code: -32601,
                message: format!("{method} not mocked"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConfirmOperationAction, ConfirmOperationStatus, OperationAction, SignatureRequest};

    fn operation() -> PlayerOperation {
        PlayerOperation {
            id: "op-1".into(),
            status: OperationStatus::Pending,
            url: Some("https://identity.mock/op-1".into()),
            actions: vec![OperationAction {
                id: "a-1".into(),
                signature: Some(SignatureRequest {
                    hash: format!("0x{}", "11".repeat(32)),
                    signature: None,
                    data: None,
                    kind: None,
                }),
            }],
            transactions: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_mock_session_issuance() {
        let api = MockApi::default();
        api.issue_sessions_on_request(true);

        let address = Address::repeat_byte(0x42);
        let request = GenerateSessionRequest {
            chain_id: 13337,
            address,
            auth_provider: None,
        };

        assert!(api.get_active_session("e", &address, 13337).await.unwrap().is_none());

        let response = api.create_session_request("e", &request).await.unwrap();
        assert!(response.url.starts_with("https://identity.mock/session/"));

        let session = api.get_active_session("e", &address, 13337).await.unwrap().unwrap();
        assert!(session.is_active);
        assert_eq!(api.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_mock_process_operation_records_signatures() {
        let api = MockApi::default();
        api.insert_operation(operation());
        api.set_process_status(OperationStatus::Executed);

        let result = api
            .process_operation(
                "op-1",
                &ConfirmOperationRequest {
                    status: ConfirmOperationStatus::Pending,
                    actions: vec![ConfirmOperationAction {
                        id: "a-1".into(),
                        signature: "0xsig".into(),
                    }],
                },
            )
            .await
            .unwrap();

        assert_eq!(result.status, OperationStatus::Executed);
        assert_eq!(
            result.actions[0].signature.as_ref().unwrap().signature.as_deref(),
            Some("0xsig")
        );
    }

    #[tokio::test]
    async fn test_mock_failures_are_recorded() {
        let api = MockApi::default();
        api.fail_on("get_operation");

        assert!(matches!(
            api.get_operation("op-1").await,
            Err(ApiError::Network(_))
        ));
        assert_eq!(api.calls(), vec![ApiCall::GetOperation("op-1".into())]);
    }

    #[tokio::test]
    async fn test_mock_rpc_chain_id() {
        let rpc = MockRpcTransport::new(13337);
        assert_eq!(rpc.chain_id().await.unwrap(), 13337);
        assert!(rpc.send("eth_call", Value::Null).await.is_err());
    }
}
