//! EIP-1193 request dispatch on top of the session manager.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use beam_core::{ChainId, RpcTransport, TransactionInteraction, TransportError};
use beam_session::{ChainEnvironment, ConfigError, SessionManager};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::eip6963::ProviderInfo;
use crate::error::JsonRpcError;
use crate::typed_data::parse_and_validate_typed_data;
use crate::types::{JsonRpcRequest, JsonRpcResponse, ProviderEvent, RequestArguments};

/// Message the owner signs when connecting through `eth_requestAccounts`.
pub const CONNECT_MESSAGE: &str = "Connect to Beam SDK";

/// Node methods forwarded unchanged to the RPC transport.
pub const PASS_THROUGH_METHODS: [&str; 12] = [
    "eth_gasPrice",
    "eth_getBalance",
    "eth_getCode",
    "eth_getStorageAt",
    "eth_estimateGas",
    "eth_call",
    "eth_blockNumber",
    "eth_getBlockByHash",
    "eth_getBlockByNumber",
    "eth_getTransactionByHash",
    "eth_getTransactionReceipt",
    "eth_getTransactionCount",
];

type RpcFactory = dyn Fn(&ChainEnvironment) -> Arc<dyn RpcTransport> + Send + Sync;

/// Wallet provider backed by Beam player accounts.
///
/// Accounts are cached per chain after the first successful connection.
pub struct Eip1193Provider {
    manager: Arc<SessionManager>,
    rpc_factory: Box<RpcFactory>,
    rpc: RwLock<Arc<dyn RpcTransport>>,
    accounts: Mutex<HashMap<u64, String>>,
    events: broadcast::Sender<ProviderEvent>,
    info: ProviderInfo,
}

impl Eip1193Provider {
    /// Lets dapps detect the Beam provider.
    pub const IS_BEAM: bool = true;

    /// `rpc_factory` builds the node transport for the active chain; it is
    /// called again after every chain switch.
    pub fn new<F>(manager: Arc<SessionManager>, rpc_factory: F) -> Result<Self, ConfigError>
    where
        F: Fn(&ChainEnvironment) -> Arc<dyn RpcTransport> + Send + Sync + 'static,
    {
        let environment = manager.config().environment()?;
        let rpc = rpc_factory(&environment);
        let (events, _) = broadcast::channel(16);

        Ok(Self {
            manager,
            rpc_factory: Box::new(rpc_factory),
            rpc: RwLock::new(rpc),
            accounts: Mutex::new(HashMap::new()),
            events,
            info: ProviderInfo::beam(),
        })
    }

    pub fn info(&self) -> &ProviderInfo {
        &self.info
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }

    /// Clear the session, forget connected accounts and emit `Disconnect`.
    pub fn disconnect(&self) {
        if let Err(e) = self.manager.clear_session() {
            warn!("Failed to clear session on disconnect: {}", e);
        }
        self.accounts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.emit(ProviderEvent::Disconnect);
    }

    /// Handle one EIP-1193 request.
    pub async fn request(&self, args: RequestArguments) -> Result<Value, JsonRpcError> {
        debug!("Provider request: {}", args.method);

        match args.method.as_str() {
            "eth_requestAccounts" => self.request_accounts().await,
            "eth_accounts" => self.accounts().await,
            "eth_sendTransaction" => self.send_transaction(&args).await,
            "eth_signTypedData" | "eth_signTypedData_v4" => self.sign_typed_data(&args).await,
            "personal_sign" => self.personal_sign(&args).await,
            "eth_chainId" => Ok(Value::String(format!("0x{:x}", self.chain_id().await?))),
            "wallet_switchEthereumChain" => self.switch_chain(&args).await,
            "wallet_revokePermissions" => {
                self.disconnect();
                Ok(Value::Null)
            }
            method if PASS_THROUGH_METHODS.contains(&method) => {
                self.transport()
                    .send(method, args.params_or_empty())
                    .await
                    .map_err(from_transport)
            }
            method => Err(JsonRpcError::unsupported_method(method)),
        }
    }

    /// Handle a JSON-RPC 2.0 request object or batch and build the response.
    ///
    /// Failures never escape: they are encoded as `error` members.
    pub async fn handle_json_rpc(&self, payload: Value) -> Value {
        match payload {
            Value::Array(batch) if batch.is_empty() => {
                to_value(JsonRpcResponse::error(
                    Value::Null,
                    JsonRpcError::invalid_request("Invalid request"),
                ))
            }
            Value::Array(batch) => {
                let mut responses = Vec::with_capacity(batch.len());
                for item in batch {
                    responses.push(to_value(self.handle_single(item).await));
                }
                Value::Array(responses)
            }
            single => to_value(self.handle_single(single).await),
        }
    }

    /// [`Eip1193Provider::handle_json_rpc`] for raw text.
    pub async fn handle_json_rpc_str(&self, raw: &str) -> String {
        let response = match serde_json::from_str::<Value>(raw) {
            Ok(payload) => self.handle_json_rpc(payload).await,
            Err(e) => to_value(JsonRpcResponse::error(
                Value::Null,
                JsonRpcError::parse_error(format!("Parse error: {e}")),
            )),
        };
        response.to_string()
    }

    async fn handle_single(&self, item: Value) -> JsonRpcResponse {
        let id = item.get("id").cloned().unwrap_or(Value::Null);
        let request: JsonRpcRequest = match serde_json::from_value(item) {
            Ok(request) => request,
            Err(_) => {
                return JsonRpcResponse::error(id, JsonRpcError::invalid_request("Invalid request"));
            }
        };

        let args = RequestArguments {
            method: request.method,
            params: request.params,
        };
        let outcome = self.request(args).await;
        let mut response = JsonRpcResponse::new(request.id, outcome);
        response.jsonrpc = request.jsonrpc;
        response
    }

    // ========================================================================
    // Methods
    // ========================================================================

    async fn request_accounts(&self) -> Result<Value, JsonRpcError> {
        let chain_id = self.chain_id().await?;
        if let Some(address) = self.cached_account(chain_id) {
            return Ok(Value::from(vec![address]));
        }

        let address = self
            .manager
            .connect(chain_id, CONNECT_MESSAGE)
            .await
            .map_err(|e| JsonRpcError::internal_from("Failed to connect", e))?;

        if address.is_empty() {
            return Err(JsonRpcError::unauthorized(format!(
                "Unauthorised - no address found for chain: {chain_id}"
            )));
        }

        self.accounts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(chain_id, address.clone());
        self.emit(ProviderEvent::AccountsChanged(vec![address.clone()]));

        Ok(Value::from(vec![address]))
    }

    async fn accounts(&self) -> Result<Value, JsonRpcError> {
        let chain_id = self.chain_id().await?;
        if let Some(address) = self.cached_account(chain_id) {
            return Ok(Value::from(vec![address]));
        }

        match self.manager.get_address(chain_id) {
            Some(address) => {
                self.accounts
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(chain_id, address.clone());
                Ok(Value::from(vec![address]))
            }
            None => Ok(Value::Array(Vec::new())),
        }
    }

    async fn send_transaction(&self, args: &RequestArguments) -> Result<Value, JsonRpcError> {
        let chain_id = self.chain_id().await?;
        let account = self.require_account(chain_id)?;

        let interaction: TransactionInteraction = args
            .param(0)
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| JsonRpcError::invalid_params(format!("Invalid transaction: {e}")))?
            .ok_or_else(|| JsonRpcError::invalid_params("Missing transaction"))?;

        let sponsor = self
            .manager
            .config()
            .environment()
            .map(|environment| environment.sponsor)
            .unwrap_or(false);

        let operation = self
            .manager
            .send_transaction(&account, chain_id, sponsor, interaction)
            .await
            .map_err(|e| JsonRpcError::internal_from("Failed to execute transaction", e))?;

        operation
            .transactions
            .first()
            .and_then(|transaction| transaction.transaction_hash.clone())
            .map(Value::String)
            .ok_or_else(|| {
                JsonRpcError::internal("Failed to execute transaction: no transaction hash")
            })
    }

    async fn sign_typed_data(&self, args: &RequestArguments) -> Result<Value, JsonRpcError> {
        let chain_id = self.chain_id().await?;
        let account = self.require_account(chain_id)?;
        let data = parse_and_validate_typed_data(args.param(1), chain_id)?;

        self.sign(chain_id, &account, data).await
    }

    async fn personal_sign(&self, args: &RequestArguments) -> Result<Value, JsonRpcError> {
        let chain_id = self.chain_id().await?;
        let account = self.require_account(chain_id)?;
        let message = args
            .param(0)
            .cloned()
            .ok_or_else(|| JsonRpcError::invalid_params("Missing message"))?;

        self.sign(chain_id, &account, message).await
    }

    async fn sign(&self, chain_id: u64, account: &str, data: Value) -> Result<Value, JsonRpcError> {
        self.manager
            .sign_message_or_data(chain_id, account, data)
            .await
            .map(Value::String)
            .map_err(|e| JsonRpcError::internal_from("Failed to sign transaction", e))
    }

    async fn switch_chain(&self, args: &RequestArguments) -> Result<Value, JsonRpcError> {
        let requested = args
            .param(0)
            .and_then(|param| param.get("chainId"))
            .and_then(parse_quantity)
            .ok_or_else(|| JsonRpcError::invalid_params("Missing or invalid chainId"))?;

        let chain = ChainId::try_from(requested)
            .ok()
            .filter(|chain| self.manager.config().has_chain(*chain))
            .ok_or_else(|| {
                JsonRpcError::invalid_params(format!(
                    "Chain {requested} not found in configuration"
                ))
            })?;

        self.disconnect();

        let environment = self
            .manager
            .config()
            .set_chain_id(chain)
            .and_then(|_| self.manager.config().environment())
            .map_err(|e| JsonRpcError::internal_from("Failed to switch chain", e))?;
        *self.rpc.write().unwrap_or_else(PoisonError::into_inner) =
            (self.rpc_factory)(&environment);
        debug!("Switched to {}", chain);

        let accounts = self
            .request_accounts()
            .await
            .map_err(|e| JsonRpcError::internal_from("Failed to switch chain", e.message))?;

        Ok(accounts.get(0).cloned().unwrap_or(Value::Null))
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn transport(&self) -> Arc<dyn RpcTransport> {
        self.rpc
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn chain_id(&self) -> Result<u64, JsonRpcError> {
        self.transport()
            .chain_id()
            .await
            .map_err(|e| JsonRpcError::internal_from("Failed to detect network", e))
    }

    fn cached_account(&self, chain_id: u64) -> Option<String> {
        self.accounts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&chain_id)
            .cloned()
    }

    fn require_account(&self, chain_id: u64) -> Result<String, JsonRpcError> {
        self.cached_account(chain_id).ok_or_else(|| {
            JsonRpcError::unauthorized("Unauthorised - call eth_requestAccounts first")
        })
    }

    fn emit(&self, event: ProviderEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

fn from_transport(error: TransportError) -> JsonRpcError {
    match error {
        TransportError::Rpc { code, message } => JsonRpcError::new(code, message),
        other => JsonRpcError::internal(other.to_string()),
    }
}

/// A chain id as a JSON number, `0x` hex string or decimal string.
fn parse_quantity(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => match text.strip_prefix("0x") {
            Some(hex) => u64::from_str_radix(hex, 16).ok(),
            None => text.parse().ok(),
        },
        _ => None,
    }
}

fn to_value(response: JsonRpcResponse) -> Value {
    serde_json::to_value(response).unwrap_or_else(|e| {
        serde_json::json!({
            "jsonrpc": "2.0",
            "id": null,
            "error": { "code": -32603, "message": e.to_string() }
        })
    })
}
