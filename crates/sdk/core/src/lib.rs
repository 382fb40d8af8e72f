//! Data contracts and remote-service seams for the Beam player SDK.
//!
//! This crate has no behavior of its own. It defines what the SDK exchanges
//! with the outside world so that the session subsystem, the HTTP client and
//! the wallet provider can be developed and tested independently.
//!
//! # Architecture
//!
//! ```text
//! Layer 2: beam-client (composition root)
//!          ├── beam-provider (EIP-1193 facade)
//!          └── beam-session  (keys, sessions, confirmation channel)
//!
//! Layer 1: Remote traits (this crate)
//!          ├── PlayerApi      sessions, operations, connection requests
//!          ├── ConnectionApi  message signatures, ownership, transactions
//!          └── RpcTransport   pass-through JSON-RPC
//!
//! Layer 0: beam-api (reqwest implementations)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use beam_core::{PlayerApi, Session};
//!
//! async fn lookup(api: &dyn PlayerApi, entity: &str, address: Address) -> Option<Session> {
//!     api.get_active_session(entity, &address, 13337).await.ok().flatten()
//! }
//! ```

pub mod traits;
pub mod types;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use traits::{ApiError, ConnectionApi, PlayerApi, RpcTransport, TransportError};

pub use types::{
    AuthProvider, ChainId, ConfirmOperationAction, ConfirmOperationRequest,
    ConfirmOperationStatus, CreateConnectionRequest, CreateOperationRequest,
    CreateTransactionRequest, GenerateSessionRequest, MessageSignatureRequest, OperationAction,
    OperationActionInput, OperationStatus, OperationTransaction, PlayerOperation,
    RequestUrlResponse, RevokeSessionRequest, Session, SignatureInput, SignatureKind,
    SignatureRequest, TransactionInteraction, UnknownChainId, VerifyOwnershipRequest,
};

#[cfg(any(test, feature = "mock"))]
pub use mock::{ApiCall, MockApi, MockRpcTransport};
