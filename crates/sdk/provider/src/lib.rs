//! EIP-1193 wallet provider for Beam player accounts.
//!
//! [`Eip1193Provider`] answers wallet methods (`eth_requestAccounts`,
//! `eth_sendTransaction`, signing, chain switching) through the session
//! manager's confirmation flows and forwards plain node queries to an
//! [`beam_core::RpcTransport`].
pub mod eip6963;
pub mod error;
pub mod provider;
pub mod typed_data;
pub mod types;

pub use eip6963::ProviderInfo;
pub use error::{JsonRpcError, ProviderErrorCode, RpcErrorCode};
pub use provider::{CONNECT_MESSAGE, Eip1193Provider, PASS_THROUGH_METHODS};
pub use typed_data::parse_and_validate_typed_data;
pub use types::{
    JsonRpcRequest, JsonRpcResponse, ProviderEvent, RequestArguments, ResponsePayload,
};
