//! HTTP implementations of the Beam remote-service traits.
//!
//! - [`HttpApiClient`] implements `PlayerApi` and `ConnectionApi`
//! - [`HttpRpcTransport`] implements `RpcTransport` over JSON-RPC 2.0
//!
//! Both resolve their endpoint per request, so a chain switch takes effect
//! without rebuilding the clients.
pub mod client;
pub mod endpoint;
pub mod rpc;

pub use client::HttpApiClient;
pub use endpoint::{ApiEndpoint, EndpointResolver};
pub use rpc::{HttpRpcTransport, RpcUrlResolver};
