//! Remote tool gateway client for Foreman.
//!
//! Talks MCP over streamable HTTP (via `rmcp`), either unauthenticated or
//! with SigV4-signed requests, and turns the gateway's tool listing into
//! [`foreman_core::Tool`] handles.

mod http;

pub mod acquirer;
pub mod session;
pub mod transport;

pub use acquirer::{Acquisition, GatewayStatus, ToolAcquirer};
pub use session::{McpSession, RemoteTool};
pub use transport::{
    DEFAULT_REQUEST_TIMEOUT, GatewaySession, GatewayTransport, PlainTransport, SigV4Transport,
    transport_from_config,
};
