//! MCP (Model Context Protocol) client over the HTTP+SSE transport.
//!
//! - `sse`: incremental Server-Sent Events decoder
//! - `protocol`: JSON-RPC 2.0 envelopes and the MCP types we consume
//! - `transport`: `McpTransport` trait and the SSE implementation
//! - `session`: MCP lifecycle (initialize, tools/list, tools/call) over a transport

pub mod protocol;
pub mod session;
pub mod sse;
pub mod transport;

pub use protocol::{format_tool_result, CallToolResult, McpContent, McpTool};
pub use session::McpSession;
pub use transport::{McpTransport, SseTransport, TransportOptions};

use thiserror::Error;

/// Protocol revision sent in `initialize`
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Server protocol revisions we can talk to
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2024-11-05", "2025-03-26", "2025-06-18"];

#[derive(Error, Debug)]
pub enum McpError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("Invalid server URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid message endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Connection closed")]
    Closed,

    #[error("Timed out waiting for response to {0}")]
    Timeout(String),

    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
