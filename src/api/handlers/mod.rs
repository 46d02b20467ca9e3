//! API request handlers for the gateway.

pub mod health; // Liveness and configured model
pub mod mcp_call; // Query answering through MCP tools

// Re-export handlers for easier access
pub(crate) use health::health_check;
pub(crate) use mcp_call::handle_query;
