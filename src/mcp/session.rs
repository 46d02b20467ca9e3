use serde_json::{json, Value};
use tracing::{debug, info};

use super::protocol::{CallToolResult, InitializeResult, ListToolsResult, McpTool};
use super::transport::McpTransport;
use super::{McpError, PROTOCOL_VERSION, SUPPORTED_PROTOCOL_VERSIONS};

/// Client side of an MCP session, generic over the transport
pub struct McpSession {
    transport: Box<dyn McpTransport>,
}

impl McpSession {
    pub fn new(transport: Box<dyn McpTransport>) -> Self {
        Self { transport }
    }

    /// Run the `initialize` handshake and announce `notifications/initialized`
    pub async fn initialize(&self) -> Result<InitializeResult, McpError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            }
        });

        let result: InitializeResult =
            serde_json::from_value(self.transport.request("initialize", Some(params)).await?)?;

        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&result.protocol_version.as_str()) {
            return Err(McpError::UnsupportedVersion(result.protocol_version));
        }

        info!(
            "Initialized session with {} {} (protocol {})",
            result.server_info.name, result.server_info.version, result.protocol_version
        );

        self.transport
            .notify("notifications/initialized", None)
            .await?;

        Ok(result)
    }

    /// List every tool, following pagination cursors
    pub async fn list_tools(&self) -> Result<Vec<McpTool>, McpError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let page: ListToolsResult =
                serde_json::from_value(self.transport.request("tools/list", params).await?)?;

            debug!("tools/list page with {} tools", page.tools.len());
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if !next.is_empty() && cursor.as_deref() != Some(next.as_str()) => {
                    cursor = Some(next)
                }
                _ => break,
            }
        }

        Ok(tools)
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, McpError> {
        let params = json!({ "name": name, "arguments": arguments });
        let result = self.transport.request("tools/call", Some(params)).await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn close(&self) -> Result<(), McpError> {
        self.transport.close().await
    }
}
