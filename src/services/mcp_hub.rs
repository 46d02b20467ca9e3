use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::errors::ApiError;
use crate::mcp::{
    CallToolResult, McpError, McpSession, McpTool, McpTransport, SseTransport, TransportOptions,
};
use crate::models::McpConfig;
use crate::services::llm::ToolDefinition;
use crate::Result;

static QUALIFIED_TOOL_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^server_(\d+)_(.+)$").expect("qualified tool name pattern is valid")
});

/// Name a tool is offered to the model under
pub fn qualified_tool_name(server_index: usize, tool: &str) -> String {
    format!("server_{}_{}", server_index, tool)
}

/// Split a qualified name back into server index and tool name
pub fn parse_qualified_tool_name(name: &str) -> Option<(usize, &str)> {
    let captures = QUALIFIED_TOOL_NAME.captures(name)?;
    let index = captures.get(1)?.as_str().parse().ok()?;
    Some((index, captures.get(2)?.as_str()))
}

/// An initialized session and the tools it advertised
pub struct ConnectedServer {
    pub name: String,
    pub session: McpSession,
    pub tools: Vec<McpTool>,
}

/// Sessions to every MCP server of one request
#[derive(Default)]
pub struct McpHub {
    servers: Vec<ConnectedServer>,
}

impl McpHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect to all `sse` servers in the config. Servers that fail are logged and skipped.
    pub async fn connect_sse_servers(config: &McpConfig, options: &TransportOptions) -> Self {
        let mut hub = Self::new();

        for (server_name, server) in config.servers() {
            if !server.is_sse() {
                info!(
                    "Skipping {}: unsupported server type {}",
                    server_name, server.kind
                );
                continue;
            }
            let Some(url) = server.url.as_deref() else {
                error!("Failed to connect to {}: missing url", server_name);
                continue;
            };

            let transport = match SseTransport::connect(url, options).await {
                Ok(transport) => transport,
                Err(e) => {
                    error!("Failed to connect to {}: {}", server_name, e);
                    continue;
                }
            };
            info!("Connected to {} at {}", server_name, url);

            if let Err(e) = hub.attach(server_name, Box::new(transport)).await {
                error!("Failed to connect to {}: {}", server_name, e);
            }
        }

        hub
    }

    /// Initialize a session over `transport` and register its tools
    pub async fn attach(
        &mut self,
        server_name: &str,
        transport: Box<dyn McpTransport>,
    ) -> std::result::Result<(), McpError> {
        let session = McpSession::new(transport);

        let tools = match initialize_and_list(&session).await {
            Ok(tools) => tools,
            Err(e) => {
                let _ = session.close().await;
                return Err(e);
            }
        };

        info!(
            "Connected to {} with tools: {:?}",
            server_name,
            tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>()
        );

        self.servers.push(ConnectedServer {
            name: server_name.to_string(),
            session,
            tools,
        });
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn servers(&self) -> &[ConnectedServer] {
        &self.servers
    }

    /// Every tool of every server as a function definition for the model
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.servers
            .iter()
            .enumerate()
            .flat_map(|(index, server)| {
                server.tools.iter().map(move |tool| {
                    ToolDefinition::function(
                        qualified_tool_name(index, &tool.name),
                        tool.description.clone(),
                        tool.input_schema.clone(),
                    )
                })
            })
            .collect()
    }

    /// Route a qualified tool call to the server that owns it
    pub async fn call_tool(&self, qualified_name: &str, arguments: Value) -> Result<CallToolResult> {
        let (index, tool_name) = parse_qualified_tool_name(qualified_name)
            .ok_or_else(|| ApiError::InvalidToolCall(qualified_name.to_string()))?;

        let server = self
            .servers
            .get(index)
            .ok_or_else(|| ApiError::InvalidToolCall(qualified_name.to_string()))?;

        info!("Calling tool {} with args {}", tool_name, arguments);
        let result = server.session.call_tool(tool_name, arguments).await?;
        info!("Tool {} returned {:?}", tool_name, result);

        if result.is_error {
            warn!("Tool {} on {} reported an error", tool_name, server.name);
        }

        Ok(result)
    }

    /// Close every session, never failing
    pub async fn shutdown(&mut self) {
        for server in self.servers.drain(..) {
            if let Err(e) = server.session.close().await {
                error!("Cleanup error for {}: {}", server.name, e);
            }
        }
    }
}

async fn initialize_and_list(session: &McpSession) -> std::result::Result<Vec<McpTool>, McpError> {
    session.initialize().await?;
    session.list_tools().await
}
