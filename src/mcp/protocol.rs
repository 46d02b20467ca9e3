//! JSON-RPC 2.0 envelopes and the subset of MCP types the gateway consumes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::McpError;

pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC "method not found"
pub const METHOD_NOT_FOUND: i64 = -32601;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Response sent by either side. Ids are kept as raw JSON since servers
/// may echo them back as strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Numeric id of the request this answers, if it is one of ours
    pub fn numeric_id(&self) -> Option<u64> {
        match &self.id {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn into_result(self) -> Result<Value, McpError> {
        if let Some(error) = self.error {
            return Err(McpError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

/// A message received from the server, classified by shape
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    Response(JsonRpcResponse),
    Request {
        id: Value,
        method: String,
        params: Option<Value>,
    },
    Notification {
        method: String,
        params: Option<Value>,
    },
}

impl IncomingMessage {
    pub fn parse(raw: &str) -> Result<Self, McpError> {
        let value: Value = serde_json::from_str(raw)?;
        let object = value
            .as_object()
            .ok_or_else(|| McpError::Protocol(format!("expected a JSON object, got: {raw}")))?;

        let method = object.get("method").and_then(Value::as_str);
        let id = object.get("id").filter(|id| !id.is_null());

        match (method, id) {
            (Some(method), Some(id)) => Ok(Self::Request {
                id: id.clone(),
                method: method.to_string(),
                params: object.get("params").cloned(),
            }),
            (Some(method), None) => Ok(Self::Notification {
                method: method.to_string(),
                params: object.get("params").cloned(),
            }),
            (None, Some(_)) => Ok(Self::Response(serde_json::from_value(value)?)),
            (None, None) => Err(McpError::Protocol(format!(
                "message is neither request, response nor notification: {raw}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Implementation {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: Value,
    #[serde(default)]
    pub server_info: Implementation,
}

/// Tool definition as advertised by an MCP server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct McpTool {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "empty_object_schema")]
    pub input_schema: Value,
}

fn empty_object_schema() -> Value {
    serde_json::json!({ "type": "object" })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    pub tools: Vec<McpTool>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// Content block returned by `tools/call`. Anything but text is kept as the raw block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "Value", into = "Value")]
pub enum McpContent {
    Text(String),
    Other(Value),
}

impl From<Value> for McpContent {
    fn from(block: Value) -> Self {
        match (block["type"].as_str(), block["text"].as_str()) {
            (Some("text"), Some(text)) => McpContent::Text(text.to_string()),
            _ => McpContent::Other(block),
        }
    }
}

impl From<McpContent> for Value {
    fn from(content: McpContent) -> Self {
        match content {
            McpContent::Text(text) => serde_json::json!({ "type": "text", "text": text }),
            McpContent::Other(block) => block,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<McpContent>,
    #[serde(default)]
    pub is_error: bool,
}

/// Render a tool result as the text fed back to the model
pub fn format_tool_result(result: &CallToolResult) -> String {
    result
        .content
        .iter()
        .map(|block| match block {
            McpContent::Text(text) => text.clone(),
            McpContent::Other(block) => block.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
