use axum::Json;
use serde_json::{json, Value};
use std::sync::OnceLock;

/// Static JSON response for the index endpoint
static INDEX_JSON: OnceLock<Value> = OnceLock::new();

/// Handler for the index endpoint that provides API documentation
///
/// # Endpoint: GET /
///
/// # Returns
/// * `Json<Value>` - JSON response containing API endpoint documentation
pub fn index() -> Json<Value> {
    let value = INDEX_JSON.get_or_init(|| {
        json!({
            "endpoints": [
                {
                    "path": "/",
                    "method": "GET",
                    "description": "API endpoint documentation",
                    "params": {}
                },
                {
                    "path": "/mcpcall",
                    "method": "POST",
                    "description": "Answer a query with an LLM that may call tools of the given remote MCP servers",
                    "params": {
                        "query": {
                            "type": "string",
                            "required": true,
                            "description": "Natural language query for the model"
                        },
                        "mcp_config": {
                            "type": "object",
                            "required": true,
                            "description": "{\"mcpServers\": {name: {\"type\": \"sse\", \"url\": ...}}}; servers of other types are skipped"
                        }
                    }
                },
                {
                    "path": "/health",
                    "method": "GET",
                    "description": "Service health and configured model",
                    "params": {}
                },
            ]
        })
    });

    Json(value.clone())
}
