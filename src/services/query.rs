use serde_json::Value;
use tracing::{debug, info, warn};

use crate::errors::ApiError;
use crate::mcp::format_tool_result;
use crate::services::llm::{ChatBackend, ChatMessage, ToolCall};
use crate::services::mcp_hub::McpHub;
use crate::Result;

/// Answer `query` with the model, executing the tool calls it requests
/// against the hub until it replies without any.
pub async fn process_query(
    query: &str,
    hub: &McpHub,
    llm: &dyn ChatBackend,
    max_tool_rounds: usize,
) -> Result<String> {
    if hub.is_empty() {
        return Err(ApiError::NoActiveConnections);
    }

    let tools = hub.tool_definitions();
    let mut messages = vec![ChatMessage::user(query)];

    debug!("Request messages: {:?}, tools: {:?}", messages, tools);
    let mut reply = llm.complete(&messages, &tools).await?;
    debug!("Reply: {:?}", reply);

    let mut final_text = Vec::new();
    if reply.requested_tool_calls().is_empty() {
        if let Some(content) = reply.content.take() {
            final_text.push(content);
        }
        return Ok(final_text.concat());
    }

    let mut rounds = 0;
    while !reply.requested_tool_calls().is_empty() {
        if rounds == max_tool_rounds {
            warn!(
                "Stopping after {} tool rounds, model still requests tools",
                max_tool_rounds
            );
            break;
        }
        rounds += 1;

        let tool_calls = reply.requested_tool_calls().to_vec();
        let mut tool_messages = Vec::with_capacity(tool_calls.len());

        for tool_call in &tool_calls {
            let arguments = parse_arguments(tool_call)?;
            let result = hub.call_tool(&tool_call.function.name, arguments).await?;
            tool_messages.push(ChatMessage::tool_result(
                tool_call.id.clone(),
                format_tool_result(&result),
            ));
        }

        messages.push(reply);
        messages.extend(tool_messages);

        info!("Tool round {} done, asking model again", rounds);
        debug!("LLM request: {:?}", messages);
        reply = llm.complete(&messages, &tools).await?;

        if let Some(content) = reply.content.as_ref().filter(|c| !c.is_empty()) {
            final_text.push(content.clone());
        }
    }

    Ok(final_text.concat())
}

fn parse_arguments(tool_call: &ToolCall) -> Result<Value> {
    let raw = tool_call.function.arguments.trim();
    if raw.is_empty() {
        return Ok(Value::Object(Default::default()));
    }

    serde_json::from_str(raw).map_err(|e| {
        ApiError::InvalidToolCall(format!(
            "{} (arguments are not valid JSON: {})",
            tool_call.function.name, e
        ))
    })
}
