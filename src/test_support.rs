//! Fakes shared by the unit tests: an in-memory MCP transport, a scripted chat
//! backend, and loopback HTTP servers speaking MCP over SSE and the chat API.

use async_trait::async_trait;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::sse::{Event, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, Stream, StreamExt};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::config::LlmSettings;
use crate::errors::ApiError;
use crate::mcp::{McpError, McpTool, McpTransport};
use crate::services::llm::{ChatBackend, ChatMessage, FunctionCall, Role, ToolCall, ToolDefinition};

pub type CallLog = Arc<Mutex<Vec<(String, Option<Value>)>>>;

fn tool_output(name: &str, arguments: &Value) -> Value {
    if name == "failing" {
        return json!({"content": [{"type": "text", "text": "boom"}], "isError": true});
    }
    json!({"content": [{"type": "text", "text": format!("{}({})", name, arguments)}], "isError": false})
}

/// In-memory MCP server behind the transport trait
#[derive(Clone)]
pub struct FakeTransport {
    tools: Vec<McpTool>,
    protocol_version: String,
    page_size: usize,
    log: CallLog,
    closed: Arc<AtomicBool>,
}

impl FakeTransport {
    pub fn new(tools: Vec<McpTool>) -> Self {
        Self {
            tools,
            protocol_version: crate::mcp::PROTOCOL_VERSION.to_string(),
            page_size: usize::MAX,
            log: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn tool(name: &str) -> McpTool {
        McpTool {
            name: name.to_string(),
            description: Some(format!("{} tool", name)),
            input_schema: json!({"type": "object", "properties": {}}),
        }
    }

    pub fn with_protocol_version(mut self, version: &str) -> Self {
        self.protocol_version = version.to_string();
        self
    }

    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    /// Params of every call of `method`, in order
    pub fn calls(&self, method: &str) -> Vec<Option<Value>> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl McpTransport for FakeTransport {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        self.log
            .lock()
            .unwrap()
            .push((method.to_string(), params.clone()));

        match method {
            "initialize" => Ok(json!({
                "protocolVersion": self.protocol_version,
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "fake", "version": "1.0.0"}
            })),
            "tools/list" => {
                let start = params
                    .as_ref()
                    .and_then(|p| p["cursor"].as_str())
                    .and_then(|c| c.parse::<usize>().ok())
                    .unwrap_or(0);
                let end = start.saturating_add(self.page_size).min(self.tools.len());
                let next_cursor = (end < self.tools.len()).then(|| end.to_string());
                Ok(json!({"tools": self.tools[start..end], "nextCursor": next_cursor}))
            }
            "tools/call" => {
                let params = params.unwrap_or_default();
                let name = params["name"].as_str().unwrap_or_default();
                if !self.tools.iter().any(|t| t.name == name) {
                    return Err(McpError::Rpc {
                        code: -32602,
                        message: format!("Unknown tool: {}", name),
                    });
                }
                Ok(tool_output(name, &params["arguments"]))
            }
            other => Err(McpError::Rpc {
                code: -32601,
                message: format!("Method not found: {}", other),
            }),
        }
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        self.log.lock().unwrap().push((method.to_string(), params));
        Ok(())
    }

    async fn close(&self) -> Result<(), McpError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Chat backend replaying canned assistant messages
pub struct ScriptedChat {
    script: Mutex<VecDeque<ChatMessage>>,
    requests: Mutex<Vec<(Vec<ChatMessage>, Vec<ToolDefinition>)>>,
}

impl ScriptedChat {
    pub fn new(script: Vec<ChatMessage>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn text(content: &str) -> ChatMessage {
        ChatMessage {
            role: Role::Assistant,
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn tool_calls(calls: &[(&str, &str, &str)]) -> ChatMessage {
        ChatMessage {
            role: Role::Assistant,
            content: None,
            tool_calls: Some(
                calls
                    .iter()
                    .map(|(id, name, arguments)| ToolCall {
                        id: id.to_string(),
                        kind: "function".to_string(),
                        function: FunctionCall {
                            name: name.to_string(),
                            arguments: arguments.to_string(),
                        },
                    })
                    .collect(),
            ),
            tool_call_id: None,
        }
    }

    pub fn tool_calls_with_text(content: &str, calls: &[(&str, &str, &str)]) -> ChatMessage {
        let mut message = Self::tool_calls(calls);
        message.content = Some(content.to_string());
        message
    }

    pub fn requests(&self) -> Vec<(Vec<ChatMessage>, Vec<ToolDefinition>)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedChat {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> crate::Result<ChatMessage> {
        self.requests
            .lock()
            .unwrap()
            .push((messages.to_vec(), tools.to_vec()));
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ApiError::Llm("script exhausted".to_string()))
    }
}

fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();
    let server = axum::Server::from_tcp(listener)
        .unwrap()
        .serve(app.into_make_service());
    tokio::spawn(server);
    addr
}

/// Serve the gateway router with peer addresses, as the per-IP limiter needs them
pub fn serve_api(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();
    let server = axum::Server::from_tcp(listener)
        .unwrap()
        .serve(app.into_make_service_with_connect_info::<SocketAddr>());
    tokio::spawn(server);
    addr
}

#[derive(Clone, Default)]
struct ChatState {
    script: Arc<Mutex<VecDeque<Value>>>,
    requests: Arc<Mutex<Vec<Value>>>,
}

/// Loopback chat-completions API answering from a script
pub struct FakeChatServer {
    addr: SocketAddr,
    state: ChatState,
}

impl FakeChatServer {
    /// Each scripted value is the `message` of one completion; once the script
    /// is exhausted the server answers 500.
    pub async fn start(script: Vec<Value>) -> Self {
        let state = ChatState {
            script: Arc::new(Mutex::new(script.into())),
            ..Default::default()
        };
        let app = Router::new()
            .route("/v1/chat/completions", post(chat_completions))
            .with_state(state.clone());

        Self {
            addr: serve(app),
            state,
        }
    }

    pub fn settings(&self) -> LlmSettings {
        LlmSettings {
            model: "test-model".to_string(),
            base_url: format!("http://{}/v1/", self.addr),
            api_key: "sk-test".to_string(),
            timeout: 10.0,
        }
    }

    pub fn requests(&self) -> Vec<Value> {
        self.state.requests.lock().unwrap().clone()
    }
}

async fn chat_completions(
    State(state): State<ChatState>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.requests.lock().unwrap().push(body);
    let next = state.script.lock().unwrap().pop_front();

    match next {
        Some(message) => (
            StatusCode::OK,
            Json(json!({
                "id": "chatcmpl-test",
                "object": "chat.completion",
                "choices": [{"index": 0, "message": message, "finish_reason": "stop"}]
            })),
        ),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": {"message": "script exhausted"}})),
        ),
    }
}

type EventSender = mpsc::UnboundedSender<Event>;

#[derive(Clone, Default)]
struct McpState {
    tools: Arc<Vec<Value>>,
    sessions: Arc<Mutex<HashMap<String, EventSender>>>,
    next_session: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<Value>>>,
}

/// Loopback MCP server using the HTTP+SSE transport.
///
/// Routes: `/sse` (well behaved, pings the client after announcing the endpoint),
/// `/silent` (never announces an endpoint), `/foreign` (announces a cross-origin endpoint),
/// `/ending` (stream ends right after the endpoint), `/quiet` (announces the endpoint and
/// then never sends another event, requests go unanswered).
pub struct FakeMcpServer {
    addr: SocketAddr,
    state: McpState,
}

impl FakeMcpServer {
    pub async fn start(tools: Vec<McpTool>) -> Self {
        let state = McpState {
            tools: Arc::new(
                tools
                    .iter()
                    .map(|t| serde_json::to_value(t).unwrap())
                    .collect(),
            ),
            ..Default::default()
        };
        let app = Router::new()
            .route("/sse", get(open_stream))
            .route("/silent", get(silent_stream))
            .route("/foreign", get(foreign_stream))
            .route("/ending", get(ending_stream))
            .route("/quiet", get(quiet_stream))
            .route("/messages", post(receive_message))
            .with_state(state.clone());

        Self {
            addr: serve(app),
            state,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Every JSON-RPC message the server received
    pub fn received(&self) -> Vec<Value> {
        self.state.received.lock().unwrap().clone()
    }

    pub fn received_methods(&self) -> Vec<String> {
        self.received()
            .iter()
            .filter_map(|m| m["method"].as_str().map(str::to_string))
            .collect()
    }
}

fn event_stream(rx: mpsc::UnboundedReceiver<Event>) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (Ok(event), rx))
    })
}

async fn open_stream(
    State(state): State<McpState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session_id = state.next_session.fetch_add(1, Ordering::SeqCst).to_string();
    let (tx, rx) = mpsc::unbounded_channel();

    let _ = tx.send(
        Event::default()
            .event("endpoint")
            .data(format!("/messages?session_id={}", session_id)),
    );
    let _ = tx.send(
        Event::default()
            .event("message")
            .data(json!({"jsonrpc": "2.0", "id": "srv-ping", "method": "ping"}).to_string()),
    );

    state.sessions.lock().unwrap().insert(session_id, tx);
    Sse::new(event_stream(rx))
}

async fn silent_stream() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    Sse::new(stream::pending::<Result<Event, Infallible>>())
}

async fn foreign_stream() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let endpoint = Event::default()
        .event("endpoint")
        .data("http://elsewhere.invalid/messages");
    Sse::new(stream::iter(vec![Ok::<_, Infallible>(endpoint)]).chain(stream::pending()))
}

/// Register a session whose messages are accepted but never answered
fn mute_session(state: &McpState) -> Event {
    let session_id = state.next_session.fetch_add(1, Ordering::SeqCst).to_string();
    let (tx, _) = mpsc::unbounded_channel();
    state.sessions.lock().unwrap().insert(session_id.clone(), tx);
    Event::default()
        .event("endpoint")
        .data(format!("/messages?session_id={}", session_id))
}

async fn ending_stream(
    State(state): State<McpState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let endpoint = mute_session(&state);
    Sse::new(stream::iter(vec![Ok::<_, Infallible>(endpoint)]))
}

async fn quiet_stream(
    State(state): State<McpState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let endpoint = mute_session(&state);
    Sse::new(stream::iter(vec![Ok::<_, Infallible>(endpoint)]).chain(stream::pending()))
}

async fn receive_message(
    State(state): State<McpState>,
    Query(query): Query<HashMap<String, String>>,
    Json(message): Json<Value>,
) -> StatusCode {
    state.received.lock().unwrap().push(message.clone());

    let sender = query
        .get("session_id")
        .and_then(|id| state.sessions.lock().unwrap().get(id).cloned());
    let Some(sender) = sender else {
        return StatusCode::NOT_FOUND;
    };

    // Notifications and replies to our ping need no answer
    let (Some(id), Some(method)) = (message.get("id"), message["method"].as_str()) else {
        return StatusCode::ACCEPTED;
    };

    let result = match method {
        "initialize" => json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {"tools": {}},
            "serverInfo": {"name": "fake-sse", "version": "0.1.0"}
        }),
        "tools/list" => json!({"tools": *state.tools}),
        "tools/call" => {
            let name = message["params"]["name"].as_str().unwrap_or_default();
            let arguments = &message["params"]["arguments"];
            match name {
                "forecast" => json!({
                    "content": [{"type": "text", "text": format!("Sunny in {}", arguments["city"].as_str().unwrap_or("?"))}],
                    "isError": false
                }),
                other => tool_output(other, arguments),
            }
        }
        _ => {
            let error = json!({"jsonrpc": "2.0", "id": id, "error": {"code": -32601, "message": "Method not found"}});
            let _ = sender.send(Event::default().event("message").data(error.to_string()));
            return StatusCode::ACCEPTED;
        }
    };

    let response = json!({"jsonrpc": "2.0", "id": id, "result": result});
    let _ = sender.send(Event::default().event("message").data(response.to_string()));
    StatusCode::ACCEPTED
}
