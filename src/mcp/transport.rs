use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};
use url::Url;

use super::protocol::{
    IncomingMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, METHOD_NOT_FOUND,
};
use super::sse::{SseDecoder, SseEvent};
use super::McpError;

const DEFAULT_CONNECT_TIMEOUT_SECONDS: u64 = 5;
const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 60;
const DEFAULT_SSE_READ_TIMEOUT_SECONDS: u64 = 300;

type PendingRequests = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

/// A bidirectional JSON-RPC channel to one MCP server
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Send a request and wait for its result
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError>;

    /// Send a notification, no response expected
    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError>;

    async fn close(&self) -> Result<(), McpError>;
}

/// Timeouts for the SSE transport
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Time allowed for the stream to open and announce its endpoint
    pub connect_timeout: Duration,
    /// Time allowed for a single request to be answered
    pub request_timeout: Duration,
    /// Maximum silence on the event stream before it is considered dead
    pub sse_read_timeout: Duration,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECONDS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECONDS),
            sse_read_timeout: Duration::from_secs(DEFAULT_SSE_READ_TIMEOUT_SECONDS),
        }
    }
}

/// MCP HTTP+SSE transport.
///
/// Server-to-client traffic arrives on a long-lived `GET` event stream, client-to-server
/// messages are `POST`ed to the endpoint announced in the stream's first `endpoint` event.
pub struct SseTransport {
    http: reqwest::Client,
    endpoint: Url,
    pending: PendingRequests,
    /// Set once the event stream is gone, no response can arrive after that
    closed: Arc<AtomicBool>,
    next_id: AtomicU64,
    request_timeout: Duration,
    reader: JoinHandle<()>,
}

impl SseTransport {
    pub async fn connect(url: &str, options: &TransportOptions) -> Result<Self, McpError> {
        let sse_url = Url::parse(url)?;
        let http = reqwest::Client::builder()
            .connect_timeout(options.connect_timeout)
            .build()?;

        let response = time::timeout(
            options.connect_timeout,
            http.get(sse_url.clone())
                .header(reqwest::header::ACCEPT, "text/event-stream")
                .send(),
        )
        .await
        .map_err(|_| McpError::Timeout("event stream".to_string()))??
        .error_for_status()?;

        info!("Event stream opened at {}", sse_url);

        let pending: PendingRequests = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let (endpoint_tx, endpoint_rx) = oneshot::channel();

        let reader = tokio::spawn(read_event_stream(
            response,
            sse_url,
            http.clone(),
            pending.clone(),
            closed.clone(),
            endpoint_tx,
            options.sse_read_timeout,
        ));

        let endpoint = match time::timeout(options.connect_timeout, endpoint_rx).await {
            Ok(Ok(endpoint)) => endpoint,
            Ok(Err(_)) => {
                reader.abort();
                return Err(McpError::Closed);
            }
            Err(_) => {
                reader.abort();
                return Err(McpError::Timeout("endpoint event".to_string()));
            }
        };

        let endpoint = match endpoint {
            Ok(endpoint) => endpoint,
            Err(err) => {
                reader.abort();
                return Err(err);
            }
        };

        info!("Message endpoint: {}", endpoint);

        Ok(Self {
            http,
            endpoint,
            pending,
            closed,
            next_id: AtomicU64::new(0),
            request_timeout: options.request_timeout,
            reader,
        })
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn post<T: serde::Serialize + ?Sized>(&self, message: &T) -> Result<(), McpError> {
        post_message(&self.http, &self.endpoint, message, self.request_timeout).await
    }
}

#[async_trait]
impl McpTransport for SseTransport {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        {
            // Checked under the lock the reader clears on exit, so a waiter is never stranded
            let mut pending = self.pending.lock().await;
            if self.is_closed() {
                return Err(McpError::Closed);
            }
            pending.insert(id, tx);
        }

        debug!("-> {} (id {})", method, id);
        if let Err(err) = self.post(&JsonRpcRequest::new(id, method, params)).await {
            self.pending.lock().await.remove(&id);
            return Err(err);
        }

        match time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => response.into_result(),
            Ok(Err(_)) => Err(McpError::Closed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(McpError::Timeout(method.to_string()))
            }
        }
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        if self.is_closed() {
            return Err(McpError::Closed);
        }
        debug!("-> {} (notification)", method);
        self.post(&JsonRpcNotification::new(method, params)).await
    }

    async fn close(&self) -> Result<(), McpError> {
        self.closed.store(true, Ordering::SeqCst);
        self.reader.abort();
        self.pending.lock().await.clear();
        Ok(())
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn post_message<T: serde::Serialize + ?Sized>(
    http: &reqwest::Client,
    endpoint: &Url,
    message: &T,
    timeout: Duration,
) -> Result<(), McpError> {
    http.post(endpoint.clone())
        .timeout(timeout)
        .json(message)
        .send()
        .await?
        .error_for_status()?;
    Ok(())
}

/// Resolve the `endpoint` event data against the stream URL. The endpoint must stay
/// on the same origin as the stream.
pub(crate) fn resolve_endpoint(sse_url: &Url, data: &str) -> Result<Url, McpError> {
    let endpoint = sse_url
        .join(data.trim())
        .map_err(|e| McpError::InvalidEndpoint(format!("{}: {}", data, e)))?;

    if endpoint.origin() != sse_url.origin() {
        return Err(McpError::InvalidEndpoint(format!(
            "endpoint origin does not match connection origin: {}",
            endpoint
        )));
    }

    Ok(endpoint)
}

async fn read_event_stream(
    response: reqwest::Response,
    sse_url: Url,
    http: reqwest::Client,
    pending: PendingRequests,
    closed: Arc<AtomicBool>,
    endpoint_tx: oneshot::Sender<Result<Url, McpError>>,
    read_timeout: Duration,
) {
    let mut stream = response.bytes_stream();
    let mut decoder = SseDecoder::new();
    let mut endpoint_tx = Some(endpoint_tx);
    let mut endpoint: Option<Url> = None;

    loop {
        let chunk = match time::timeout(read_timeout, stream.next()).await {
            Ok(Some(Ok(chunk))) => chunk,
            Ok(Some(Err(err))) => {
                warn!("Event stream error from {}: {}", sse_url, err);
                break;
            }
            Ok(None) => {
                info!("Event stream from {} ended", sse_url);
                break;
            }
            Err(_) => {
                warn!("No events from {} for {:?}, closing", sse_url, read_timeout);
                break;
            }
        };

        for event in decoder.feed(&chunk) {
            match event.kind() {
                "endpoint" => {
                    let resolved = resolve_endpoint(&sse_url, &event.data);
                    if let Ok(url) = &resolved {
                        endpoint = Some(url.clone());
                    }
                    match endpoint_tx.take() {
                        Some(tx) => {
                            let _ = tx.send(resolved);
                        }
                        None => warn!("Ignoring repeated endpoint event: {}", event.data),
                    }
                }
                "message" => {
                    handle_message(&event, endpoint.as_ref(), &http, &pending, read_timeout).await
                }
                other => debug!("Ignoring SSE event of type {}", other),
            }
        }
    }

    // Wake every waiter; their receivers see a closed channel
    closed.store(true, Ordering::SeqCst);
    pending.lock().await.clear();
}

async fn handle_message(
    event: &SseEvent,
    endpoint: Option<&Url>,
    http: &reqwest::Client,
    pending: &PendingRequests,
    timeout: Duration,
) {
    let message = match IncomingMessage::parse(&event.data) {
        Ok(message) => message,
        Err(err) => {
            warn!("Dropping malformed message: {}", err);
            return;
        }
    };

    match message {
        IncomingMessage::Response(response) => {
            let waiter = match response.numeric_id() {
                Some(id) => pending.lock().await.remove(&id),
                None => None,
            };
            match waiter {
                Some(tx) => {
                    let _ = tx.send(response);
                }
                None => warn!("Response for unknown request id {}", response.id),
            }
        }
        IncomingMessage::Request { id, method, .. } => {
            let reply = if method == "ping" {
                JsonRpcResponse::success(id, json!({}))
            } else {
                JsonRpcResponse::failure(
                    id,
                    METHOD_NOT_FOUND,
                    format!("Method not found: {}", method),
                )
            };

            let Some(endpoint) = endpoint else {
                warn!("Server request {} received before endpoint", method);
                return;
            };
            // Answered off the reader so responses keep flowing while the POST is in flight
            let (http, endpoint) = (http.clone(), endpoint.clone());
            tokio::spawn(async move {
                if let Err(err) = post_message(&http, &endpoint, &reply, timeout).await {
                    warn!("Failed to answer server request {}: {}", method, err);
                }
            });
        }
        IncomingMessage::Notification { method, params } => {
            debug!("Server notification {}: {:?}", method, params);
        }
    }
}
