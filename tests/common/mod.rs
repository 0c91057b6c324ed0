//! Shared test utilities for integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{self, Stream};
use mcp_sse_client::client::{FrameStream, PostResponse, Transport};
use mcp_sse_client::config::{ClientConfig, ReconnectPolicy};
use mcp_sse_client::error::{McpError, McpResult};
use mcp_sse_client::types::{RawFrame, ToolCallRequest};
use serde_json::{json, Value};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A config with short timings suitable for tests.
pub fn test_config() -> ClientConfig {
    let mut config = ClientConfig::new("http://mock.local");
    config.call_timeout = Duration::from_secs(5);
    config.connect_timeout = Duration::from_secs(2);
    config.reconnect = ReconnectPolicy {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        multiplier: 2.0,
        max_attempts: 3,
    };
    config
}

/// Poll `check` until it returns true, panicking after two seconds.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 2s"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ---------------------------------------------------------------------------
// MockTransport
// ---------------------------------------------------------------------------

type PostReply = Box<dyn FnMut(&ToolCallRequest) -> McpResult<PostResponse> + Send>;

/// In-memory transport. Each `open_stream` pops the next scripted outcome;
/// with nothing scripted it fails like an unreachable server.
pub struct MockTransport {
    opens: Mutex<VecDeque<McpResult<FrameStream>>>,
    open_count: AtomicUsize,
    posts: Mutex<Vec<(String, ToolCallRequest)>>,
    post_reply: Mutex<PostReply>,
    closed: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            opens: Mutex::new(VecDeque::new()),
            open_count: AtomicUsize::new(0),
            posts: Mutex::new(Vec::new()),
            post_reply: Mutex::new(Box::new(|_| Ok(PostResponse::accepted()))),
            closed: AtomicBool::new(false),
        })
    }

    /// Script the next successful `open_stream` and return its controller.
    pub fn push_stream(&self) -> StreamController {
        let (tx, rx) = mpsc::unbounded_channel();
        let frames: FrameStream = Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        }));
        self.opens.lock().unwrap().push_back(Ok(frames));
        StreamController { tx }
    }

    /// Script a stream that already carries `tools` and `endpoint` events.
    pub fn push_session(&self, session_id: &str, tools: &[&str]) -> StreamController {
        let controller = self.push_stream();
        controller.tools(tools);
        controller.endpoint(session_id);
        controller
    }

    /// Script a failing `open_stream`.
    pub fn push_open_failure(&self, message: &str) {
        self.opens
            .lock()
            .unwrap()
            .push_back(Err(McpError::Transport(message.to_string())));
    }

    pub fn set_post_reply<F>(&self, reply: F)
    where
        F: FnMut(&ToolCallRequest) -> McpResult<PostResponse> + Send + 'static,
    {
        *self.post_reply.lock().unwrap() = Box::new(reply);
    }

    pub fn posts(&self) -> Vec<(String, ToolCallRequest)> {
        self.posts.lock().unwrap().clone()
    }

    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open_stream(&self) -> McpResult<FrameStream> {
        self.open_count.fetch_add(1, Ordering::SeqCst);
        self.opens
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(McpError::Transport("connection refused".to_string())))
    }

    async fn post(&self, endpoint: &str, request: &ToolCallRequest) -> McpResult<PostResponse> {
        self.posts
            .lock()
            .unwrap()
            .push((endpoint.to_string(), request.clone()));
        let mut reply = self.post_reply.lock().unwrap();
        (*reply)(request)
    }

    async fn close(&self) -> McpResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Feeds frames into one scripted stream. Dropping it (or calling
/// [`end`](Self::end)) ends the stream.
pub struct StreamController {
    tx: mpsc::UnboundedSender<McpResult<RawFrame>>,
}

impl StreamController {
    pub fn send(&self, frame: RawFrame) {
        let _ = self.tx.send(Ok(frame));
    }

    pub fn fail(&self, error: McpError) {
        let _ = self.tx.send(Err(error));
    }

    pub fn endpoint(&self, session_id: &str) {
        self.send(RawFrame::new(
            "endpoint",
            format!("/messages/?session_id={session_id}"),
        ));
    }

    pub fn tools(&self, names: &[&str]) {
        let tools: Vec<Value> = names
            .iter()
            .map(|name| {
                json!({
                    "name": name,
                    "description": format!("{name} tool"),
                    "input_schema": {"type": "object", "properties": {}}
                })
            })
            .collect();
        self.send(RawFrame::new("tools", Value::Array(tools).to_string()));
    }

    pub fn result(&self, correlation_id: &str, payload: Value) {
        self.send(RawFrame::new(
            "result",
            json!({"correlationId": correlation_id, "payload": payload}).to_string(),
        ));
    }

    pub fn error(&self, correlation_id: &str, message: &str) {
        self.send(RawFrame::new(
            "error",
            json!({"correlationId": correlation_id, "message": message}).to_string(),
        ));
    }

    pub fn session_error(&self, message: &str, kind: &str) {
        self.send(RawFrame::new(
            "error",
            json!({"message": message, "kind": kind}).to_string(),
        ));
    }

    pub fn heartbeat(&self) {
        self.send(RawFrame::comment("ping"));
    }

    pub fn end(self) {}
}

// ---------------------------------------------------------------------------
// Fake MCP SSE server (axum)
// ---------------------------------------------------------------------------

/// Shared state of the fake server.
#[derive(Default)]
pub struct ServerState {
    api_key: Option<String>,
    sessions: Mutex<HashMap<String, mpsc::UnboundedSender<SseEvent>>>,
    posts: Mutex<Vec<Value>>,
    connections: AtomicUsize,
}

/// A running fake server.
pub struct TestServer {
    pub base_url: String,
    pub state: Arc<ServerState>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Sever every open event stream, as a server restart would.
    pub fn drop_sessions(&self) {
        self.state.sessions.lock().unwrap().clear();
    }

    pub fn posts(&self) -> Vec<Value> {
        self.state.posts.lock().unwrap().clone()
    }

    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Start a fake MCP server on a random port.
///
/// Tools: `echo` answers with its args on the event stream, `inline_echo`
/// answers in the POST response body, `fail` answers with an `error` event,
/// and `silent` never answers.
pub async fn start_test_server(api_key: Option<&str>) -> TestServer {
    let state = Arc::new(ServerState {
        api_key: api_key.map(str::to_string),
        ..ServerState::default()
    });

    let app = Router::new()
        .route("/sse", get(handle_sse))
        .route("/messages/", post(handle_message))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base_url = format!("http://{}", addr);

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Brief wait for the server to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        base_url,
        state,
        handle,
    }
}

fn authorized(state: &ServerState, headers: &HeaderMap) -> bool {
    match &state.api_key {
        Some(expected) => headers
            .get("api_key")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == expected),
        None => true,
    }
}

async fn handle_sse(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    if !authorized(&state, &headers) {
        return (StatusCode::UNAUTHORIZED, "missing api key").into_response();
    }

    state.connections.fetch_add(1, Ordering::SeqCst);
    let session_id = uuid::Uuid::new_v4().simple().to_string();
    let (tx, rx) = mpsc::unbounded_channel();
    state
        .sessions
        .lock()
        .unwrap()
        .insert(session_id.clone(), tx);

    Sse::new(session_stream(session_id, rx))
        .keep_alive(KeepAlive::default())
        .into_response()
}

fn session_stream(
    session_id: String,
    mut rx: mpsc::UnboundedReceiver<SseEvent>,
) -> impl Stream<Item = Result<SseEvent, Infallible>> {
    async_stream::stream! {
        yield Ok(SseEvent::default()
            .event("endpoint")
            .data(format!("/messages/?session_id={session_id}")));

        let tools = json!([
            {"name": "echo", "description": "Echo the arguments back",
             "input_schema": {"type": "object", "properties": {"msg": {"type": "string"}}}},
            {"name": "inline_echo", "description": "Echo inside the POST response"},
            {"name": "fail", "description": "Always fails"},
            {"name": "silent", "description": "Never answers"}
        ]);
        yield Ok(SseEvent::default().event("tools").data(tools.to_string()));

        while let Some(event) = rx.recv().await {
            yield Ok(event);
        }
    }
}

async fn handle_message(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&state, &headers) {
        return (StatusCode::UNAUTHORIZED, "missing api key").into_response();
    }

    let session_id = query.get("session_id").cloned().unwrap_or_default();
    let sender = state.sessions.lock().unwrap().get(&session_id).cloned();
    let Some(sender) = sender else {
        return (StatusCode::NOT_FOUND, "unknown session").into_response();
    };
    state.posts.lock().unwrap().push(body.clone());

    let correlation_id = body["correlationId"].as_str().unwrap_or_default().to_string();
    let args = body["args"].clone();

    match body["tool"].as_str().unwrap_or_default() {
        "echo" => {
            let data = json!({"correlationId": correlation_id, "payload": args});
            let _ = sender.send(SseEvent::default().event("result").data(data.to_string()));
        }
        "fail" => {
            let data = json!({"correlationId": correlation_id, "message": "tool failed", "kind": "tool_error"});
            let _ = sender.send(SseEvent::default().event("error").data(data.to_string()));
        }
        "inline_echo" => {
            let data = json!({"correlationId": correlation_id, "payload": args});
            let body = format!("event: result\ndata: {data}\n\n");
            return ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response();
        }
        _ => {}
    }

    StatusCode::ACCEPTED.into_response()
}
