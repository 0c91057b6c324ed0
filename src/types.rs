//! MCP SSE protocol types: wire payloads and client-side domain values.
//!
//! Server → client traffic arrives as SSE frames (`event:` / `data:` pairs)
//! with these event names:
//!
//! | event | data |
//! |---|---|
//! | `endpoint` | path (or URL) for POSTing calls, e.g. `/messages/?session_id=abc` |
//! | `tools` | JSON list of [`ToolDescriptor`]s |
//! | `result` | `{"correlationId": …, "payload": …}` |
//! | `error` | `{"correlationId"?: …, "message": …, "kind"?: …}` |
//! | `heartbeat` / `ping` / SSE comment | ignored payload |
//!
//! Client → server traffic is a JSON [`ToolCallRequest`] POSTed to the
//! endpoint path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// ============================================================================
// Session
// ============================================================================

/// Lifecycle state of the client's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Not yet connected, or the last connect attempt failed.
    Disconnected,
    /// Stream opened; waiting for the `endpoint` event.
    Connecting,
    /// Endpoint received; tool calls may be sent.
    Active,
    /// Stream dropped; reconnecting with backoff.
    Reconnecting,
    /// Closed by the client or by an exhausted reconnect budget.
    Closed,
}

impl SessionState {
    /// Returns `true` only for [`SessionState::Active`].
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Active => "active",
            SessionState::Reconnecting => "reconnecting",
            SessionState::Closed => "closed",
        };
        write!(f, "{}", s)
    }
}

/// The server-assigned session, created from an `endpoint` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Opaque session id (the `session_id` query parameter of the endpoint).
    pub id: String,
    /// Absolute URL that tool calls are POSTed to.
    pub endpoint_url: String,
    /// State of the session. Only the live session is ever `Active`.
    pub state: SessionState,
    /// Last time the server showed signs of life on this session.
    pub last_active_at: DateTime<Utc>,
    /// Counts `endpoint` events installed by this client, starting at 1.
    /// Distinguishes sessions even when the server reissues an id.
    pub generation: u64,
}

/// Payload of an `endpoint` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Path or URL exactly as sent by the server.
    pub url: String,
    /// Session id extracted from the endpoint's query string.
    pub session_id: String,
}

// ============================================================================
// Raw frames
// ============================================================================

/// One decoded SSE frame, before any protocol interpretation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFrame {
    /// Value of the `event:` field, if present.
    pub event: Option<String>,
    /// Concatenated `data:` lines (joined with `\n`).
    pub data: String,
    /// Value of the `id:` field, if present.
    pub id: Option<String>,
    /// Comment text for comment-only frames (SSE keep-alives).
    pub comment: Option<String>,
}

impl RawFrame {
    /// Create a frame with an event name and data.
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: Some(event.into()),
            data: data.into(),
            ..Default::default()
        }
    }

    /// Create a comment-only frame.
    pub fn comment(text: impl Into<String>) -> Self {
        Self {
            comment: Some(text.into()),
            ..Default::default()
        }
    }

    /// The effective event name (`message` when no `event:` field was sent).
    pub fn event_name(&self) -> &str {
        self.event.as_deref().unwrap_or("message")
    }

    /// Whether this frame carries only a comment.
    pub fn is_comment(&self) -> bool {
        self.comment.is_some() && self.event.is_none() && self.data.is_empty()
    }
}

// ============================================================================
// Tools
// ============================================================================

/// A tool advertised by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique tool name within the catalog.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// JSON Schema for the tool's arguments.
    #[serde(rename = "inputSchema", alias = "input_schema", default = "empty_schema")]
    pub input_schema: Value,
}

fn empty_schema() -> Value {
    Value::Object(serde_json::Map::new())
}

impl ToolDescriptor {
    /// Create a descriptor with an empty input schema.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: empty_schema(),
        }
    }

    /// Set the input schema (builder-style).
    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }
}

/// Wire shape of `tools` data: a bare list, or an object wrapping one.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ToolsData {
    List(Vec<ToolDescriptor>),
    Wrapped { tools: Vec<ToolDescriptor> },
}

impl ToolsData {
    pub(crate) fn into_tools(self) -> Vec<ToolDescriptor> {
        match self {
            ToolsData::List(tools) | ToolsData::Wrapped { tools } => tools,
        }
    }
}

// ============================================================================
// Calls and results
// ============================================================================

/// Body of the POST that invokes a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Session the call belongs to.
    pub session_id: String,
    /// Tool name.
    pub tool: String,
    /// Tool arguments.
    pub args: Value,
    /// Client-generated id echoed back in the `result` / `error` event.
    #[serde(rename = "correlationId")]
    pub correlation_id: String,
}

/// Data of a `result` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Id of the call this result answers.
    #[serde(rename = "correlationId")]
    pub correlation_id: String,
    /// Tool output.
    #[serde(default)]
    pub payload: Value,
}

/// Data of an `error` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// Id of the failed call; absent for session-level errors.
    #[serde(
        rename = "correlationId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub correlation_id: Option<String>,
    /// Error message.
    #[serde(default = "unknown_error_message")]
    pub message: String,
    /// Optional server-defined error kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

fn unknown_error_message() -> String {
    "unknown server error".to_string()
}

/// Server error kinds that invalidate the whole session.
const FATAL_ERROR_KINDS: &[&str] = &["fatal", "session_expired"];

impl ServerError {
    /// A session-level error with only a message.
    pub fn session(message: impl Into<String>) -> Self {
        Self {
            correlation_id: None,
            message: message.into(),
            kind: None,
        }
    }

    /// Whether this session-level error should abandon the current stream.
    pub fn is_fatal(&self) -> bool {
        self.kind
            .as_deref()
            .is_some_and(|k| FATAL_ERROR_KINDS.contains(&k))
    }

    /// Convert into the error delivered to a waiting caller.
    pub fn into_error(self) -> crate::error::McpError {
        crate::error::McpError::Server {
            message: self.message,
            kind: self.kind,
        }
    }
}

// ============================================================================
// Events
// ============================================================================

/// A typed server event, produced by the event parser.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Session (re)established; calls go to this endpoint.
    Endpoint(Endpoint),
    /// Full replacement of the tool catalog.
    Tools(Vec<ToolDescriptor>),
    /// Successful result for a call.
    Result(ToolResult),
    /// Error for a call, or for the whole session when uncorrelated.
    Error(ServerError),
    /// Keep-alive.
    Heartbeat,
}

impl Event {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Event::Endpoint(_) => "endpoint",
            Event::Tools(_) => "tools",
            Event::Result(_) => "result",
            Event::Error(_) => "error",
            Event::Heartbeat => "heartbeat",
        }
    }
}
