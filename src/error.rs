//! MCP client error types: the error taxonomy surfaced to callers.
//!
//! Every failure in the crate is an [`McpError`]. Callers that need to branch
//! on the category rather than the message use [`McpError::kind()`], which
//! collapses the variants into the coarse [`ErrorKind`] taxonomy:
//!
//! - Transport / Protocol errors are normally absorbed by the dispatcher and
//!   session manager (reconnect or skip the frame)
//! - call-scoped errors (UnknownTool, NotConnected, SessionExpired,
//!   ClientClosed, Timeout, Server) are delivered to the one caller that
//!   owns the call
//! - ConnectionLost is fatal to the client instance until `reconnect()`

use std::fmt;

use crate::types::SessionState;

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Coarse classification of an [`McpError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Socket, TLS, or HTTP-level failure.
    Transport,
    /// A frame or payload did not match the wire format.
    Protocol,
    /// A call was attempted while the session was not active.
    NotConnected,
    /// The tool name is not in the current catalog.
    UnknownTool,
    /// The call was orphaned by a reconnection.
    SessionExpired,
    /// The reconnection budget was exhausted.
    ConnectionLost,
    /// The client was closed.
    ClientClosed,
    /// A per-call deadline or connect deadline elapsed.
    Timeout,
    /// The server reported an error for the call.
    Server,
    /// The caller cancelled the call.
    Cancelled,
    /// Invalid client configuration.
    Config,
    /// Anything else.
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Transport => "transport",
            ErrorKind::Protocol => "protocol",
            ErrorKind::NotConnected => "not_connected",
            ErrorKind::UnknownTool => "unknown_tool",
            ErrorKind::SessionExpired => "session_expired",
            ErrorKind::ConnectionLost => "connection_lost",
            ErrorKind::ClientClosed => "client_closed",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Server => "server",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Config => "config",
            ErrorKind::Other => "other",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// McpError enum
// ---------------------------------------------------------------------------

/// Unified error type for the MCP SSE client.
///
/// The type is `Clone` so a single failure (for example a lost connection)
/// can be delivered to every pending call it affects.
#[derive(Debug, Clone, thiserror::Error)]
pub enum McpError {
    /// Transport-level error (connection failed, stream reset, TLS, etc.).
    #[error("Transport error: {0}")]
    Transport(String),

    /// HTTP error with status code and response body.
    #[error("HTTP {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body text.
        body: String,
    },

    /// Malformed frame or payload received from the server.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A call was attempted while the session was not active.
    #[error("Not connected (session is {0})")]
    NotConnected(SessionState),

    /// The requested tool is not in the current catalog.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// The call was sent under a session that has since been replaced.
    #[error("Session {session_id} expired before the call completed")]
    SessionExpired {
        /// Id of the session the call was sent under.
        session_id: String,
    },

    /// Reconnection gave up after exhausting its attempt budget.
    #[error("Connection lost after {attempts} reconnection attempts")]
    ConnectionLost {
        /// Number of reconnection attempts made.
        attempts: u32,
    },

    /// The client was closed.
    #[error("Client closed")]
    ClientClosed,

    /// A call or the connect handshake did not complete in time.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The server answered the call with an `error` event.
    #[error("Server error: {message}")]
    Server {
        /// Error message from the server.
        message: String,
        /// Optional server-supplied error kind.
        kind: Option<String>,
    },

    /// The caller cancelled the call.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Invalid client configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Catch-all for errors that don't fit other categories.
    #[error("{0}")]
    Other(String),
}

/// Convenience result type for MCP client operations.
pub type McpResult<T> = Result<T, McpError>;

impl McpError {
    /// Returns the taxonomy bucket for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            McpError::Transport(_) | McpError::Http { .. } => ErrorKind::Transport,
            McpError::Protocol(_) => ErrorKind::Protocol,
            McpError::NotConnected(_) => ErrorKind::NotConnected,
            McpError::UnknownTool(_) => ErrorKind::UnknownTool,
            McpError::SessionExpired { .. } => ErrorKind::SessionExpired,
            McpError::ConnectionLost { .. } => ErrorKind::ConnectionLost,
            McpError::ClientClosed => ErrorKind::ClientClosed,
            McpError::Timeout(_) => ErrorKind::Timeout,
            McpError::Server { .. } => ErrorKind::Server,
            McpError::Cancelled(_) => ErrorKind::Cancelled,
            McpError::Config(_) => ErrorKind::Config,
            McpError::Other(_) => ErrorKind::Other,
        }
    }

    /// Whether re-issuing the call (with a fresh correlation id) may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotConnected
                | ErrorKind::SessionExpired
                | ErrorKind::Transport
                | ErrorKind::Timeout
        )
    }

    /// Create a `Server` error with a message and no kind.
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
            kind: None,
        }
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        McpError::Protocol(err.to_string())
    }
}

impl From<url::ParseError> for McpError {
    fn from(err: url::ParseError) -> Self {
        McpError::Config(format!("invalid URL: {err}"))
    }
}
