//! # mcp-sse-client: Rust client for MCP servers over Server-Sent Events
//!
//! This crate implements the client side of the MCP SSE binding: one
//! long-lived event stream carries everything the server says, and each
//! tool call is a separate HTTP POST answered asynchronously on that stream.
//!
//! ## Overview
//!
//! A client:
//! - opens the SSE stream and waits for the server to assign a session
//!   (`endpoint` event)
//! - keeps the latest tool catalog (`tools` events replace it wholesale)
//! - sends tool calls with a fresh correlation id and matches the `result` /
//!   `error` event that answers each one, in any order
//! - reconnects with exponential backoff when the stream drops, failing
//!   calls from the old session with `SessionExpired`
//!
//! ## Feature flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `http`  | yes     | `reqwest`-based [`client::HttpTransport`] |
//! | `full`  | no      | Enable all features |
//!
//! Without `http`, plug in your own [`client::Transport`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use mcp_sse_client::ClientBuilder;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ClientBuilder::new("http://localhost:3000")
//!         .with_api_key("secret")
//!         .build()?;
//!
//!     client.connect().await?;
//!     println!("tools: {:?}", client.tools().await.names());
//!
//!     // Fire several calls; each handle resolves independently.
//!     let a = client.call_tool("echo", json!({"msg": "one"})).await?;
//!     let b = client.call_tool("echo", json!({"msg": "two"})).await?;
//!     println!("{} {}", b.await?, a.await?);
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Error handling
//!
//! Every fallible operation returns [`McpResult`]. Use
//! [`McpError::kind()`] to branch on the category, and
//! [`McpError::is_retryable()`] to decide whether retrying the same call
//! could help (for example after `SessionExpired`).
//!
//! ## Logging
//!
//! The crate logs through [`tracing`]; install any subscriber to see
//! connection lifecycle, reconnection, and per-call events.

pub mod builders;
pub mod client;
pub mod config;
pub mod error;
pub mod types;

/// Prelude module that re-exports commonly used types and traits.
///
/// # Example
///
/// ```
/// use mcp_sse_client::prelude::*;
///
/// let config = ClientConfig::new("http://localhost:3000");
/// assert_eq!(config.sse_url().unwrap().path(), "/sse");
/// ```
pub mod prelude {
    pub use crate::builders::ClientBuilder;
    pub use crate::client::{McpClient, ToolCallHandle, ToolSnapshot, Transport};
    pub use crate::config::{ClientConfig, ReconnectPolicy};
    pub use crate::error::{ErrorKind, McpError, McpResult};
    pub use crate::types::{Event, Session, SessionState, ToolDescriptor};
}

// Re-export core types at crate root for convenience.
pub use builders::ClientBuilder;
pub use client::McpClient;
pub use config::ClientConfig;
pub use error::{ErrorKind, McpError, McpResult};
pub use types::*;
