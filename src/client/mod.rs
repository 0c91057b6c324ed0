//! MCP client: talk to an MCP server over one SSE stream plus HTTP POSTs.
//!
//! The pieces, bottom-up:
//!
//! - [`Transport`] / [`HttpTransport`]: open the event stream, POST calls
//! - [`SseDecoder`]: bytes → raw SSE frames
//! - [`parse_frame`]: raw frames → typed [`Event`](crate::types::Event)s
//! - [`SessionManager`]: session identity, state machine, reconnection
//! - [`ToolsCatalog`]: latest tool definitions, replaced atomically
//! - [`PendingCallRegistry`]: in-flight calls keyed by correlation id
//! - [`McpClient`]: the facade (`connect`, `call_tool`, `close`)
//!
//! # Quick Start
//!
//! ```no_run
//! use mcp_sse_client::client::McpClient;
//! use mcp_sse_client::config::ClientConfig;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = McpClient::new(ClientConfig::from_env()?)?;
//! client.connect().await?;
//!
//! for tool in client.tools().await.tools() {
//!     println!("{}: {}", tool.name, tool.description);
//! }
//!
//! let reply = client.call("echo", json!({"msg": "hello"})).await?;
//! println!("{reply}");
//! # Ok(())
//! # }
//! ```

mod catalog;
mod dispatcher;
mod mcp_client;
mod parser;
mod pending;
mod session;
mod sse;
mod transport;

pub use catalog::{ToolSnapshot, ToolsCatalog};
pub use mcp_client::McpClient;
pub use parser::{events, parse_endpoint, parse_frame};
pub use pending::{PendingCall, PendingCallRegistry, ToolCallHandle};
pub use session::SessionManager;
pub use sse::SseDecoder;
pub use transport::{FrameStream, PostResponse, Transport};

#[cfg(feature = "http")]
pub use transport::{HttpTransport, TransportConfig};
