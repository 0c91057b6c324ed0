//! Transport adapter for MCP client communication.
//!
//! Provides the `Transport` trait that abstracts the two HTTP primitives the
//! client needs (a long-lived event stream and one-shot POSTs), and
//! `HttpTransport`, the `reqwest` implementation.

use std::pin::Pin;

use async_trait::async_trait;
use futures::stream::Stream;

use crate::error::McpResult;
use crate::types::{RawFrame, ToolCallRequest};

/// Lazy sequence of raw frames; infinite until the server closes the stream
/// or a transport error is yielded.
pub type FrameStream = Pin<Box<dyn Stream<Item = McpResult<RawFrame>> + Send>>;

/// Raw response to a tool-call POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostResponse {
    /// HTTP status code.
    pub status: u16,
    /// Value of the `Content-Type` header, if any.
    pub content_type: Option<String>,
    /// Response body text.
    pub body: String,
}

impl PostResponse {
    /// A bare `202 Accepted` with no body, the usual answer to a call.
    pub fn accepted() -> Self {
        Self {
            status: 202,
            content_type: None,
            body: String::new(),
        }
    }

    /// Whether the body is an SSE stream that may carry inline events.
    pub fn is_event_stream(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("text/event-stream"))
    }
}

/// Transport abstraction for the MCP SSE binding.
///
/// Implementations surface socket, TLS, and HTTP failures as transport
/// errors and never interpret protocol content.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the server's event stream.
    async fn open_stream(&self) -> McpResult<FrameStream>;

    /// POST a tool call to the session endpoint.
    ///
    /// `endpoint` is the absolute URL assigned by the latest `endpoint` event.
    async fn post(&self, endpoint: &str, request: &ToolCallRequest) -> McpResult<PostResponse>;

    /// Close the transport and release any held resources.
    ///
    /// The default implementation is a no-op.
    async fn close(&self) -> McpResult<()> {
        Ok(())
    }
}

#[cfg(feature = "http")]
pub use http::{HttpTransport, TransportConfig};

#[cfg(feature = "http")]
mod http {
    use std::collections::HashMap;
    use std::time::Duration;

    use async_trait::async_trait;
    use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};

    use super::{FrameStream, PostResponse, Transport};
    use crate::client::sse::frames_from_response;
    use crate::config::ClientConfig;
    use crate::error::{McpError, McpResult};
    use crate::types::ToolCallRequest;

    /// Configuration for [`HttpTransport`].
    #[derive(Debug, Clone)]
    pub struct TransportConfig {
        /// Timeout for establishing TCP/TLS connections. Defaults to 10 seconds.
        pub connect_timeout: Duration,
        /// Timeout for a whole POST exchange. Defaults to 30 seconds.
        ///
        /// The event stream is long-lived and never gets a total timeout.
        pub request_timeout: Duration,
        /// Additional HTTP headers to include on every request.
        pub headers: HashMap<String, String>,
    }

    impl Default for TransportConfig {
        fn default() -> Self {
            Self {
                connect_timeout: Duration::from_secs(10),
                request_timeout: Duration::from_secs(30),
                headers: HashMap::new(),
            }
        }
    }

    impl From<&ClientConfig> for TransportConfig {
        fn from(config: &ClientConfig) -> Self {
            Self {
                connect_timeout: config.http_connect_timeout,
                request_timeout: config.request_timeout,
                headers: config.request_headers(),
            }
        }
    }

    /// SSE + POST transport using `reqwest`.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use mcp_sse_client::client::HttpTransport;
    ///
    /// let transport = HttpTransport::new("http://localhost:3000/sse");
    /// ```
    #[derive(Debug, Clone)]
    pub struct HttpTransport {
        client: reqwest::Client,
        sse_url: String,
        request_timeout: Duration,
    }

    impl HttpTransport {
        /// Create a transport for the given SSE stream URL with default settings.
        pub fn new(sse_url: impl Into<String>) -> Self {
            Self::with_config(sse_url, TransportConfig::default())
        }

        /// Create a transport with custom configuration.
        pub fn with_config(sse_url: impl Into<String>, config: TransportConfig) -> Self {
            let mut default_headers = HeaderMap::new();
            for (key, value) in &config.headers {
                match (
                    HeaderName::from_bytes(key.as_bytes()),
                    HeaderValue::from_str(value),
                ) {
                    (Ok(name), Ok(val)) => {
                        default_headers.insert(name, val);
                    }
                    _ => tracing::warn!(header = %key, "skipping invalid HTTP header"),
                }
            }

            let client = reqwest::Client::builder()
                .connect_timeout(config.connect_timeout)
                .default_headers(default_headers)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new());

            Self {
                client,
                sse_url: sse_url.into(),
                request_timeout: config.request_timeout,
            }
        }

        /// Create a transport with an existing `reqwest::Client`.
        ///
        /// The client must not carry a total request timeout, or the event
        /// stream will be cut when it elapses.
        pub fn with_client(sse_url: impl Into<String>, client: reqwest::Client) -> Self {
            Self {
                client,
                sse_url: sse_url.into(),
                request_timeout: TransportConfig::default().request_timeout,
            }
        }

        /// Create a transport from a full client configuration.
        pub fn from_client_config(config: &ClientConfig) -> McpResult<Self> {
            let sse_url = config.sse_url()?;
            Ok(Self::with_config(sse_url, TransportConfig::from(config)))
        }

        /// Returns the URL of the event stream.
        pub fn sse_url(&self) -> &str {
            &self.sse_url
        }
    }

    fn map_send_error(context: &str, e: reqwest::Error) -> McpError {
        if e.is_timeout() {
            McpError::Timeout(format!("{context} timed out: {e}"))
        } else if e.is_connect() {
            McpError::Transport(format!("{context} connection failed: {e}"))
        } else {
            McpError::Transport(format!("{context} failed: {e}"))
        }
    }

    #[async_trait]
    impl Transport for HttpTransport {
        async fn open_stream(&self) -> McpResult<FrameStream> {
            tracing::debug!(url = %self.sse_url, "opening SSE stream");

            let response = self
                .client
                .get(&self.sse_url)
                .header(ACCEPT, "text/event-stream")
                .send()
                .await
                .map_err(|e| map_send_error("SSE stream", e))?;

            let status = response.status();
            if !status.is_success() {
                let body_text = response.text().await.unwrap_or_default();
                return Err(McpError::Http {
                    status: status.as_u16(),
                    body: body_text,
                });
            }

            Ok(frames_from_response(response))
        }

        async fn post(&self, endpoint: &str, request: &ToolCallRequest) -> McpResult<PostResponse> {
            let body = serde_json::to_vec(request).map_err(|e| {
                McpError::Transport(format!("failed to serialize tool call: {e}"))
            })?;

            let response = self
                .client
                .post(endpoint)
                .timeout(self.request_timeout)
                .header(CONTENT_TYPE, "application/json")
                .body(body)
                .send()
                .await
                .map_err(|e| map_send_error("tool call POST", e))?;

            let status = response.status();
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body_text = response
                .text()
                .await
                .map_err(|e| McpError::Transport(format!("failed to read POST response: {e}")))?;

            if !status.is_success() {
                return Err(McpError::Http {
                    status: status.as_u16(),
                    body: body_text,
                });
            }

            Ok(PostResponse {
                status: status.as_u16(),
                content_type,
                body: body_text,
            })
        }
    }

}
