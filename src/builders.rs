//! Builder patterns for ergonomic construction of MCP clients.

use std::sync::Arc;
use std::time::Duration;

use crate::client::{McpClient, Transport};
use crate::config::{ClientConfig, ReconnectPolicy};
use crate::error::McpResult;

/// Builder for constructing [`McpClient`] with custom configuration.
///
/// # Example
///
/// ```no_run
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// use mcp_sse_client::builders::ClientBuilder;
/// use std::time::Duration;
///
/// let client = ClientBuilder::new("http://localhost:3000")
///     .with_api_key("secret")
///     .with_call_timeout(Duration::from_secs(30))
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    /// Create a new client builder for the given server base URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            config: ClientConfig::new(url),
        }
    }

    /// Start from an existing configuration.
    pub fn from_config(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Send an API key in the `api_key` header.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config.api_key = Some(api_key.into());
        self
    }

    /// Change the header the API key is sent in.
    pub fn with_api_key_header(mut self, header_name: impl Into<String>) -> Self {
        self.config.api_key_header = header_name.into();
        self
    }

    /// Add an Authorization header with a bearer token.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.config.bearer_token = Some(token.into());
        self
    }

    /// Add a custom HTTP header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.insert(key.into(), value.into());
        self
    }

    /// Default deadline for each tool call.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout = timeout;
        self
    }

    /// How long `connect()` waits for the server to assign a session.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// TCP/TLS connect timeout of the HTTP client.
    pub fn with_http_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.http_connect_timeout = timeout;
        self
    }

    /// Timeout for each tool-call POST.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Backoff policy for reconnecting a dropped stream.
    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.config.reconnect = policy;
        self
    }

    /// Treat the stream as dead after two intervals without any event.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = Some(interval);
        self
    }

    /// Path of the event stream, relative to the base URL. Defaults to `/sse`.
    pub fn with_sse_path(mut self, path: impl Into<String>) -> Self {
        self.config.sse_path = path.into();
        self
    }

    /// The configuration built so far.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Build an HTTP client. Does not connect.
    #[cfg(feature = "http")]
    pub fn build(self) -> McpResult<McpClient> {
        McpClient::new(self.config)
    }

    /// Build a client over a custom transport. Does not connect.
    pub fn build_with_transport(self, transport: Arc<dyn Transport>) -> McpResult<McpClient> {
        McpClient::with_transport(self.config, transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_builder_basic() {
        let builder = ClientBuilder::new("http://localhost:8080")
            .with_call_timeout(Duration::from_secs(30))
            .with_bearer_token("test-token")
            .with_api_key("k");

        let config = builder.config();
        assert_eq!(config.server_url, "http://localhost:8080");
        assert_eq!(config.call_timeout, Duration::from_secs(30));

        let headers = config.request_headers();
        assert_eq!(
            headers.get("Authorization"),
            Some(&"Bearer test-token".to_string())
        );
        assert_eq!(headers.get("api_key"), Some(&"k".to_string()));
    }

    #[test]
    fn client_builder_custom_api_key_header() {
        let builder = ClientBuilder::new("http://localhost:8080")
            .with_api_key("k")
            .with_api_key_header("X-Api-Key")
            .with_header("X-Trace", "1");
        let headers = builder.config().request_headers();
        assert_eq!(headers.get("X-Api-Key"), Some(&"k".to_string()));
        assert_eq!(headers.get("X-Trace"), Some(&"1".to_string()));
        assert!(!headers.contains_key("api_key"));
    }

    #[test]
    fn client_builder_timing_options() {
        let policy = ReconnectPolicy {
            max_attempts: 2,
            ..ReconnectPolicy::default()
        };
        let builder = ClientBuilder::new("http://localhost:8080")
            .with_connect_timeout(Duration::from_secs(3))
            .with_http_connect_timeout(Duration::from_secs(2))
            .with_request_timeout(Duration::from_secs(4))
            .with_heartbeat_interval(Duration::from_secs(5))
            .with_reconnect_policy(policy)
            .with_sse_path("/events");

        let config = builder.config();
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.http_connect_timeout, Duration::from_secs(2));
        assert_eq!(config.request_timeout, Duration::from_secs(4));
        assert_eq!(config.idle_timeout(), Some(Duration::from_secs(10)));
        assert_eq!(config.reconnect.max_attempts, 2);
        assert_eq!(
            config.sse_url().unwrap().as_str(),
            "http://localhost:8080/events"
        );
    }

    #[cfg(feature = "http")]
    #[test]
    fn client_builder_rejects_bad_url() {
        let err = ClientBuilder::new("ftp://example.com").build().unwrap_err();
        assert!(matches!(err, crate::error::McpError::Config(_)));
    }
}
