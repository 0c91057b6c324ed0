//! Client configuration: server location, credentials, timeouts, and the
//! reconnection policy.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use url::Url;

use crate::error::{McpError, McpResult};

/// Environment variable holding the server base URL.
pub const ENV_SERVER_URL: &str = "MCP_SERVER_URL";
/// Environment variable holding the API key.
pub const ENV_API_KEY: &str = "MCP_API_KEY";
/// Environment variable holding a bearer token.
pub const ENV_BEARER_TOKEN: &str = "MCP_BEARER_TOKEN";
/// Environment variable overriding the per-call timeout, in seconds.
pub const ENV_CALL_TIMEOUT_SECS: &str = "MCP_CALL_TIMEOUT_SECS";

/// Default header the API key is sent in.
pub const DEFAULT_API_KEY_HEADER: &str = "api_key";

/// Default path of the SSE stream, relative to the server URL.
pub const DEFAULT_SSE_PATH: &str = "/sse";

/// Exponential backoff used while the session is `Reconnecting`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Growth factor between consecutive attempts.
    pub multiplier: f64,
    /// Attempts allowed before the connection is declared lost.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the zero-based `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let secs = self.initial_delay.as_secs_f64() * exp;
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    fn validate(&self) -> McpResult<()> {
        if self.multiplier.is_nan() || self.multiplier < 1.0 {
            return Err(McpError::Config(format!(
                "reconnect multiplier must be >= 1.0, got {}",
                self.multiplier
            )));
        }
        if self.initial_delay > self.max_delay {
            return Err(McpError::Config(
                "reconnect initial_delay exceeds max_delay".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for [`McpClient`](crate::client::McpClient).
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL of the MCP server, e.g. `http://localhost:3000`.
    pub server_url: String,
    /// Path of the SSE stream, appended to the path of `server_url`.
    pub sse_path: String,
    /// API key sent on every request, if set.
    pub api_key: Option<String>,
    /// Header the API key is sent in.
    pub api_key_header: String,
    /// Bearer token sent as `Authorization`, if set.
    pub bearer_token: Option<String>,
    /// Additional HTTP headers to include on every request.
    pub headers: HashMap<String, String>,
    /// Deadline for each tool call, measured from registration.
    pub call_timeout: Duration,
    /// How long `connect()` waits for the `endpoint` event.
    pub connect_timeout: Duration,
    /// TCP/TLS connect timeout of the underlying HTTP client.
    pub http_connect_timeout: Duration,
    /// Timeout for a single POST request.
    pub request_timeout: Duration,
    /// Backoff policy for reconnection.
    pub reconnect: ReconnectPolicy,
    /// Expected heartbeat interval. When set, a stream silent for twice this
    /// long is treated as dropped.
    pub heartbeat_interval: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:3000".to_string(),
            sse_path: DEFAULT_SSE_PATH.to_string(),
            api_key: None,
            api_key_header: DEFAULT_API_KEY_HEADER.to_string(),
            bearer_token: None,
            headers: HashMap::new(),
            call_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(30),
            http_connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            reconnect: ReconnectPolicy::default(),
            heartbeat_interval: None,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("server_url", &self.server_url)
            .field("sse_path", &self.sse_path)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_key_header", &self.api_key_header)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("call_timeout", &self.call_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("http_connect_timeout", &self.http_connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("reconnect", &self.reconnect)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .finish()
    }
}

impl ClientConfig {
    /// Create a configuration for the given server with default settings.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Default::default()
        }
    }

    /// Load configuration from `MCP_*` environment variables.
    ///
    /// `MCP_SERVER_URL` is required; `MCP_API_KEY`, `MCP_BEARER_TOKEN` and
    /// `MCP_CALL_TIMEOUT_SECS` are optional.
    pub fn from_env() -> McpResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> McpResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let server_url = lookup(ENV_SERVER_URL)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| McpError::Config(format!("{ENV_SERVER_URL} is not set")))?;

        let mut config = Self::new(server_url.trim());
        config.api_key = lookup(ENV_API_KEY).filter(|v| !v.is_empty());
        config.bearer_token = lookup(ENV_BEARER_TOKEN).filter(|v| !v.is_empty());

        if let Some(raw) = lookup(ENV_CALL_TIMEOUT_SECS) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                McpError::Config(format!("{ENV_CALL_TIMEOUT_SECS} is not a number: {raw}"))
            })?;
            config.call_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> McpResult<()> {
        self.sse_url()?;
        self.reconnect.validate()?;
        if self.call_timeout.is_zero() {
            return Err(McpError::Config("call_timeout must be non-zero".to_string()));
        }
        if self.heartbeat_interval.is_some_and(|d| d.is_zero()) {
            return Err(McpError::Config(
                "heartbeat_interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// The parsed server base URL.
    pub fn base_url(&self) -> McpResult<Url> {
        let url = Url::parse(self.server_url.trim_end_matches('/'))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(McpError::Config(format!(
                "server_url must be http or https, got {other}"
            ))),
        }
    }

    /// Absolute URL of the SSE stream.
    ///
    /// `sse_path` extends the server URL's path, so
    /// `http://host:3000/mcp` streams from `http://host:3000/mcp/sse`.
    pub fn sse_url(&self) -> McpResult<Url> {
        let mut base = self.base_url()?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(base.join(self.sse_path.trim_start_matches('/'))?)
    }

    /// Silence window after which the stream is considered dead.
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.heartbeat_interval.map(|d| d.saturating_mul(2))
    }

    /// All headers to attach to every request, credentials included.
    pub fn request_headers(&self) -> HashMap<String, String> {
        let mut headers = self.headers.clone();
        if let Some(key) = &self.api_key {
            headers.insert(self.api_key_header.clone(), key.clone());
        }
        if let Some(token) = &self.bearer_token {
            headers.insert("Authorization".to_string(), format!("Bearer {token}"));
        }
        headers
    }
}
