//! High-level MCP client: connect, call tools, close.
//!
//! Composes the transport, event parser, dispatcher, session manager, tools
//! catalog, and pending-call registry behind three operations. Each client
//! owns its own session; any number of clients can coexist in one process.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::{McpError, McpResult};
use crate::types::{Session, SessionState, ToolCallRequest, ToolDescriptor};

use super::catalog::{ToolSnapshot, ToolsCatalog};
use super::dispatcher::{route_inline, Dispatcher};
use super::pending::{PendingCallRegistry, ToolCallHandle};
use super::session::SessionManager;
use super::transport::Transport;

/// State shared between the facade and the reader task.
pub(crate) struct ClientCore {
    pub(crate) config: ClientConfig,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) session: SessionManager,
    pub(crate) catalog: ToolsCatalog,
    pub(crate) registry: PendingCallRegistry,
}

impl ClientCore {
    pub(crate) fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> McpResult<Self> {
        config.validate()?;
        let session = SessionManager::new(config.base_url()?, config.reconnect.clone());
        Ok(Self {
            config,
            transport,
            session,
            catalog: ToolsCatalog::new(),
            registry: PendingCallRegistry::new(),
        })
    }
}

/// Client for an MCP server speaking the SSE binding.
///
/// # Example
///
/// ```no_run
/// use mcp_sse_client::client::McpClient;
/// use mcp_sse_client::config::ClientConfig;
/// use serde_json::json;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = McpClient::new(ClientConfig::new("http://localhost:3000"))?;
/// client.connect().await?;
///
/// let handle = client.call_tool("echo", json!({"msg": "hi"})).await?;
/// let payload = handle.await?;
/// println!("{payload}");
///
/// client.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct McpClient {
    core: Arc<ClientCore>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("config", &self.core.config)
            .field("state", &self.core.session.state())
            .field("pending_calls", &self.core.registry.len())
            .finish_non_exhaustive()
    }
}

impl McpClient {
    /// Create a client that talks HTTP to `config.server_url`.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::Config`] if the configuration is invalid.
    #[cfg(feature = "http")]
    pub fn new(config: ClientConfig) -> McpResult<Self> {
        let transport = super::transport::HttpTransport::from_client_config(&config)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a client over a custom transport.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> McpResult<Self> {
        Ok(Self {
            core: Arc::new(ClientCore::new(config, transport)?),
            reader: Mutex::new(None),
        })
    }

    /// Open the event stream and wait until the server assigns a session.
    ///
    /// Returns immediately if already connected; joins an attempt already in
    /// progress (including a background reconnection).
    ///
    /// # Errors
    ///
    /// Transport failures, a stream that ends before the `endpoint` event,
    /// or `Timeout` after `connect_timeout`. `ClientClosed` after
    /// [`close()`](Self::close); `ConnectionLost` if the reconnection budget
    /// was exhausted (use [`reconnect()`](Self::reconnect)).
    pub async fn connect(&self) -> McpResult<()> {
        self.start(false).await
    }

    /// Like [`connect()`](Self::connect), but also allowed after the
    /// connection was declared lost.
    pub async fn reconnect(&self) -> McpResult<()> {
        self.start(true).await
    }

    async fn start(&self, after_loss: bool) -> McpResult<()> {
        let mut reader = self.reader.lock().await;
        if self.core.session.is_closed_by_client().await {
            return Err(McpError::ClientClosed);
        }

        let reader_alive = reader.as_ref().is_some_and(|h| !h.is_finished());
        match self.core.session.state() {
            SessionState::Active if reader_alive => return Ok(()),
            SessionState::Connecting | SessionState::Reconnecting if reader_alive => {
                drop(reader);
                return self.wait_until_settled().await;
            }
            SessionState::Closed if !after_loss => {
                let attempts = self.core.session.lost_after().await.unwrap_or_default();
                return Err(McpError::ConnectionLost { attempts });
            }
            _ => {}
        }

        if let Some(stale) = reader.take() {
            stale.abort();
        }
        self.core.session.begin_connect().await?;

        let frames = match self.core.transport.open_stream().await {
            Ok(frames) => frames,
            Err(e) => {
                self.core.session.mark_disconnected().await;
                return Err(e);
            }
        };

        let (ready_tx, ready_rx) = oneshot::channel();
        let dispatcher = Dispatcher::new(self.core.clone());
        *reader = Some(tokio::spawn(dispatcher.run(frames, ready_tx)));
        // close() must be able to take the reader while we wait.
        drop(reader);

        match tokio::time::timeout(self.core.config.connect_timeout, ready_rx).await {
            Ok(Ok(Ok(session))) => {
                info!(session_id = %session.id, "connected");
                Ok(())
            }
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(self.stopped_error().await),
            Err(_) => {
                if let Some(handle) = self.reader.lock().await.take() {
                    handle.abort();
                }
                self.core.session.mark_disconnected().await;
                Err(McpError::Timeout(format!(
                    "no endpoint received within {:?}",
                    self.core.config.connect_timeout
                )))
            }
        }
    }

    async fn wait_until_settled(&self) -> McpResult<()> {
        let mut states = self.core.session.subscribe();
        let settled = tokio::time::timeout(
            self.core.config.connect_timeout,
            states.wait_for(|s| {
                matches!(
                    s,
                    SessionState::Active | SessionState::Closed | SessionState::Disconnected
                )
            }),
        )
        .await
        .map(|state| state.map(|s| s.is_active()).unwrap_or(false));

        match settled {
            Ok(true) => Ok(()),
            Ok(false) => Err(self.stopped_error().await),
            Err(_) => Err(McpError::Timeout(format!(
                "session not active within {:?}",
                self.core.config.connect_timeout
            ))),
        }
    }

    async fn stopped_error(&self) -> McpError {
        if self.core.session.is_closed_by_client().await {
            McpError::ClientClosed
        } else if let Some(attempts) = self.core.session.lost_after().await {
            McpError::ConnectionLost { attempts }
        } else {
            McpError::Transport("event reader stopped before the session became active".to_string())
        }
    }

    /// Invoke a tool.
    ///
    /// The call is registered before the POST is sent, and the returned
    /// handle completes when the matching `result` / `error` event arrives,
    /// the call times out, or its session is replaced.
    ///
    /// # Errors
    ///
    /// Fails fast, without sending anything, with `ClientClosed` after
    /// `close()`, `NotConnected` unless the session is `Active`, and
    /// `UnknownTool` if `name` is not in the current catalog. A failed POST
    /// is returned as-is and the call is forgotten.
    pub async fn call_tool(&self, name: &str, args: Value) -> McpResult<ToolCallHandle> {
        let session = self.core.session.active_session().await?;

        if !self.core.catalog.snapshot().await.contains(name) {
            return Err(McpError::UnknownTool(name.to_string()));
        }

        let correlation_id = PendingCallRegistry::new_correlation_id();
        let handle = self.core.registry.register(
            correlation_id.clone(),
            name,
            args.clone(),
            session.id.clone(),
            session.generation,
            self.core.config.call_timeout,
        )?;

        // A reconnect may have swapped the session between the check above
        // and registration; such a call would never be answered.
        if self.core.session.current_generation().await != session.generation {
            handle.cancel();
            return Err(McpError::SessionExpired {
                session_id: session.id,
            });
        }

        let request = ToolCallRequest {
            session_id: session.id,
            tool: name.to_string(),
            args,
            correlation_id,
        };

        debug!(
            correlation_id = %request.correlation_id,
            tool = name,
            endpoint = %session.endpoint_url,
            "sending tool call"
        );

        // Dropping `handle` on error removes the pending entry.
        let response = self
            .core
            .transport
            .post(&session.endpoint_url, &request)
            .await?;

        if response.is_event_stream() && !response.body.is_empty() {
            route_inline(&self.core.registry, &response.body);
        }

        Ok(handle)
    }

    /// Invoke a tool and wait for its result.
    pub async fn call(&self, name: &str, args: Value) -> McpResult<Value> {
        self.call_tool(name, args).await?.await
    }

    /// The current tool catalog.
    pub async fn tools(&self) -> Arc<ToolSnapshot> {
        self.core.catalog.snapshot().await
    }

    /// Look up one tool in the current catalog.
    pub async fn tool(&self, name: &str) -> Option<ToolDescriptor> {
        self.core.catalog.get(name).await
    }

    /// The current session state.
    pub fn state(&self) -> SessionState {
        self.core.session.state()
    }

    /// Observe session state transitions.
    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.core.session.subscribe()
    }

    /// A copy of the current (or most recent) session.
    pub async fn session(&self) -> Option<Session> {
        self.core.session.current().await
    }

    /// Number of calls awaiting a result.
    pub fn pending_calls(&self) -> usize {
        self.core.registry.len()
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.core.config
    }

    /// Close the client.
    ///
    /// Stops the reader task, rejects every pending call with `ClientClosed`,
    /// and releases the transport. Later calls fail with `ClientClosed`.
    pub async fn close(&self) -> McpResult<()> {
        let previous = self.core.session.close().await;

        if let Some(handle) = self.reader.lock().await.take() {
            handle.abort();
        }

        let rejected = self.core.registry.reject_all(McpError::ClientClosed);
        info!(from = %previous, rejected, "client closed");

        self.core.transport.close().await
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        if let Some(handle) = self.reader.get_mut().take() {
            handle.abort();
        }
    }
}
