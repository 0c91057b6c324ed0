//! Dispatcher: the control loop that drains the event stream and routes
//! each event to the component that owns the state it touches.
//!
//! | Event | Action |
//! |---|---|
//! | `endpoint` | session manager installs the (new) session |
//! | `tools` | catalog snapshot replaced |
//! | `result` | registry resolves the matching call, or the event is dropped |
//! | `error` + correlation id | registry rejects the matching call |
//! | `error` without id | recorded on the session; fatal kinds force a reconnect |
//! | heartbeat | session `last_active_at` refreshed |
//!
//! The loop runs on one dedicated task that only ever waits for the next
//! frame (or, while reconnecting, for the backoff timer).

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::error::{ErrorKind, McpError, McpResult};
use crate::types::{Event, Session};

use super::mcp_client::ClientCore;
use super::parser;
use super::pending::PendingCallRegistry;
use super::sse::SseDecoder;
use super::transport::FrameStream;

/// What the loop should do after routing one event.
#[derive(Debug)]
pub(crate) enum Flow {
    /// Keep reading.
    Continue,
    /// A session became active.
    Established(Session),
    /// Give up on the current stream and reconnect.
    Abandon(McpError),
}

/// Reader-task state. Holds only shared handles; all routed state lives in
/// the session manager, catalog, and registry.
pub(crate) struct Dispatcher {
    core: Arc<ClientCore>,
}

impl Dispatcher {
    pub(crate) fn new(core: Arc<ClientCore>) -> Self {
        Self { core }
    }

    /// Drive the event stream until the client closes or the connection is
    /// lost for good.
    ///
    /// `ready` is completed with the first active session, or with the error
    /// that ended the stream before one arrived. Until then, failures are
    /// fatal to the connect attempt instead of triggering a reconnect.
    pub(crate) async fn run(self, mut frames: FrameStream, ready: oneshot::Sender<McpResult<Session>>) {
        let mut ready = Some(ready);
        let mut attempts = 0u32;

        loop {
            let reason = self.pump(frames, &mut ready, &mut attempts).await;

            if let Some(tx) = ready.take() {
                self.core.session.mark_disconnected().await;
                let _ = tx.send(Err(reason));
                return;
            }
            if self.core.session.is_closed_by_client().await {
                return;
            }

            warn!(error = %reason, "event stream lost");
            self.core.session.mark_reconnecting().await;

            match self
                .core
                .session
                .reconnect(self.core.transport.as_ref(), &mut attempts)
                .await
            {
                Ok(next) => {
                    info!(attempt = attempts, "event stream reopened; awaiting endpoint");
                    frames = next;
                }
                Err(lost) => {
                    let rejected = self.core.registry.reject_all(lost.clone());
                    error!(error = %lost, rejected, "giving up on the event stream");
                    return;
                }
            }
        }
    }

    /// Read one stream to its end. Returns why the stream ended.
    async fn pump(
        &self,
        frames: FrameStream,
        ready: &mut Option<oneshot::Sender<McpResult<Session>>>,
        attempts: &mut u32,
    ) -> McpError {
        let events = parser::events(frames);
        futures::pin_mut!(events);
        let idle_timeout = self.core.config.idle_timeout();

        loop {
            let next = match idle_timeout {
                Some(window) => match tokio::time::timeout(window, events.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        return McpError::Timeout(format!("no events received for {window:?}"))
                    }
                },
                None => events.next().await,
            };

            let event = match next {
                None => return McpError::Transport("event stream closed by server".to_string()),
                Some(Err(e)) if e.kind() == ErrorKind::Protocol => {
                    warn!(error = %e, "skipping malformed frame");
                    continue;
                }
                Some(Err(e)) => return e,
                Some(Ok(event)) => event,
            };

            match self.dispatch(event).await {
                Flow::Continue => {}
                Flow::Established(session) => {
                    *attempts = 0;
                    if let Some(tx) = ready.take() {
                        let _ = tx.send(Ok(session));
                    }
                }
                Flow::Abandon(reason) => return reason,
            }
        }
    }

    /// Route a single event.
    pub(crate) async fn dispatch(&self, event: Event) -> Flow {
        debug!(event = event.name(), "dispatching event");

        match event {
            Event::Endpoint(endpoint) => match self.core.session.install(&endpoint).await {
                Ok(session) => {
                    self.core.registry.reject_stale(session.generation);
                    Flow::Established(session)
                }
                Err(McpError::ClientClosed) => Flow::Continue,
                Err(e) => {
                    warn!(error = %e, "ignoring unusable endpoint");
                    Flow::Continue
                }
            },
            Event::Tools(tools) => {
                let snapshot = self.core.catalog.replace(tools).await;
                info!(tools = ?snapshot.names(), "tool catalog updated");
                Flow::Continue
            }
            Event::Result(result) => {
                if !self
                    .core
                    .registry
                    .resolve(&result.correlation_id, result.payload)
                {
                    debug!(
                        correlation_id = %result.correlation_id,
                        "dropping result for unknown or settled call"
                    );
                }
                Flow::Continue
            }
            Event::Error(err) => match err.correlation_id.clone() {
                Some(correlation_id) => {
                    if !self.core.registry.reject(&correlation_id, err.into_error()) {
                        debug!(%correlation_id, "dropping error for unknown or settled call");
                    }
                    Flow::Continue
                }
                None => {
                    warn!(message = %err.message, kind = ?err.kind, "session-level server error");
                    let fatal = err.is_fatal();
                    self.core.session.record_error(err.clone()).await;
                    if fatal {
                        Flow::Abandon(err.into_error())
                    } else {
                        Flow::Continue
                    }
                }
            },
            Event::Heartbeat => {
                self.core.session.touch().await;
                Flow::Continue
            }
        }
    }
}

/// Apply `result` / `error` events carried inline in a POST response body.
///
/// Only correlated events are honoured; the registry's idempotent settle
/// makes a later duplicate on the main stream harmless. Returns the number
/// of calls settled.
pub(crate) fn route_inline(registry: &PendingCallRegistry, body: &str) -> usize {
    let mut decoder = SseDecoder::new();
    let mut frames: Vec<_> = decoder.feed(body.as_bytes()).into_iter().flatten().collect();
    frames.extend(decoder.finish());

    let mut settled = 0;
    for frame in frames {
        let settled_one = match parser::parse_frame(&frame) {
            Ok(Some(Event::Result(result))) => {
                registry.resolve(&result.correlation_id, result.payload)
            }
            Ok(Some(Event::Error(err))) => match err.correlation_id.clone() {
                Some(id) => registry.reject(&id, err.into_error()),
                None => false,
            },
            Ok(_) => false,
            Err(e) => {
                warn!(error = %e, "skipping malformed frame in POST response");
                false
            }
        };
        if settled_one {
            settled += 1;
        }
    }
    settled
}
