//! Session manager: owns the session identity, the endpoint URL, and the
//! connect / reconnect lifecycle.
//!
//! ```text
//! Disconnected ─connect()─▶ Connecting ─endpoint─▶ Active
//!                                                   │ stream lost
//!                                                   ▼
//!          Closed ◀─budget exhausted── Reconnecting ─endpoint─▶ Active
//!            ▲                              │
//!            └────────── close() ───────────┘   (close() is terminal)
//! ```
//!
//! Tool calls may only be sent while the state is `Active`. The state is
//! published on a `watch` channel so callers can observe transitions.

use chrono::Utc;
use tokio::sync::{watch, RwLock};
use tracing::{info, warn};
use url::Url;

use crate::config::ReconnectPolicy;
use crate::error::{McpError, McpResult};
use crate::types::{Endpoint, ServerError, Session, SessionState};

use super::transport::{FrameStream, Transport};

#[derive(Debug, Default)]
struct SessionSlot {
    session: Option<Session>,
    generation: u64,
    closed_by_client: bool,
    lost_after: Option<u32>,
    last_error: Option<ServerError>,
}

/// Owner of the client's single live [`Session`].
#[derive(Debug)]
pub struct SessionManager {
    base_url: Url,
    policy: ReconnectPolicy,
    slot: RwLock<SessionSlot>,
    state_tx: watch::Sender<SessionState>,
}

impl SessionManager {
    /// Create a manager in the `Disconnected` state.
    ///
    /// `base_url` resolves relative endpoint paths.
    pub fn new(base_url: Url, policy: ReconnectPolicy) -> Self {
        let (state_tx, _rx) = watch::channel(SessionState::Disconnected);
        Self {
            base_url,
            policy,
            slot: RwLock::new(SessionSlot::default()),
            state_tx,
        }
    }

    /// The current state.
    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Subscribe to state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// A copy of the current (or most recent) session, if any.
    pub async fn current(&self) -> Option<Session> {
        self.slot.read().await.session.clone()
    }

    /// Generation of the current (or most recent) session; 0 before the
    /// first `endpoint`.
    pub async fn current_generation(&self) -> u64 {
        self.slot.read().await.generation
    }

    /// Whether `close()` has been called.
    pub async fn is_closed_by_client(&self) -> bool {
        self.slot.read().await.closed_by_client
    }

    /// Attempts made before the connection was declared lost, if it was.
    pub async fn lost_after(&self) -> Option<u32> {
        self.slot.read().await.lost_after
    }

    /// The last session-level error reported by the server.
    pub async fn last_error(&self) -> Option<ServerError> {
        self.slot.read().await.last_error.clone()
    }

    /// The live session, provided calls may be sent right now.
    ///
    /// # Errors
    ///
    /// `ClientClosed` after `close()`, `NotConnected` in any state other
    /// than `Active`.
    pub async fn active_session(&self) -> McpResult<Session> {
        let slot = self.slot.read().await;
        if slot.closed_by_client {
            return Err(McpError::ClientClosed);
        }
        match (self.state(), &slot.session) {
            (SessionState::Active, Some(session)) => Ok(session.clone()),
            (state, _) => Err(McpError::NotConnected(state)),
        }
    }

    /// Enter `Connecting` for a fresh connection attempt.
    pub async fn begin_connect(&self) -> McpResult<()> {
        let mut slot = self.slot.write().await;
        if slot.closed_by_client {
            return Err(McpError::ClientClosed);
        }
        slot.lost_after = None;
        self.transition(&mut slot, SessionState::Connecting);
        Ok(())
    }

    /// Install a new session from an `endpoint` event and enter `Active`.
    ///
    /// The previous session, if any, is discarded.
    pub async fn install(&self, endpoint: &Endpoint) -> McpResult<Session> {
        let endpoint_url = self.base_url.join(&endpoint.url).map_err(|e| {
            McpError::Protocol(format!("cannot resolve endpoint '{}': {e}", endpoint.url))
        })?;

        let mut slot = self.slot.write().await;
        if slot.closed_by_client {
            return Err(McpError::ClientClosed);
        }

        slot.generation += 1;
        let session = Session {
            id: endpoint.session_id.clone(),
            endpoint_url: endpoint_url.to_string(),
            state: SessionState::Active,
            last_active_at: Utc::now(),
            generation: slot.generation,
        };
        let previous = slot.session.replace(session.clone());
        slot.last_error = None;
        self.transition(&mut slot, SessionState::Active);

        match previous {
            Some(prev) => info!(
                previous = %prev.id,
                session_id = %session.id,
                generation = session.generation,
                "session replaced"
            ),
            None => info!(session_id = %session.id, endpoint = %session.endpoint_url, "session established"),
        }
        Ok(session)
    }

    /// Record a heartbeat on the live session.
    pub async fn touch(&self) {
        if let Some(session) = self.slot.write().await.session.as_mut() {
            session.last_active_at = Utc::now();
        }
    }

    /// Remember a session-level server error.
    pub async fn record_error(&self, error: ServerError) {
        self.slot.write().await.last_error = Some(error);
    }

    /// The stream was lost; enter `Reconnecting`.
    pub async fn mark_reconnecting(&self) {
        let mut slot = self.slot.write().await;
        if !slot.closed_by_client {
            self.transition(&mut slot, SessionState::Reconnecting);
        }
    }

    /// A fresh connection attempt failed; fall back to `Disconnected`.
    pub async fn mark_disconnected(&self) {
        let mut slot = self.slot.write().await;
        if !slot.closed_by_client {
            self.transition(&mut slot, SessionState::Disconnected);
        }
    }

    /// Explicit close. Terminal: later connects fail with `ClientClosed`.
    ///
    /// Returns the state before closing.
    pub async fn close(&self) -> SessionState {
        let mut slot = self.slot.write().await;
        let previous = self.state();
        slot.closed_by_client = true;
        self.transition(&mut slot, SessionState::Closed);
        previous
    }

    /// Re-open the event stream with exponential backoff.
    ///
    /// `attempts` counts attempts since the session was last `Active` and is
    /// carried across calls, so a stream that opens but never delivers an
    /// endpoint still consumes the budget. When the budget is exhausted the
    /// state becomes `Closed` and `ConnectionLost` is returned.
    pub async fn reconnect(
        &self,
        transport: &dyn Transport,
        attempts: &mut u32,
    ) -> McpResult<FrameStream> {
        loop {
            if self.is_closed_by_client().await {
                return Err(McpError::ClientClosed);
            }
            if *attempts >= self.policy.max_attempts {
                return Err(self.mark_lost(*attempts).await);
            }

            let delay = self.policy.delay_for(*attempts);
            *attempts += 1;
            warn!(
                attempt = *attempts,
                max_attempts = self.policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "reconnecting event stream"
            );
            tokio::time::sleep(delay).await;

            match transport.open_stream().await {
                Ok(frames) => return Ok(frames),
                Err(e) => warn!(attempt = *attempts, error = %e, "reconnection attempt failed"),
            }
        }
    }

    async fn mark_lost(&self, attempts: u32) -> McpError {
        let mut slot = self.slot.write().await;
        slot.lost_after = Some(attempts);
        self.transition(&mut slot, SessionState::Closed);
        warn!(attempts, "reconnection budget exhausted; connection lost");
        McpError::ConnectionLost { attempts }
    }

    fn transition(&self, slot: &mut SessionSlot, next: SessionState) {
        let previous = self.state_tx.send_replace(next);
        if let Some(session) = slot.session.as_mut() {
            session.state = next;
        }
        if previous != next {
            info!(from = %previous, to = %next, "session state changed");
        }
    }
}
