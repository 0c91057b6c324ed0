//! Pending-call registry: correlates in-flight tool calls with the
//! `result` / `error` events that eventually answer them.
//!
//! Each registered call owns a write-once result slot (a oneshot channel) and
//! an independent deadline. Settlement removes the entry, so a second
//! `resolve` / `reject` for the same correlation id is a no-op. Responses
//! are matched purely by correlation id; arrival order does not matter.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::error::{McpError, McpResult};

type CallMap = Mutex<HashMap<String, PendingCall>>;

/// One in-flight tool call.
#[derive(Debug)]
pub struct PendingCall {
    /// Client-generated id, unique among in-flight calls.
    pub correlation_id: String,
    /// Name of the tool being called.
    pub tool_name: String,
    /// Arguments the tool was called with.
    pub args: Value,
    /// Session the call was sent under.
    pub session_id: String,
    /// Generation of that session; see [`Session::generation`](crate::types::Session::generation).
    pub generation: u64,
    /// Registration time.
    pub created_at: DateTime<Utc>,
    /// Deadline measured from `created_at`.
    pub timeout: Duration,
    slot: oneshot::Sender<McpResult<Value>>,
    watcher: Option<AbortHandle>,
}

impl PendingCall {
    fn settle(mut self, outcome: McpResult<Value>) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
        // The handle may already be gone; nobody is left to tell.
        let _ = self.slot.send(outcome);
    }
}

/// Thread-safe map of correlation id → [`PendingCall`].
///
/// Cloning is cheap; clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct PendingCallRegistry {
    calls: Arc<CallMap>,
}

fn lock(calls: &CallMap) -> MutexGuard<'_, HashMap<String, PendingCall>> {
    calls.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PendingCallRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a fresh correlation id (random UUID v4).
    pub fn new_correlation_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Register a call and return the handle its caller awaits.
    ///
    /// A timer is armed for `timeout`; if the call is still pending when it
    /// fires, the call is rejected with `Timeout`. Must be called from within
    /// a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::Other`] if `correlation_id` is already in flight.
    pub fn register(
        &self,
        correlation_id: impl Into<String>,
        tool_name: impl Into<String>,
        args: Value,
        session_id: impl Into<String>,
        generation: u64,
        timeout: Duration,
    ) -> McpResult<ToolCallHandle> {
        let correlation_id = correlation_id.into();
        let tool_name = tool_name.into();
        let (tx, rx) = oneshot::channel();

        let mut calls = lock(&self.calls);
        if calls.contains_key(&correlation_id) {
            return Err(McpError::Other(format!(
                "correlation id {correlation_id} is already in flight"
            )));
        }

        let watcher = spawn_deadline(Arc::downgrade(&self.calls), correlation_id.clone(), timeout);
        calls.insert(
            correlation_id.clone(),
            PendingCall {
                correlation_id: correlation_id.clone(),
                tool_name: tool_name.clone(),
                args,
                session_id: session_id.into(),
                generation,
                created_at: Utc::now(),
                timeout,
                slot: tx,
                watcher: Some(watcher),
            },
        );
        drop(calls);

        debug!(correlation_id = %correlation_id, tool = %tool_name, "registered pending call");

        Ok(ToolCallHandle {
            correlation_id,
            tool_name,
            receiver: rx,
            registry: self.clone(),
            finished: false,
        })
    }

    /// Complete a call with its payload. Returns `false` if no such call is
    /// pending (unknown, late, or duplicate delivery).
    pub fn resolve(&self, correlation_id: &str, payload: Value) -> bool {
        self.settle(correlation_id, Ok(payload))
    }

    /// Fail a call. Returns `false` if no such call is pending.
    pub fn reject(&self, correlation_id: &str, error: McpError) -> bool {
        self.settle(correlation_id, Err(error))
    }

    /// Fail a call with `Timeout`. Returns `false` if no such call is pending.
    pub fn expire(&self, correlation_id: &str) -> bool {
        let Some(call) = lock(&self.calls).remove(correlation_id) else {
            return false;
        };
        debug!(correlation_id, tool = %call.tool_name, "pending call timed out");
        let error = McpError::Timeout(format!(
            "call {} to '{}' did not complete within {:?}",
            call.correlation_id, call.tool_name, call.timeout
        ));
        call.settle(Err(error));
        true
    }

    /// Forget a call without notifying its handle. Returns `false` if no such
    /// call is pending.
    pub fn cancel(&self, correlation_id: &str) -> bool {
        let removed = lock(&self.calls).remove(correlation_id);
        match removed {
            Some(mut call) => {
                if let Some(watcher) = call.watcher.take() {
                    watcher.abort();
                }
                debug!(correlation_id, "pending call cancelled");
                true
            }
            None => false,
        }
    }

    /// Reject every call sent under a session generation older than
    /// `current_generation` with `SessionExpired`, even when the server
    /// reissued the same session id. Returns the number of calls rejected.
    pub fn reject_stale(&self, current_generation: u64) -> usize {
        let stale: Vec<PendingCall> = {
            let mut calls = lock(&self.calls);
            let ids: Vec<String> = calls
                .values()
                .filter(|c| c.generation < current_generation)
                .map(|c| c.correlation_id.clone())
                .collect();
            ids.iter().filter_map(|id| calls.remove(id)).collect()
        };

        let count = stale.len();
        for call in stale {
            let session_id = call.session_id.clone();
            call.settle(Err(McpError::SessionExpired { session_id }));
        }
        if count > 0 {
            debug!(count, generation = current_generation, "expired calls from previous session");
        }
        count
    }

    /// Reject every pending call with `error`. Returns the number rejected.
    pub fn reject_all(&self, error: McpError) -> usize {
        let drained: Vec<PendingCall> = lock(&self.calls).drain().map(|(_, c)| c).collect();
        let count = drained.len();
        for call in drained {
            call.settle(Err(error.clone()));
        }
        count
    }

    /// Number of calls in flight.
    pub fn len(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Whether no calls are in flight.
    pub fn is_empty(&self) -> bool {
        lock(&self.calls).is_empty()
    }

    /// Whether `correlation_id` is in flight.
    pub fn contains(&self, correlation_id: &str) -> bool {
        lock(&self.calls).contains_key(correlation_id)
    }

    /// Correlation ids of all calls in flight.
    pub fn pending_ids(&self) -> Vec<String> {
        lock(&self.calls).keys().cloned().collect()
    }

    fn settle(&self, correlation_id: &str, outcome: McpResult<Value>) -> bool {
        let removed = lock(&self.calls).remove(correlation_id);
        match removed {
            Some(call) => {
                debug!(
                    correlation_id,
                    tool = %call.tool_name,
                    ok = outcome.is_ok(),
                    "settled pending call"
                );
                call.settle(outcome);
                true
            }
            None => false,
        }
    }
}

fn spawn_deadline(calls: Weak<CallMap>, correlation_id: String, timeout: Duration) -> AbortHandle {
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        if let Some(calls) = calls.upgrade() {
            PendingCallRegistry { calls }.expire(&correlation_id);
        }
    })
    .abort_handle()
}

/// Future resolving to the outcome of one tool call.
///
/// Dropping the handle (or calling [`cancel()`](Self::cancel)) before it
/// completes removes the pending entry. Cancellation is advisory: the server
/// may still execute the call.
#[derive(Debug)]
pub struct ToolCallHandle {
    correlation_id: String,
    tool_name: String,
    receiver: oneshot::Receiver<McpResult<Value>>,
    registry: PendingCallRegistry,
    finished: bool,
}

impl ToolCallHandle {
    /// The call's correlation id.
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// The called tool's name.
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    /// Stop waiting for the call. Returns `true` if it was still pending.
    pub fn cancel(mut self) -> bool {
        self.finished = true;
        self.registry.cancel(&self.correlation_id)
    }
}

impl Future for ToolCallHandle {
    type Output = McpResult<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(outcome) => {
                self.finished = true;
                Poll::Ready(outcome.unwrap_or_else(|_| {
                    Err(McpError::Cancelled(format!(
                        "call {} was dropped before completing",
                        self.correlation_id
                    )))
                }))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for ToolCallHandle {
    fn drop(&mut self) {
        if !self.finished {
            self.registry.cancel(&self.correlation_id);
        }
    }
}
