// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Correlation of server-initiated requests with client answers.
//!
//! A handler that needs the client's input registers a wait with
//! [`CorrelationTable::begin_wait`], pushes a request carrying the returned id
//! onto the event channel, then suspends in [`CorrelationTable::wait`]. The
//! client answers on a separate POST; the inbound path hands that reply to
//! [`CorrelationTable::resolve`]. Each id is settled exactly once, by the reply
//! or by the timeout, whichever wins the table lock first.

use crate::core::errors::CorrelationError;
use crate::core::models::{CorrelationId, JsonRpcError};
use crate::core::wait::{wait_pair, Completer, WaitHandle, WaitOutcome};
use crate::utils::sync::lock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Client reply to a server-initiated request
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Result(Value),
    Error(JsonRpcError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    TimedOut,
    SessionClosed,
}

/// What a waiter gets back
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    Reply(Value),
    Rejected(JsonRpcError),
    Cancelled(CancelReason),
}

impl From<Reply> for Answer {
    fn from(reply: Reply) -> Self {
        match reply {
            Reply::Result(value) => Answer::Reply(value),
            Reply::Error(error) => Answer::Rejected(error),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Resolved,
    /// No pending wait under that id: never issued, already answered, or timed out
    Unknown,
}

struct Pending {
    created_at: Instant,
    completer: Option<Completer<Reply>>,
    handle: Option<WaitHandle<Reply>>,
}

#[derive(Default)]
pub struct CorrelationTable {
    pending: Mutex<HashMap<CorrelationId, Pending>>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new wait and return its id.
    pub fn begin_wait(&self) -> CorrelationId {
        let id = CorrelationId::generate();
        let (completer, handle) = wait_pair();
        lock(&self.pending).insert(
            id.clone(),
            Pending {
                created_at: Instant::now(),
                completer: Some(completer),
                handle: Some(handle),
            },
        );
        debug!(correlation_id = %id, "Registered pending wait");
        id
    }

    /// Suspend until `id` is resolved or `timeout` elapses. The entry is gone
    /// when this returns, however it returns.
    pub async fn wait(
        &self,
        id: &CorrelationId,
        timeout: Duration,
    ) -> Result<Answer, CorrelationError> {
        let mut handle = {
            let mut pending = lock(&self.pending);
            let entry = pending
                .get_mut(id)
                .ok_or_else(|| CorrelationError::Unknown(id.clone()))?;
            entry
                .handle
                .take()
                .ok_or_else(|| CorrelationError::AlreadyAwaited(id.clone()))?
        };
        let _guard = PendingGuard { table: self, id };

        let answer = match handle.wait(timeout).await {
            WaitOutcome::Ready(reply) => reply.into(),
            WaitOutcome::Abandoned => Answer::Cancelled(CancelReason::SessionClosed),
            WaitOutcome::TimedOut => {
                let entry = lock(&self.pending).remove(id);
                // resolve() completes under the table lock, so once the entry is
                // removed a winning reply is either already buffered or never comes.
                match handle.try_take() {
                    Some(reply) => reply.into(),
                    None => {
                        let waited = entry.map(|e| e.created_at.elapsed()).unwrap_or(timeout);
                        warn!(
                            correlation_id = %id,
                            waited_ms = waited.as_millis() as u64,
                            "Wait timed out, treating as cancel"
                        );
                        Answer::Cancelled(CancelReason::TimedOut)
                    }
                }
            }
        };
        Ok(answer)
    }

    /// Hand a client reply to the matching waiter. Unknown or already
    /// settled ids are logged and ignored.
    pub fn resolve(&self, id: &CorrelationId, reply: Reply) -> Resolution {
        let mut pending = lock(&self.pending);
        let Some(entry) = pending.get_mut(id) else {
            warn!(correlation_id = %id, "Reply for unknown or expired correlation, ignoring");
            return Resolution::Unknown;
        };
        let Some(completer) = entry.completer.take() else {
            warn!(correlation_id = %id, "Duplicate reply for correlation, ignoring");
            return Resolution::Unknown;
        };
        let _ = completer.complete(reply);
        if entry.handle.is_none() {
            // Waiter is suspended and now holds the value; nothing left to keep.
            pending.remove(id);
        }
        debug!(correlation_id = %id, "Resolved pending wait");
        Resolution::Resolved
    }

    /// Drop a wait that will never be awaited (its request could not be sent).
    pub fn discard(&self, id: &CorrelationId) -> bool {
        lock(&self.pending).remove(id).is_some()
    }

    /// Wake every waiter with a session-closed cancellation.
    pub fn abandon_all(&self) -> usize {
        let drained: Vec<_> = lock(&self.pending).drain().collect();
        if !drained.is_empty() {
            debug!(count = drained.len(), "Abandoning pending waits");
        }
        drained.len()
    }

    pub fn contains(&self, id: &CorrelationId) -> bool {
        lock(&self.pending).contains_key(id)
    }

    pub fn len(&self) -> usize {
        lock(&self.pending).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Removes the entry when a wait ends, including when the waiting future is dropped.
struct PendingGuard<'a> {
    table: &'a CorrelationTable,
    id: &'a CorrelationId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock(&self.table.pending).remove(self.id);
    }
}
