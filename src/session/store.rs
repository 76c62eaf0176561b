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

//! Session records and the process-wide session store.
//!
//! A [`Session`] owns its event channel, its correlation table and the
//! handles of its periodic timers. The [`SessionStore`] is the only place
//! sessions are created or removed; termination is idempotent, and exactly
//! one caller (explicit DELETE, reaper, stream disconnect, shutdown) observes
//! that it performed the teardown.

use crate::core::constants::methods;
use crate::core::constants::session::PING_ID_PREFIX;
use crate::core::errors::SessionError;
use crate::core::models::{CorrelationId, JsonRpcMessage, SessionId};
use crate::session::channel::{Delivery, EventChannel};
use crate::session::correlation::{CorrelationTable, Reply, Resolution};
use crate::utils::sync::{lock, read, write};
use chrono::{DateTime, Utc};
use futures::Stream;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// What the client told us at initialize
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientInfo {
    pub protocol_version: Option<String>,
    pub info: Option<Value>,
}

#[derive(Debug, Default)]
pub struct SessionStats {
    pub pings_sent: AtomicU64,
    pub pongs_received: AtomicU64,
    pub notifications_sent: AtomicU64,
}

pub struct Session {
    id: SessionId,
    created_at: DateTime<Utc>,
    started: Instant,
    last_activity: Mutex<Instant>,
    active: AtomicBool,
    initialized: AtomicBool,
    client: Mutex<ClientInfo>,
    channel: EventChannel,
    correlations: CorrelationTable,
    stats: SessionStats,
    shutdown: CancellationToken,
    timers: Mutex<Vec<JoinHandle<()>>>,
}

impl Session {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            id: SessionId::generate(),
            created_at: Utc::now(),
            started: now,
            last_activity: Mutex::new(now),
            active: AtomicBool::new(true),
            initialized: AtomicBool::new(false),
            client: Mutex::new(ClientInfo::default()),
            channel: EventChannel::new(),
            correlations: CorrelationTable::new(),
            stats: SessionStats::default(),
            shutdown: CancellationToken::new(),
            timers: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn idle_for(&self) -> Duration {
        lock(&self.last_activity).elapsed()
    }

    pub fn touch(&self) {
        *lock(&self.last_activity) = Instant::now();
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Returns `true` only the first time.
    pub fn mark_initialized(&self) -> bool {
        !self.initialized.swap(true, Ordering::AcqRel)
    }

    pub fn record_client(&self, client: ClientInfo) {
        *lock(&self.client) = client;
    }

    pub fn client(&self) -> ClientInfo {
        lock(&self.client).clone()
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn correlations(&self) -> &CorrelationTable {
        &self.correlations
    }

    /// Push a server-to-client message. Dropped once the session is terminated.
    pub fn push(&self, message: JsonRpcMessage) -> bool {
        if !self.is_active() {
            debug!(session_id = %self.id, "Session inactive, dropping event");
            return false;
        }
        self.channel.push(message)
    }

    pub fn events_pushed(&self) -> u64 {
        self.channel.pushed()
    }

    /// Attach the single stream reader.
    pub fn drain(
        &self,
        idle: Duration,
    ) -> Result<impl Stream<Item = Delivery> + Send + 'static, SessionError> {
        self.channel
            .take_reader()
            .map(|reader| reader.into_stream(idle))
            .ok_or(SessionError::StreamAlreadyAttached(self.id))
    }

    /// Queue the next keepalive ping and return its id. `pings_sent` only
    /// counts pings the channel accepted.
    pub fn send_ping(&self) -> Option<String> {
        let n = self.stats.pings_sent.load(Ordering::Relaxed) + 1;
        let id = format!("{}{}", PING_ID_PREFIX, n);
        let ping = JsonRpcMessage::request(Value::String(id.clone()), methods::PING, None);
        if !self.push(ping) {
            return None;
        }
        self.stats.pings_sent.fetch_add(1, Ordering::Relaxed);
        Some(id)
    }

    /// Route a client reply (no `method`) to whatever is waiting on its id.
    pub fn accept_reply(&self, id: &Value, reply: Reply) -> Resolution {
        if let Some(ping) = id.as_str().filter(|s| s.starts_with(PING_ID_PREFIX)) {
            self.stats.pongs_received.fetch_add(1, Ordering::Relaxed);
            debug!(session_id = %self.id, ping, "Pong received");
            return Resolution::Resolved;
        }
        match CorrelationId::from_value(id) {
            Some(correlation_id) => self.correlations.resolve(&correlation_id, reply),
            None => Resolution::Unknown,
        }
    }

    /// Token cancelled when the session terminates
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Register timer tasks; returns `false` (and aborts them) if the session
    /// already has timers or is no longer active.
    pub fn attach_timers(&self, handles: Vec<JoinHandle<()>>) -> bool {
        let mut timers = lock(&self.timers);
        if !timers.is_empty() || !self.is_active() {
            handles.iter().for_each(JoinHandle::abort);
            return false;
        }
        timers.extend(handles);
        true
    }

    /// Timer tasks that have not finished yet
    pub fn running_timers(&self) -> usize {
        lock(&self.timers).iter().filter(|h| !h.is_finished()).count()
    }

    fn shutdown(&self) -> bool {
        if !self.active.swap(false, Ordering::AcqRel) {
            return false;
        }
        self.shutdown.cancel();
        self.channel.close();
        self.correlations.abandon_all();
        true
    }
}

#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self) -> Arc<Session> {
        let session = Arc::new(Session::new());
        write(&self.sessions).insert(session.id, session.clone());
        info!(session_id = %session.id, "Session created");
        session
    }

    pub fn get(&self, id: &SessionId) -> Result<Arc<Session>, SessionError> {
        read(&self.sessions)
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    /// Resolve a raw header value to a live session.
    pub fn lookup(&self, raw: Option<&str>) -> Result<Arc<Session>, SessionError> {
        let raw = raw.ok_or(SessionError::MissingSessionId)?;
        let id: SessionId = raw
            .parse()
            .map_err(|_| SessionError::InvalidSessionId(raw.to_string()))?;
        self.get(&id)
    }

    pub fn touch(&self, id: &SessionId) -> Result<(), SessionError> {
        self.get(id).map(|session| session.touch())
    }

    /// Tear a session down. Returns `true` only for the call that removed it.
    pub fn terminate(&self, id: &SessionId) -> bool {
        let removed = write(&self.sessions).remove(id);
        match removed {
            Some(session) => {
                let done = session.shutdown();
                if done {
                    info!(session_id = %id, uptime_secs = session.uptime().as_secs(), "Session terminated");
                }
                done
            }
            None => false,
        }
    }

    /// Terminate every session idle for longer than `threshold`.
    pub fn reap_idle(&self, threshold: Duration) -> Vec<SessionId> {
        let stale: Vec<SessionId> = read(&self.sessions)
            .values()
            .filter(|s| s.idle_for() > threshold)
            .map(|s| s.id)
            .collect();
        stale.into_iter().filter(|id| self.terminate(id)).collect()
    }

    pub fn terminate_all(&self) -> usize {
        let ids: Vec<SessionId> = read(&self.sessions).keys().copied().collect();
        ids.iter().filter(|id| self.terminate(id)).count()
    }

    pub fn len(&self) -> usize {
        read(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
