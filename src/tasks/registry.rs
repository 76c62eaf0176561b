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

//! Process-wide task registry.
//!
//! Every task record lives behind one lock shared by its worker and by
//! `get`/`cancel` callers, so a snapshot never shows a half-applied
//! transition. State and result are written together when a task completes,
//! and nothing moves a task out of a terminal state.

use crate::core::constants::messages;
use crate::core::errors::TaskError;
use crate::core::models::{JsonRpcMessage, TaskId, TaskState};
use crate::session::Session;
use crate::tasks::worker::{self, TaskContext, TaskExecutor};
use crate::utils::sync::lock;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Public view of a task; unset fields are omitted on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub state: TaskState,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_token: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

struct TaskRecord {
    snapshot: TaskSnapshot,
    params: Value,
    session: Weak<Session>,
    seq: u64,
}

impl TaskRecord {
    fn set_state(&mut self, state: TaskState, message: &str) {
        self.snapshot.state = state;
        self.snapshot.message = Some(message.to_string());
        self.snapshot.updated_at = Utc::now();
    }
}

#[derive(Default)]
struct Tasks {
    records: HashMap<TaskId, TaskRecord>,
    next_seq: u64,
}

pub struct TaskRegistry {
    tasks: Mutex<Tasks>,
    executor: Arc<dyn TaskExecutor>,
    start_delay: Duration,
}

/// A progress update the worker must publish once the lock is released
pub(crate) struct ProgressNote {
    session: Weak<Session>,
    token: Value,
    progress: u64,
    total: u64,
    message: Option<String>,
}

impl ProgressNote {
    pub(crate) fn publish(self) {
        let Some(session) = self.session.upgrade() else {
            return;
        };
        session.push(JsonRpcMessage::progress(
            self.token,
            self.progress,
            self.total,
            self.message.as_deref(),
        ));
    }
}

impl TaskRegistry {
    pub fn new(executor: Arc<dyn TaskExecutor>, start_delay: Duration) -> Self {
        Self {
            tasks: Mutex::new(Tasks::default()),
            executor,
            start_delay,
        }
    }

    /// Store a pending task and start its worker. The returned snapshot is
    /// taken before the worker can run, so it always reads `pending`.
    pub fn create(
        self: &Arc<Self>,
        session: &Arc<Session>,
        method: &str,
        params: Value,
        progress_token: Option<Value>,
    ) -> TaskSnapshot {
        let now = Utc::now();
        let id = TaskId::generate();
        let snapshot = TaskSnapshot {
            id,
            state: TaskState::Pending,
            method: method.to_string(),
            progress_token,
            progress: None,
            total: None,
            message: Some(messages::TASK_CREATED.to_string()),
            result: None,
            created_at: now,
            updated_at: now,
        };
        {
            let mut tasks = lock(&self.tasks);
            tasks.next_seq += 1;
            let seq = tasks.next_seq;
            tasks.records.insert(
                id,
                TaskRecord {
                    snapshot: snapshot.clone(),
                    params,
                    session: Arc::downgrade(session),
                    seq,
                },
            );
        }
        info!(task_id = %id, method, session_id = %session.id(), "Task created");
        tokio::spawn(worker::drive(self.clone(), id, self.start_delay));
        snapshot
    }

    pub fn get(&self, id: &TaskId) -> Result<TaskSnapshot, TaskError> {
        lock(&self.tasks)
            .records
            .get(id)
            .map(|r| r.snapshot.clone())
            .ok_or_else(|| TaskError::NotFound(id.to_string()))
    }

    /// All tasks in creation order
    pub fn list(&self) -> Vec<TaskSnapshot> {
        let tasks = lock(&self.tasks);
        let mut records: Vec<&TaskRecord> = tasks.records.values().collect();
        records.sort_by_key(|r| r.seq);
        records.into_iter().map(|r| r.snapshot.clone()).collect()
    }

    /// Request cooperative cancellation. Terminal tasks are left untouched.
    pub fn cancel(&self, id: &TaskId) -> Result<TaskSnapshot, TaskError> {
        let mut tasks = lock(&self.tasks);
        let record = tasks
            .records
            .get_mut(id)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;
        let state = record.snapshot.state;
        if state.is_terminal() {
            warn!(task_id = %id, %state, "Cancel rejected for terminal task");
            return Err(TaskError::NotCancellable(state));
        }
        record.set_state(TaskState::Cancelled, messages::TASK_CANCELLED);
        info!(task_id = %id, "Task cancelled");
        Ok(record.snapshot.clone())
    }

    pub fn len(&self) -> usize {
        lock(&self.tasks).records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn executor(&self) -> Arc<dyn TaskExecutor> {
        self.executor.clone()
    }

    /// `pending -> running`. Fails if the task was cancelled before it started.
    pub(crate) fn start(self: &Arc<Self>, id: TaskId) -> Result<TaskContext, TaskError> {
        let mut tasks = lock(&self.tasks);
        let record = tasks
            .records
            .get_mut(&id)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;
        if record.snapshot.state != TaskState::Pending {
            return Err(TaskError::Stopped(id));
        }
        record.set_state(TaskState::Running, "Starting work...");
        record.snapshot.progress = Some(0);
        debug!(task_id = %id, "Task running");
        Ok(TaskContext::new(
            self.clone(),
            id,
            record.snapshot.method.clone(),
            record.params.clone(),
        ))
    }

    /// Apply a progress update. Counters only move forward and progress is
    /// capped at total. A note is returned only when progress advanced, so a
    /// report that merely seeds the total stays silent.
    pub(crate) fn record_progress(
        &self,
        id: TaskId,
        progress: u64,
        total: u64,
        message: Option<String>,
    ) -> Result<Option<ProgressNote>, TaskError> {
        let mut tasks = lock(&self.tasks);
        let record = tasks
            .records
            .get_mut(&id)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;
        if record.snapshot.state != TaskState::Running {
            return Err(TaskError::Stopped(id));
        }
        let snapshot = &mut record.snapshot;
        let previous = snapshot.progress.unwrap_or(0);
        let total = snapshot.total.map_or(total, |t| t.max(total));
        let progress = previous.max(progress).min(total);
        snapshot.total = Some(total);
        snapshot.progress = Some(progress);
        if message.is_some() {
            snapshot.message = message.clone();
        }
        snapshot.updated_at = Utc::now();

        if progress == previous {
            return Ok(None);
        }
        Ok(snapshot.progress_token.clone().map(|token| ProgressNote {
            session: record.session.clone(),
            token,
            progress,
            total,
            message,
        }))
    }

    /// `running -> completed`, writing state and result together.
    pub(crate) fn complete(&self, id: TaskId, result: Value) -> bool {
        let mut tasks = lock(&self.tasks);
        let Some(record) = tasks.records.get_mut(&id) else {
            return false;
        };
        if record.snapshot.state != TaskState::Running {
            return false;
        }
        record.set_state(TaskState::Completed, messages::TASK_DONE);
        record.snapshot.result = Some(result);
        info!(task_id = %id, "Task completed");
        true
    }

    pub(crate) fn fail(&self, id: TaskId, reason: &str) -> bool {
        let mut tasks = lock(&self.tasks);
        let Some(record) = tasks.records.get_mut(&id) else {
            return false;
        };
        if record.snapshot.state.is_terminal() {
            return false;
        }
        record.set_state(TaskState::Failed, reason);
        warn!(task_id = %id, reason, "Task failed");
        true
    }
}
