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

//! Task workers.
//!
//! One worker drives each task through `pending -> running -> terminal`. The
//! actual work is delegated to a [`TaskExecutor`]; it reports progress through
//! its [`TaskContext`], and a report on a cancelled task returns
//! [`TaskError::Stopped`] so the executor unwinds with `?`.

use crate::core::constants::{messages, timing};
use crate::core::errors::TaskError;
use crate::core::models::TaskId;
use crate::tasks::registry::TaskRegistry;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Pluggable body of a background task
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn run(&self, ctx: &TaskContext) -> anyhow::Result<Value>;
}

/// Handle a running executor uses to talk back to the registry
pub struct TaskContext {
    registry: Arc<TaskRegistry>,
    id: TaskId,
    method: String,
    params: Value,
}

impl TaskContext {
    pub(crate) fn new(
        registry: Arc<TaskRegistry>,
        id: TaskId,
        method: String,
        params: Value,
    ) -> Self {
        Self {
            registry,
            id,
            method,
            params,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn params(&self) -> &Value {
        &self.params
    }

    /// Record progress and emit a progress notification if the task has a token.
    pub fn report(
        &self,
        progress: u64,
        total: u64,
        message: Option<String>,
    ) -> Result<(), TaskError> {
        let note = self.registry.record_progress(self.id, progress, total, message)?;
        if let Some(note) = note {
            note.publish();
        }
        Ok(())
    }
}

/// Fixed number of evenly spaced steps. Stands in for real delegated work
/// and is what `tasks/create` runs by default.
pub struct SteppedWork {
    step_interval: Duration,
    default_steps: u64,
}

impl SteppedWork {
    pub fn new(step_interval: Duration, default_steps: u64) -> Self {
        Self {
            step_interval,
            default_steps,
        }
    }
}

#[async_trait]
impl TaskExecutor for SteppedWork {
    async fn run(&self, ctx: &TaskContext) -> anyhow::Result<Value> {
        let total = ctx
            .params()
            .get("steps")
            .and_then(Value::as_u64)
            .unwrap_or(self.default_steps)
            .clamp(1, timing::TASK_MAX_STEPS);
        ctx.report(0, total, None)?;
        for step in 1..=total {
            tokio::time::sleep(self.step_interval).await;
            ctx.report(step, total, Some(format!("Step {} of {}", step, total)))?;
        }
        Ok(json!({
            "summary": messages::TASK_SUMMARY,
            "method": ctx.method(),
        }))
    }
}

pub(crate) async fn drive(registry: Arc<TaskRegistry>, id: TaskId, start_delay: Duration) {
    // Leave the create response time to go out while the task still reads pending.
    tokio::time::sleep(start_delay).await;
    let ctx = match registry.start(id) {
        Ok(ctx) => ctx,
        Err(e) => {
            debug!(task_id = %id, error = %e, "Task not started");
            return;
        }
    };

    let executor = registry.executor();
    let outcome = tokio::spawn(async move { executor.run(&ctx).await }).await;
    match outcome {
        Ok(Ok(result)) => {
            registry.complete(id, result);
        }
        Ok(Err(e)) => match e.downcast_ref::<TaskError>() {
            Some(TaskError::Stopped(_)) => debug!(task_id = %id, "Worker observed cancellation"),
            _ => {
                registry.fail(id, &e.to_string());
            }
        },
        Err(join_error) => {
            error!(task_id = %id, error = %join_error, "Task worker panicked");
            registry.fail(id, messages::TASK_PANICKED);
        }
    }
}
