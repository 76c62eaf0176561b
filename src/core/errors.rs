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

//! Domain error types.
//!
//! Each component owns a small error enum. Everything that can reach a
//! client converts into a [`JsonRpcError`] with the matching code, and
//! the HTTP boundary maps [`TransportError`] onto status codes.

use crate::core::models::{CorrelationId, JsonRpcError, SessionId, TaskId, TaskState};
use thiserror::Error;

/// Session lookup and stream attachment failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Session header absent on a session-scoped exchange (HTTP 400)
    #[error("Missing Mcp-Session-Id header")]
    MissingSessionId,

    /// Session header present but not a session id (HTTP 400)
    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),

    /// Unknown or terminated session (HTTP 404)
    #[error("Session not found: {0}")]
    NotFound(String),

    /// A second reader tried to drain the event channel (HTTP 409)
    #[error("Event stream already attached for session {0}")]
    StreamAlreadyAttached(SessionId),
}

/// Correlation table misuse. Resolutions of unknown ids are not errors,
/// they are reported through [`crate::session::correlation::Resolution`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CorrelationError {
    /// No pending wait registered under this id
    #[error("Unknown correlation id: {0}")]
    Unknown(CorrelationId),

    /// Someone is already waiting on this id
    #[error("Correlation {0} is already being awaited")]
    AlreadyAwaited(CorrelationId),
}

/// Task registry failures, reported to clients as invalid params
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("Task not found: {0}")]
    NotFound(String),

    /// Cancel of a task that already reached a terminal state
    #[error("Cannot cancel task in state '{0}'")]
    NotCancellable(TaskState),

    /// Raised to the worker when the task was cancelled or finished underneath it
    #[error("Task {0} is no longer running")]
    Stopped(TaskId),
}

/// Tool invocation failures
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool '{name}' timed out after {secs}s")]
    TimedOut { name: String, secs: u64 },

    #[error("Tool '{0}' panicked")]
    Panicked(String),

    #[error("Tool '{name}' failed: {source}")]
    Failed {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Errors surfaced at the HTTP boundary
#[derive(Error, Debug)]
pub enum TransportError {
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Request body exceeded the configured limit (HTTP 413)
    #[error("Payload too large")]
    PayloadTooLarge,

    /// Invalid configuration detected before serving
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            TransportError::Session(SessionError::MissingSessionId)
            | TransportError::Session(SessionError::InvalidSessionId(_)) => 400,
            TransportError::Session(SessionError::NotFound(_)) => 404,
            TransportError::Session(SessionError::StreamAlreadyAttached(_)) => 409,
            TransportError::PayloadTooLarge => 413,
            TransportError::Configuration(_) | TransportError::Io(_) => 500,
        }
    }

    /// Get user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            TransportError::Session(e) => e.to_string(),
            TransportError::PayloadTooLarge => "Payload too large".to_string(),
            TransportError::Configuration(_) => "Internal error".to_string(),
            TransportError::Io(_) => "Internal system error".to_string(),
        }
    }
}

impl From<SessionError> for JsonRpcError {
    fn from(e: SessionError) -> Self {
        JsonRpcError::internal(e.to_string())
    }
}

impl From<TaskError> for JsonRpcError {
    fn from(e: TaskError) -> Self {
        match e {
            TaskError::Stopped(_) => JsonRpcError::internal(e.to_string()),
            _ => JsonRpcError::invalid_params(e.to_string()),
        }
    }
}

impl From<ToolError> for JsonRpcError {
    fn from(e: ToolError) -> Self {
        match e {
            ToolError::UnknownTool(_) | ToolError::InvalidArguments(_) => {
                JsonRpcError::invalid_params(e.to_string())
            }
            ToolError::TimedOut { .. } | ToolError::Panicked(_) | ToolError::Failed { .. } => {
                JsonRpcError::internal(e.to_string())
            }
        }
    }
}
