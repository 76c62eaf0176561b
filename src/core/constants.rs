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

//! lilith-stream Constants - Single source of truth for protocol and timing values.
//!
//! Error codes, method names, header names and the default timings for the
//! periodic schedulers live here so every component agrees on them.

/// JSON-RPC 2.0 Error Codes
pub mod jsonrpc {
    /// Protocol version string carried in every envelope
    pub const VERSION: &str = "2.0";
    /// Parse error (standard JSON-RPC)
    pub const ERROR_PARSE: i32 = -32700;
    /// Invalid request (standard JSON-RPC)
    pub const ERROR_INVALID_REQUEST: i32 = -32600;
    /// Method not found (standard JSON-RPC)
    pub const ERROR_METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params, also used for unknown task ids (standard JSON-RPC)
    pub const ERROR_INVALID_PARAMS: i32 = -32602;
    /// Internal error (standard JSON-RPC)
    pub const ERROR_INTERNAL: i32 = -32603;
}

/// MCP Protocol Methods
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const PING: &str = "ping";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
    pub const TASKS_CREATE: &str = "tasks/create";
    pub const TASKS_GET: &str = "tasks/get";
    pub const TASKS_CANCEL: &str = "tasks/cancel";
    pub const TASKS_LIST: &str = "tasks/list";
    pub const ELICITATION_CREATE: &str = "elicitation/create";
    pub const ELICITATION_RESPONSE: &str = "elicitation/response";
    pub const PROGRESS: &str = "notifications/progress";
    pub const SERVER_STATUS: &str = "notification/server_status";
    pub const MANUAL_NOTIFICATION: &str = "notification/manual";
}

/// Session and transport framing
pub mod session {
    /// Header carrying the session id on every non-initialize exchange
    pub const HEADER_SESSION_ID: &str = "mcp-session-id";
    /// Prefix of the keepalive ping id sequence, disjoint from correlation ids
    pub const PING_ID_PREFIX: &str = "ping-";
    /// SSE event name for JSON-RPC payloads
    pub const SSE_EVENT_MESSAGE: &str = "message";
    /// SSE event name announcing the POST endpoint on legacy streams
    pub const SSE_EVENT_ENDPOINT: &str = "endpoint";
    /// SSE comment sent when the stream has been idle
    pub const SSE_KEEPALIVE_COMMENT: &str = "keepalive";
}

/// Default timings, all overridable through [`crate::config::Config`]
pub mod timing {
    pub const PING_INTERVAL_SECS: u64 = 10;
    pub const STATUS_INTERVAL_SECS: u64 = 30;
    pub const REAPER_INTERVAL_SECS: u64 = 60;
    pub const INACTIVITY_TIMEOUT_SECS: u64 = 300;
    pub const STREAM_KEEPALIVE_SECS: u64 = 30;
    pub const ELICITATION_TIMEOUT_SECS: u64 = 120;
    pub const TOOL_TIMEOUT_SECS: u64 = 180;
    pub const TASK_START_DELAY_MS: u64 = 100;
    pub const TASK_STEP_INTERVAL_MS: u64 = 300;
    pub const TASK_DEFAULT_STEPS: u64 = 5;
    /// Upper bound accepted for `params.steps` on `tasks/create`
    pub const TASK_MAX_STEPS: u64 = 100;
}

/// Configuration Environment Variables
pub mod config {
    pub const ENV_CONFIG_PATH: &str = "LILITH_STREAM_CONFIG";
    pub const ENV_HOST: &str = "LILITH_STREAM_HOST";
    pub const ENV_PORT: &str = "LILITH_STREAM_PORT";
    pub const ENV_PATH: &str = "LILITH_STREAM_PATH";
    pub const ENV_TRANSPORT: &str = "LILITH_STREAM_TRANSPORT";
    pub const ENV_PROTOCOL_VERSION: &str = "LILITH_STREAM_PROTOCOL_VERSION";
    pub const ENV_INACTIVITY_TIMEOUT: &str = "LILITH_STREAM_INACTIVITY_TIMEOUT_SECS";
    pub const ENV_ELICITATION_TIMEOUT: &str = "LILITH_STREAM_ELICITATION_TIMEOUT_SECS";
    pub const ENV_TOOL_TIMEOUT: &str = "LILITH_STREAM_TOOL_TIMEOUT_SECS";
    pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
    pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";
}

/// Transport Limits (DoS Protection)
pub mod limits {
    /// Maximum allowed JSON-RPC message size (10 MB)
    pub const MAX_MESSAGE_SIZE_BYTES: usize = 10 * 1024 * 1024;
}

/// Fixed server-side texts
pub mod messages {
    pub const TASK_CREATED: &str = "Task created";
    pub const TASK_DONE: &str = "All steps done";
    pub const TASK_SUMMARY: &str = "Background task finished successfully";
    pub const TASK_CANCELLED: &str = "Cancelled by client";
    pub const TASK_PANICKED: &str = "worker panicked";
}
