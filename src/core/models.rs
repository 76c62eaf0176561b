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

//! Core wire and identity types.
//!
//! `JsonRpcMessage` is the single envelope shape used in both directions:
//! requests, notifications, responses and replies to server-initiated
//! requests all fit `{jsonrpc, id?, method?, params?, result?, error?}`.

use crate::core::constants::{jsonrpc, methods};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a new random id
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            /// Get the underlying Uuid
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map($name)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0.to_string()
            }
        }

        impl TryFrom<String> for $name {
            type Error = uuid::Error;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Opaque session identifier, carried in the `Mcp-Session-Id` header.
    SessionId
);

uuid_id!(
    /// Process-unique identifier of a background task.
    TaskId
);

/// Key linking a server-initiated request to the client's answer.
///
/// JSON-RPC ids may be strings or numbers; both are normalized to their
/// string form so `"7"` sent by us matches `7` echoed back by a lenient client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Recover a correlation key from an envelope id.
    pub fn from_value(id: &Value) -> Option<Self> {
        match id {
            Value::String(s) => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_value(&self) -> Value {
        Value::String(self.0.clone())
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error(detail: impl fmt::Display) -> Self {
        Self::new(jsonrpc::ERROR_PARSE, format!("Parse error: {}", detail))
    }

    pub fn invalid_request(detail: impl fmt::Display) -> Self {
        Self::new(
            jsonrpc::ERROR_INVALID_REQUEST,
            format!("Invalid Request: {}", detail),
        )
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            jsonrpc::ERROR_METHOD_NOT_FOUND,
            format!("Method not found: {}", method),
        )
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(jsonrpc::ERROR_INVALID_PARAMS, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(jsonrpc::ERROR_INTERNAL, message)
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

/// JSON-RPC 2.0 envelope.
///
/// Absent and `null` ids both deserialize to `None`; responses built with
/// [`JsonRpcMessage::error`] and no recoverable id serialize `"id": null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcMessage {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcMessage {
    fn empty() -> Self {
        Self {
            jsonrpc: jsonrpc::VERSION.to_string(),
            id: None,
            method: None,
            params: None,
            result: None,
            error: None,
        }
    }

    pub fn request(id: Value, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            id: Some(id),
            method: Some(method.into()),
            params,
            ..Self::empty()
        }
    }

    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            method: Some(method.into()),
            params,
            ..Self::empty()
        }
    }

    /// `notifications/progress` for `token`; `message` is omitted when unset.
    pub fn progress(token: Value, progress: u64, total: u64, message: Option<&str>) -> Self {
        let mut params = serde_json::json!({
            "progressToken": token,
            "progress": progress,
            "total": total,
        });
        if let Some(message) = message {
            params["message"] = Value::String(message.to_string());
        }
        Self::notification(methods::PROGRESS, Some(params))
    }

    pub fn success(id: Value, result: Value) -> Self {
        Self {
            id: Some(id),
            result: Some(result),
            ..Self::empty()
        }
    }

    pub fn error(id: Option<Value>, error: JsonRpcError) -> Self {
        Self {
            id: Some(id.unwrap_or(Value::Null)),
            error: Some(error),
            ..Self::empty()
        }
    }

    pub fn is_response(&self) -> bool {
        self.method.is_none() && (self.result.is_some() || self.error.is_some())
    }
}

/// Background task lifecycle: `pending -> running -> {completed | failed | cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of server-to-client delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Delivery id written as the SSE `id:` line, stamped by the channel
    pub id: Option<u64>,
    pub message: JsonRpcMessage,
}

impl Event {
    pub fn new(message: JsonRpcMessage) -> Self {
        Self { id: None, message }
    }
}

impl From<JsonRpcMessage> for Event {
    fn from(message: JsonRpcMessage) -> Self {
        Self::new(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_id_string_round_trip() {
        let id = SessionId::generate();
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<SessionId>().is_err());
    }

    #[test]
    fn test_error_response_serializes_null_id() {
        let msg = JsonRpcMessage::error(None, JsonRpcError::parse_error("eof"));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["id"], Value::Null);
        assert_eq!(value["error"]["code"], json!(-32700));
        assert!(value.get("result").is_none());
    }

    #[test]
    fn test_notification_omits_id() {
        let msg = JsonRpcMessage::notification("notifications/progress", Some(json!({})));
        let text = serde_json::to_string(&msg).unwrap();
        assert!(!text.contains("\"id\""));
        assert!(!msg.is_response());
    }

    #[test]
    fn test_progress_notification_shape() {
        let bare = JsonRpcMessage::progress(json!("tok"), 2, 5, None);
        assert_eq!(bare.method.as_deref(), Some("notifications/progress"));
        assert_eq!(
            bare.params,
            Some(json!({"progressToken": "tok", "progress": 2, "total": 5}))
        );

        let noted = JsonRpcMessage::progress(json!(7), 5, 5, Some("done"));
        let params = noted.params.unwrap();
        assert_eq!(params["progressToken"], 7);
        assert_eq!(params["message"], "done");
    }

    #[test]
    fn test_correlation_id_normalizes_numbers() {
        assert_eq!(
            CorrelationId::from_value(&json!(7)),
            Some(CorrelationId::from("7"))
        );
        assert_eq!(CorrelationId::from_value(&json!(null)), None);
    }
}
