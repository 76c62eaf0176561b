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

//! Envelope classification.
//!
//! Every inbound body is sorted into exactly one of: a request (method and
//! id), a notification (method, no id), or a reply to a server-initiated
//! request (result or error, no method). Anything else becomes a structured
//! protocol error carrying whatever id could be recovered.

use crate::core::constants::jsonrpc;
use crate::core::models::{JsonRpcError, JsonRpcMessage};
use crate::session::correlation::Reply;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Request {
        id: Value,
        method: String,
        params: Value,
    },
    Notification {
        method: String,
        params: Value,
    },
    Reply {
        id: Value,
        reply: Reply,
    },
}

impl Inbound {
    pub fn method(&self) -> Option<&str> {
        match self {
            Inbound::Request { method, .. } | Inbound::Notification { method, .. } => Some(method),
            Inbound::Reply { .. } => None,
        }
    }
}

/// A body that could not be classified, with the best-effort request id
#[derive(Debug, Clone, PartialEq)]
pub struct EnvelopeError {
    pub id: Option<Value>,
    pub error: JsonRpcError,
}

impl EnvelopeError {
    fn new(id: Option<Value>, error: JsonRpcError) -> Self {
        Self { id, error }
    }

    pub fn into_response(self) -> JsonRpcMessage {
        JsonRpcMessage::error(self.id, self.error)
    }
}

pub fn parse(body: &[u8]) -> Result<Inbound, EnvelopeError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| EnvelopeError::new(None, JsonRpcError::parse_error(e)))?;
    classify(value)
}

pub fn classify(value: Value) -> Result<Inbound, EnvelopeError> {
    let mut object = match value {
        Value::Object(object) => object,
        Value::Array(_) => {
            return Err(EnvelopeError::new(
                None,
                JsonRpcError::invalid_request("batch requests are not supported"),
            ))
        }
        _ => {
            return Err(EnvelopeError::new(
                None,
                JsonRpcError::invalid_request("expected a JSON object"),
            ))
        }
    };

    let id = recover_id(&object);
    let invalid =
        |detail: &str| EnvelopeError::new(id.clone(), JsonRpcError::invalid_request(detail));

    if object.get("jsonrpc").and_then(Value::as_str) != Some(jsonrpc::VERSION) {
        return Err(invalid("jsonrpc must be \"2.0\""));
    }
    if object.get("id").is_some_and(|raw| !raw.is_null()) && id.is_none() {
        return Err(invalid("id must be a string or a number"));
    }

    match object.remove("method") {
        Some(Value::String(method)) => {
            let params = match object.remove("params") {
                None | Some(Value::Null) => Value::Object(Map::new()),
                Some(params @ (Value::Object(_) | Value::Array(_))) => params,
                Some(_) => return Err(invalid("params must be an object or an array")),
            };
            Ok(match id {
                Some(id) => Inbound::Request { id, method, params },
                None => Inbound::Notification { method, params },
            })
        }
        Some(_) => Err(invalid("method must be a string")),
        None => {
            let reply = if let Some(result) = object.remove("result") {
                Reply::Result(result)
            } else if let Some(error) = object.remove("error") {
                let error: JsonRpcError = serde_json::from_value(error)
                    .map_err(|_| invalid("malformed error object"))?;
                Reply::Error(error)
            } else {
                return Err(invalid("missing method"));
            };
            match id.clone() {
                Some(id) => Ok(Inbound::Reply { id, reply }),
                None => Err(invalid("reply without id")),
            }
        }
    }
}

fn recover_id(object: &Map<String, Value>) -> Option<Value> {
    object
        .get("id")
        .filter(|id| id.is_string() || id.is_number())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn classify_json(value: Value) -> Result<Inbound, EnvelopeError> {
        classify(value)
    }

    #[test]
    fn test_request_and_notification() {
        let request = classify_json(json!({"jsonrpc": "2.0", "id": 1, "method": "ping"})).unwrap();
        assert_eq!(
            request,
            Inbound::Request {
                id: json!(1),
                method: "ping".into(),
                params: json!({})
            }
        );
        let note = classify_json(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
            .unwrap();
        assert_eq!(note.method(), Some("notifications/initialized"));
        assert!(matches!(note, Inbound::Notification { .. }));
    }

    #[test]
    fn test_reply_routes_by_id() {
        let reply = classify_json(json!({"jsonrpc": "2.0", "id": "abc", "result": {"action": "accept"}}))
            .unwrap();
        assert_eq!(
            reply,
            Inbound::Reply {
                id: json!("abc"),
                reply: Reply::Result(json!({"action": "accept"}))
            }
        );
        let rejected = classify_json(
            json!({"jsonrpc": "2.0", "id": 4, "error": {"code": -32000, "message": "user said no"}}),
        )
        .unwrap();
        assert!(matches!(rejected, Inbound::Reply { reply: Reply::Error(e), .. } if e.code == -32000));
    }

    #[test]
    fn test_unparsable_body_is_parse_error_with_null_id() {
        let err = parse(b"{not json").unwrap_err();
        assert_eq!(err.id, None);
        assert_eq!(err.error.code, -32700);
        let wire = serde_json::to_value(err.into_response()).unwrap();
        assert_eq!(wire["id"], Value::Null);
    }

    #[test]
    fn test_missing_method_keeps_recovered_id() {
        let err = classify_json(json!({"jsonrpc": "2.0", "id": 9})).unwrap_err();
        assert_eq!(err.id, Some(json!(9)));
        assert_eq!(err.error.code, -32600);
    }

    #[test]
    fn test_batch_and_wrong_version_rejected() {
        assert_eq!(classify_json(json!([])).unwrap_err().error.code, -32600);
        let err = classify_json(json!({"jsonrpc": "1.0", "id": "x", "method": "ping"})).unwrap_err();
        assert_eq!(err.id, Some(json!("x")));
        assert_eq!(err.error.code, -32600);
    }

    #[test]
    fn test_bad_params_rejected() {
        let err = classify_json(json!({"jsonrpc": "2.0", "id": 2, "method": "x", "params": 5}))
            .unwrap_err();
        assert_eq!(err.error.code, -32600);
    }
}
