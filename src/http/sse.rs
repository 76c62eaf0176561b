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

//! Server-Sent Events framing and the per-session stream body.
//!
//! A stream owns a [`StreamGuard`]; when the client disconnects the body is
//! dropped and the guard terminates the session.

use crate::core::constants::session::{
    HEADER_SESSION_ID, SSE_EVENT_ENDPOINT, SSE_EVENT_MESSAGE, SSE_KEEPALIVE_COMMENT,
};
use crate::core::errors::SessionError;
use crate::core::models::{JsonRpcMessage, SessionId};
use crate::session::channel::Delivery;
use crate::session::{Session, SessionStore};
use axum::body::{Body, Bytes};
use axum::http::header::{self, HeaderName};
use axum::response::{IntoResponse, Response};
use futures::{future, stream, StreamExt};
use std::convert::Infallible;
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const CONTENT_TYPE_EVENT_STREAM: &str = "text/event-stream";

/// `id:` (when sequenced), `event: message`, `data:` and the blank terminator.
pub fn message_frame(
    id: Option<u64>,
    message: &JsonRpcMessage,
) -> Result<String, serde_json::Error> {
    let data = serde_json::to_string(message)?;
    let mut frame = String::with_capacity(data.len() + 32);
    if let Some(id) = id {
        let _ = writeln!(frame, "id: {}", id);
    }
    let _ = write!(frame, "event: {}\ndata: {}\n\n", SSE_EVENT_MESSAGE, data);
    Ok(frame)
}

pub fn endpoint_frame(path: &str) -> String {
    format!("event: {}\ndata: {}\n\n", SSE_EVENT_ENDPOINT, path)
}

pub fn keepalive_frame() -> String {
    format!(": {}\n\n", SSE_KEEPALIVE_COMMENT)
}

fn encode(delivery: &Delivery) -> Option<Bytes> {
    match delivery {
        Delivery::Event(event) => match message_frame(event.id, &event.message) {
            Ok(frame) => Some(Bytes::from(frame)),
            Err(e) => {
                warn!(error = %e, "Dropping unserializable event");
                None
            }
        },
        Delivery::Keepalive => Some(Bytes::from(keepalive_frame())),
    }
}

/// Terminates its session when the stream body is dropped.
pub struct StreamGuard {
    store: Arc<SessionStore>,
    session_id: SessionId,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        if self.store.terminate(&self.session_id) {
            info!(session_id = %self.session_id, "Stream closed, session terminated");
        }
    }
}

/// Streaming body draining the session's event channel.
///
/// `preamble` is written before any event (legacy streams announce their
/// POST endpoint this way). Fails if a reader is already attached.
pub fn event_stream(
    store: &Arc<SessionStore>,
    session: &Session,
    idle: Duration,
    preamble: Option<String>,
) -> Result<Body, SessionError> {
    let deliveries = session.drain(idle)?;
    let guard = StreamGuard {
        store: Arc::clone(store),
        session_id: session.id(),
    };
    let frames = deliveries.filter_map(move |delivery| {
        let _guard = &guard;
        future::ready(encode(&delivery))
    });
    let body = stream::iter(preamble.map(Bytes::from))
        .chain(frames)
        .map(Ok::<_, Infallible>);
    Ok(Body::from_stream(body))
}

/// Wrap a body with the event-stream headers and the session id.
pub fn stream_response(session_id: SessionId, body: Body) -> Response {
    (
        [
            (header::CONTENT_TYPE, CONTENT_TYPE_EVENT_STREAM),
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        [(HEADER_SESSION_ID, session_id.to_string())],
        body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_frame_layout() {
        let message =
            JsonRpcMessage::notification("notification/manual", Some(json!({"message": "hi"})));
        let frame = message_frame(Some(7), &message).unwrap();
        let lines: Vec<&str> = frame.split('\n').collect();
        assert_eq!(lines[0], "id: 7");
        assert_eq!(lines[1], "event: message");
        assert!(lines[2].starts_with("data: {"));
        assert!(frame.ends_with("\n\n"));

        let data: serde_json::Value = serde_json::from_str(&lines[2]["data: ".len()..]).unwrap();
        assert_eq!(data["method"], "notification/manual");
    }

    #[test]
    fn test_frame_without_id_and_multiline_payload() {
        let message = JsonRpcMessage::success(json!(1), json!({"text": "a\nb"}));
        let frame = message_frame(None, &message).unwrap();
        assert!(frame.starts_with("event: message\ndata: "));
        // Embedded newlines stay escaped so the frame keeps one data line.
        assert_eq!(frame.matches('\n').count(), 3);
    }

    #[test]
    fn test_endpoint_and_keepalive_frames() {
        assert_eq!(endpoint_frame("/mcp"), "event: endpoint\ndata: /mcp\n\n");
        assert_eq!(keepalive_frame(), ": keepalive\n\n");
    }

    #[tokio::test]
    async fn test_dropping_body_terminates_session() {
        let store = Arc::new(SessionStore::new());
        let session = store.create();
        let body = event_stream(&store, &session, Duration::from_secs(30), None).unwrap();
        assert!(matches!(
            event_stream(&store, &session, Duration::from_secs(30), None),
            Err(SessionError::StreamAlreadyAttached(_))
        ));
        drop(body);
        assert!(!session.is_active());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_stream_yields_preamble_then_events() {
        let store = Arc::new(SessionStore::new());
        let session = store.create();
        session.push(JsonRpcMessage::notification("notification/manual", None));
        let body = event_stream(
            &store,
            &session,
            Duration::from_secs(30),
            Some(endpoint_frame("/mcp")),
        )
        .unwrap();
        let mut chunks = body.into_data_stream();
        let first = chunks.next().await.unwrap().unwrap();
        assert_eq!(&first[..], b"event: endpoint\ndata: /mcp\n\n");
        let second = chunks.next().await.unwrap().unwrap();
        assert!(std::str::from_utf8(&second).unwrap().starts_with("id: 1\n"));
    }
}
