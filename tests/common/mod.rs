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

// Shared helpers for the HTTP integration tests

#![allow(dead_code)]

use axum::body::{Body, BodyDataStream};
use axum::http::{Method, Request, Response, StatusCode};
use axum::Router;
use futures::StreamExt;
use lilith_stream::config::{Config, TransportMode};
use lilith_stream::http::{create_router, AppState};
use lilith_stream::rpc::demo_tools::default_catalog;
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceExt;

pub const SESSION_HEADER: &str = "mcp-session-id";
pub const ACCEPT_BOTH: &str = "application/json, text/event-stream";

pub fn test_state(transport: TransportMode) -> AppState {
    let config = Config {
        transport,
        task_start_delay_ms: 10,
        task_step_interval_ms: 10,
        ..Config::default()
    };
    AppState::new(config, default_catalog()).unwrap()
}

pub fn test_app(transport: TransportMode) -> (Router, AppState) {
    let state = test_state(transport);
    (create_router(state.clone()), state)
}

pub fn request(method: Method, session: Option<&str>, body: Option<&Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri("/mcp")
        .header("accept", ACCEPT_BOTH)
        .header("content-type", "application/json");
    if let Some(id) = session {
        builder = builder.header(SESSION_HEADER, id);
    }
    let body = match body {
        Some(value) => Body::from(value.to_string()),
        None => Body::empty(),
    };
    builder.body(body).unwrap()
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn post(app: &Router, session: Option<&str>, body: Value) -> Response<Body> {
    send(app, request(Method::POST, session, Some(&body))).await
}

pub fn session_id(response: &Response<Body>) -> String {
    response
        .headers()
        .get(SESSION_HEADER)
        .expect("session header")
        .to_str()
        .unwrap()
        .to_string()
}

/// JSON-RPC payload of an inline reply, whether framed as SSE or plain JSON.
pub async fn payload(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = std::str::from_utf8(&bytes).unwrap();
    match text.lines().find_map(|line| line.strip_prefix("data: ")) {
        Some(data) => serde_json::from_str(data).unwrap(),
        None => serde_json::from_str(text).unwrap(),
    }
}

pub fn rpc(id: i64, method: &str, params: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params })
}

pub fn notification(method: &str, params: Value) -> Value {
    json!({ "jsonrpc": "2.0", "method": method, "params": params })
}

/// Run the streamable handshake and return the new session id.
pub async fn initialize(app: &Router) -> String {
    let response = post(
        app,
        None,
        rpc(
            1,
            "initialize",
            json!({ "protocolVersion": "2025-06-18", "clientInfo": { "name": "tests" } }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let id = session_id(&response);
    let ack = post(app, Some(&id), notification("notifications/initialized", json!({}))).await;
    assert_eq!(ack.status(), StatusCode::ACCEPTED);
    id
}

/// Incremental reader over a live SSE body
pub struct SseReader {
    chunks: BodyDataStream,
    buffer: String,
}

impl SseReader {
    pub fn new(response: Response<Body>) -> Self {
        Self {
            chunks: response.into_body().into_data_stream(),
            buffer: String::new(),
        }
    }

    /// Next complete frame (without the blank-line terminator).
    pub async fn next_frame(&mut self) -> String {
        loop {
            if let Some(end) = self.buffer.find("\n\n") {
                let frame = self.buffer[..end].to_string();
                self.buffer.drain(..end + 2);
                return frame;
            }
            let chunk = tokio::time::timeout(Duration::from_secs(5), self.chunks.next())
                .await
                .expect("timed out waiting for an SSE frame")
                .expect("stream ended")
                .unwrap();
            self.buffer.push_str(std::str::from_utf8(&chunk).unwrap());
        }
    }

    /// Next `message` frame decoded as JSON, skipping keepalives.
    pub async fn next_message(&mut self) -> Value {
        loop {
            let frame = self.next_frame().await;
            if let Some(data) = frame.lines().find_map(|line| line.strip_prefix("data: ")) {
                if frame.contains("event: message") {
                    return serde_json::from_str(data).unwrap();
                }
            }
        }
    }

    /// Next message whose `method` equals `method`, skipping pings and status.
    pub async fn next_with_method(&mut self, method: &str) -> Value {
        loop {
            let message = self.next_message().await;
            if message["method"] == method {
                return message;
            }
        }
    }

    /// Next message carrying a response for `id`.
    pub async fn next_response(&mut self, id: i64) -> Value {
        loop {
            let message = self.next_message().await;
            if message.get("method").is_none() && message["id"] == id {
                return message;
            }
        }
    }

    pub async fn ended(&mut self) -> bool {
        matches!(
            tokio::time::timeout(Duration::from_secs(5), self.chunks.next()).await,
            Ok(None)
        )
    }
}
