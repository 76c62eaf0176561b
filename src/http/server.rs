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

//! Axum router and handlers for the transport endpoint.
//!
//! One path serves both directions. The streamable variant answers requests
//! inline and streams server-initiated traffic over a separate GET; the
//! legacy SSE variant opens the stream first and routes every response
//! through it.

use crate::config::{Config, TransportMode};
use crate::core::constants::{limits, methods, session::HEADER_SESSION_ID};
use crate::core::errors::{SessionError, TransportError};
use crate::core::models::JsonRpcMessage;
use crate::http::sse;
use crate::rpc::envelope::{self, Inbound};
use crate::rpc::{Dispatched, Dispatcher, ToolCatalog};
use crate::scheduler::spawn_reaper;
use crate::session::correlation::{Reply, Resolution};
use crate::session::{Session, SessionStore};
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, MethodRouter};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SessionStore>,
    pub dispatcher: Arc<Dispatcher>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Build the shared state. The config is validated here too, since zero
    /// intervals would otherwise reach the timers.
    pub fn new(config: Config, tools: ToolCatalog) -> Result<Self, TransportError> {
        config.validate()?;
        let dispatcher = Dispatcher::from_config(&config, tools);
        Ok(Self {
            store: Arc::new(SessionStore::new()),
            dispatcher: Arc::new(dispatcher),
            config: Arc::new(config),
        })
    }
}

/// Error body returned for transport-level failures
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Converts transport errors to HTTP responses
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl From<TransportError> for ApiError {
    fn from(err: TransportError) -> Self {
        Self {
            status: StatusCode::from_u16(err.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            message: err.user_message(),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        TransportError::from(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        debug!(status = %self.status, message = %self.message, "Rejecting request");
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

/// Build the router for the configured transport variant.
///
/// Layers, outermost first: request tracing, body size limit.
pub fn create_router(state: AppState) -> Router {
    let endpoint: MethodRouter<AppState> = match state.config.transport {
        TransportMode::Streamable => get(streamable_connect)
            .post(streamable_submit)
            .delete(terminate),
        TransportMode::Sse => get(legacy_connect).post(legacy_submit).delete(terminate),
    };
    let path = state.config.path.clone();

    Router::new()
        .route(&path, endpoint)
        .route("/health", get(health))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(limits::MAX_MESSAGE_SIZE_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` resolves, then terminate every session so open
/// streams end and graceful shutdown can complete.
pub async fn serve<F>(
    listener: TcpListener,
    state: AppState,
    shutdown: F,
) -> Result<(), TransportError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let store = Arc::clone(&state.store);
    let reaper_stop = CancellationToken::new();
    let reaper = spawn_reaper(
        Arc::clone(&store),
        state.config.reaper_interval(),
        state.config.inactivity_timeout(),
        reaper_stop.clone(),
    );

    info!(
        addr = %listener.local_addr()?,
        transport = %state.config.transport,
        path = %state.config.path,
        "Server listening"
    );

    let router = create_router(state);
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown.await;
            let terminated = store.terminate_all();
            info!(sessions = terminated, "Shutting down, sessions terminated");
        })
        .await?;

    reaper_stop.cancel();
    let _ = reaper.await;
    info!("Server shutdown complete");
    Ok(())
}

fn session_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(HEADER_SESSION_ID)
        .and_then(|value| value.to_str().ok())
}

fn accepts_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.contains(sse::CONTENT_TYPE_EVENT_STREAM))
}

/// Answer a request inline: one SSE frame, or plain JSON for clients that
/// do not accept event streams.
fn reply_inline(headers: &HeaderMap, session: &Session, message: JsonRpcMessage) -> Response {
    let session_id = [(HEADER_SESSION_ID, session.id().to_string())];
    if !accepts_event_stream(headers) {
        return (session_id, Json(message)).into_response();
    }
    match sse::message_frame(None, &message) {
        Ok(frame) => (
            [
                (header::CONTENT_TYPE, sse::CONTENT_TYPE_EVENT_STREAM),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            session_id,
            frame,
        )
            .into_response(),
        Err(e) => ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: e.to_string(),
        }
        .into_response(),
    }
}

fn route_reply(session: &Session, id: Value, reply: Reply) {
    if session.accept_reply(&id, reply) == Resolution::Unknown {
        debug!(session_id = %session.id(), id = %id, "Reply matched no pending request");
    }
}

async fn streamable_submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let header = session_header(&headers);
    let inbound = match envelope::parse(&body) {
        Ok(inbound) => inbound,
        Err(rejected) => {
            debug!(code = rejected.error.code, "Malformed envelope");
            return Ok(Json(rejected.into_response()).into_response());
        }
    };

    let session = match (&inbound, header) {
        (Inbound::Request { method, .. }, None) if method == methods::INITIALIZE => {
            state.store.create()
        }
        (_, header) => state.store.lookup(header)?,
    };
    session.touch();

    match inbound {
        Inbound::Reply { id, reply } => {
            route_reply(&session, id, reply);
            Ok(StatusCode::ACCEPTED.into_response())
        }
        inbound => match state.dispatcher.dispatch(&session, inbound).await {
            Dispatched::Response(message) => Ok(reply_inline(&headers, &session, message)),
            Dispatched::Accepted => Ok(StatusCode::ACCEPTED.into_response()),
        },
    }
}

async fn streamable_connect(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let session = state.store.lookup(session_header(&headers))?;
    session.touch();
    let body = sse::event_stream(
        &state.store,
        &session,
        state.config.stream_keepalive(),
        None,
    )?;
    info!(session_id = %session.id(), "Event stream attached");
    Ok(sse::stream_response(session.id(), body))
}

async fn legacy_connect(State(state): State<AppState>) -> Result<Response, ApiError> {
    let session = state.store.create();
    let body = sse::event_stream(
        &state.store,
        &session,
        state.config.stream_keepalive(),
        Some(sse::endpoint_frame(&state.config.path)),
    )?;
    info!(session_id = %session.id(), "Legacy event stream opened");
    Ok(sse::stream_response(session.id(), body))
}

async fn legacy_submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let session = state.store.lookup(session_header(&headers))?;
    session.touch();

    let inbound = match envelope::parse(&body) {
        Ok(inbound) => inbound,
        Err(rejected) => {
            session.push(rejected.into_response());
            return Ok(StatusCode::ACCEPTED);
        }
    };
    if let Inbound::Reply { id, reply } = inbound {
        route_reply(&session, id, reply);
        return Ok(StatusCode::ACCEPTED);
    }

    let suspends = inbound.method().is_some_and(Dispatcher::may_suspend);
    let dispatcher = Arc::clone(&state.dispatcher);
    let work = async move {
        if let Dispatched::Response(message) = dispatcher.dispatch(&session, inbound).await {
            session.push(message);
        }
    };
    // A suspended tool call must not hold the POST open; its answer
    // arrives on another POST.
    if suspends {
        tokio::spawn(work);
    } else {
        work.await;
    }
    Ok(StatusCode::ACCEPTED)
}

async fn terminate(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let session = state.store.lookup(session_header(&headers))?;
    if !state.store.terminate(&session.id()) {
        return Err(SessionError::NotFound(session.id().to_string()).into());
    }
    info!(session_id = %session.id(), "Session terminated by client");
    Ok(Json(json!({ "terminated": session.id().to_string() })))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "sessions": state.store.len(),
        "tasks": state.dispatcher.tasks().len(),
        "transport": state.config.transport,
    }))
}
