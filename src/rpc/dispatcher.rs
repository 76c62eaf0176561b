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

//! JSON-RPC method routing.
//!
//! Requests resolve to a response envelope; notifications and replies are
//! acknowledged with nothing to send back. Failures inside handlers are
//! turned into JSON-RPC errors here and never escape to the transport.

use crate::config::Config;
use crate::core::constants::methods;
use crate::core::errors::{SessionError, ToolError};
use crate::core::models::{CorrelationId, JsonRpcError, JsonRpcMessage, TaskId};
use crate::core::wait::{spawn_with_deadline, WaitOutcome};
use crate::rpc::envelope::Inbound;
use crate::rpc::tools::{ToolCatalog, ToolContext};
use crate::scheduler::{start_session_timers, TimerSettings};
use crate::session::correlation::{Reply, Resolution};
use crate::session::store::ClientInfo;
use crate::session::Session;
use crate::tasks::{SteppedWork, TaskRegistry};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of dispatching one inbound envelope
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    Response(JsonRpcMessage),
    Accepted,
}

#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    pub protocol_version: String,
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub tool_timeout: Duration,
    pub elicitation_timeout: Duration,
    pub timers: TimerSettings,
}

pub struct Dispatcher {
    tasks: Arc<TaskRegistry>,
    tools: Arc<ToolCatalog>,
    server: ServerInfo,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        server: ServerInfo,
        settings: DispatchSettings,
        tasks: Arc<TaskRegistry>,
        tools: Arc<ToolCatalog>,
    ) -> Self {
        Self {
            tasks,
            tools,
            server,
            settings,
        }
    }

    /// Dispatcher wired with the default task executor and the given tools.
    pub fn from_config(config: &Config, tools: ToolCatalog) -> Self {
        let executor = Arc::new(SteppedWork::new(
            config.task_step_interval(),
            config.task_default_steps,
        ));
        Self::new(
            ServerInfo {
                name: config.server_name.clone(),
                version: config.server_version.clone(),
                protocol_version: config.protocol_version.clone(),
            },
            DispatchSettings {
                tool_timeout: config.tool_timeout(),
                elicitation_timeout: config.elicitation_timeout(),
                timers: TimerSettings::from(config),
            },
            Arc::new(TaskRegistry::new(executor, config.task_start_delay())),
            Arc::new(tools),
        )
    }

    pub fn tasks(&self) -> &Arc<TaskRegistry> {
        &self.tasks
    }

    /// Methods whose handlers may suspend for a long time (elicitation, tool timeout)
    pub fn may_suspend(method: &str) -> bool {
        method == methods::TOOLS_CALL
    }

    pub async fn dispatch(&self, session: &Arc<Session>, inbound: Inbound) -> Dispatched {
        match inbound {
            Inbound::Request { id, method, params } => {
                let outcome = if session.is_active() {
                    self.handle_request(session, &method, params).await
                } else {
                    Err(SessionError::NotFound(session.id().to_string()).into())
                };
                Dispatched::Response(match outcome {
                    Ok(result) => JsonRpcMessage::success(id, result),
                    Err(error) => {
                        warn!(
                            session_id = %session.id(),
                            method,
                            code = error.code,
                            message = %error.message,
                            "Request failed"
                        );
                        JsonRpcMessage::error(Some(id), error)
                    }
                })
            }
            Inbound::Notification { method, params } => {
                self.handle_notification(session, &method, &params);
                Dispatched::Accepted
            }
            Inbound::Reply { id, reply } => {
                session.accept_reply(&id, reply);
                Dispatched::Accepted
            }
        }
    }

    async fn handle_request(
        &self,
        session: &Arc<Session>,
        method: &str,
        params: Value,
    ) -> Result<Value, JsonRpcError> {
        debug!(session_id = %session.id(), method, "Dispatching request");
        match method {
            methods::INITIALIZE => Ok(self.initialize(session, &params)),
            methods::INITIALIZED => {
                self.acknowledge_initialized(session);
                Ok(json!({}))
            }
            methods::PING => Ok(json!({})),
            methods::TOOLS_LIST => Ok(json!({ "tools": self.tools.descriptors() })),
            methods::TOOLS_CALL => self.call_tool(session, &params).await,
            methods::TASKS_CREATE => self.create_task(session, &params),
            methods::TASKS_GET => to_value(self.tasks.get(&task_id(&params)?)?),
            methods::TASKS_CANCEL => to_value(self.tasks.cancel(&task_id(&params)?)?),
            methods::TASKS_LIST => Ok(json!({ "tasks": self.tasks.list() })),
            methods::ELICITATION_RESPONSE => {
                elicitation_response(session, &params)?;
                Ok(json!({}))
            }
            other => Err(JsonRpcError::method_not_found(other)),
        }
    }

    fn handle_notification(&self, session: &Arc<Session>, method: &str, params: &Value) {
        match method {
            methods::INITIALIZED => self.acknowledge_initialized(session),
            methods::ELICITATION_RESPONSE => {
                if let Err(e) = elicitation_response(session, params) {
                    warn!(
                        session_id = %session.id(),
                        error = %e,
                        "Ignoring malformed elicitation response"
                    );
                }
            }
            other => {
                debug!(session_id = %session.id(), method = other, "Ignoring notification")
            }
        }
    }

    fn initialize(&self, session: &Session, params: &Value) -> Value {
        let client = ClientInfo {
            protocol_version: params
                .get("protocolVersion")
                .and_then(Value::as_str)
                .map(str::to_string),
            info: params.get("clientInfo").cloned(),
        };
        info!(
            session_id = %session.id(),
            client_protocol = ?client.protocol_version,
            "Client initializing"
        );
        session.record_client(client);
        json!({
            "protocolVersion": self.server.protocol_version,
            "capabilities": {
                "tools": { "listChanged": false },
                "elicitation": {},
                "tasks": {},
                "notifications": {
                    "server": [
                        methods::SERVER_STATUS,
                        methods::PROGRESS,
                        methods::MANUAL_NOTIFICATION,
                    ],
                },
            },
            "serverInfo": {
                "name": self.server.name,
                "version": self.server.version,
            },
        })
    }

    fn acknowledge_initialized(&self, session: &Arc<Session>) {
        if session.mark_initialized() {
            start_session_timers(session, self.settings.timers);
            info!(session_id = %session.id(), "Session initialized");
        }
    }

    async fn call_tool(
        &self,
        session: &Arc<Session>,
        params: &Value,
    ) -> Result<Value, JsonRpcError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| JsonRpcError::invalid_params("Missing tool name"))?
            .to_string();
        let handler = self
            .tools
            .get(&name)
            .ok_or_else(|| ToolError::UnknownTool(name.clone()))?;
        let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
        let progress_token = params
            .get("_meta")
            .and_then(|meta| meta.get("progressToken"))
            .cloned();
        let ctx = ToolContext::new(
            session.clone(),
            self.settings.elicitation_timeout,
            progress_token,
        );

        let limit = self.settings.tool_timeout;
        let work = async move { handler.call(&ctx, arguments).await };
        let error = match spawn_with_deadline(work, limit).await {
            WaitOutcome::Ready(Ok(result)) => return to_value(result),
            WaitOutcome::Ready(Err(e)) => match e.downcast::<ToolError>() {
                Ok(tool_error) => tool_error,
                Err(source) => ToolError::Failed { name, source },
            },
            WaitOutcome::TimedOut => ToolError::TimedOut {
                name,
                secs: limit.as_secs(),
            },
            WaitOutcome::Abandoned => ToolError::Panicked(name),
        };
        Err(error.into())
    }

    fn create_task(&self, session: &Arc<Session>, params: &Value) -> Result<Value, JsonRpcError> {
        let method = params
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let task_params = params.get("params").cloned().unwrap_or_else(|| json!({}));
        let progress_token = params
            .get("progressToken")
            .cloned()
            .filter(|t| !t.is_null());
        to_value(self.tasks.create(session, method, task_params, progress_token))
    }
}

fn task_id(params: &Value) -> Result<TaskId, JsonRpcError> {
    let raw = params.get("id").and_then(Value::as_str).unwrap_or_default();
    raw.parse()
        .map_err(|_| JsonRpcError::invalid_params(format!("Task not found: {}", raw)))
}

/// Route an `elicitation/response` message to the waiting handler.
fn elicitation_response(session: &Session, params: &Value) -> Result<Resolution, JsonRpcError> {
    let id = params
        .get("elicitationId")
        .and_then(CorrelationId::from_value)
        .ok_or_else(|| JsonRpcError::invalid_params("Missing elicitationId"))?;
    let action = params
        .get("action")
        .and_then(Value::as_str)
        .ok_or_else(|| JsonRpcError::invalid_params("Missing action"))?;
    let mut answer = json!({ "action": action });
    if let Some(content) = params.get("content").filter(|c| !c.is_null()) {
        answer["content"] = content.clone();
    }
    Ok(session.correlations().resolve(&id, Reply::Result(answer)))
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::jsonrpc;
    use crate::rpc::tools::{CallToolResult, ToolDescriptor, ToolHandler};
    use crate::session::channel::Delivery;
    use crate::session::SessionStore;
    use async_trait::async_trait;
    use futures::StreamExt;

    struct Sleepy;

    #[async_trait]
    impl ToolHandler for Sleepy {
        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor {
                name: "sleepy".into(),
                description: "never finishes in time".into(),
                input_schema: json!({}),
            }
        }

        async fn call(&self, _ctx: &ToolContext, _args: Value) -> anyhow::Result<CallToolResult> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(CallToolResult::text("late"))
        }
    }

    struct Broken;

    #[async_trait]
    impl ToolHandler for Broken {
        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor {
                name: "broken".into(),
                description: "panics".into(),
                input_schema: json!({}),
            }
        }

        async fn call(&self, _ctx: &ToolContext, _args: Value) -> anyhow::Result<CallToolResult> {
            panic!("handler bug")
        }
    }

    fn dispatcher() -> Dispatcher {
        let config = Config {
            tool_timeout_secs: 2,
            ..Config::default()
        };
        let tools = crate::rpc::demo_tools::default_catalog()
            .with(Sleepy)
            .with(Broken);
        Dispatcher::from_config(&config, tools)
    }

    fn request(method: &str, params: Value) -> Inbound {
        Inbound::Request {
            id: json!(1),
            method: method.to_string(),
            params,
        }
    }

    async fn call(
        d: &Dispatcher,
        session: &Arc<Session>,
        method: &str,
        params: Value,
    ) -> JsonRpcMessage {
        match d.dispatch(session, request(method, params)).await {
            Dispatched::Response(message) => message,
            Dispatched::Accepted => panic!("expected a response for {}", method),
        }
    }

    #[tokio::test]
    async fn test_initialize_reports_capabilities() {
        let store = SessionStore::new();
        let session = store.create();
        let d = dispatcher();
        let response = call(
            &d,
            &session,
            "initialize",
            json!({"protocolVersion": "2025-06-18", "clientInfo": {"name": "t"}}),
        )
        .await;
        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], "2025-06-18");
        assert!(result["capabilities"].get("elicitation").is_some());
        assert!(result["capabilities"].get("tasks").is_some());
        assert_eq!(result["serverInfo"]["name"], "lilith-stream");
        assert_eq!(session.client().info, Some(json!({"name": "t"})));
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let store = SessionStore::new();
        let session = store.create();
        let response = call(&dispatcher(), &session, "bogus/method", json!({})).await;
        let error = response.error.unwrap();
        assert_eq!(error.code, jsonrpc::ERROR_METHOD_NOT_FOUND);
        assert_eq!(error.message, "Method not found: bogus/method");
        assert_eq!(response.id, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_task_errors_use_invalid_params() {
        let store = SessionStore::new();
        let session = store.create();
        let d = dispatcher();
        let missing = TaskId::generate().to_string();
        let response = call(&d, &session, "tasks/get", json!({"id": missing})).await;
        let error = response.error.unwrap();
        assert_eq!(error.code, jsonrpc::ERROR_INVALID_PARAMS);
        assert_eq!(error.message, format!("Task not found: {}", missing));

        let response = call(&d, &session, "tasks/cancel", json!({"id": "nope"})).await;
        assert_eq!(response.error.unwrap().code, jsonrpc::ERROR_INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_tasks_create_returns_pending_snapshot() {
        let store = SessionStore::new();
        let session = store.create();
        let d = dispatcher();
        let response = call(
            &d,
            &session,
            "tasks/create",
            json!({"method": "tools/call", "params": {}, "progressToken": "t1"}),
        )
        .await;
        let result = response.result.unwrap();
        assert_eq!(result["state"], "pending");
        assert_eq!(result["progressToken"], "t1");
        let listed = call(&d, &session, "tasks/list", json!({})).await.result.unwrap();
        assert_eq!(listed["tasks"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_tool_call_and_unknown_tool() {
        let store = SessionStore::new();
        let session = store.create();
        let d = dispatcher();
        let response = call(
            &d,
            &session,
            "tools/call",
            json!({"name": "echo", "arguments": {"message": "yo"}}),
        )
        .await;
        assert_eq!(response.result.unwrap()["content"][0]["text"], "Echo: yo");

        let response = call(&d, &session, "tools/call", json!({"name": "ghost"})).await;
        assert_eq!(response.error.unwrap().code, jsonrpc::ERROR_INVALID_PARAMS);

        let params = json!({"name": "echo", "arguments": {}});
        let response = call(&d, &session, "tools/call", params).await;
        assert_eq!(response.error.unwrap().code, jsonrpc::ERROR_INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_tool_panic_is_internal_error() {
        let store = SessionStore::new();
        let session = store.create();
        let params = json!({"name": "broken"});
        let response = call(&dispatcher(), &session, "tools/call", params).await;
        let error = response.error.unwrap();
        assert_eq!(error.code, jsonrpc::ERROR_INTERNAL);
        assert!(error.message.contains("panicked"));
        assert!(session.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tool_timeout_is_internal_error() {
        let store = SessionStore::new();
        let session = store.create();
        let params = json!({"name": "sleepy"});
        let response = call(&dispatcher(), &session, "tools/call", params).await;
        let error = response.error.unwrap();
        assert_eq!(error.code, jsonrpc::ERROR_INTERNAL);
        assert!(error.message.contains("timed out"));
    }

    #[tokio::test]
    async fn test_terminated_session_mid_dispatch_is_internal_error() {
        let store = SessionStore::new();
        let session = store.create();
        store.terminate(&session.id());
        let response = call(&dispatcher(), &session, "ping", json!({})).await;
        assert_eq!(response.error.unwrap().code, jsonrpc::ERROR_INTERNAL);
    }

    #[tokio::test]
    async fn test_elicitation_response_route_resolves_wait() {
        let store = SessionStore::new();
        let session = store.create();
        let d = dispatcher();
        let mut stream = Box::pin(session.drain(Duration::from_secs(600)).unwrap());

        let caller = {
            let session = session.clone();
            tokio::spawn(async move {
                let d = dispatcher();
                let params = json!({
                    "name": "delete_files",
                    "arguments": { "file_pattern": "*.log" },
                });
                call(&d, &session, "tools/call", params).await
            })
        };
        let Some(Delivery::Event(event)) = stream.next().await else {
            panic!("expected elicitation");
        };
        let elicitation_id = event.message.params.unwrap()["elicitationId"].clone();
        let ack = d
            .dispatch(
                &session,
                Inbound::Notification {
                    method: "elicitation/response".into(),
                    params: json!({
                        "elicitationId": elicitation_id,
                        "action": "accept",
                        "content": {"confirm": true},
                    }),
                },
            )
            .await;
        assert_eq!(ack, Dispatched::Accepted);
        let response = caller.await.unwrap();
        let text = response.result.unwrap()["content"][0]["text"].clone();
        assert!(text.as_str().unwrap().starts_with("Successfully deleted 3 files"));
    }

    #[tokio::test]
    async fn test_initialized_notification_starts_timers_once() {
        let store = SessionStore::new();
        let session = store.create();
        let d = dispatcher();
        for _ in 0..2 {
            let outcome = d
                .dispatch(
                    &session,
                    Inbound::Notification {
                        method: "notifications/initialized".into(),
                        params: json!({}),
                    },
                )
                .await;
            assert_eq!(outcome, Dispatched::Accepted);
        }
        assert!(session.is_initialized());
        assert_eq!(session.running_timers(), 2);
        store.terminate(&session.id());
    }
}
