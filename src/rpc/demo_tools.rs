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

//! Default tool set shipped with the server binary.
//!
//! These exist to exercise the transport end to end: plain request/response,
//! progress streaming, unsolicited notifications and single or multi-step
//! elicitation.

use crate::core::constants::methods;
use crate::rpc::tools::{
    required_str, str_or, CallToolResult, ToolCatalog, ToolContext, ToolDescriptor, ToolHandler,
};
use crate::session::elicitation::{ElicitAction, ElicitResult};
use crate::utils::time;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

pub fn default_catalog() -> ToolCatalog {
    ToolCatalog::new()
        .with(Echo)
        .with(LongTask)
        .with(TriggerNotification)
        .with(CreateDocument)
        .with(DeleteFiles)
        .with(DeployApplication)
}

fn descriptor(name: &str, description: &str, input_schema: Value) -> ToolDescriptor {
    ToolDescriptor {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
    }
}

/// Declined or cancelled answers end a tool early with a message.
fn stopped(answer: &ElicitResult, declined: &str, cancelled: &str) -> Option<CallToolResult> {
    match answer.action {
        ElicitAction::Accept => None,
        ElicitAction::Decline => Some(CallToolResult::text(declined)),
        ElicitAction::Cancel => Some(CallToolResult::text(cancelled)),
    }
}

fn accepted<T: for<'de> Deserialize<'de>>(answer: &ElicitResult) -> Result<T, CallToolResult> {
    let content = answer.accepted().cloned().unwrap_or(Value::Null);
    serde_json::from_value(content)
        .map_err(|e| CallToolResult::error(format!("Invalid elicitation response: {}", e)))
}

pub struct Echo;

#[async_trait]
impl ToolHandler for Echo {
    fn descriptor(&self) -> ToolDescriptor {
        descriptor(
            "echo",
            "Echoes back the provided message",
            json!({
                "type": "object",
                "properties": { "message": { "type": "string" } },
                "required": ["message"],
            }),
        )
    }

    async fn call(&self, _ctx: &ToolContext, arguments: Value) -> anyhow::Result<CallToolResult> {
        let message = required_str(&arguments, "message")?;
        Ok(CallToolResult::text(format!("Echo: {}", message)))
    }
}

pub struct LongTask;

#[async_trait]
impl ToolHandler for LongTask {
    fn descriptor(&self) -> ToolDescriptor {
        descriptor(
            "long_task",
            "Runs for a while, reporting progress when a progress token is supplied",
            json!({
                "type": "object",
                "properties": {
                    "steps": { "type": "integer", "minimum": 1, "maximum": 100 },
                    "delay_ms": { "type": "integer", "minimum": 0 },
                },
            }),
        )
    }

    async fn call(&self, ctx: &ToolContext, arguments: Value) -> anyhow::Result<CallToolResult> {
        let steps = arguments
            .get("steps")
            .and_then(Value::as_u64)
            .unwrap_or(5)
            .clamp(1, 100);
        let delay = Duration::from_millis(
            arguments
                .get("delay_ms")
                .and_then(Value::as_u64)
                .unwrap_or(500),
        );
        for step in 1..=steps {
            tokio::time::sleep(delay).await;
            ctx.progress(step, steps, Some(&format!("Step {} of {}", step, steps)));
        }
        Ok(CallToolResult::text(format!(
            "Long task completed after {} steps",
            steps
        )))
    }
}

pub struct TriggerNotification;

#[async_trait]
impl ToolHandler for TriggerNotification {
    fn descriptor(&self) -> ToolDescriptor {
        descriptor(
            "trigger_notification",
            "Pushes a notification onto the session's event stream",
            json!({
                "type": "object",
                "properties": { "message": { "type": "string" } },
            }),
        )
    }

    async fn call(&self, ctx: &ToolContext, arguments: Value) -> anyhow::Result<CallToolResult> {
        let message = str_or(&arguments, "message", "Manual notification");
        let delivered = ctx.notify(
            methods::MANUAL_NOTIFICATION,
            json!({ "message": message, "timestamp": time::now() }),
        );
        Ok(if delivered {
            CallToolResult::text(format!("Notification sent: {}", message))
        } else {
            CallToolResult::error("Session is no longer active")
        })
    }
}

#[derive(Deserialize)]
struct DocumentDetails {
    title: String,
    #[serde(default = "anonymous")]
    author: String,
}

fn anonymous() -> String {
    "Anonymous".to_string()
}

#[derive(Deserialize)]
struct DocumentContent {
    content: String,
}

pub struct CreateDocument;

#[async_trait]
impl ToolHandler for CreateDocument {
    fn descriptor(&self) -> ToolDescriptor {
        descriptor(
            "create_document",
            "Create a document interactively; asks for title, author and content",
            json!({
                "type": "object",
                "properties": {
                    "format": { "type": "string", "enum": ["markdown", "plain", "html"] },
                },
                "required": ["format"],
            }),
        )
    }

    async fn call(&self, ctx: &ToolContext, arguments: Value) -> anyhow::Result<CallToolResult> {
        let format = str_or(&arguments, "format", "plain");

        let answer = ctx
            .elicit(
                "Please provide document details:",
                json!({
                    "type": "object",
                    "properties": {
                        "title": { "type": "string", "minLength": 1 },
                        "author": { "type": "string", "default": "Anonymous" },
                    },
                    "required": ["title"],
                }),
            )
            .await;
        if let Some(done) = stopped(
            &answer,
            "User declined to provide document details. Operation cancelled.",
            "User cancelled the operation.",
        ) {
            return Ok(done);
        }
        let details: DocumentDetails = match accepted(&answer) {
            Ok(details) => details,
            Err(result) => return Ok(result),
        };

        let answer = ctx
            .elicit(
                &format!(
                    "Please provide content for '{}' by {}:",
                    details.title, details.author
                ),
                json!({
                    "type": "object",
                    "properties": { "content": { "type": "string", "minLength": 1 } },
                    "required": ["content"],
                }),
            )
            .await;
        let declined = format!(
            "User declined to provide content. Document '{}' not created.",
            details.title
        );
        if let Some(done) = stopped(&answer, &declined, "User cancelled the operation.") {
            return Ok(done);
        }
        let body: DocumentContent = match accepted(&answer) {
            Ok(body) => body,
            Err(result) => return Ok(result),
        };

        let document = match format {
            "markdown" => format!(
                "# {}\n\n**Author:** {}\n\n{}",
                details.title, details.author, body.content
            ),
            "html" => format!(
                "<html>\n<head><title>{t}</title></head>\n<body>\n<h1>{t}</h1>\n<p><em>By {a}</em></p>\n<p>{c}</p>\n</body>\n</html>",
                t = details.title,
                a = details.author,
                c = body.content
            ),
            _ => format!("{}\nBy {}\n\n{}", details.title, details.author, body.content),
        };
        Ok(CallToolResult::text(format!(
            "Document created successfully!\n\nFormat: {}\nTitle: {}\nAuthor: {}\n\n{}",
            format, details.title, details.author, document
        )))
    }
}

#[derive(Deserialize)]
struct Confirmation {
    confirm: bool,
    #[serde(default)]
    reason: String,
}

fn confirmation_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "confirm": { "type": "boolean", "description": "Confirm the operation" },
            "reason": { "type": "string", "description": "Optional reason for declining" },
        },
        "required": ["confirm"],
    })
}

pub struct DeleteFiles;

#[async_trait]
impl ToolHandler for DeleteFiles {
    fn descriptor(&self) -> ToolDescriptor {
        descriptor(
            "delete_files",
            "Delete files matching a pattern after explicit confirmation",
            json!({
                "type": "object",
                "properties": { "file_pattern": { "type": "string" } },
                "required": ["file_pattern"],
            }),
        )
    }

    async fn call(&self, ctx: &ToolContext, arguments: Value) -> anyhow::Result<CallToolResult> {
        let pattern = required_str(&arguments, "file_pattern")?;
        // Simulated match set; nothing touches the filesystem.
        let files = ["temp1.tmp", "temp2.tmp", "cache.tmp"];

        let answer = ctx
            .elicit(
                &format!(
                    "WARNING: Delete Files\n\nPattern: {}\nFiles to delete: {}\n- {}\n\nThis operation cannot be undone. Do you want to proceed?",
                    pattern,
                    files.len(),
                    files.join(", ")
                ),
                confirmation_schema(),
            )
            .await;
        if let Some(done) = stopped(
            &answer,
            "User declined. No files were deleted.",
            "Operation cancelled. No files were deleted.",
        ) {
            return Ok(done);
        }
        let confirmation: Confirmation = match accepted(&answer) {
            Ok(confirmation) => confirmation,
            Err(result) => return Ok(result),
        };
        if !confirmation.confirm {
            let reason = if confirmation.reason.is_empty() {
                "No reason provided"
            } else {
                confirmation.reason.as_str()
            };
            return Ok(CallToolResult::text(format!(
                "Deletion not confirmed. Reason: {}\nNo files were deleted.",
                reason
            )));
        }
        Ok(CallToolResult::text(format!(
            "Successfully deleted {} files:\n- {}",
            files.len(),
            files.join("\n- ")
        )))
    }
}

pub struct DeployApplication;

#[async_trait]
impl ToolHandler for DeployApplication {
    fn descriptor(&self) -> ToolDescriptor {
        descriptor(
            "deploy_application",
            "Deploy an application with multi-step confirmation",
            json!({
                "type": "object",
                "properties": {
                    "environment": {
                        "type": "string",
                        "enum": ["development", "staging", "production"],
                    },
                    "version": { "type": "string" },
                },
                "required": ["environment", "version"],
            }),
        )
    }

    async fn call(&self, ctx: &ToolContext, arguments: Value) -> anyhow::Result<CallToolResult> {
        let environment = str_or(&arguments, "environment", "development");
        let version = str_or(&arguments, "version", "latest");

        let answer = ctx
            .elicit(
                &format!(
                    "Deploy Application\n\nEnvironment: {}\nVersion: {}\n\nDo you want to proceed with deployment?",
                    environment, version
                ),
                confirmation_schema(),
            )
            .await;
        if let Some(done) = stopped(&answer, "Deployment declined.", "Deployment cancelled.") {
            return Ok(done);
        }
        match accepted::<Confirmation>(&answer) {
            Ok(c) if c.confirm => {}
            Ok(_) => return Ok(CallToolResult::text("Deployment not confirmed.")),
            Err(result) => return Ok(result),
        }

        if environment == "production" {
            let answer = ctx
                .elicit(
                    &format!(
                        "PRODUCTION DEPLOYMENT\n\nYou are deploying version {} to PRODUCTION.\n\nThis will affect live users. Please confirm again:",
                        version
                    ),
                    confirmation_schema(),
                )
                .await;
            let confirmed = answer.action == ElicitAction::Accept
                && matches!(accepted::<Confirmation>(&answer), Ok(c) if c.confirm);
            if !confirmed {
                return Ok(CallToolResult::text(
                    "Production deployment cancelled at final confirmation.",
                ));
            }
        }

        Ok(CallToolResult::text(format!(
            "Successfully deployed version {} to {}!",
            version, environment
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::channel::Delivery;
    use crate::session::correlation::Reply;
    use crate::session::SessionStore;
    use futures::StreamExt;
    use std::sync::Arc;

    fn context(store: &SessionStore, token: Option<Value>) -> ToolContext {
        ToolContext::new(store.create(), Duration::from_secs(30), token)
    }

    /// Answer every elicitation on the session's stream with the next canned answer.
    fn answer_elicitations(ctx: &ToolContext, answers: Vec<Value>) -> tokio::task::JoinHandle<usize> {
        let session = ctx.session().clone();
        let mut stream = Box::pin(session.drain(Duration::from_secs(600)).unwrap());
        tokio::spawn(async move {
            let mut answered = 0;
            for answer in answers {
                loop {
                    match stream.next().await {
                        Some(Delivery::Event(event))
                            if event.message.method.as_deref() == Some("elicitation/create") =>
                        {
                            session.accept_reply(&event.message.id.unwrap(), Reply::Result(answer));
                            answered += 1;
                            break;
                        }
                        Some(_) => continue,
                        None => return answered,
                    }
                }
            }
            answered
        })
    }

    #[tokio::test]
    async fn test_echo() {
        let store = SessionStore::new();
        let ctx = context(&store, None);
        let result = Echo.call(&ctx, json!({"message": "hi"})).await.unwrap();
        assert_eq!(result.text_content(), "Echo: hi");
        assert!(Echo.call(&ctx, json!({})).await.is_err());
    }

    #[tokio::test]
    async fn test_create_document_two_step_elicitation() {
        let store = SessionStore::new();
        let ctx = context(&store, None);
        let responder = answer_elicitations(
            &ctx,
            vec![
                json!({"action": "accept", "content": {"title": "Plan", "author": "Ada"}}),
                json!({"action": "accept", "content": {"content": "Ship it"}}),
            ],
        );
        let result = CreateDocument
            .call(&ctx, json!({"format": "markdown"}))
            .await
            .unwrap();
        assert_eq!(responder.await.unwrap(), 2);
        let text = result.text_content();
        assert!(text.contains("# Plan"));
        assert!(text.contains("**Author:** Ada"));
        assert!(text.contains("Ship it"));
    }

    #[tokio::test]
    async fn test_create_document_decline_stops_after_first_step() {
        let store = SessionStore::new();
        let ctx = context(&store, None);
        let responder = answer_elicitations(&ctx, vec![json!({"action": "decline"})]);
        let result = CreateDocument.call(&ctx, json!({"format": "plain"})).await.unwrap();
        assert_eq!(responder.await.unwrap(), 1);
        assert!(result.text_content().contains("declined"));
    }

    #[tokio::test]
    async fn test_production_deploy_needs_second_confirmation() {
        let store = SessionStore::new();
        let ctx = context(&store, None);
        let responder = answer_elicitations(
            &ctx,
            vec![
                json!({"action": "accept", "content": {"confirm": true}}),
                json!({"action": "accept", "content": {"confirm": false}}),
            ],
        );
        let result = DeployApplication
            .call(&ctx, json!({"environment": "production", "version": "1.2.3"}))
            .await
            .unwrap();
        assert_eq!(responder.await.unwrap(), 2);
        assert!(result.text_content().contains("cancelled at final confirmation"));
    }

    #[tokio::test]
    async fn test_delete_files_requires_confirm_true() {
        let store = SessionStore::new();
        let ctx = context(&store, None);
        let responder = answer_elicitations(
            &ctx,
            vec![json!({"action": "accept", "content": {"confirm": false, "reason": "oops"}})],
        );
        let result = DeleteFiles
            .call(&ctx, json!({"file_pattern": "*.tmp"}))
            .await
            .unwrap();
        responder.await.unwrap();
        assert!(result.text_content().contains("Reason: oops"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_task_reports_progress() {
        let store = SessionStore::new();
        let ctx = context(&store, Some(json!("p-1")));
        let session: Arc<_> = ctx.session().clone();
        let result = LongTask
            .call(&ctx, json!({"steps": 3, "delay_ms": 10}))
            .await
            .unwrap();
        assert!(result.text_content().contains("3 steps"));
        assert_eq!(session.events_pushed(), 3);
    }

    #[tokio::test]
    async fn test_trigger_notification_pushes_event() {
        let store = SessionStore::new();
        let ctx = context(&store, None);
        TriggerNotification
            .call(&ctx, json!({"message": "ding"}))
            .await
            .unwrap();
        let mut stream = Box::pin(ctx.session().drain(Duration::from_secs(1)).unwrap());
        let Some(Delivery::Event(event)) = stream.next().await else {
            panic!("expected notification");
        };
        assert_eq!(event.message.method.as_deref(), Some("notification/manual"));
        assert_eq!(event.message.params.unwrap()["message"], "ding");
    }
}
