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

//! Pluggable tool handlers.
//!
//! The transport core knows nothing about what a tool does. Deployments
//! register [`ToolHandler`]s in a [`ToolCatalog`]; the dispatcher runs each
//! call on its own task with a [`ToolContext`] that can talk back to the
//! client (progress, notifications, elicitation) through the session.

use crate::core::errors::ToolError;
use crate::core::models::JsonRpcMessage;
use crate::session::elicitation::{elicit, ElicitResult};
use crate::session::Session;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    Text { text: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    pub content: Vec<Content>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl CallToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::Text { text: text.into() }],
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::Text { text: text.into() }],
            is_error: true,
        }
    }

    /// Concatenated text content
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .map(|Content::Text { text }| text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn descriptor(&self) -> ToolDescriptor;

    async fn call(&self, ctx: &ToolContext, arguments: Value) -> anyhow::Result<CallToolResult>;
}

/// What a running tool may do besides returning its result
pub struct ToolContext {
    session: Arc<Session>,
    elicitation_timeout: Duration,
    progress_token: Option<Value>,
}

impl ToolContext {
    pub fn new(
        session: Arc<Session>,
        elicitation_timeout: Duration,
        progress_token: Option<Value>,
    ) -> Self {
        Self {
            session,
            elicitation_timeout,
            progress_token,
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn progress_token(&self) -> Option<&Value> {
        self.progress_token.as_ref()
    }

    /// Ask the client a question and suspend until it answers or the wait times out.
    pub async fn elicit(&self, message: &str, schema: Value) -> ElicitResult {
        elicit(&self.session, message, schema, self.elicitation_timeout).await
    }

    pub fn notify(&self, method: &str, params: Value) -> bool {
        self.session.push(JsonRpcMessage::notification(method, Some(params)))
    }

    /// Emit `notifications/progress` for the caller's progress token, if any.
    pub fn progress(&self, progress: u64, total: u64, message: Option<&str>) -> bool {
        let Some(token) = &self.progress_token else {
            return false;
        };
        self.session
            .push(JsonRpcMessage::progress(token.clone(), progress, total, message))
    }
}

/// Ordered set of tools, looked up by name
#[derive(Default, Clone)]
pub struct ToolCatalog {
    tools: Vec<Arc<dyn ToolHandler>>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any earlier handler with the same name.
    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        let name = handler.descriptor().name;
        self.tools.retain(|t| t.descriptor().name != name);
        self.tools.push(handler);
    }

    pub fn with(mut self, handler: impl ToolHandler + 'static) -> Self {
        self.register(Arc::new(handler));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools
            .iter()
            .find(|t| t.descriptor().name == name)
            .cloned()
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Required string argument
pub fn required_str<'a>(arguments: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArguments(format!("'{}' must be a string", key)))
}

/// Optional string argument with a fallback
pub fn str_or<'a>(arguments: &'a Value, key: &str, fallback: &'a str) -> &'a str {
    arguments.get(key).and_then(Value::as_str).unwrap_or(fallback)
}
