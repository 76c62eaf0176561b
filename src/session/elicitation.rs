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

//! Elicitation: asking the client a question from inside a handler.

use crate::core::constants::methods;
use crate::core::models::JsonRpcMessage;
use crate::session::correlation::Answer;
use crate::session::store::Session;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElicitAction {
    Accept,
    Decline,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElicitResult {
    pub action: ElicitAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
}

impl ElicitResult {
    pub fn cancel() -> Self {
        Self {
            action: ElicitAction::Cancel,
            content: None,
        }
    }

    /// Content of an accepted answer, `None` for decline and cancel
    pub fn accepted(&self) -> Option<&Value> {
        match self.action {
            ElicitAction::Accept => self.content.as_ref().or(Some(&Value::Null)),
            _ => None,
        }
    }
}

/// Push an `elicitation/create` request and suspend until the client answers.
///
/// Timeouts, client errors, malformed answers and session teardown all come
/// back as a cancel so callers handle a single "no" path.
pub async fn elicit(
    session: &Session,
    message: &str,
    schema: Value,
    timeout: Duration,
) -> ElicitResult {
    let correlations = session.correlations();
    let id = correlations.begin_wait();
    let request = JsonRpcMessage::request(
        id.to_value(),
        methods::ELICITATION_CREATE,
        Some(json!({
            "elicitationId": id.as_str(),
            "message": message,
            "requestedSchema": schema,
        })),
    );
    if !session.push(request) {
        correlations.discard(&id);
        return ElicitResult::cancel();
    }
    debug!(session_id = %session.id(), correlation_id = %id, "Elicitation sent");

    match correlations.wait(&id, timeout).await {
        Ok(Answer::Reply(value)) => serde_json::from_value(value).unwrap_or_else(|e| {
            warn!(correlation_id = %id, error = %e, "Malformed elicitation answer");
            ElicitResult::cancel()
        }),
        Ok(Answer::Rejected(error)) => {
            warn!(correlation_id = %id, %error, "Client rejected elicitation");
            ElicitResult::cancel()
        }
        Ok(Answer::Cancelled(reason)) => {
            debug!(correlation_id = %id, ?reason, "Elicitation cancelled");
            ElicitResult::cancel()
        }
        Err(e) => {
            warn!(correlation_id = %id, error = %e, "Elicitation wait failed");
            ElicitResult::cancel()
        }
    }
}
