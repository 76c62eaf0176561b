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

//! lilith-stream: a session-oriented JSON-RPC transport over HTTP and SSE.
//!
//! The library owns the moving parts of a bidirectional MCP-style
//! transport: sessions with per-session ordered event delivery, server
//! initiated requests that suspend until the client answers (elicitation),
//! background tasks with progress and cooperative cancellation, and the
//! periodic keepalive, status and reaper timers that keep it all tidy.

pub mod config;
pub mod core;
pub mod http;
pub mod rpc;
pub mod scheduler;
pub mod session;
pub mod tasks;
pub mod utils;
