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

//! Time utilities.
//!
//! Wall-clock timestamps are only used for wire payloads. Durations
//! (uptime, inactivity) are measured on the tokio clock so tests can pause it.

use chrono::{DateTime, SecondsFormat, Utc};

pub fn now() -> String {
    rfc3339(Utc::now())
}

/// RFC 3339 rendering used in task snapshots and status notifications
pub fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
