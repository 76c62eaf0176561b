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

//! Server configuration.
//!
//! Layers, lowest first: built-in defaults, an optional YAML file, the
//! environment, then CLI flags (applied by the binary).

use crate::core::constants::config as env_keys;
use crate::core::constants::timing;
use crate::core::errors::TransportError;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Which transport variant this instance speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// POST answers inline, GET opens the event stream
    Streamable,
    /// GET opens the stream and creates the session, POST answers on the stream
    Sse,
}

impl FromStr for TransportMode {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "streamable" | "streamable-http" | "http" => Ok(TransportMode::Streamable),
            "sse" | "legacy" => Ok(TransportMode::Sse),
            other => Err(TransportError::Configuration(format!(
                "unknown transport '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportMode::Streamable => f.write_str("streamable"),
            TransportMode::Sse => f.write_str("sse"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub transport: TransportMode,
    pub protocol_version: String,
    pub server_name: String,
    pub server_version: String,
    pub ping_interval_secs: u64,
    pub status_interval_secs: u64,
    pub reaper_interval_secs: u64,
    pub inactivity_timeout_secs: u64,
    pub stream_keepalive_secs: u64,
    pub elicitation_timeout_secs: u64,
    pub tool_timeout_secs: u64,
    pub task_start_delay_ms: u64,
    pub task_step_interval_ms: u64,
    pub task_default_steps: u64,
    pub log_level: String,
    pub log_format: String, // "json" or "text"
}

impl Config {
    /// Defaults, then the YAML file named by `LILITH_STREAM_CONFIG`, then the environment.
    pub fn from_env() -> Result<Self, TransportError> {
        let mut config = match env::var(env_keys::ENV_CONFIG_PATH) {
            Ok(path) => Self::from_yaml_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_env_from(|key| env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, TransportError> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml_ng::from_str(&content).map_err(|e| {
            TransportError::Configuration(format!("{}: {}", path.display(), e))
        })
    }

    /// Overlay values from `lookup` (the process environment in production).
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), TransportError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(env_keys::ENV_HOST) {
            self.host = host;
        }
        if let Some(port) = parse_var(&lookup, env_keys::ENV_PORT)? {
            self.port = port;
        }
        if let Some(path) = lookup(env_keys::ENV_PATH) {
            self.path = path;
        }
        if let Some(transport) = parse_var(&lookup, env_keys::ENV_TRANSPORT)? {
            self.transport = transport;
        }
        if let Some(version) = lookup(env_keys::ENV_PROTOCOL_VERSION) {
            self.protocol_version = version;
        }
        if let Some(secs) = parse_var(&lookup, env_keys::ENV_INACTIVITY_TIMEOUT)? {
            self.inactivity_timeout_secs = secs;
        }
        if let Some(secs) = parse_var(&lookup, env_keys::ENV_ELICITATION_TIMEOUT)? {
            self.elicitation_timeout_secs = secs;
        }
        if let Some(secs) = parse_var(&lookup, env_keys::ENV_TOOL_TIMEOUT)? {
            self.tool_timeout_secs = secs;
        }
        if let Some(level) = lookup(env_keys::ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        if let Some(format) = lookup(env_keys::ENV_LOG_FORMAT) {
            self.log_format = format;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), TransportError> {
        if !self.path.starts_with('/') {
            return Err(TransportError::Configuration(format!(
                "path must start with '/': {}",
                self.path
            )));
        }
        let intervals = [
            ("ping_interval_secs", self.ping_interval_secs),
            ("status_interval_secs", self.status_interval_secs),
            ("reaper_interval_secs", self.reaper_interval_secs),
            ("inactivity_timeout_secs", self.inactivity_timeout_secs),
            ("stream_keepalive_secs", self.stream_keepalive_secs),
            ("elicitation_timeout_secs", self.elicitation_timeout_secs),
            ("tool_timeout_secs", self.tool_timeout_secs),
            ("task_default_steps", self.task_default_steps),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, v)| *v == 0) {
            return Err(TransportError::Configuration(format!(
                "{} must be greater than zero",
                name
            )));
        }
        if self.log_format != "json" && self.log_format != "text" {
            return Err(TransportError::Configuration(format!(
                "log_format must be 'json' or 'text', got '{}'",
                self.log_format
            )));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs)
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }

    pub fn stream_keepalive(&self) -> Duration {
        Duration::from_secs(self.stream_keepalive_secs)
    }

    pub fn elicitation_timeout(&self) -> Duration {
        Duration::from_secs(self.elicitation_timeout_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn task_start_delay(&self) -> Duration {
        Duration::from_millis(self.task_start_delay_ms)
    }

    pub fn task_step_interval(&self) -> Duration {
        Duration::from_millis(self.task_step_interval_ms)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, TransportError>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| {
                TransportError::Configuration(format!("{}='{}': {}", key, raw, e))
            })
        })
        .transpose()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            path: "/mcp".to_string(),
            transport: TransportMode::Streamable,
            protocol_version: "2025-06-18".to_string(),
            server_name: env!("CARGO_PKG_NAME").to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            ping_interval_secs: timing::PING_INTERVAL_SECS,
            status_interval_secs: timing::STATUS_INTERVAL_SECS,
            reaper_interval_secs: timing::REAPER_INTERVAL_SECS,
            inactivity_timeout_secs: timing::INACTIVITY_TIMEOUT_SECS,
            stream_keepalive_secs: timing::STREAM_KEEPALIVE_SECS,
            elicitation_timeout_secs: timing::ELICITATION_TIMEOUT_SECS,
            tool_timeout_secs: timing::TOOL_TIMEOUT_SECS,
            task_start_delay_ms: timing::TASK_START_DELAY_MS,
            task_step_interval_ms: timing::TASK_STEP_INTERVAL_MS,
            task_default_steps: timing::TASK_DEFAULT_STEPS,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}
