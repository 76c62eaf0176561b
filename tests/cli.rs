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

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

fn bin() -> Command {
    let mut cmd = Command::cargo_bin("lilith-stream").unwrap();
    cmd.env_remove("LILITH_STREAM_CONFIG")
        .env_remove("LILITH_STREAM_PORT")
        .env_remove("LILITH_STREAM_TRANSPORT")
        .env_remove("LOG_FORMAT");
    cmd
}

#[test]
fn test_help_lists_flags() {
    bin()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--transport"))
        .stdout(predicate::str::contains("--print-config"));
}

#[test]
fn test_print_config_applies_flags() {
    bin()
        .args(["--print-config", "--port", "9100", "--transport", "sse", "--path", "/rpc"])
        .assert()
        .success()
        .stdout(predicate::str::contains("port: 9100"))
        .stdout(predicate::str::contains("transport: sse"))
        .stdout(predicate::str::contains("path: /rpc"));
}

#[test]
fn test_config_file_then_env_then_flags() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "port: 7000\nhost: 0.0.0.0\ntool_timeout_secs: 5").unwrap();

    bin()
        .env("LILITH_STREAM_PORT", "7100")
        .args(["--print-config", "--host", "127.0.0.2"])
        .arg("--config")
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("port: 7100"))
        .stdout(predicate::str::contains("host: 127.0.0.2"))
        .stdout(predicate::str::contains("tool_timeout_secs: 5"));
}

#[test]
fn test_invalid_config_rejected() {
    bin()
        .args(["--print-config", "--path", "no-slash"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("path must start with '/'"));
}
